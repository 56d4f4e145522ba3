use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time as an RFC 3339 string with millisecond precision.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generates an outbound message id of the form `{epoch_ms}_{base36}`.
///
/// Ids are not globally unique; two ids minted in the same millisecond may
/// collide with small probability.
pub(crate) fn message_id() -> String {
    format!("{}_{}", now_millis(), random_suffix())
}

fn random_suffix() -> String {
    let mut hasher = RandomState::new().build_hasher();
    SEQUENCE.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    now_millis().hash(&mut hasher);
    to_base36(hasher.finish(), SUFFIX_LEN)
}

fn to_base36(mut value: u64, len: usize) -> String {
    let mut digits = Vec::with_capacity(len);
    for _ in 0..len {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_shape() {
        let id = message_id();
        let (millis, suffix) = id.split_once('_').unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_message_ids_vary() {
        assert_ne!(message_id(), message_id());
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0, 3), "000");
        assert_eq!(to_base36(35, 2), "0z");
        assert_eq!(to_base36(36, 2), "10");
    }

    #[test]
    fn test_now_rfc3339_parses() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
