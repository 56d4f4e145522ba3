//! Credential storage boundary.
//!
//! Durable persistence belongs to the host; the coordinator only needs
//! synchronous `get`/`set`/`clear` so that the expiry check and the creation
//! of a refresh ticket happen under one lock acquisition.

use std::sync::{PoisonError, RwLock};

use crate::types::Credentials;

/// Storage for the current credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credentials>;

    /// Replace the stored credentials as one unit.
    fn set(&self, credentials: Credentials);

    fn clear(&self);
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: RwLock::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credentials> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credentials: Credentials) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials);
    }

    fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessToken;
    use chrono::Utc;

    fn creds(token: &str) -> Credentials {
        Credentials::new(
            AccessToken::new(token).unwrap(),
            Utc::now() + chrono::Duration::hours(1),
            Some("refresh".to_string()),
        )
    }

    #[test]
    fn test_memory_store_starts_empty() {
        assert!(MemoryCredentialStore::new().get().is_none());
    }

    #[test]
    fn test_memory_store_set_replaces() {
        let store = MemoryCredentialStore::with_credentials(creds("first"));
        store.set(creds("second"));
        assert_eq!(store.get().unwrap().access_token.as_str(), "second");
    }

    #[test]
    fn test_memory_store_clear() {
        let store = MemoryCredentialStore::with_credentials(creds("t"));
        store.clear();
        assert!(store.get().is_none());
    }
}
