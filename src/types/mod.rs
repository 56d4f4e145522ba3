pub mod credentials;
pub mod envelope;
pub(crate) mod response;

pub use credentials::*;
pub use envelope::*;
