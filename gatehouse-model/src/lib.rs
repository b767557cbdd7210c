//! Core data model definitions shared across gatehouse crates.

pub mod credential;
pub mod payload;
pub mod session;

pub use credential::{Credential, CredentialError};
pub use payload::ValidationPayload;
pub use session::{Session, SessionProfile, SessionStatus};
