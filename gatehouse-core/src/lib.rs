//! Session bootstrap for clients holding a bearer credential.
//!
//! On start the [`SessionBootstrapper`] looks for a stored credential,
//! validates it with the backend and, when there is none or the backend
//! rejects it, runs the consent flow to obtain a new one. The resulting
//! [`Session`] is published to any number of observers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatehouse_core::{
//!     Collaborators, ConfigLoader, MemoryTokenStore, SessionBootstrapper,
//!     initiator::AuthorizationInitiator,
//! };
//!
//! # async fn run(initiator: Arc<dyn AuthorizationInitiator>) -> anyhow::Result<()> {
//! let config = ConfigLoader::new().load()?.config;
//! let store = Arc::new(MemoryTokenStore::new());
//! let collaborators = Collaborators::with_http_validator(store, initiator, &config)?;
//!
//! let bootstrapper = SessionBootstrapper::spawn(collaborators, &config);
//! bootstrapper.bootstrap().await?;
//! let session = bootstrapper.settled().await?;
//! println!("signed in: {}", session.is_authenticated());
//! # Ok(())
//! # }
//! ```

pub mod bootstrapper;
pub mod config;
pub mod error;
pub mod initiator;
pub mod machine;
pub mod store;
pub mod telemetry;
pub mod validator;

pub use bootstrapper::{Collaborators, SessionBootstrapper, SessionSnapshot, TransitionRecord};
pub use config::{AuthorizationSettings, BootstrapConfig, ConfigLoadError, ConfigLoader};
pub use error::{BootstrapError, BootstrapResult, InitiatorError, StoreError, ValidatorError};
pub use initiator::{
    AttemptId, AuthorizationEvent, AuthorizationOutcome, AuthorizationRequest, CompletionSender,
};
pub use machine::{Phase, SessionMachine};
pub use store::{CredentialSlot, MemoryTokenStore, TokenStore};
pub use validator::{HttpTokenValidator, TokenValidator};

pub use gatehouse_model::{Credential, Session, SessionProfile, SessionStatus};
