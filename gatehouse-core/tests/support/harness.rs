use std::sync::Arc;

use gatehouse_core::{
    BootstrapConfig, Collaborators, MemoryTokenStore, Phase, SessionBootstrapper, TokenStore,
    TransitionRecord,
};
use tokio::sync::broadcast;
use url::Url;

use super::fakes::{Consent, ScriptedInitiator, ScriptedValidator, Verdict};

pub const STORE_KEY: &str = "userToken";

pub fn test_config() -> BootstrapConfig {
    BootstrapConfig::new(Url::parse("http://127.0.0.1:9").expect("static url"))
        .with_store_key(STORE_KEY)
}

/// A running bootstrapper wired to scripted collaborators.
pub struct Harness {
    pub bootstrapper: SessionBootstrapper,
    pub store: MemoryTokenStore,
    pub initiator: Arc<ScriptedInitiator>,
    pub validator: Arc<ScriptedValidator>,
    pub transitions: broadcast::Receiver<TransitionRecord>,
}

impl Harness {
    pub fn new(
        store: MemoryTokenStore,
        consents: impl IntoIterator<Item = Consent>,
        verdicts: impl IntoIterator<Item = Verdict>,
    ) -> Self {
        Self::with_config(store, consents, verdicts, test_config())
    }

    pub fn with_config(
        store: MemoryTokenStore,
        consents: impl IntoIterator<Item = Consent>,
        verdicts: impl IntoIterator<Item = Verdict>,
        config: BootstrapConfig,
    ) -> Self {
        let initiator = Arc::new(ScriptedInitiator::new(consents));
        let validator = Arc::new(ScriptedValidator::new(verdicts));
        Self::spawn(Arc::new(store.clone()), store, initiator, validator, config)
    }

    pub fn spawn(
        backing: Arc<dyn TokenStore>,
        store: MemoryTokenStore,
        initiator: Arc<ScriptedInitiator>,
        validator: Arc<ScriptedValidator>,
        config: BootstrapConfig,
    ) -> Self {
        let collaborators = Collaborators::new(backing, initiator.clone(), validator.clone());
        let bootstrapper = SessionBootstrapper::spawn(collaborators, &config);
        let transitions = bootstrapper.transitions();
        Self {
            bootstrapper,
            store,
            initiator,
            validator,
            transitions,
        }
    }

    /// Empty store.
    pub fn fresh(
        consents: impl IntoIterator<Item = Consent>,
        verdicts: impl IntoIterator<Item = Verdict>,
    ) -> Self {
        Self::new(MemoryTokenStore::new(), consents, verdicts)
    }

    /// Store pre-seeded with `token`.
    pub fn stored(
        token: &str,
        consents: impl IntoIterator<Item = Consent>,
        verdicts: impl IntoIterator<Item = Verdict>,
    ) -> Self {
        Self::new(
            MemoryTokenStore::with_entry(STORE_KEY, token.as_bytes().to_vec()),
            consents,
            verdicts,
        )
    }

    /// Transition records broadcast so far.
    pub fn drain_transitions(&mut self) -> Vec<TransitionRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.transitions.try_recv() {
            records.push(record);
        }
        records
    }

    pub fn path(records: &[TransitionRecord]) -> Vec<(Phase, Phase)> {
        records.iter().map(|r| (r.from, r.to)).collect()
    }

    pub async fn stored_token(&self) -> Option<String> {
        self.store
            .get(STORE_KEY)
            .await
            .expect("memory store never fails")
            .map(|bytes| String::from_utf8(bytes).expect("utf-8 token"))
    }
}
