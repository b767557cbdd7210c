use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{
    AttemptId, AuthorizationOutcome, AuthorizationRequest, CompletionSender, Credential,
    InitiatorError, MemoryTokenStore, SessionProfile, StoreError, TokenStore, TokenValidator, ValidatorError,
    initiator::AuthorizationInitiator,
};
use serde_json::json;

/// What the fake consent flow does on its next invocation.
#[derive(Debug, Clone)]
pub enum Consent {
    /// Report the outcome from a separate task.
    Complete(AuthorizationOutcome),
    /// Report the same outcome twice.
    Duplicate(AuthorizationOutcome),
    /// Never report back.
    Silent,
    /// Fail to open the flow at all.
    Refuse(InitiatorError),
}

impl Consent {
    pub fn grant(token: &str) -> Self {
        Consent::Complete(AuthorizationOutcome::Success(credential(token)))
    }
}

/// Consent flow that follows a script and records every invocation.
#[derive(Debug, Default)]
pub struct ScriptedInitiator {
    script: Mutex<VecDeque<Consent>>,
    invocations: Mutex<Vec<AttemptId>>,
}

impl ScriptedInitiator {
    pub fn new(script: impl IntoIterator<Item = Consent>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, consent: Consent) {
        self.script.lock().unwrap().push_back(consent);
    }

    pub fn invocations(&self) -> Vec<AttemptId> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthorizationInitiator for ScriptedInitiator {
    async fn invoke(
        &self,
        request: AuthorizationRequest,
        completions: CompletionSender,
    ) -> Result<(), InitiatorError> {
        self.invocations.lock().unwrap().push(request.attempt);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Consent::Silent);

        let attempt = request.attempt;
        match next {
            Consent::Complete(outcome) => {
                tokio::spawn(async move {
                    let _ = completions.publish(attempt, outcome);
                });
                Ok(())
            }
            Consent::Duplicate(outcome) => {
                tokio::spawn(async move {
                    let _ = completions.publish(attempt, outcome.clone());
                    let _ = completions.publish(attempt, outcome);
                });
                Ok(())
            }
            Consent::Silent => Ok(()),
            Consent::Refuse(err) => Err(err),
        }
    }
}

/// What the fake backend answers on its next validation.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accept(SessionProfile),
    Reject(u16),
    Fail(ValidatorError),
    /// Never answer.
    Hang,
}

/// Validator that follows a script and records the credentials it saw.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    script: Mutex<VecDeque<Verdict>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn new(script: impl IntoIterator<Item = Verdict>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, verdict: Verdict) {
        self.script.lock().unwrap().push_back(verdict);
    }

    /// Raw credentials presented so far, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenValidator for ScriptedValidator {
    async fn validate(&self, credential: &Credential) -> Result<SessionProfile, ValidatorError> {
        self.seen
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Verdict::Accept(profile)) => Ok(profile),
            Some(Verdict::Reject(status)) => Err(ValidatorError::Rejected { status }),
            Some(Verdict::Fail(err)) => Err(err),
            Some(Verdict::Hang) => std::future::pending().await,
            None => Err(ValidatorError::Transport("no verdict scripted".into())),
        }
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl TokenStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::ReadFailed {
            key: key.to_string(),
            reason: "keychain locked".into(),
        })
    }

    async fn set(&self, key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::WriteFailed {
            key: key.to_string(),
            reason: "keychain locked".into(),
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        Err(StoreError::RemoveFailed {
            key: key.to_string(),
            reason: "keychain locked".into(),
        })
    }
}

/// In-memory store with a delay in front of reads and removals.
#[derive(Debug, Clone, Default)]
pub struct SlowStore {
    inner: MemoryTokenStore,
    get_delay: Duration,
    remove_delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryTokenStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn slow_get(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    pub fn slow_remove(mut self, delay: Duration) -> Self {
        self.remove_delay = delay;
        self
    }
}

#[async_trait]
impl TokenStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        tokio::time::sleep(self.get_delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        tokio::time::sleep(self.remove_delay).await;
        self.inner.remove(key).await
    }
}

pub fn credential(raw: &str) -> Credential {
    Credential::new(raw).expect("non-empty test credential")
}

/// Profile for `{ user: {id}, tracks: [], isSubscriber }`.
pub fn profile(user_id: u64, entitlement: bool) -> SessionProfile {
    SessionProfile {
        user: json!({ "id": user_id }),
        content: json!([]),
        entitlement,
    }
}
