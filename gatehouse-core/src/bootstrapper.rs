//! Async session bootstrapper
//!
//! [`SessionBootstrapper`] owns a background task that is the only writer of
//! the [`Session`]. Callers talk to it through commands (`bootstrap`,
//! `authenticate`, `logout`), read the latest value through a watch channel
//! and can follow every phase change through a broadcast of
//! [`TransitionRecord`]s. Consent-flow results come in through the
//! completion channel, which is subscribed once at spawn and closed when the
//! bootstrapper is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_model::Session;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AuthorizationSettings, BootstrapConfig};
use crate::error::{BootstrapError, BootstrapResult, ValidatorError};
use crate::initiator::{
    AttemptId, AuthorizationEvent, AuthorizationInitiator, AuthorizationOutcome,
    AuthorizationRequest, CompletionSender,
};
use crate::machine::{Effect, MachineEvent, Phase, SessionMachine};
use crate::store::{CredentialSlot, TokenStore};
use crate::validator::{HttpTokenValidator, TokenValidator};

const COMMAND_BUFFER: usize = 16;
const TRANSITION_BUFFER: usize = 64;

/// External services the bootstrapper drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn TokenStore>,
    pub initiator: Arc<dyn AuthorizationInitiator>,
    pub validator: Arc<dyn TokenValidator>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn TokenStore>,
        initiator: Arc<dyn AuthorizationInitiator>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            store,
            initiator,
            validator,
        }
    }

    /// Use the HTTP validator against `config.backend_url`.
    pub fn with_http_validator(
        store: Arc<dyn TokenStore>,
        initiator: Arc<dyn AuthorizationInitiator>,
        config: &BootstrapConfig,
    ) -> Result<Self, ValidatorError> {
        let validator = HttpTokenValidator::new(&config.backend_url, config.validation_timeout)?;
        Ok(Self::new(store, initiator, Arc::new(validator)))
    }
}

/// Latest published state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub session: Session,
}

/// One phase change, as broadcast to [`SessionBootstrapper::transitions`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    /// What triggered the change.
    pub cause: &'static str,
    /// Failure absorbed along the way, if any.
    pub error: Option<BootstrapError>,
}

enum Command {
    Bootstrap(oneshot::Sender<Session>),
    Authenticate(oneshot::Sender<Session>),
    Logout(oneshot::Sender<Session>),
}

/// Handle to the running bootstrapper. Dropping it stops the task.
pub struct SessionBootstrapper {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    transitions: broadcast::Sender<TransitionRecord>,
    completions: CompletionSender,
    task: JoinHandle<()>,
}

impl fmt::Debug for SessionBootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBootstrapper")
            .field("phase", &self.phase())
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

impl SessionBootstrapper {
    /// Start the driver task on the current tokio runtime.
    ///
    /// The session starts out `Unauthenticated` in phase `Start`; nothing
    /// happens until [`bootstrap`](Self::bootstrap) or
    /// [`authenticate`](Self::authenticate) is called.
    pub fn spawn(collaborators: Collaborators, config: &BootstrapConfig) -> Self {
        let machine = SessionMachine::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            phase: machine.phase(),
            session: machine.session(),
        });
        let (transition_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        let (completions, completion_rx) = CompletionSender::channel();

        let driver = Driver {
            machine,
            slot: CredentialSlot::new(collaborators.store, config.store_key.clone()),
            initiator: collaborators.initiator,
            validator: collaborators.validator,
            settings: Arc::new(config.authorization.clone()),
            authorization_timeout: config.authorization_timeout,
            validation_timeout: config.validation_timeout,
            completions: completions.clone(),
            snapshot: snapshot_tx,
            transitions: transition_tx.clone(),
            deadline: None,
        };

        info!(
            "Session bootstrapper started (store key '{}')",
            config.store_key
        );
        let task = tokio::spawn(driver.run(command_rx, completion_rx));

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            transitions: transition_tx,
            completions,
            task,
        }
    }

    /// Check the store and validate or re-authorize from scratch.
    ///
    /// Resolves once the bootstrapper rests or waits on the consent flow.
    pub async fn bootstrap(&self) -> BootstrapResult<Session> {
        self.send(Command::Bootstrap).await
    }

    /// Open the consent flow regardless of the current state.
    pub async fn authenticate(&self) -> BootstrapResult<Session> {
        self.send(Command::Authenticate).await
    }

    /// Drop the session and purge the stored credential.
    pub async fn logout(&self) -> BootstrapResult<Session> {
        self.send(Command::Logout).await
    }

    pub fn current_session(&self) -> Session {
        self.snapshot.borrow().session.clone()
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.borrow().phase
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Phase changes from now on.
    pub fn transitions(&self) -> broadcast::Receiver<TransitionRecord> {
        self.transitions.subscribe()
    }

    /// Wait until the bootstrapper rests in `Authenticated` or
    /// `Unauthenticated`.
    pub async fn settled(&self) -> BootstrapResult<Session> {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(|snapshot| snapshot.phase.is_resting())
            .await
            .map_err(|_| BootstrapError::Closed)?;
        Ok(snapshot.session.clone())
    }

    /// Where the consent flow reports its results.
    pub fn completion_sender(&self) -> CompletionSender {
        self.completions.clone()
    }

    /// Stop the driver task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.task.abort();
        if let Err(e) = (&mut self.task).await
            && !e.is_cancelled()
        {
            warn!("Session bootstrapper task ended abnormally: {}", e);
        }
        info!("Session bootstrapper stopped");
    }

    async fn send(
        &self,
        command: impl FnOnce(oneshot::Sender<Session>) -> Command,
    ) -> BootstrapResult<Session> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| BootstrapError::Closed)?;
        reply_rx.await.map_err(|_| BootstrapError::Closed)
    }
}

impl Drop for SessionBootstrapper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    machine: SessionMachine,
    slot: CredentialSlot,
    initiator: Arc<dyn AuthorizationInitiator>,
    validator: Arc<dyn TokenValidator>,
    settings: Arc<AuthorizationSettings>,
    authorization_timeout: Duration,
    validation_timeout: Duration,
    completions: CompletionSender,
    snapshot: watch::Sender<SessionSnapshot>,
    transitions: broadcast::Sender<TransitionRecord>,
    deadline: Option<(AttemptId, Instant)>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<AuthorizationEvent>,
    ) {
        loop {
            let armed = self.deadline;
            let expires_at = armed.map_or_else(Instant::now, |(_, at)| at);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All bootstrapper handles dropped; stopping");
                        break;
                    }
                },
                Some(AuthorizationEvent { attempt, outcome }) = completions.recv() => {
                    debug!("Authorization completion for attempt {}", attempt);
                    self.dispatch(MachineEvent::AuthorizationCompleted { attempt, outcome })
                        .await;
                }
                _ = tokio::time::sleep_until(expires_at), if armed.is_some() => {
                    if let Some((attempt, _)) = armed {
                        self.deadline = None;
                        warn!("Consent flow for attempt {} did not report back in time", attempt);
                        self.dispatch(MachineEvent::AuthorizationTimedOut { attempt }).await;
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let (event, reply) = match command {
            Command::Bootstrap(reply) => (MachineEvent::Bootstrap, reply),
            Command::Authenticate(reply) => (MachineEvent::Authenticate, reply),
            Command::Logout(reply) => (MachineEvent::Logout, reply),
        };
        self.dispatch(event).await;
        // Caller may have given up waiting.
        let _ = reply.send(self.machine.session());
    }

    /// Apply `event` and every event its effects produce, in order.
    async fn dispatch(&mut self, event: MachineEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let from = self.machine.phase();
            let cause = event.label();
            let step = self.machine.apply(event);
            if step.ignored {
                continue;
            }

            if step.phase != Phase::AwaitingAuthorization {
                self.deadline = None;
            }
            if let Some(error) = &step.error {
                warn!("{} ({})", error, cause);
            }

            // Observers woken by this step must find the store already updated.
            let (writes, follow_ups): (Vec<_>, Vec<_>) =
                step.effects.into_iter().partition(Effect::is_store_write);
            for effect in writes {
                self.execute(effect).await;
            }

            if let Some(transient) = step.transient {
                self.snapshot.send_replace(SessionSnapshot {
                    phase: from,
                    session: transient,
                });
            }
            self.snapshot.send_replace(SessionSnapshot {
                phase: step.phase,
                session: self.machine.session(),
            });

            if from != step.phase {
                if step.phase.is_resting() {
                    info!("Session {} -> {} ({})", from, step.phase, cause);
                } else {
                    debug!("Session {} -> {} ({})", from, step.phase, cause);
                }
                // No subscribers is fine.
                let _ = self.transitions.send(TransitionRecord {
                    from,
                    to: step.phase,
                    cause,
                    error: step.error,
                });
            }

            for effect in follow_ups {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<MachineEvent> {
        match effect {
            Effect::LoadStoredCredential => {
                debug!("Looking up stored credential");
                Some(MachineEvent::StoreLoaded(self.slot.load().await))
            }
            Effect::PersistCredential(credential) => {
                self.slot.persist(&credential).await;
                None
            }
            Effect::PurgeStoredCredential => {
                self.slot.purge().await;
                None
            }
            Effect::InvokeInitiator(attempt) => self.invoke_initiator(attempt).await,
            Effect::Validate(credential) => {
                debug!("Validating credential {}", credential);
                let result =
                    tokio::time::timeout(self.validation_timeout, self.validator.validate(&credential))
                        .await
                        .unwrap_or(Err(ValidatorError::Timeout));
                Some(match result.map_err(BootstrapError::from) {
                    Ok(profile) => MachineEvent::ValidationAccepted(profile),
                    Err(BootstrapError::ValidationRejected { status }) => {
                        MachineEvent::ValidationRejected { status }
                    }
                    Err(BootstrapError::ValidationTransportError(reason)) => {
                        MachineEvent::ValidationFailed { reason }
                    }
                    Err(other) => MachineEvent::ValidationFailed {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn invoke_initiator(&mut self, attempt: AttemptId) -> Option<MachineEvent> {
        debug!("Opening consent flow for attempt {}", attempt);
        self.deadline = Some((attempt, Instant::now() + self.authorization_timeout));

        let request = AuthorizationRequest {
            attempt,
            settings: Arc::clone(&self.settings),
        };
        let invocation = self.initiator.invoke(request, self.completions.clone());

        match tokio::time::timeout(self.authorization_timeout, invocation).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(MachineEvent::AuthorizationCompleted {
                attempt,
                outcome: AuthorizationOutcome::Failed(e.to_string()),
            }),
            Err(_) => Some(MachineEvent::AuthorizationTimedOut { attempt }),
        }
    }
}
