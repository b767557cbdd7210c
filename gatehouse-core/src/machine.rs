//! Session bootstrap transition table
//!
//! [`SessionMachine`] is the pure half of the bootstrapper: it takes one
//! [`MachineEvent`] at a time and answers with a [`Step`] describing the new
//! phase and the side effects the driver has to carry out. It performs no I/O
//! and never blocks, so every edge can be exercised synchronously.
//!
//! ```text
//! Start                  -> Validating | AwaitingAuthorization
//! AwaitingAuthorization  -> Validating | Unauthenticated
//! Validating             -> Authenticated | AwaitingAuthorization | Unauthenticated
//! Authenticated          -> Unauthenticated
//! ```

use std::fmt;

use gatehouse_model::{Credential, Session, SessionProfile};
use tracing::{debug, warn};

use crate::error::BootstrapError;
use crate::initiator::{AttemptId, AuthorizationOutcome};

/// Reason attached to an authorization wait that ran out of time.
pub const AUTHORIZATION_TIMED_OUT: &str = "timed out waiting for the consent flow";

/// Coarse bootstrapper state, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Checking the store for a credential.
    Start,
    /// Waiting for the consent flow to report back.
    AwaitingAuthorization,
    /// A credential is with the validator.
    Validating,
    /// Validated session with profile data.
    Authenticated,
    /// No usable credential.
    Unauthenticated,
}

impl Phase {
    /// `Authenticated` and `Unauthenticated` are the only phases the
    /// bootstrapper rests in without outstanding work.
    pub fn is_resting(self) -> bool {
        matches!(self, Phase::Authenticated | Phase::Unauthenticated)
    }

    /// Whether moving from `from` to `to` is a legal edge.
    ///
    /// Covers the protocol edges plus the ones entered by caller operations:
    /// `bootstrap()` re-enters `Start` from any phase but `Validating`,
    /// `authenticate()` enters `AwaitingAuthorization` from anywhere and
    /// `logout()` enters `Unauthenticated` from anywhere.
    pub fn permits(from: Phase, to: Phase) -> bool {
        use Phase::*;

        if from == to {
            return false;
        }

        match (from, to) {
            (Start, Validating) | (Start, AwaitingAuthorization) => true,
            (AwaitingAuthorization, Validating) | (AwaitingAuthorization, Unauthenticated) => {
                true
            }
            (Validating, Authenticated)
            | (Validating, AwaitingAuthorization)
            | (Validating, Unauthenticated) => true,
            (Authenticated, Unauthenticated) => true,
            // bootstrap()
            (AwaitingAuthorization | Authenticated | Unauthenticated, Start) => true,
            // authenticate()
            (_, AwaitingAuthorization) => true,
            // logout()
            (_, Unauthenticated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "Start",
            Phase::AwaitingAuthorization => "AwaitingAuthorization",
            Phase::Validating => "Validating",
            Phase::Authenticated => "Authenticated",
            Phase::Unauthenticated => "Unauthenticated",
        };
        f.write_str(name)
    }
}

/// Full machine state, including the data each phase carries.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineState {
    /// Store lookup in progress. Keeps exposing the session held when the
    /// lookup began.
    Start { prior: Session },
    /// Consent flow open for `attempt`.
    AwaitingAuthorization { attempt: AttemptId },
    /// `credential` is being validated.
    Validating { credential: Credential },
    /// `credential` was accepted and hydrated `profile`.
    Authenticated {
        credential: Credential,
        profile: SessionProfile,
    },
    /// Resting without a credential.
    Unauthenticated,
}

impl MachineState {
    /// Phase of this state.
    pub fn phase(&self) -> Phase {
        match self {
            MachineState::Start { .. } => Phase::Start,
            MachineState::AwaitingAuthorization { .. } => Phase::AwaitingAuthorization,
            MachineState::Validating { .. } => Phase::Validating,
            MachineState::Authenticated { .. } => Phase::Authenticated,
            MachineState::Unauthenticated => Phase::Unauthenticated,
        }
    }

    /// Session value observed by callers while in this state.
    pub fn session(&self) -> Session {
        match self {
            MachineState::Validating { credential } => Session::pending(credential.clone()),
            MachineState::Authenticated {
                credential,
                profile,
            } => Session::authenticated(credential.clone(), profile.clone()),
            MachineState::Start { prior } => prior.clone(),
            MachineState::AwaitingAuthorization { .. } | MachineState::Unauthenticated => {
                Session::unauthenticated()
            }
        }
    }
}

/// Inputs to the transition table.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// Caller asked for `bootstrap()`.
    Bootstrap,
    /// Caller asked for `authenticate()`.
    Authenticate,
    /// Caller asked for `logout()`.
    Logout,
    /// Result of the store lookup.
    StoreLoaded(Option<Credential>),
    /// Consent flow reported on `attempt`.
    AuthorizationCompleted {
        attempt: AttemptId,
        outcome: AuthorizationOutcome,
    },
    /// Deadline for `attempt` passed.
    AuthorizationTimedOut { attempt: AttemptId },
    /// Validator accepted the credential.
    ValidationAccepted(SessionProfile),
    /// Validator answered with a non-success status.
    ValidationRejected { status: u16 },
    /// Validator could not be reached or understood.
    ValidationFailed { reason: String },
}

impl MachineEvent {
    /// Short label used in logs and transition records.
    pub fn label(&self) -> &'static str {
        match self {
            MachineEvent::Bootstrap => "bootstrap",
            MachineEvent::Authenticate => "authenticate",
            MachineEvent::Logout => "logout",
            MachineEvent::StoreLoaded(Some(_)) => "stored credential found",
            MachineEvent::StoreLoaded(None) => "no stored credential",
            MachineEvent::AuthorizationCompleted { outcome, .. } => match outcome {
                AuthorizationOutcome::Success(_) => "authorization succeeded",
                AuthorizationOutcome::Cancelled => "authorization cancelled",
                AuthorizationOutcome::Failed(_) => "authorization failed",
            },
            MachineEvent::AuthorizationTimedOut { .. } => "authorization timed out",
            MachineEvent::ValidationAccepted(_) => "validation accepted",
            MachineEvent::ValidationRejected { .. } => "validation rejected",
            MachineEvent::ValidationFailed { .. } => "validation failed",
        }
    }
}

/// Side effect requested by a transition, executed by the driver in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Read the stored credential; answered with `StoreLoaded`.
    LoadStoredCredential,
    /// Write a freshly issued credential.
    PersistCredential(Credential),
    /// Remove the stored credential.
    PurgeStoredCredential,
    /// Open the consent flow for the attempt.
    InvokeInitiator(AttemptId),
    /// Ask the validator; answered with a `Validation*` event.
    Validate(Credential),
}

impl Effect {
    /// Store writes, which must land before the step is published.
    pub fn is_store_write(&self) -> bool {
        matches!(
            self,
            Effect::PersistCredential(_) | Effect::PurgeStoredCredential
        )
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Phase after the event.
    pub phase: Phase,
    /// Work for the driver, in order.
    pub effects: Vec<Effect>,
    /// Published before the resting session (the transient `Invalid` value).
    pub transient: Option<Session>,
    /// Failure absorbed by this transition.
    pub error: Option<BootstrapError>,
    /// `true` when the event did not apply to the current state.
    pub ignored: bool,
}

impl Step {
    fn to(phase: Phase) -> Self {
        Self {
            phase,
            effects: Vec::new(),
            transient: None,
            error: None,
            ignored: false,
        }
    }

    /// No state change and no effects.
    pub fn ignored(phase: Phase) -> Self {
        Self {
            ignored: true,
            ..Self::to(phase)
        }
    }

    fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn transient(mut self, session: Session) -> Self {
        self.transient = Some(session);
        self
    }

    fn error(mut self, error: BootstrapError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Pure session bootstrap state machine.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: MachineState,
    last_attempt: AttemptId,
    consecutive_rejections: u32,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// Machine in `Start` with an unauthenticated session.
    pub fn new() -> Self {
        Self {
            state: MachineState::Start {
                prior: Session::unauthenticated(),
            },
            last_attempt: AttemptId::new(0),
            consecutive_rejections: 0,
        }
    }

    /// Current state with its payload.
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Session callers should see right now.
    pub fn session(&self) -> Session {
        self.state.session()
    }

    /// The attempt currently being waited for, if any.
    pub fn awaited_attempt(&self) -> Option<AttemptId> {
        match self.state {
            MachineState::AwaitingAuthorization { attempt } => Some(attempt),
            _ => None,
        }
    }

    /// Rejections since the last accepted or abandoned credential.
    pub fn consecutive_rejections(&self) -> u32 {
        self.consecutive_rejections
    }

    /// Feed one event through the table.
    pub fn apply(&mut self, event: MachineEvent) -> Step {
        let current = self.phase();

        match (&self.state, event) {
            (MachineState::Validating { .. }, MachineEvent::Bootstrap) => {
                debug!("bootstrap() ignored while a validation is in flight");
                Step::ignored(current)
            }
            (_, MachineEvent::Bootstrap) => {
                let prior = self.session();
                self.state = MachineState::Start { prior };
                Step::to(Phase::Start).effect(Effect::LoadStoredCredential)
            }

            (_, MachineEvent::Authenticate) => self.await_authorization(),

            (_, MachineEvent::Logout) => {
                self.consecutive_rejections = 0;
                self.state = MachineState::Unauthenticated;
                Step::to(Phase::Unauthenticated).effect(Effect::PurgeStoredCredential)
            }

            (MachineState::Start { .. }, MachineEvent::StoreLoaded(Some(credential))) => {
                self.begin_validation(credential, None)
            }
            (MachineState::Start { .. }, MachineEvent::StoreLoaded(None)) => self.await_authorization(),

            (
                MachineState::AwaitingAuthorization { attempt: awaited },
                MachineEvent::AuthorizationCompleted { attempt, outcome },
            ) if *awaited == attempt => match outcome {
                AuthorizationOutcome::Success(credential) => {
                    self.begin_validation(credential.clone(), Some(credential))
                }
                AuthorizationOutcome::Cancelled => {
                    self.abandon(BootstrapError::AuthorizationCancelled)
                }
                AuthorizationOutcome::Failed(reason) => {
                    self.abandon(BootstrapError::AuthorizationFailed(reason))
                }
            },
            (
                MachineState::AwaitingAuthorization { attempt: awaited },
                MachineEvent::AuthorizationTimedOut { attempt },
            ) if *awaited == attempt => self.abandon(BootstrapError::AuthorizationFailed(
                AUTHORIZATION_TIMED_OUT.to_string(),
            )),
            (_, MachineEvent::AuthorizationCompleted { attempt, outcome }) => {
                warn!(
                    "Ignoring stale authorization completion {} ({:?}) in phase {}",
                    attempt, outcome, current
                );
                Step::ignored(current)
            }
            (_, MachineEvent::AuthorizationTimedOut { attempt }) => {
                debug!("Ignoring expired deadline for attempt {}", attempt);
                Step::ignored(current)
            }

            (MachineState::Validating { credential }, MachineEvent::ValidationAccepted(profile)) => {
                let credential = credential.clone();
                self.consecutive_rejections = 0;
                self.state = MachineState::Authenticated {
                    credential,
                    profile,
                };
                Step::to(Phase::Authenticated)
            }
            (MachineState::Validating { credential }, MachineEvent::ValidationRejected { status }) => {
                let invalid = Session::invalid(credential.clone());
                self.consecutive_rejections = self.consecutive_rejections.saturating_add(1);
                if self.consecutive_rejections > 1 {
                    warn!(
                        "Credential rejected {} times in a row (last status {}); re-prompting again",
                        self.consecutive_rejections, status
                    );
                }
                let attempt = self.next_attempt();
                self.state = MachineState::AwaitingAuthorization { attempt };
                Step::to(Phase::AwaitingAuthorization)
                    .transient(invalid)
                    .effect(Effect::PurgeStoredCredential)
                    .effect(Effect::InvokeInitiator(attempt))
                    .error(BootstrapError::ValidationRejected { status })
            }
            (MachineState::Validating { .. }, MachineEvent::ValidationFailed { reason }) => {
                self.abandon(BootstrapError::ValidationTransportError(reason))
            }

            (_, event) => {
                debug!("Ignoring '{}' in phase {}", event.label(), current);
                Step::ignored(current)
            }
        }
    }

    fn next_attempt(&mut self) -> AttemptId {
        self.last_attempt = self.last_attempt.next();
        self.last_attempt
    }

    fn await_authorization(&mut self) -> Step {
        let attempt = self.next_attempt();
        self.state = MachineState::AwaitingAuthorization { attempt };
        Step::to(Phase::AwaitingAuthorization).effect(Effect::InvokeInitiator(attempt))
    }

    fn begin_validation(&mut self, credential: Credential, persist: Option<Credential>) -> Step {
        self.state = MachineState::Validating {
            credential: credential.clone(),
        };
        let mut step = Step::to(Phase::Validating);
        if let Some(fresh) = persist {
            step = step.effect(Effect::PersistCredential(fresh));
        }
        step.effect(Effect::Validate(credential))
    }

    /// Rest in `Unauthenticated`, making sure nothing is left in the store.
    fn abandon(&mut self, error: BootstrapError) -> Step {
        self.consecutive_rejections = 0;
        self.state = MachineState::Unauthenticated;
        Step::to(Phase::Unauthenticated)
            .effect(Effect::PurgeStoredCredential)
            .error(error)
    }
}
