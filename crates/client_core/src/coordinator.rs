//! Sequences one external call per triggered action against one state container.
//!
//! Each action kind declares its [`DispatchPolicy`] and [`RetryPolicy`] once,
//! as associated consts of [`Action`]. A dispatch validates its input, moves the
//! container to `Loading`, runs the call on the Tokio runtime and applies the
//! outcome only if the dispatch is still current: not superseded, not
//! cancelled, and (for session-bound coordinators) still in the session it
//! started in.

use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ErrorInfo, ErrorKind},
    lock_unpoisoned,
    session::{AuthedUser, Session, SessionBound, SessionGate},
    state::{AsyncResult, StateContainer, StateReader},
};

/// What happens to a dispatch that arrives while an earlier one is still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Drop the new request; the in-flight call stays authoritative.
    IgnoreWhileLoading,
    /// Start the new request and discard the earlier call's eventual result.
    Supersede,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        backoff: Duration::ZERO,
    };

    /// Retries network-class failures with linear backoff.
    pub const fn network(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn should_retry(&self, attempt: u32, error: &ErrorInfo) -> bool {
        attempt < self.max_attempts && error.kind() == ErrorKind::Network
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Per-dispatch context handed to [`Action::execute`].
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    user: Option<AuthedUser>,
    epoch: Option<u64>,
}

impl CallContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for work on behalf of `user`, signed in during session `epoch`.
    pub fn for_user(user: AuthedUser, epoch: u64) -> Self {
        Self {
            user: Some(user),
            epoch: Some(epoch),
        }
    }

    pub fn user(&self) -> Option<&AuthedUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&AuthedUser, ClientError> {
        self.user.as_ref().ok_or(ClientError::NotAuthenticated)
    }

    /// The signed-in user together with the session epoch the dispatch saw.
    pub fn require_session(&self) -> Result<(&AuthedUser, u64), ClientError> {
        match (&self.user, self.epoch) {
            (Some(user), Some(epoch)) => Ok((user, epoch)),
            _ => Err(ClientError::NotAuthenticated),
        }
    }
}

#[async_trait]
pub trait Action: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    /// Stable name used in logs.
    const KIND: &'static str;
    const POLICY: DispatchPolicy;
    const RETRY: RetryPolicy = RetryPolicy::NONE;

    /// Client-side preconditions. A failure short-circuits the dispatch.
    fn validate(&self, _input: &Self::Input) -> Result<(), ErrorInfo> {
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        input: &Self::Input,
    ) -> Result<Self::Output, ClientError>;
}

/// Result of asking a coordinator to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The container is `Loading` and the call is running.
    Started { generation: u64 },
    /// Dropped because an earlier dispatch is still loading.
    Ignored,
    /// Failed before any external call; the container holds the failure.
    Rejected(ErrorInfo),
    /// Session-bound coordinator with no authenticated session.
    SignedOut,
    Disposed,
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
}

struct Flight {
    generation: u64,
    in_flight: Option<InFlight>,
    disposed: bool,
}

struct Core<A: Action> {
    action: A,
    state: StateContainer<A::Output>,
    session: Option<SessionGate>,
    flight: Mutex<Flight>,
}

pub struct Coordinator<A: Action> {
    core: Arc<Core<A>>,
}

impl<A: Action> Coordinator<A> {
    /// Coordinator for work that does not depend on the signed-in user.
    pub fn new(action: A) -> Self {
        Self {
            core: Arc::new(Core::new(action, None)),
        }
    }

    /// Coordinator whose calls run as the signed-in user and are cancelled,
    /// with the container reset to `Idle`, when that session ends.
    pub fn bound(action: A, gate: &SessionGate) -> Self {
        let core = Arc::new(Core::new(action, Some(gate.clone())));
        let weak: Weak<Core<A>> = Arc::downgrade(&core);
        let target: Weak<dyn SessionBound> = weak;
        gate.bind(target);
        Self { core }
    }

    pub fn policy(&self) -> DispatchPolicy {
        A::POLICY
    }

    pub fn action(&self) -> &A {
        &self.core.action
    }

    pub fn state(&self) -> StateReader<A::Output> {
        self.core.state.reader()
    }

    pub fn current(&self) -> AsyncResult<A::Output> {
        self.core.state.current()
    }

    pub fn is_loading(&self) -> bool {
        lock_unpoisoned(&self.core.flight).in_flight.is_some()
    }

    /// Triggers the action. Must be called from within a Tokio runtime for the
    /// call to start; otherwise the dispatch is rejected.
    pub fn dispatch(&self, input: A::Input) -> Dispatch {
        let core = &self.core;
        let mut flight = lock_unpoisoned(&core.flight);
        if flight.disposed {
            return Dispatch::Disposed;
        }

        if flight.in_flight.is_some() && A::POLICY == DispatchPolicy::IgnoreWhileLoading {
            debug!(action = A::KIND, "coordinator: ignoring dispatch while loading");
            return Dispatch::Ignored;
        }

        let (ctx, epoch) = match &core.session {
            None => (CallContext::anonymous(), None),
            Some(gate) => {
                let snapshot = gate.snapshot();
                match snapshot.session {
                    Session::AuthedUser(user) => {
                        (CallContext::for_user(user, snapshot.epoch), Some(snapshot.epoch))
                    }
                    Session::UnauthedUser => {
                        debug!(action = A::KIND, "coordinator: no session, dispatch refused");
                        return Dispatch::SignedOut;
                    }
                }
            }
        };

        if let Some(prior) = flight.in_flight.take() {
            prior.task.abort();
            debug!(
                action = A::KIND,
                superseded = prior.generation,
                "coordinator: superseding in-flight call"
            );
        }
        flight.generation += 1;
        let generation = flight.generation;

        if let Err(error) = core.action.validate(&input) {
            debug!(action = A::KIND, %error, "coordinator: input rejected");
            core.state.set(AsyncResult::Failure(error.clone()));
            return Dispatch::Rejected(error);
        }

        let Ok(runtime) = Handle::try_current() else {
            let error = ErrorInfo::new(ErrorKind::Unknown, "no async runtime available");
            warn!(action = A::KIND, "coordinator: dispatch outside of a tokio runtime");
            core.state.set(AsyncResult::Failure(error.clone()));
            return Dispatch::Rejected(error);
        };

        core.state.set(AsyncResult::Loading);
        let task = runtime.spawn(run(Arc::clone(core), generation, epoch, ctx, input));
        flight.in_flight = Some(InFlight { generation, task });
        debug!(action = A::KIND, generation, policy = ?A::POLICY, "coordinator: dispatched");
        Dispatch::Started { generation }
    }

    /// Cancels the in-flight call, if any; a `Loading` container returns to `Idle`.
    pub fn cancel(&self) {
        self.core.cancel(false);
    }

    /// Cancels the in-flight call and resets the container to `Idle`.
    pub fn reset(&self) {
        self.core.cancel(true);
    }

    /// Cancels the in-flight call and closes the container for good.
    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl<A: Action> Drop for Coordinator<A> {
    fn drop(&mut self) {
        self.core.dispose();
    }
}

impl<A: Action> Core<A> {
    fn new(action: A, session: Option<SessionGate>) -> Self {
        Self {
            action,
            state: StateContainer::new(),
            session,
            flight: Mutex::new(Flight {
                generation: 0,
                in_flight: None,
                disposed: false,
            }),
        }
    }

    fn session_matches(&self, epoch: Option<u64>) -> bool {
        match (&self.session, epoch) {
            (Some(gate), Some(epoch)) => gate.epoch() == epoch,
            _ => true,
        }
    }

    fn is_current(&self, generation: u64, epoch: Option<u64>) -> bool {
        let flight = lock_unpoisoned(&self.flight);
        !flight.disposed && flight.generation == generation && self.session_matches(epoch)
    }

    fn complete(
        &self,
        generation: u64,
        epoch: Option<u64>,
        outcome: Result<A::Output, ErrorInfo>,
    ) {
        let reauth = {
            let mut flight = lock_unpoisoned(&self.flight);
            if flight.disposed || flight.generation != generation || !self.session_matches(epoch) {
                debug!(action = A::KIND, generation, "coordinator: discarding stale result");
                return;
            }
            flight.in_flight = None;

            match outcome {
                Ok(value) => {
                    debug!(action = A::KIND, generation, "coordinator: success");
                    self.state.set(AsyncResult::Success(value));
                    false
                }
                Err(error) => {
                    info!(action = A::KIND, generation, kind = %error.kind(), "coordinator: failure");
                    let reauth = error.requires_reauth();
                    self.state.set(AsyncResult::Failure(error));
                    reauth
                }
            }
        };

        if reauth {
            if let Some(gate) = &self.session {
                gate.report_unauthorized();
            }
        }
    }

    fn cancel(&self, reset: bool) {
        let mut flight = lock_unpoisoned(&self.flight);
        if flight.disposed {
            return;
        }
        let was_loading = match flight.in_flight.take() {
            Some(in_flight) => {
                in_flight.task.abort();
                debug!(action = A::KIND, generation = in_flight.generation, "coordinator: cancelled");
                true
            }
            None => false,
        };
        flight.generation += 1;
        if (reset && !self.state.current().is_idle()) || was_loading {
            self.state.set(AsyncResult::Idle);
        }
    }

    fn dispose(&self) {
        let mut flight = lock_unpoisoned(&self.flight);
        if flight.disposed {
            return;
        }
        flight.disposed = true;
        flight.generation += 1;
        if let Some(in_flight) = flight.in_flight.take() {
            in_flight.task.abort();
        }
        self.state.dispose();
    }
}

impl<A: Action> SessionBound for Core<A> {
    fn session_ended(&self) {
        debug!(action = A::KIND, "coordinator: session ended, resetting");
        self.cancel(true);
    }
}

async fn run<A: Action>(
    core: Arc<Core<A>>,
    generation: u64,
    epoch: Option<u64>,
    ctx: CallContext,
    input: A::Input,
) {
    let mut attempt = 1;
    let outcome = loop {
        match core.action.execute(&ctx, &input).await {
            Ok(value) => break Ok(value),
            Err(err) => {
                let error = ErrorInfo::classify(&err);
                if A::RETRY.should_retry(attempt, &error) && core.is_current(generation, epoch) {
                    let delay = A::RETRY.delay(attempt);
                    warn!(
                        action = A::KIND,
                        attempt,
                        ?delay,
                        error = %err,
                        "coordinator: retrying after network failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                break Err(error);
            }
        }
    };
    core.complete(generation, epoch, outcome);
}
