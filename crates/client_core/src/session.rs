//! Process-wide authentication context.
//!
//! [`SessionGate`] is the cloneable read side: current session, transition
//! subscriptions, and registration of session-bound work. [`SessionAuthority`]
//! is the single write side and belongs to the auth collaborator
//! ([`crate::auth::Authenticator`]).
//!
//! Every change of identity bumps the session epoch. When an authenticated
//! session ends, every bound target is told synchronously, after the new
//! epoch is visible, so no in-flight work of the old session can apply its
//! result afterwards.

use std::sync::{Arc, Mutex, Weak};

use shared::domain::{UserId, UserProfile};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::lock_unpoisoned;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthedUser {
    pub user_id: UserId,
    pub profile: UserProfile,
}

impl AuthedUser {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    AuthedUser(AuthedUser),
    #[default]
    UnauthedUser,
}

impl Session {
    pub fn user(&self) -> Option<&AuthedUser> {
        match self {
            Self::AuthedUser(user) => Some(user),
            Self::UnauthedUser => None,
        }
    }

    pub fn is_authed(&self) -> bool {
        matches!(self, Self::AuthedUser(_))
    }

    fn user_id(&self) -> Option<UserId> {
        self.user().map(|user| user.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    SignedIn,
    SignedOut,
    /// Forced sign-out after the backend rejected the session.
    Expired,
    ProfileUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    pub epoch: u64,
    pub session: Session,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub session: Session,
}

/// Work tied to one authenticated session.
pub trait SessionBound: Send + Sync {
    /// Called synchronously when the session the work was bound to ends.
    fn session_ended(&self);
}

struct GateInner {
    session: Session,
    epoch: u64,
    bound: Vec<Weak<dyn SessionBound>>,
    subscribers: Vec<mpsc::UnboundedSender<SessionTransition>>,
}

#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<Mutex<GateInner>>,
}

impl SessionGate {
    /// Creates an unauthenticated gate and its single write handle.
    pub fn new() -> (SessionGate, SessionAuthority) {
        let gate = SessionGate {
            inner: Arc::new(Mutex::new(GateInner {
                session: Session::UnauthedUser,
                epoch: 0,
                bound: Vec::new(),
                subscribers: Vec::new(),
            })),
        };
        let authority = SessionAuthority { gate: gate.clone() };
        (gate, authority)
    }

    pub fn current(&self) -> Session {
        lock_unpoisoned(&self.inner).session.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = lock_unpoisoned(&self.inner);
        SessionSnapshot {
            epoch: inner.epoch,
            session: inner.session.clone(),
        }
    }

    pub fn epoch(&self) -> u64 {
        lock_unpoisoned(&self.inner).epoch
    }

    pub fn is_authed(&self) -> bool {
        lock_unpoisoned(&self.inner).session.is_authed()
    }

    pub fn authed_user(&self) -> Option<AuthedUser> {
        lock_unpoisoned(&self.inner).session.user().cloned()
    }

    /// Receives every later transition, in order.
    pub fn subscribe(&self) -> SessionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        lock_unpoisoned(&self.inner).subscribers.push(tx);
        SessionSubscription { rx }
    }

    /// Registers work that must be cancelled when the current session ends.
    ///
    /// Targets are held weakly; dropped targets are pruned on the next transition.
    pub fn bind(&self, target: Weak<dyn SessionBound>) {
        lock_unpoisoned(&self.inner).bound.push(target);
    }

    /// Forces a sign-out after an unauthorized response. No-op when already signed out.
    pub fn report_unauthorized(&self) {
        self.transition(Session::UnauthedUser, TransitionReason::Expired, None);
    }

    /// Applies `next` and notifies subscribers. With `within_epoch`, nothing
    /// happens unless the gate is still in that epoch and `next` keeps the
    /// same identity. Returns whether the session changed.
    fn transition(
        &self,
        next: Session,
        reason: TransitionReason,
        within_epoch: Option<u64>,
    ) -> bool {
        let (ended, targets) = {
            let mut inner = lock_unpoisoned(&self.inner);
            let previous = inner.session.user_id();
            let identity_changed = previous != next.user_id();

            if within_epoch.is_some_and(|epoch| epoch != inner.epoch || identity_changed) {
                return false;
            }

            // Same identity: only a changed profile is worth announcing.
            if !identity_changed && (inner.session == next || !next.is_authed()) {
                return false;
            }

            if identity_changed {
                inner.epoch += 1;
            }
            inner.session = next;

            let transition = SessionTransition {
                epoch: inner.epoch,
                session: inner.session.clone(),
                reason,
            };
            inner
                .subscribers
                .retain(|subscriber| subscriber.send(transition.clone()).is_ok());

            info!(
                epoch = inner.epoch,
                reason = ?reason,
                authed = inner.session.is_authed(),
                "session: transition"
            );

            let ended = identity_changed && previous.is_some();
            inner.bound.retain(|target| target.strong_count() > 0);
            let targets: Vec<Arc<dyn SessionBound>> = if ended {
                inner.bound.iter().filter_map(Weak::upgrade).collect()
            } else {
                Vec::new()
            };
            (ended, targets)
        };

        if ended {
            debug!(targets = targets.len(), "session: invalidating bound work");
            for target in targets {
                target.session_ended();
            }
        }
        true
    }
}

/// Write side of the gate. Not cloneable: exactly one owner mutates the session.
pub struct SessionAuthority {
    gate: SessionGate,
}

impl SessionAuthority {
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn establish(&self, user: AuthedUser) {
        self.gate
            .transition(Session::AuthedUser(user), TransitionReason::SignedIn, None);
    }

    pub fn end(&self) {
        self.gate
            .transition(Session::UnauthedUser, TransitionReason::SignedOut, None);
    }

    /// Replaces the profile of the signed-in user without ending the session.
    ///
    /// Ignored unless the gate is still in session `epoch` and `profile`
    /// belongs to its user; returns whether the profile was applied.
    pub fn update_profile(&self, epoch: u64, profile: UserProfile) -> bool {
        let user_id = profile.user_id;
        let applied = self.gate.transition(
            Session::AuthedUser(AuthedUser::new(profile)),
            TransitionReason::ProfileUpdated,
            Some(epoch),
        );
        if !applied {
            debug!(user_id = user_id.0, epoch, "session: ignoring stale profile update");
        }
        applied
    }
}

pub struct SessionSubscription {
    rx: mpsc::UnboundedReceiver<SessionTransition>,
}

impl SessionSubscription {
    pub async fn next(&mut self) -> Option<SessionTransition> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<SessionTransition> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<SessionTransition> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
