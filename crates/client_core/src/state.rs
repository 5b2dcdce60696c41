//! Observable result containers.
//!
//! A [`StateContainer`] holds the single current [`AsyncResult`] of one logical
//! action. The container itself is the only write path and is not `Clone`, so
//! whoever owns it (normally a [`crate::coordinator::Coordinator`]) is the sole
//! writer. Observers get a [`StateReader`], which can read the current value and
//! open ordered, lossless subscriptions.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{error::ErrorInfo, lock_unpoisoned};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum AsyncResult<T> {
    #[default]
    Idle,
    Loading,
    Success(T),
    Failure(ErrorInfo),
}

/// Payload-free view of an [`AsyncResult`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Failure,
}

impl<T> AsyncResult<T> {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Loading => Phase::Loading,
            Self::Success(_) => Phase::Success,
            Self::Failure(_) => Phase::Failure,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the presentation should offer the action's trigger.
    pub fn accepts_trigger(&self) -> bool {
        !self.is_loading()
    }
}

struct Inner<T> {
    current: AsyncResult<T>,
    disposed: bool,
    subscribers: Vec<mpsc::UnboundedSender<AsyncResult<T>>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
}

pub struct StateContainer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> StateContainer<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    current: AsyncResult::Idle,
                    disposed: false,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    pub fn reader(&self) -> StateReader<T> {
        StateReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn current(&self) -> AsyncResult<T> {
        lock_unpoisoned(&self.shared.inner).current.clone()
    }

    /// Replaces the current state and notifies every live subscriber.
    ///
    /// Returns `false` once the container has been disposed.
    pub fn set(&self, next: AsyncResult<T>) -> bool {
        let mut inner = lock_unpoisoned(&self.shared.inner);
        if inner.disposed {
            return false;
        }
        // Delivered under the lock so every subscriber sees the same order.
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(next.clone()).is_ok());
        inner.current = next;
        true
    }

    /// Stops accepting writes and closes every subscription.
    pub fn dispose(&self) {
        let mut inner = lock_unpoisoned(&self.shared.inner);
        inner.disposed = true;
        inner.subscribers.clear();
    }

    pub fn is_disposed(&self) -> bool {
        lock_unpoisoned(&self.shared.inner).disposed
    }
}

impl<T: Clone> Default for StateContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for StateContainer<T> {
    fn drop(&mut self) {
        let mut inner = lock_unpoisoned(&self.shared.inner);
        inner.disposed = true;
        inner.subscribers.clear();
    }
}

/// Read-only handle to a [`StateContainer`].
pub struct StateReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for StateReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> StateReader<T> {
    pub fn current(&self) -> AsyncResult<T> {
        lock_unpoisoned(&self.shared.inner).current.clone()
    }

    pub fn is_disposed(&self) -> bool {
        lock_unpoisoned(&self.shared.inner).disposed
    }

    /// Opens a subscription receiving every later state, in write order.
    ///
    /// The state current at subscription time is captured atomically and
    /// available through [`StateSubscription::initial`]. Subscribing to a
    /// disposed container yields a subscription that ends immediately.
    pub fn subscribe(&self) -> StateSubscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock_unpoisoned(&self.shared.inner);
        if !inner.disposed {
            inner.subscribers.push(tx);
        }
        StateSubscription {
            initial: inner.current.clone(),
            rx,
        }
    }
}

pub struct StateSubscription<T> {
    initial: AsyncResult<T>,
    rx: mpsc::UnboundedReceiver<AsyncResult<T>>,
}

impl<T> StateSubscription<T> {
    pub fn initial(&self) -> &AsyncResult<T> {
        &self.initial
    }

    /// Waits for the next state; `None` once the container is disposed.
    pub async fn next(&mut self) -> Option<AsyncResult<T>> {
        self.rx.recv().await
    }

    /// Waits past any `Loading` state; `None` once the container is disposed.
    pub async fn next_settled(&mut self) -> Option<AsyncResult<T>> {
        loop {
            match self.rx.recv().await? {
                AsyncResult::Loading => continue,
                settled => return Some(settled),
            }
        }
    }

    /// Returns an already delivered state without waiting.
    pub fn try_next(&mut self) -> Option<AsyncResult<T>> {
        self.rx.try_recv().ok()
    }

    /// Drains every state delivered so far.
    pub fn drain(&mut self) -> Vec<AsyncResult<T>> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<AsyncResult<T>> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
