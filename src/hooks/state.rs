use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::error::Error;

/// Lifecycle of one hook operation.
#[derive(Debug, Clone)]
pub enum HookState<T> {
    Idle,
    Loading,
    Success(T),
    Error(Arc<Error>),
}

impl<T> HookState<T> {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Observable value that goes quiet once its consumer is gone.
///
/// After [`deactivate`](Self::deactivate), updates are silently ignored.
pub struct Reactive<T> {
    tx: watch::Sender<T>,
    active: AtomicBool,
}

impl<T: Clone> Reactive<T> {
    pub(crate) fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(initial),
            active: AtomicBool::new(true),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every change, for re-rendering.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn set(&self, value: T) {
        if self.is_active() {
            self.tx.send_replace(value);
        }
    }
}

impl<T: Clone> Reactive<HookState<T>> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.tx.borrow().error().cloned()
    }

    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.tx.borrow().data().cloned()
    }

    /// Drive `op` through `Loading` into `Success` or `Error`.
    ///
    /// The error is recorded and returned. If the caller drops the future
    /// midway, the state falls back to `Idle` instead of staying `Loading`.
    pub(crate) async fn track<F>(&self, op: F) -> Result<T, Arc<Error>>
    where
        F: Future<Output = Result<T, Error>>,
    {
        self.set(HookState::Loading);
        let mut guard = LoadingGuard { state: self, armed: true };
        let result = op.await;
        guard.armed = false;

        match result {
            Ok(data) => {
                self.set(HookState::Success(data.clone()));
                Ok(data)
            }
            Err(e) => {
                let e = Arc::new(e);
                self.set(HookState::Error(e.clone()));
                Err(e)
            }
        }
    }
}

struct LoadingGuard<'a, T: Clone> {
    state: &'a Reactive<HookState<T>>,
    armed: bool,
}

impl<T: Clone> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.state.set(HookState::Idle);
        }
    }
}
