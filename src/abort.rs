//! Cancellation handles and the per-client registry of outstanding requests.
//!
//! An [`AbortController`] owns the cancellation state of one logical request;
//! any number of [`AbortSignal`]s observe it. Callers who want to cancel a
//! single request create their own controller and pass its signal in
//! [`RequestOptions`](crate::RequestOptions). Requests without a
//! caller-supplied signal get a controller of their own, which the client
//! tracks so [`Client::abort_all`](crate::Client::abort_all) can reach it.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// The message used when a request is aborted without an explicit reason.
pub const DEFAULT_ABORT_REASON: &str = "Request aborted by user";

/// Why a request was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum AbortReason {
    /// Cancelled explicitly, with a caller-supplied message.
    Cancelled(String),
    /// The configured timeout elapsed.
    Timeout,
}

impl AbortReason {
    /// Returns the human-readable message for this reason.
    pub fn message(&self) -> &str {
        match self {
            AbortReason::Cancelled(message) => message,
            AbortReason::Timeout => "Request timeout",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Active,
    Aborted(AbortReason),
    Finished,
}

/// The owning side of a cancellation handle.
///
/// Cloning a controller yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct AbortController {
    state: Arc<watch::Sender<State>>,
}

impl AbortController {
    /// Creates a controller in the active state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::Active);
        Self {
            state: Arc::new(state),
        }
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: self.state.subscribe(),
        }
    }

    /// Aborts the request.
    ///
    /// Returns `true` if this call performed the transition. Aborting a
    /// request that already finished or was already aborted is a no-op.
    pub fn abort(&self, reason: AbortReason) -> bool {
        self.state.send_if_modified(|state| {
            if *state == State::Active {
                *state = State::Aborted(reason);
                true
            } else {
                false
            }
        })
    }

    /// Returns `true` once the controller has been aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(*self.state.borrow(), State::Aborted(_))
    }

    /// Marks the request as finished so later aborts become no-ops.
    pub(crate) fn finish(&self) {
        self.state.send_if_modified(|state| {
            if *state == State::Active {
                *state = State::Finished;
                true
            } else {
                false
            }
        });
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a cancellation handle.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: watch::Receiver<State>,
}

impl AbortSignal {
    /// Returns the abort reason, if the request has been aborted.
    pub fn reason(&self) -> Option<AbortReason> {
        match &*self.state.borrow() {
            State::Aborted(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Returns `true` once the request has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves with the reason once the request is aborted.
    ///
    /// Never resolves for a request that finishes normally.
    pub async fn aborted(&self) -> AbortReason {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            if let State::Aborted(reason) = current {
                return reason;
            }
            if state.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Resolves once the request is either aborted or finished.
    pub(crate) async fn settled(&self) {
        let mut state = self.state.clone();
        // An error means every controller is gone; nothing can change anymore.
        let _ = state.wait_for(|state| *state != State::Active).await;
    }
}

/// Tracks the controllers of outstanding requests, keyed by a monotonic id.
#[derive(Debug, Default)]
pub(crate) struct AbortRegistry {
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, AbortController>>,
}

impl AbortRegistry {
    /// Tracks `controller` until the returned guard is dropped.
    pub(crate) fn register(&self, controller: AbortController) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, controller.clone());
        Registration {
            registry: self,
            id,
            controller,
        }
    }

    /// Aborts every tracked request and clears the registry.
    ///
    /// Returns the number of handles that were tracked.
    pub(crate) fn abort_all(&self, reason: &str) -> usize {
        let drained: Vec<AbortController> = self.lock().drain().map(|(_, c)| c).collect();
        for controller in &drained {
            controller.abort(AbortReason::Cancelled(reason.to_string()));
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AbortController>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a handle from the registry and finishes its controller on drop.
pub(crate) struct Registration<'a> {
    registry: &'a AbortRegistry,
    id: u64,
    controller: AbortController,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
        self.controller.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_abort_is_one_shot() {
        let controller = AbortController::new();
        let signal = controller.signal();

        assert!(controller.abort(AbortReason::Timeout));
        assert!(!controller.abort(AbortReason::Cancelled("late".into())));
        assert_eq!(signal.reason(), Some(AbortReason::Timeout));
    }

    #[test]
    fn test_abort_after_finish_is_noop() {
        let controller = AbortController::new();
        controller.finish();

        assert!(!controller.abort(AbortReason::Timeout));
        assert!(!controller.signal().is_aborted());
    }

    #[tokio::test]
    async fn test_signal_resolves_on_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let waiter = tokio::spawn(async move { signal.aborted().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort(AbortReason::Cancelled("stop".into()));

        let reason = waiter.await.unwrap();
        assert_eq!(reason, AbortReason::Cancelled("stop".into()));
    }

    #[tokio::test]
    async fn test_signal_does_not_resolve_after_finish() {
        let controller = AbortController::new();
        let signal = controller.signal();
        controller.finish();

        let result = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(result.is_err());
        signal.settled().await;
    }

    #[test]
    fn test_registry_abort_all_clears() {
        let registry = AbortRegistry::default();
        let first = AbortController::new();
        let second = AbortController::new();
        let first_guard = registry.register(first.clone());
        let second_guard = registry.register(second.clone());
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.abort_all(DEFAULT_ABORT_REASON), 2);
        assert_eq!(registry.len(), 0);
        assert!(first.is_aborted());
        assert!(second.is_aborted());

        drop(first_guard);
        drop(second_guard);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registration_drop_removes_and_finishes() {
        let registry = AbortRegistry::default();
        let controller = AbortController::new();
        {
            let _guard = registry.register(controller.clone());
            assert_eq!(registry.len(), 1);
        }
        assert_eq!(registry.len(), 0);
        assert!(!controller.abort(AbortReason::Timeout));
    }
}
