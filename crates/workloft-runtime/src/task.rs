//! Settle-once asynchronous task handles

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::callback::{CallbackSet, ListenerId};
use crate::delivery::Delivery;

/// Lifecycle of a [`TaskHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_settled(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

struct TaskInner<T, E> {
    state: TaskState,
    result: Option<Arc<T>>,
    error: Option<Arc<E>>,
    callbacks: CallbackSet<T, E>,
}

/// A settle-once unit of work observable through listeners.
///
/// The executor that created the handle drives it: `mark_running`, then
/// exactly one of `succeed`/`fail`. Callers attach listeners and may
/// cancel; they never settle the task themselves.
///
/// Listener delivery runs on the handle's [`Delivery`] context. The one
/// documented exception: a listener attached after settlement is invoked
/// immediately on the attaching thread with the stored outcome.
pub struct TaskHandle<T, E> {
    inner: Arc<Mutex<TaskInner<T, E>>>,
    delivery: Delivery,
    settled_tx: Arc<watch::Sender<bool>>,
    settled_rx: watch::Receiver<bool>,
}

impl<T, E> Clone for TaskHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            delivery: self.delivery.clone(),
            settled_tx: self.settled_tx.clone(),
            settled_rx: self.settled_rx.clone(),
        }
    }
}

impl<T, E> TaskHandle<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(delivery: Delivery) -> Self {
        Self::with_callbacks(delivery, CallbackSet::new())
    }

    /// Create a handle whose unconsumed errors bubble into `fallback`.
    pub fn with_error_fallback<F>(delivery: Delivery, fallback: F) -> Self
    where
        F: FnMut(&E) -> bool + Send + 'static,
    {
        Self::with_callbacks(delivery, CallbackSet::with_error_fallback(fallback))
    }

    fn with_callbacks(delivery: Delivery, callbacks: CallbackSet<T, E>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(TaskInner {
                state: TaskState::Pending,
                result: None,
                error: None,
                callbacks,
            })),
            delivery,
            settled_tx: Arc::new(tx),
            settled_rx: rx,
        }
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// The stored result, once settled successfully.
    pub fn result(&self) -> Option<Arc<T>> {
        self.inner.lock().result.clone()
    }

    /// The stored error, once settled with a failure.
    pub fn error(&self) -> Option<Arc<E>> {
        self.inner.lock().error.clone()
    }

    /// Transition `Pending -> Running`. Returns `false` when the task was
    /// cancelled (or already driven) and must not execute.
    pub fn mark_running(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Pending {
            inner.state = TaskState::Running;
            true
        } else {
            false
        }
    }

    /// Cancel the task. A pending task never executes; a running task
    /// keeps executing but its outcome is no longer delivered.
    pub fn cancel(&self) {
        let cancelled = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Pending | TaskState::Running => {
                    inner.state = TaskState::Cancelled;
                    true
                }
                _ => false,
            }
        };
        if cancelled {
            trace!("task cancelled");
            let _ = self.settled_tx.send(true);
        }
    }

    /// Settle with a result and deliver to result listeners. First settle
    /// wins; anything after it (including after cancellation) is ignored.
    pub fn succeed(&self, value: T) {
        let settled = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Pending | TaskState::Running => {
                    inner.state = TaskState::Succeeded;
                    inner.result = Some(Arc::new(value));
                    true
                }
                _ => false,
            }
        };
        if !settled {
            return;
        }
        let _ = self.settled_tx.send(true);

        let inner = self.inner.clone();
        self.delivery.post(move || {
            // Listener code runs outside the lock; late attachments see
            // the settled state and self-deliver.
            let (value, mut listeners) = {
                let mut inner = inner.lock();
                let value = match inner.result.clone() {
                    Some(value) => value,
                    None => return,
                };
                (value, inner.callbacks.take_results())
            };
            listeners.deliver(&value);
        });
    }

    /// Settle with an error and deliver to error listeners, bubbling to
    /// the fallback when no per-task listener consumed it.
    pub fn fail(&self, error: E) {
        let settled = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Pending | TaskState::Running => {
                    inner.state = TaskState::Failed;
                    inner.error = Some(Arc::new(error));
                    true
                }
                _ => false,
            }
        };
        if !settled {
            return;
        }
        let _ = self.settled_tx.send(true);

        let inner = self.inner.clone();
        self.delivery.post(move || {
            let (error, mut listeners, fallback) = {
                let mut inner = inner.lock();
                let error = match inner.error.clone() {
                    Some(error) => error,
                    None => return,
                };
                let (listeners, fallback) = inner.callbacks.take_errors();
                (error, listeners, fallback)
            };
            if !listeners.deliver(&error) {
                if let Some(mut fallback) = fallback {
                    fallback(&error);
                }
            }
        });
    }

    /// Attach a result listener. Returns the listener's id.
    ///
    /// After settlement the listener is invoked immediately on the
    /// attaching thread instead of being queued.
    pub fn on_result<F>(&self, mut listener: F) -> ListenerId
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        let (id, value) = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Succeeded {
                return inner.callbacks.add_result(listener);
            }
            (inner.callbacks.reserve_result_id(), inner.result.clone())
        };
        // Invoked outside the lock so the listener may touch the task.
        if let Some(value) = value {
            listener(&value);
        }
        id
    }

    /// Attach an error listener; same immediate-delivery rule as
    /// [`TaskHandle::on_result`].
    pub fn on_error<F>(&self, mut listener: F) -> ListenerId
    where
        F: FnMut(&E) -> bool + Send + 'static,
    {
        let (id, error) = {
            let mut inner = self.inner.lock();
            if inner.state != TaskState::Failed {
                return inner.callbacks.add_error(listener);
            }
            (inner.callbacks.reserve_error_id(), inner.error.clone())
        };
        if let Some(error) = error {
            listener(&error);
        }
        id
    }

    pub fn remove_result_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().callbacks.remove_result(id)
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().callbacks.remove_error(id)
    }

    /// Await settlement (or cancellation) and return the final state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.settled_rx.clone();
        loop {
            if *rx.borrow() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.state()
    }

    /// Bounded wait used internally by retry policies. `None` on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<TaskState> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

impl<T, E> std::fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("state", &self.inner.lock().state)
            .finish()
    }
}
