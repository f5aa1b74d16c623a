//! Listener-observable handles for in-flight API calls

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use workloft_runtime::{Delivery, ListenerId, ListenerSet, TaskHandle, TaskState};

use crate::callback::GlobalRegistry;
use crate::error::ClientError;
use crate::session::Session;

struct SessionSide {
    listeners: ListenerSet<Session>,
    session_changed: bool,
    delivered: Option<Session>,
}

/// One in-flight or completed API call.
///
/// Returned immediately by [`crate::Client`] request methods; the caller
/// attaches result/error/session listeners and may cancel. Unconsumed
/// errors bubble to the client's [`GlobalRegistry`], as do session
/// changes produced by auth exchanges.
pub struct RequestTask<T> {
    handle: TaskHandle<T, ClientError>,
    session_side: Arc<Mutex<SessionSide>>,
    globals: Arc<GlobalRegistry>,
    delivery: Delivery,
    is_auth_request: bool,
}

impl<T> Clone for RequestTask<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            session_side: self.session_side.clone(),
            globals: self.globals.clone(),
            delivery: self.delivery.clone(),
            is_auth_request: self.is_auth_request,
        }
    }
}

impl<T> RequestTask<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        delivery: Delivery,
        globals: Arc<GlobalRegistry>,
        is_auth_request: bool,
    ) -> Self {
        let fallback_registry = globals.clone();
        let handle = TaskHandle::with_error_fallback(delivery.clone(), move |error| {
            fallback_registry.deliver_error(error)
        });
        Self {
            handle,
            session_side: Arc::new(Mutex::new(SessionSide {
                listeners: ListenerSet::new(),
                session_changed: false,
                delivered: None,
            })),
            globals,
            delivery,
            is_auth_request,
        }
    }

    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    /// Whether this task is an authentication exchange.
    pub fn is_auth_request(&self) -> bool {
        self.is_auth_request
    }

    /// Whether completing this task replaced the session.
    pub fn has_session_changed(&self) -> bool {
        self.session_side.lock().session_changed
    }

    /// Cancel the call. Pending tasks never execute; running tasks stop
    /// delivering but the transport call may still finish in the
    /// background and is ignored.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn result(&self) -> Option<Arc<T>> {
        self.handle.result()
    }

    pub fn error(&self) -> Option<Arc<ClientError>> {
        self.handle.error()
    }

    /// Attach a result listener; returns its id. Attached after
    /// completion, the listener fires immediately on this thread.
    pub fn on_result<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.handle.on_result(listener)
    }

    /// Attach an error listener; same late-attachment rule as
    /// [`RequestTask::on_result`].
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&ClientError) -> bool + Send + 'static,
    {
        self.handle.on_error(listener)
    }

    /// Attach a session listener, fired when this task replaces the
    /// session (auth exchanges only).
    pub fn on_session<F>(&self, mut listener: F) -> ListenerId
    where
        F: FnMut(&Session) -> bool + Send + 'static,
    {
        let (id, delivered) = {
            let mut side = self.session_side.lock();
            match side.delivered.clone() {
                Some(session) => (side.listeners.reserve_id(), Some(session)),
                None => return side.listeners.add(listener),
            }
        };
        if let Some(session) = delivered {
            listener(&session);
        }
        id
    }

    pub fn remove_result_listener(&self, id: ListenerId) -> bool {
        self.handle.remove_result_listener(id)
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.handle.remove_error_listener(id)
    }

    pub fn remove_session_listener(&self, id: ListenerId) -> bool {
        self.session_side.lock().listeners.remove(id)
    }

    /// Await settlement and return the final state.
    pub async fn wait(&self) -> TaskState {
        self.handle.wait().await
    }

    pub(crate) async fn wait_timeout(&self, timeout: Duration) -> Option<TaskState> {
        self.handle.wait_timeout(timeout).await
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.handle.mark_running()
    }

    pub(crate) fn succeed(&self, value: T) {
        self.handle.succeed(value);
    }

    pub(crate) fn fail(&self, error: ClientError) {
        self.handle.fail(error);
    }

    /// Record the session replacement and deliver it: per-task listeners
    /// first, then the global registry unless consumed.
    pub(crate) fn deliver_session(&self, session: Session) {
        {
            let mut side = self.session_side.lock();
            side.session_changed = true;
            side.delivered = Some(session.clone());
        }
        let side = self.session_side.clone();
        let globals = self.globals.clone();
        self.delivery.post(move || {
            let mut listeners = {
                let mut side = side.lock();
                std::mem::take(&mut side.listeners)
            };
            if !listeners.deliver(&session) {
                globals.deliver_session(&session);
            }
        });
    }
}

impl<T> std::fmt::Debug for RequestTask<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTask")
            .field("state", &self.state())
            .field("is_auth_request", &self.is_auth_request)
            .finish()
    }
}
