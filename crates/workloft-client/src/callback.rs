//! Listener registry shared across all of a client's tasks

use parking_lot::Mutex;

use workloft_runtime::{ListenerId, ListenerSet};

use crate::error::ClientError;
use crate::session::Session;

/// Error and session listeners shared by every task a [`crate::Client`]
/// creates. A task's own listeners always run first; an event only
/// bubbles here when none of them consumed it.
///
/// Listeners run while the registry is locked, so they must not add or
/// remove global listeners themselves.
#[derive(Default)]
pub struct GlobalRegistry {
    errors: Mutex<ListenerSet<ClientError>>,
    sessions: Mutex<ListenerSet<Session>>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error_listener<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&ClientError) -> bool + Send + 'static,
    {
        self.errors.lock().add(listener)
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.errors.lock().remove(id)
    }

    pub fn add_session_listener<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&Session) -> bool + Send + 'static,
    {
        self.sessions.lock().add(listener)
    }

    pub fn remove_session_listener(&self, id: ListenerId) -> bool {
        self.sessions.lock().remove(id)
    }

    pub(crate) fn deliver_error(&self, error: &ClientError) -> bool {
        self.errors.lock().deliver(error)
    }

    pub(crate) fn deliver_session(&self, session: &Session) -> bool {
        self.sessions.lock().deliver(session)
    }
}

impl std::fmt::Debug for GlobalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRegistry")
            .field("errors", &self.errors.lock().len())
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}
