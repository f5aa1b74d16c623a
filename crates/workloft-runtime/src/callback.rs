//! Ordered listener registries with consume semantics

/// Identifies a registered listener so it can be removed later.
pub type ListenerId = u64;

/// An ordered set of listeners for one event kind.
///
/// Listeners are visited in registration order. A listener returning
/// `true` consumes the event: later listeners in this set are skipped and
/// the event does not bubble to any fallback registry.
pub struct ListenerSet<A> {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Box<dyn FnMut(&A) -> bool + Send>)>,
}

impl<A> ListenerSet<A> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    /// Register a listener and return its id.
    pub fn add<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&A) -> bool + Send + 'static,
    {
        let id = self.reserve_id();
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Allocate an id without storing a listener. Used for listeners that
    /// were delivered immediately and never joined the set.
    pub fn reserve_id(&mut self) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Remove a listener by id. Idempotent: removing twice reports `false`
    /// the second time.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Visit listeners in order, stopping at the first that consumes the
    /// event. Returns whether the event was consumed.
    pub fn deliver(&mut self, value: &A) -> bool {
        for (_, listener) in self.listeners.iter_mut() {
            if listener(value) {
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<A> Default for ListenerSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for ListenerSet<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// The per-task listener registry: one result set, one error set, and an
/// optional error fallback invoked when no per-task listener consumed the
/// error (the hook the client uses to bubble into its global registry).
pub struct CallbackSet<T, E> {
    results: ListenerSet<T>,
    errors: ListenerSet<E>,
    error_fallback: Option<Box<dyn FnMut(&E) -> bool + Send>>,
}

impl<T, E> CallbackSet<T, E> {
    pub fn new() -> Self {
        Self {
            results: ListenerSet::new(),
            errors: ListenerSet::new(),
            error_fallback: None,
        }
    }

    pub fn with_error_fallback<F>(fallback: F) -> Self
    where
        F: FnMut(&E) -> bool + Send + 'static,
    {
        let mut set = Self::new();
        set.error_fallback = Some(Box::new(fallback));
        set
    }

    pub fn add_result<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.results.add(listener)
    }

    pub fn add_error<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> bool + Send + 'static,
    {
        self.errors.add(listener)
    }

    pub fn reserve_result_id(&mut self) -> ListenerId {
        self.results.reserve_id()
    }

    pub fn reserve_error_id(&mut self) -> ListenerId {
        self.errors.reserve_id()
    }

    pub fn remove_result(&mut self, id: ListenerId) -> bool {
        self.results.remove(id)
    }

    pub fn remove_error(&mut self, id: ListenerId) -> bool {
        self.errors.remove(id)
    }

    /// Take the result listeners out for delivery without holding the
    /// owner's lock across listener code.
    pub fn take_results(&mut self) -> ListenerSet<T> {
        std::mem::take(&mut self.results)
    }

    /// Take the error listeners plus the fallback hook out for delivery.
    #[allow(clippy::type_complexity)]
    pub fn take_errors(&mut self) -> (ListenerSet<E>, Option<Box<dyn FnMut(&E) -> bool + Send>>) {
        (std::mem::take(&mut self.errors), self.error_fallback.take())
    }
}

impl<T, E> Default for CallbackSet<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_listeners_visited_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ListenerSet::new();
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            set.add(move |_: &u32| {
                seen.lock().unwrap().push(tag);
                false
            });
        }

        assert!(!set.deliver(&7));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_consume_halts_later_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ListenerSet::new();
        let s = seen.clone();
        set.add(move |_: &u32| {
            s.lock().unwrap().push("l1");
            false
        });
        let s = seen.clone();
        set.add(move |_: &u32| {
            s.lock().unwrap().push("l2");
            true
        });
        let s = seen.clone();
        set.add(move |_: &u32| {
            s.lock().unwrap().push("l3");
            false
        });

        assert!(set.deliver(&7));
        assert_eq!(*seen.lock().unwrap(), vec!["l1", "l2"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut set = ListenerSet::new();
        let id = set.add(|_: &u32| false);
        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());
    }

    #[test]
    fn test_deliver_on_empty_set_is_a_no_op() {
        let mut set: ListenerSet<u32> = ListenerSet::new();
        assert!(!set.deliver(&1));
    }

    #[test]
    fn test_error_fallback_runs_only_when_not_consumed() {
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let mut set: CallbackSet<u32, String> = CallbackSet::with_error_fallback(move |_| {
            *h.lock().unwrap() += 1;
            true
        });
        set.add_error(|_| true);

        let (mut errors, fallback) = set.take_errors();
        let err = "boom".to_string();
        if !errors.deliver(&err) {
            if let Some(mut fallback) = fallback {
                fallback(&err);
            }
        }
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
