//! The fixed delivery context for listener callbacks

use tokio::sync::mpsc;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a single-consumer delivery context.
///
/// All settle callbacks posted through one `Delivery` run on the same
/// dedicated task, in post order, so listener code never races with
/// itself. Cloning the handle shares the context.
#[derive(Clone)]
pub struct Delivery {
    tx: mpsc::UnboundedSender<Job>,
}

impl Delivery {
    /// Spawn a new delivery context on the current tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            trace!("delivery context closed");
        });
        Self { tx }
    }

    /// Post a callback to run on the delivery context.
    ///
    /// Jobs posted after the context shut down are dropped silently.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.tx.send(Box::new(job));
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_in_post_order() {
        let delivery = Delivery::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = seen.clone();
            delivery.post(move || seen.lock().unwrap().push(i));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_clones_share_one_context() {
        let delivery = Delivery::spawn();
        let other = delivery.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        delivery.post(move || s.lock().unwrap().push("a"));
        let s = seen.clone();
        other.post(move || s.lock().unwrap().push("b"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }
}
