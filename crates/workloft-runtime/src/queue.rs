//! Single-worker FIFO execution queues

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

struct QueueInner<J> {
    label: &'static str,
    pending: Mutex<VecDeque<J>>,
    wakeup: Notify,
    paused: AtomicBool,
    closed: AtomicBool,
}

/// A FIFO queue drained by exactly one worker task.
///
/// Jobs run strictly in submission order, one at a time. The queue can be
/// paused (the worker finishes its current job, then idles), resumed, and
/// drained (pending jobs handed back to the caller, e.g. to fail them all
/// with one error). Dropping the queue shuts the worker down after it
/// finishes whatever is already dequeued.
pub struct SerialQueue<J> {
    inner: Arc<QueueInner<J>>,
}

impl<J: Send + 'static> SerialQueue<J> {
    /// Spawn the worker on the current tokio runtime. `handler` is invoked
    /// for each job; the next job is not dequeued until it completes.
    pub fn spawn<F, Fut>(label: &'static str, mut handler: F) -> Self
    where
        F: FnMut(J) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let inner = Arc::new(QueueInner {
            label,
            pending: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let worker = inner.clone();
        tokio::spawn(async move {
            loop {
                let job = if worker.paused.load(Ordering::Acquire) {
                    None
                } else {
                    worker.pending.lock().pop_front()
                };

                match job {
                    Some(job) => handler(job).await,
                    None => {
                        if worker.closed.load(Ordering::Acquire) {
                            break;
                        }
                        worker.wakeup.notified().await;
                    }
                }
            }
            trace!(queue = worker.label, "queue worker stopped");
        });

        Self { inner }
    }

    /// Append a job. Never blocks; the worker picks it up in order.
    pub fn submit(&self, job: J) {
        self.inner.pending.lock().push_back(job);
        self.inner.wakeup.notify_one();
    }

    /// Stop dequeuing after the current job finishes.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
        trace!(queue = self.inner.label, "queue paused");
    }

    /// Resume dequeuing.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.wakeup.notify_one();
        trace!(queue = self.inner.label, "queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Remove and return every job not yet started.
    pub fn drain(&self) -> Vec<J> {
        let drained: Vec<J> = self.inner.pending.lock().drain(..).collect();
        if !drained.is_empty() {
            trace!(
                queue = self.inner.label,
                count = drained.len(),
                "drained pending jobs"
            );
        }
        drained
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl<J> Drop for SerialQueue<J> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.wakeup.notify_one();
    }
}

impl<J> std::fmt::Debug for SerialQueue<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.inner.label)
            .field("paused", &self.inner.paused.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let queue = SerialQueue::spawn("test", move |n: u32| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(n);
            }
        });

        for n in 0..20 {
            queue.submit(n);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pause_holds_jobs_until_resume() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let queue = SerialQueue::spawn("test", move |n: u32| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(n);
            }
        });

        queue.pause();
        queue.submit(1);
        queue.submit(2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(queue.pending_len(), 2);

        queue.resume();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_drain_removes_pending_jobs() {
        let queue: SerialQueue<u32> = SerialQueue::spawn("test", |_| async {});
        queue.pause();
        queue.submit(1);
        queue.submit(2);
        queue.submit(3);

        let drained = queue.drain();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(queue.pending_len(), 0);

        queue.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_worker_finishes_current_job_before_next() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let queue = SerialQueue::spawn("test", move |n: u32| {
            let sink = sink.clone();
            async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                sink.lock().unwrap().push(n);
            }
        });

        queue.submit(0);
        queue.submit(1);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
