//! The two-tier local store and its operation family

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

use workloft_runtime::{Delivery, SerialQueue, TaskHandle};

use crate::disk::DiskStore;
use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;

/// Future-like handle for a queued store operation, with the same
/// result/error-listener contract as the client's request tasks.
pub type StoreTask<T> = TaskHandle<T, StoreError>;

type StoreJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// The two cache tiers. Either may independently be absent: during
/// startup, after `free` (memory gone), or after `erase` (both gone).
/// The async mutex on the disk slot is the disk-readiness lock: every
/// disk access holds it for its duration, while memory-only work never
/// touches it.
struct Tiers {
    name: String,
    memory: Mutex<Option<MemoryStore>>,
    disk: AsyncMutex<Option<DiskStore>>,
}

/// A two-tier (memory + disk) key/value cache.
///
/// `open` returns immediately; initialization and every operation run in
/// submission order on the store's own single-worker queue, so a `get`
/// issued right after `open` simply queues behind init. Values are cached
/// as JSON: write-through to disk, memory-first reads with disk fallback
/// and backfill. Cloning shares the store.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct LocalStore {
    tiers: Arc<Tiers>,
    queue: Arc<SerialQueue<StoreJob>>,
    delivery: Delivery,
}

impl LocalStore {
    /// Open (or create) the named store under the platform cache
    /// directory, with the memory tier bounded to `memory_budget_kb`.
    pub fn open(name: &str, memory_budget_kb: usize) -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("workloft");
        Self::open_in(root, name, memory_budget_kb)
    }

    /// Open a store under an explicit cache root.
    pub fn open_in(root: impl Into<PathBuf>, name: &str, memory_budget_kb: usize) -> Self {
        let store = Self {
            tiers: Arc::new(Tiers {
                name: name.to_string(),
                memory: Mutex::new(None),
                disk: AsyncMutex::new(None),
            }),
            queue: Arc::new(SerialQueue::spawn("store", |job: StoreJob| job())),
            delivery: Delivery::spawn(),
        };
        store.enqueue_init(root.into(), memory_budget_kb);
        store
    }

    pub fn name(&self) -> &str {
        &self.tiers.name
    }

    /// Best-effort readiness query; racy by nature, informational only.
    pub fn is_memory_store_ready(&self) -> bool {
        self.tiers.memory.lock().is_some()
    }

    /// Best-effort readiness query; racy by nature, informational only.
    pub fn is_disk_store_ready(&self) -> bool {
        self.tiers
            .disk
            .try_lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    fn enqueue_init(&self, root: PathBuf, memory_budget_kb: usize) {
        let tiers = self.tiers.clone();
        self.queue.submit(Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(async move {
                // Hold the disk-readiness lock for the whole preparation
                // so callers block instead of observing a half-open tier.
                let mut disk = tiers.disk.lock().await;
                *tiers.memory.lock() = Some(MemoryStore::with_budget_kb(memory_budget_kb));
                match DiskStore::prepare(&root, &tiers.name).await {
                    Ok(store) => {
                        debug!(store = %tiers.name, "store initialized");
                        *disk = Some(store);
                    }
                    Err(err) => {
                        // Memory-only degrade: reads and writes keep
                        // working against the memory tier.
                        warn!(store = %tiers.name, "disk tier unavailable: {err}");
                    }
                }
            })
        }));
    }

    fn submit<T, F>(&self, work: F) -> StoreTask<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Arc<Tiers>) -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        let task: StoreTask<T> = TaskHandle::new(self.delivery.clone());
        let tiers = self.tiers.clone();
        let job_task = task.clone();
        self.queue.submit(Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(async move {
                if !job_task.mark_running() {
                    return;
                }
                match work(tiers).await {
                    Ok(value) => job_task.succeed(value),
                    Err(err) => job_task.fail(err),
                }
            })
        }));
        task
    }

    /// Fetch a value: memory first, then disk under the readiness lock,
    /// backfilling memory on a disk hit. `None` on a total miss.
    pub fn get<T>(&self, key: &str) -> StoreTask<Option<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let key = key.to_string();
        self.submit(move |tiers| Box::pin(async move { get_value::<T>(&tiers, &key).await }))
    }

    /// Write a value through both tiers.
    pub fn set<T>(&self, key: &str, value: &T) -> StoreTask<()>
    where
        T: Serialize,
    {
        let key = key.to_string();
        let value = match serde_json::to_value(value) {
            Ok(value) => Arc::new(value),
            Err(err) => {
                let task: StoreTask<()> = TaskHandle::new(self.delivery.clone());
                task.mark_running();
                task.fail(StoreError::Serialization(err.to_string()));
                return task;
            }
        };
        self.submit(move |tiers| Box::pin(async move { set_value(&tiers, &key, value).await }))
    }

    /// Remove a key from both tiers. Silent no-op when absent.
    pub fn remove(&self, key: &str) -> StoreTask<()> {
        let key = key.to_string();
        self.submit(move |tiers| Box::pin(async move { remove_value(&tiers, &key).await }))
    }

    /// Release the memory tier entirely; disk untouched.
    pub fn free(&self) -> StoreTask<()> {
        self.submit(move |tiers| Box::pin(async move { free_memory(&tiers) }))
    }

    /// Release the memory tier and delete everything on disk, including
    /// the store directory. The handle is closed afterwards.
    pub fn erase(&self) -> StoreTask<()> {
        self.submit(move |tiers| Box::pin(async move { erase_all(&tiers).await }))
    }
}

async fn get_value<T: DeserializeOwned>(tiers: &Tiers, key: &str) -> Result<Option<T>> {
    {
        let mut memory = tiers.memory.lock();
        if let Some(memory) = memory.as_mut() {
            if let Some(hit) = memory.get(key) {
                trace!(key, "memory hit");
                let decoded = serde_json::from_value((*hit).clone())
                    .map_err(|err| StoreError::Deserialization(err.to_string()))?;
                return Ok(Some(decoded));
            }
        }
    }

    let disk = tiers.disk.lock().await;
    match disk.as_ref() {
        Some(store) => match store.read(key).await? {
            Some(value) => {
                let value = Arc::new(value);
                if let Some(memory) = tiers.memory.lock().as_mut() {
                    memory.put(key, value.clone());
                }
                let decoded = serde_json::from_value((*value).clone())
                    .map_err(|err| StoreError::Deserialization(err.to_string()))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        },
        None if tiers.memory.lock().is_some() => Ok(None),
        None => Err(StoreError::Closed),
    }
}

async fn set_value(tiers: &Tiers, key: &str, value: Arc<Value>) -> Result<()> {
    let wrote_memory = {
        let mut memory = tiers.memory.lock();
        match memory.as_mut() {
            Some(memory) => {
                memory.put(key, value.clone());
                true
            }
            None => false,
        }
    };

    let disk = tiers.disk.lock().await;
    match disk.as_ref() {
        Some(store) => store.write(key, &value).await,
        None if wrote_memory => Ok(()),
        None => Err(StoreError::Closed),
    }
}

async fn remove_value(tiers: &Tiers, key: &str) -> Result<()> {
    let had_memory = {
        let mut memory = tiers.memory.lock();
        match memory.as_mut() {
            Some(memory) => {
                memory.remove(key);
                true
            }
            None => false,
        }
    };

    let disk = tiers.disk.lock().await;
    match disk.as_ref() {
        Some(store) => store.delete(key).await,
        None if had_memory => Ok(()),
        None => Err(StoreError::Closed),
    }
}

fn free_memory(tiers: &Tiers) -> Result<()> {
    if tiers.memory.lock().take().is_some() {
        debug!("memory tier released");
        Ok(())
    } else {
        Err(StoreError::MemoryGone)
    }
}

async fn erase_all(tiers: &Tiers) -> Result<()> {
    let had_memory = tiers.memory.lock().take().is_some();
    let mut disk = tiers.disk.lock().await;
    match disk.take() {
        Some(store) => store.destroy().await,
        None if had_memory => Ok(()),
        None => Err(StoreError::Closed),
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("name", &self.tiers.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workloft_runtime::TaskState;

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        store.set("greeting", &"hello".to_string());
        let task = store.get::<String>("greeting");
        assert_eq!(task.wait().await, TaskState::Succeeded);
        assert_eq!(
            task.result().as_deref(),
            Some(&Some("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_get_of_missing_key_is_none() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        let task = store.get::<String>("nothing");
        task.wait().await;
        assert_eq!(task.result().as_deref(), Some(&None));
    }

    #[tokio::test]
    async fn test_remove_is_a_silent_no_op_for_missing_keys() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        let task = store.remove("nothing");
        assert_eq!(task.wait().await, TaskState::Succeeded);
    }

    #[tokio::test]
    async fn test_double_free_reports_memory_gone() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        assert_eq!(store.free().wait().await, TaskState::Succeeded);
        let second = store.free();
        assert_eq!(second.wait().await, TaskState::Failed);
        assert!(matches!(
            second.error().as_deref(),
            Some(StoreError::MemoryGone)
        ));
    }

    #[tokio::test]
    async fn test_set_still_works_disk_only_after_free() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        store.free().wait().await;
        assert_eq!(store.set("k", &7u32).wait().await, TaskState::Succeeded);
        let task = store.get::<u32>("k");
        task.wait().await;
        assert_eq!(task.result().as_deref(), Some(&Some(7)));
    }

    #[tokio::test]
    async fn test_operations_after_erase_report_closed() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        store.set("k", &1u32);
        assert_eq!(store.erase().wait().await, TaskState::Succeeded);

        let get = store.get::<u32>("k");
        get.wait().await;
        assert!(matches!(get.error().as_deref(), Some(StoreError::Closed)));

        let set = store.set("k", &2u32);
        set.wait().await;
        assert!(matches!(set.error().as_deref(), Some(StoreError::Closed)));
    }

    #[tokio::test]
    async fn test_readiness_queries_flip_after_init() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalStore::open_in(root.path(), "cache", 64);

        // Queue a no-op and wait for it: init has completed by then.
        store.remove("warmup").wait().await;
        assert!(store.is_memory_store_ready());
        assert!(store.is_disk_store_ready());
    }
}
