//! Process-wide registry of expensive model instances
//!
//! Each model identity owns one [`tokio::sync::OnceCell`]. The first caller
//! constructs the instance; concurrent callers wait on the same construction
//! and then share the result. A failed construction leaves the cell empty so a
//! later request can try again.

use crate::error::{BannerError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

struct Slot<T: ?Sized> {
    cell: OnceCell<Arc<T>>,
    attempts: AtomicUsize,
}

/// Type-erased view of a slot for bookkeeping queries
trait ErasedSlot: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn attempts(&self) -> usize;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: ?Sized + Send + Sync + 'static> ErasedSlot for Slot<T> {
    fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registry of lazily constructed, shared model instances
#[derive(Default)]
pub struct ModelRegistry {
    slots: Mutex<HashMap<String, Arc<dyn ErasedSlot>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .slots
            .lock()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ModelRegistry").field("keys", &keys).finish()
    }
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T>(&self, key: &str) -> Result<Arc<Slot<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| BannerError::internal("model registry lock poisoned"))?;
            Arc::clone(slots.entry(key.to_string()).or_insert_with(|| {
                Arc::new(Slot::<T> {
                    cell: OnceCell::new(),
                    attempts: AtomicUsize::new(0),
                }) as Arc<dyn ErasedSlot>
            }))
        };
        erased.into_any().downcast::<Slot<T>>().map_err(|_| {
            BannerError::internal(format!(
                "model registry key '{}' reused with another type",
                key
            ))
        })
    }

    /// Return the instance for `key`, constructing it with `init` if needed
    ///
    /// # Errors
    /// Whatever `init` returns; the slot stays empty afterwards.
    pub async fn get_or_try_init<T, F, Fut>(&self, key: &str, init: F) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        let slot = self.slot::<T>(key)?;
        let instance = slot
            .cell
            .get_or_try_init(|| {
                slot.attempts.fetch_add(1, Ordering::SeqCst);
                tracing::info!(model = key, "constructing model instance");
                init()
            })
            .await
            .map_err(|e| {
                tracing::warn!(model = key, error = %e, "model construction failed");
                e
            })?;
        Ok(Arc::clone(instance))
    }

    /// Whether `key` holds a constructed instance
    #[must_use]
    pub fn is_loaded(&self, key: &str) -> bool {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(key).map(|slot| slot.is_loaded()))
            .unwrap_or(false)
    }

    /// Number of construction attempts for `key`, successful or not
    #[must_use]
    pub fn construction_count(&self, key: &str) -> usize {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(key).map(|slot| slot.attempts()))
            .unwrap_or(0)
    }

    /// Keys that currently hold a constructed instance
    #[must_use]
    pub fn loaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .slots
            .lock()
            .map(|slots| {
                slots
                    .iter()
                    .filter(|(_, slot)| slot.is_loaded())
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    #[derive(Debug)]
    struct Model(&'static str);

    impl Named for Model {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test]
    async fn test_constructs_once_and_shares() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_loaded("sd"));

        let first: Arc<dyn Named> = registry
            .get_or_try_init("sd", || async { Ok(Arc::new(Model("sd")) as Arc<dyn Named>) })
            .await
            .unwrap();
        let second: Arc<dyn Named> = registry
            .get_or_try_init("sd", || async { Ok(Arc::new(Model("other")) as Arc<dyn Named>) })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.name(), "sd");
        assert_eq!(registry.construction_count("sd"), 1);
        assert!(registry.is_loaded("sd"));
        assert_eq!(registry.loaded_keys(), ["sd"]);
    }

    #[tokio::test]
    async fn test_failed_construction_can_retry() {
        let registry = ModelRegistry::new();
        let err = registry
            .get_or_try_init::<Model, _, _>("esrgan", || async {
                Err(BannerError::resource_unavailable("weights missing"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
        assert!(!registry.is_loaded("esrgan"));

        let model = registry
            .get_or_try_init("esrgan", || async { Ok(Arc::new(Model("esrgan"))) })
            .await
            .unwrap();
        assert_eq!(model.name(), "esrgan");
        assert_eq!(registry.construction_count("esrgan"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_construct_once() {
        let registry = Arc::new(ModelRegistry::new());
        let started = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let started = Arc::clone(&started);
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_try_init("sdxl", || async move {
                        assert!(!started.swap(true, Ordering::SeqCst), "double construction");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new(Model("sdxl")))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().name(), "sdxl");
        }
        assert_eq!(registry.construction_count("sdxl"), 1);
    }

    #[tokio::test]
    async fn test_key_type_mismatch_is_internal() {
        let registry = ModelRegistry::new();
        registry
            .get_or_try_init("k", || async { Ok(Arc::new(Model("k"))) })
            .await
            .unwrap();
        let err = registry
            .get_or_try_init("k", || async { Ok(Arc::new(7_u32)) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
