//! Bounded fire-and-forget task runner for success-path cache writes.
//!
//! Writes are detached onto the current tokio runtime. A semaphore caps how
//! many may be in flight; once the cap is reached further writes are dropped
//! (and counted) instead of queueing, so a slow cache can never pile up
//! unbounded work. Failures inside a write are the write's own business and
//! are never reported back.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

const MAX_CAPACITY: usize = 1 << 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub dispatched: u64,
    pub dropped: u64,
}

pub struct BackgroundWriter {
    permits: Arc<Semaphore>,
    capacity: usize,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

impl BackgroundWriter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Detach `task`. Returns `false` when it was dropped, either because the
    /// writer is saturated or because there is no runtime to run it on.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("affinity write dropped: no tokio runtime");
                return false;
            }
        };
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(capacity = self.capacity, "affinity write dropped: writer saturated");
                return false;
            }
        };
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        handle.spawn(async move {
            task.await;
            drop(permit);
        });
        true
    }

    /// Wait until every write dispatched so far has finished.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.permits.acquire_many(self.capacity as u32).await {
            drop(all);
        }
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_spawn_runs_task() {
        let writer = BackgroundWriter::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = counter.clone();
            assert!(writer.spawn(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        writer.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(writer.stats().dispatched, 3);
        assert_eq!(writer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_saturated_writer_drops() {
        let writer = BackgroundWriter::new(1);
        let (tx, rx) = oneshot::channel::<()>();
        assert!(writer.spawn(async move {
            let _ = rx.await;
        }));
        assert!(!writer.spawn(async {}));
        assert_eq!(writer.stats().dropped, 1);

        tx.send(()).unwrap();
        writer.wait_idle().await;
        assert!(writer.spawn(async {}));
        writer.wait_idle().await;
        assert_eq!(writer.stats().dispatched, 2);
    }

    #[test]
    fn test_no_runtime_drops() {
        let writer = BackgroundWriter::new(2);
        assert!(!writer.spawn(async {}));
        assert_eq!(writer.stats().dropped, 1);
    }
}
