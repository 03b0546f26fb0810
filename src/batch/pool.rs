//! Bounded fan-out over a [`JoinSet`].
//!
//! Each unit runs on its own tokio task once it holds a semaphore permit, so
//! at most `max_workers` units execute at a time. A unit is spawned inside a
//! keyed wrapper task; a panic in the unit surfaces as a [`TaskError`] next to
//! its key instead of losing track of which input failed.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::error;

/// Reasons a pooled unit produced no value.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TaskError {
    /// The unit panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
    /// The unit was cancelled before it completed.
    #[error("worker cancelled")]
    Cancelled,
}

impl From<JoinError> for TaskError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic()))
        } else {
            Self::Cancelled
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| String::from("unknown panic payload"), |message| (*message).to_owned()),
    }
}

/// Output of one pooled unit, tagged with the key it was spawned under.
pub type Tagged<K, T> = (K, Result<T, TaskError>);

/// Worker pool running keyed units with bounded parallelism.
#[derive(Debug)]
pub struct WorkerPool<K, T> {
    semaphore: Arc<Semaphore>,
    set: JoinSet<Tagged<K, T>>,
}

impl<K, T> WorkerPool<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    /// Creates a pool running at most `max_workers` units at once. A width of
    /// zero is treated as one.
    #[must_use]
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            set: JoinSet::new(),
        }
    }

    /// Queues `work` under `key`. The unit starts once a permit is free and
    /// keeps the permit until it finishes.
    pub fn spawn<F>(&mut self, key: K, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.set.spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return (key, Err(TaskError::Cancelled));
            };
            let outcome = tokio::spawn(work).await.map_err(TaskError::from);
            drop(permit);
            (key, outcome)
        });
    }

    /// Waits for the next unit to finish, in completion order. Returns `None`
    /// once every queued unit has been collected.
    pub async fn join_next(&mut self) -> Option<Tagged<K, T>> {
        loop {
            match self.set.join_next().await? {
                Ok(tagged) => return Some(tagged),
                Err(err) => error!(error = %err, "worker wrapper task failed"),
            }
        }
    }

    /// Waits for every unit and returns the outputs in completion order.
    pub async fn join_all(mut self) -> Vec<Tagged<K, T>> {
        let mut outputs = Vec::with_capacity(self.set.len());
        while let Some(tagged) = self.join_next().await {
            outputs.push(tagged);
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_worker_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let limit = 3;
        let mut pool = WorkerPool::new(limit);

        for index in 0..limit * 5 {
            let running = Arc::clone(&running);
            pool.spawn(index, async move {
                let watermark = running.fetch_add(1, Ordering::SeqCst) + 1;
                let jitter = u64::try_from(index % 4).expect("small index");
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                watermark
            });
        }

        let outputs = pool.join_all().await;
        assert_eq!(outputs.len(), limit * 5);
        for (index, watermark) in outputs {
            let watermark = watermark.expect("unit should complete");
            assert!(
                watermark <= limit,
                "unit {index} observed {watermark} concurrent units"
            );
        }
    }

    #[tokio::test]
    async fn panicking_unit_keeps_its_key() {
        let mut pool: WorkerPool<&'static str, u32> = WorkerPool::new(2);
        pool.spawn("ok", async { 7 });
        pool.spawn("boom", async {
            let explode = true;
            assert!(!explode, "unit exploded");
            0
        });

        let mut outputs = pool.join_all().await;
        outputs.sort_by_key(|(key, _)| *key);
        assert_eq!(
            outputs,
            vec![
                ("boom", Err(TaskError::Panicked(String::from("unit exploded")))),
                ("ok", Ok(7)),
            ]
        );
    }

    #[test]
    fn zero_width_pool_still_runs() {
        let pool: WorkerPool<u8, u8> = WorkerPool::new(0);
        assert_eq!(pool.semaphore.available_permits(), 1);
    }
}
