// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The bounded, per-key FIFO task executor: work submitted under
//! the same key always runs on the same worker thread, in submission order,
//! so that requests on one connection never execute out of order relative to
//! one another while still fanning out across connections.

use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use log::*;

use crate::error::ExecutorError;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed pool of worker threads, each backed by its own bounded queue.
/// `enqueue` routes a task to `key % worker_count`'s queue, so two tasks
/// submitted under the same key always land on the same worker and keep
/// their relative order.
pub struct Executor {
    senders: Vec<SyncSender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl Executor {
    /// `worker_count` dedicated threads, each with a queue that holds at
    /// most `queue_capacity` pending tasks before `enqueue` starts returning
    /// [`ExecutorError::QueueFull`].
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        assert!(worker_count > 0, "executor needs at least one worker");

        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let (tx, rx) = sync_channel::<Task>(queue_capacity);
            let handle = thread::Builder::new()
                .name(format!("rpc-task-{idx}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        task();
                    }
                })
                .expect("failed to spawn task executor thread");
            senders.push(tx);
            workers.push(handle);
        }

        Self { senders, workers }
    }

    /// Submits `task` to run on the worker owning `key`. Non-blocking: a full
    /// queue is reported rather than waited on, so a slow connection can't
    /// stall the reactor thread that called `enqueue`.
    pub fn enqueue(
        &self,
        key: u64,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), ExecutorError> {
        let idx = (key as usize) % self.senders.len();
        self.senders[idx]
            .try_send(Box::new(task))
            .map_err(|e| match e {
                TrySendError::Full(_) => ExecutorError::QueueFull,
                TrySendError::Disconnected(_) => ExecutorError::Closed,
            })
    }

    /// Stops accepting new work and waits for every worker to drain its
    /// queue and exit. Tasks already enqueued still run; nothing is dropped.
    pub fn shutdown(self) {
        info!("shutting down task executor, draining {} queues", self.senders.len());
        drop(self.senders);
        for worker in self.workers {
            if worker.join().is_err() {
                error!("a task executor thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn tasks_sharing_a_key_run_in_submission_order() {
        let executor = Executor::new(4, 8);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            executor.enqueue(42, move || order.lock().unwrap().push(i)).unwrap();
        }

        executor.shutdown();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn different_keys_can_run_concurrently() {
        let executor = Executor::new(4, 8);
        let (tx, rx) = mpsc::channel();

        for key in 0..4u64 {
            let tx = tx.clone();
            executor.enqueue(key, move || tx.send(key).unwrap()).unwrap();
        }
        drop(tx);

        let mut seen: Vec<u64> = rx.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        executor.shutdown();
    }

    #[test]
    fn full_queue_is_reported_rather_than_blocking() {
        let executor = Executor::new(1, 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Occupies the single worker thread until released.
        executor.enqueue(0, move || release_rx.recv().unwrap()).unwrap();
        thread::sleep(Duration::from_millis(50));

        // Fills the one-slot queue behind the busy worker.
        executor.enqueue(0, || {}).unwrap();

        // The queue is now full; a third task must be rejected, not blocked on.
        let err = executor.enqueue(0, || {}).unwrap_err();
        assert_eq!(err, ExecutorError::QueueFull);

        release_tx.send(()).unwrap();
        executor.shutdown();
    }
}
