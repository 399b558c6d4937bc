//! Where asynchronous loads and handshakes run.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// A unit of background work. Results travel back over a channel the task
/// captured; the spawner never sees them.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// Runs every task on its own named thread.
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    name: String,
}

impl ThreadSpawner {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new("gardensonic-task")
    }
}

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, task: Task) {
        if let Err(e) = thread::Builder::new().name(self.name.clone()).spawn(task) {
            log::error!("Failed to spawn {} thread: {}", self.name, e);
        }
    }
}

/// Queues tasks until the owner runs them, which makes completion order
/// fully controllable. Clones share the queue.
#[derive(Clone, Default)]
pub struct ManualSpawner {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl ManualSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Runs the oldest queued task. Returns false when the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = self.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks, including ones spawned while running, until the
    /// queue is empty. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskSpawner for ManualSpawner {
    fn spawn(&self, task: Task) {
        self.lock().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_manual_spawner_defers_until_run() {
        let spawner = ManualSpawner::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            spawner.spawn(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(spawner.pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(spawner.run_next());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(spawner.run_all(), 2);
        assert!(!spawner.run_next());
    }

    #[test]
    fn test_thread_spawner_runs_task() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        ThreadSpawner::default().spawn(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(
            rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(),
            42
        );
    }
}
