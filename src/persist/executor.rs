//! Bounded worker pool used by every persistence phase.
//!
//! Tasks go through a `crossbeam-channel` bounded queue, so `submit` blocks
//! once `capacity` tasks are waiting. Workers check the shared abort latch
//! before starting each task: once it trips, queued tasks are dropped and
//! only tasks already running finish.

use crate::error::Result;
use crate::model::ImportResults;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub struct BoundedExecutor {
    name: String,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    discard: Arc<AtomicBool>,
    started: Arc<AtomicUsize>,
    results: Arc<ImportResults>,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn worker_loop(
    name: &str,
    receiver: &Receiver<Task>,
    discard: &AtomicBool,
    started: &AtomicUsize,
    results: &ImportResults,
) {
    for task in receiver {
        if discard.load(Ordering::SeqCst) || results.abort_import() {
            continue;
        }
        started.fetch_add(1, Ordering::Relaxed);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            results.add_error(format!(
                "{name}: task panicked: {}",
                panic_message(payload.as_ref())
            ));
        }
    }
}

impl BoundedExecutor {
    /// Start `workers` threads named `ProjectImport: <name>-<n>`.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(
        name: &str,
        workers: usize,
        capacity: usize,
        results: Arc<ImportResults>,
    ) -> Result<Self> {
        let (sender, receiver) = bounded::<Task>(capacity.max(1));
        let discard = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicUsize::new(0));
        let mut executor = Self {
            name: format!("ProjectImport: {name}"),
            sender: Some(sender),
            workers: Vec::with_capacity(workers.max(1)),
            discard,
            started,
            results,
        };

        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let discard = Arc::clone(&executor.discard);
            let started = Arc::clone(&executor.started);
            let results = Arc::clone(&executor.results);
            let thread_name = format!("{}-{index}", executor.name);
            let label = executor.name.clone();
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker_loop(&label, &receiver, &discard, &started, &results))?;
            executor.workers.push(handle);
        }
        tracing::debug!(executor = %executor.name, workers = executor.workers.len(), capacity, "Executor started");
        Ok(executor)
    }

    /// Queue a task, blocking while the queue is full.
    ///
    /// Returns `false` without queueing once the import has been aborted.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.results.abort_import() {
            return false;
        }
        self.sender
            .as_ref()
            .is_some_and(|sender| sender.send(Box::new(task)).is_ok())
    }

    /// Tasks that workers have started so far.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    /// Let workers drain the queue, then join them.
    pub fn shutdown_and_wait(mut self) {
        self.close(false);
    }

    /// Drop queued tasks, let running ones finish, then join.
    pub fn shutdown_and_ignore_queue(mut self) {
        self.close(true);
    }

    /// Shut down according to the abort latch. Returns `true` if aborted.
    pub fn shutdown(self) -> bool {
        let aborted = self.results.abort_import();
        if aborted {
            self.shutdown_and_ignore_queue();
        } else {
            self.shutdown_and_wait();
        }
        aborted
    }

    fn close(&mut self, discard: bool) {
        if discard {
            self.discard.store(true, Ordering::SeqCst);
        }
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(executor = %self.name, "Worker thread panicked");
            }
        }
        tracing::debug!(executor = %self.name, started = self.started(), discard, "Executor stopped");
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.close(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn drains_every_task_on_wait() {
        let results = Arc::new(ImportResults::new(10));
        let executor = BoundedExecutor::new("Test", 4, 2, Arc::clone(&results)).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let done = Arc::clone(&done);
            assert!(executor.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        executor.shutdown_and_wait();
        assert_eq!(done.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn no_task_starts_after_abort() {
        let results = Arc::new(ImportResults::new(2));
        let executor = BoundedExecutor::new("Test", 1, 1, Arc::clone(&results)).unwrap();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mut submitted = 0;
        for index in 0..50 {
            let ran = Arc::clone(&ran);
            let task_results = Arc::clone(&results);
            let accepted = executor.submit(move || {
                ran.lock().unwrap().push(index);
                task_results.add_error(format!("task {index} failed"));
            });
            if !accepted {
                break;
            }
            submitted += 1;
        }
        assert!(executor.shutdown());
        assert_eq!(*ran.lock().unwrap(), vec![0, 1]);
        assert_eq!(results.error_count(), 2);
        assert!(submitted <= 4);
    }

    #[test]
    fn panicking_task_becomes_soft_error() {
        let results = Arc::new(ImportResults::new(10));
        let executor = BoundedExecutor::new("Test", 2, 2, Arc::clone(&results)).unwrap();
        assert!(executor.submit(|| panic!("boom")));
        executor.shutdown_and_wait();
        assert_eq!(results.error_count(), 1);
        assert!(results.errors()[0].contains("boom"));
    }
}
