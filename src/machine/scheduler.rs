//! Single-consumer work queues backed by one dedicated worker thread.

use crate::core::{panic_message, MachineError, Result};
use crossbeam::channel::{self, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serializes jobs onto one long-lived worker.
///
/// Enqueueing never blocks. Jobs run in submission order; a panicking job
/// is logged and the worker moves on. Dropping the scheduler lets queued
/// jobs finish and joins the worker.
pub struct Scheduler {
    name: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl Scheduler {
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded::<Job>();
        let label = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                        tracing::warn!(
                            scheduler = %label,
                            panic = %panic_message(payload.as_ref()),
                            "scheduled job panicked"
                        );
                    }
                }
                tracing::debug!(scheduler = %label, "scheduler worker stopped");
            })
            .map_err(|e| MachineError::SchedulerUnavailable(format!("{name}: {e}")))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            name,
            sender: Some(sender),
            worker: Some(worker),
            worker_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job. Returns `false` if the worker has shut down.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Block until every job queued before this call has run.
    ///
    /// Returns immediately when called from the worker itself.
    pub fn flush(&self) {
        if self.is_worker_thread() {
            return;
        }
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        if self.enqueue(move || {
            let _ = done_tx.send(());
        }) {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if self.is_worker_thread() {
                return;
            }
            if worker.join().is_err() {
                tracing::warn!(scheduler = %self.name, "scheduler worker exited abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn jobs_run_in_submission_order() {
        let scheduler = Scheduler::spawn("order-test").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = Arc::clone(&seen);
            assert!(scheduler.enqueue(move || seen.lock().unwrap().push(i)));
        }

        scheduler.flush();
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn jobs_run_on_the_worker_thread() {
        let scheduler = Arc::new(Scheduler::spawn("thread-test").unwrap());
        let observed = Arc::new(Mutex::new(None));
        let (handle, slot) = (Arc::clone(&scheduler), Arc::clone(&observed));
        scheduler.enqueue(move || {
            *slot.lock().unwrap() = Some(handle.is_worker_thread());
        });

        scheduler.flush();
        assert_eq!(*observed.lock().unwrap(), Some(true));
        assert!(!scheduler.is_worker_thread());
    }

    #[test]
    fn panicking_job_does_not_stop_worker() {
        let scheduler = Scheduler::spawn("panic-test").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.enqueue(|| panic!("job failed"));
        let counter = Arc::clone(&count);
        scheduler.enqueue(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_drains_queued_jobs() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = Scheduler::spawn("drain-test").unwrap();
            for _ in 0..5 {
                let counter = Arc::clone(&count);
                scheduler.enqueue(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}
