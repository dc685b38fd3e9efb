//! A fixed-size worker pool for per-bundle work units.
//!
//! Both pipelines keep a FIFO sliding window of submitted tasks sized to
//! the pool, so the pool stays saturated without unbounded memory growth
//! and results are consumed strictly in submission order.

use crate::error::Error;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::trace;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of worker threads consuming submitted jobs.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Pool sized to the available hardware parallelism plus a small
    /// constant, keeping the pipeline busy while some workers block.
    pub fn with_default_size() -> Self {
        Self::new(num_cpus::get() + 2)
    }

    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..num_workers)
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::Builder::new()
                    .name(format!("nestcol-worker-{index}"))
                    .spawn(move || {
                        for job in receiver.iter() {
                            job();
                        }
                        trace!("worker {index} shutting down");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submits `job` and returns a handle to its eventual result.
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_sender, result_receiver) = bounded(1);
        let wrapped: Job = Box::new(move || {
            // The handle may have been dropped; the result is discarded.
            let _ = result_sender.send(job());
        });
        let submitted = self
            .sender
            .as_ref()
            .map(|sender| sender.send(wrapped).is_ok())
            .unwrap_or(false);
        TaskHandle {
            receiver: result_receiver,
            submitted,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the job channel lets every worker drain and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// The pending result of a submitted job, delivered over a single-slot
/// channel. Joining blocks until the worker finishes.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
    submitted: bool,
}

impl<T> TaskHandle<T> {
    /// Waits for the job's result. Fails if the job was never accepted or
    /// its worker died before delivering.
    pub fn join(self) -> Result<T, Error> {
        if !self.submitted {
            return Err(Error::Pipeline("worker pool is shut down".to_string()));
        }
        self.receiver
            .recv()
            .map_err(|_| Error::Pipeline("worker exited before delivering a result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_and_join() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| 2 + 2);

        assert_eq!(handle.join().unwrap(), 4);
    }

    #[test]
    fn test_results_arrive_in_submission_order() {
        let pool = WorkerPool::new(4);
        let handles = (0..32)
            .map(|i| pool.submit(move || i))
            .collect::<Vec<_>>();

        let results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_pool_drains_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                let handle = pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                drop(handle);
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
