//! Worker pools the parallel seek fans out to.

/// Executor backed by a tokio runtime.
#[cfg(feature = "tokio")]
pub mod tokio;

use std::{io, thread};

use thiserror::Error;

/// Boxed unit of work handed to a [`SeekExecutor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Failure to run a task on an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor no longer accepts work.
    #[error("seek executor is shut down")]
    Shutdown,
    /// A task was dispatched but its completion never arrived.
    #[error("seek worker exited before reporting")]
    WorkerLost,
    /// The worker threads could not be started.
    #[error("failed to start seek workers: {0}")]
    Start(#[source] io::Error),
}

/// Runs blocking seek tasks off the calling thread.
pub trait SeekExecutor: Send + Sync {
    /// Queue `task`; it may start at any later point.
    fn spawn(&self, task: Task) -> Result<(), ExecutorError>;
}

/// Fixed-size pool of named OS threads fed by one shared queue.
pub struct ThreadPoolExecutor {
    sender: Option<flume::Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Start `workers` threads (at least one).
    pub fn new(workers: usize) -> io::Result<Self> {
        let (sender, receiver) = flume::unbounded::<Task>();
        let workers = (0..workers.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("cellstore-seek-{index}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl SeekExecutor for ThreadPoolExecutor {
    fn spawn(&self, task: Task) -> Result<(), ExecutorError> {
        self.sender
            .as_ref()
            .ok_or(ExecutorError::Shutdown)?
            .send(task)
            .map_err(|_| ExecutorError::Shutdown)
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Closing the queue lets every worker drain and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
