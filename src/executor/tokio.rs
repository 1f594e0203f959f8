use tokio::runtime::Handle;

use super::{ExecutorError, SeekExecutor, Task};

/// Runs seek tasks on a tokio runtime's blocking pool.
pub struct TokioSeekExecutor {
    handle: Handle,
}

impl TokioSeekExecutor {
    /// Executor bound to `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl SeekExecutor for TokioSeekExecutor {
    fn spawn(&self, task: Task) -> Result<(), ExecutorError> {
        // The join handle is dropped; completion is reported by the task itself.
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
