use std::{fmt, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::executor::SeekExecutor;

/// Knobs of a [`StoreScanner`](crate::scanner::StoreScanner).
#[derive(Clone)]
pub struct ScannerOptions {
    pub(crate) parallel_seek: bool,
    pub(crate) lazy_seek: bool,
    pub(crate) parallel_seek_timeout: Duration,
    pub(crate) seek_workers: usize,
    pub(crate) executor: Option<Arc<dyn SeekExecutor>>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) now_ms: Option<i64>,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        ScannerOptions {
            parallel_seek: false,
            lazy_seek: true,
            parallel_seek_timeout: Duration::from_secs(60),
            seek_workers: 4,
            executor: None,
            cancellation: CancellationToken::new(),
            now_ms: None,
        }
    }
}

impl ScannerOptions {
    /// Seek segment cursors concurrently when more than one segment backs the scan.
    pub fn parallel_seek(self, parallel_seek: bool) -> Self {
        ScannerOptions {
            parallel_seek,
            ..self
        }
    }

    /// Defer positioning of segment cursors for explicit-column scans.
    pub fn lazy_seek(self, lazy_seek: bool) -> Self {
        ScannerOptions { lazy_seek, ..self }
    }

    /// Bounded wait on the parallel seek barrier.
    pub fn parallel_seek_timeout(self, parallel_seek_timeout: Duration) -> Self {
        ScannerOptions {
            parallel_seek_timeout,
            ..self
        }
    }

    /// Size of the thread pool started when no executor is supplied.
    pub fn seek_workers(self, seek_workers: usize) -> Self {
        ScannerOptions {
            seek_workers,
            ..self
        }
    }

    /// Run parallel seeks on `executor` instead of a private pool.
    pub fn executor(self, executor: Arc<dyn SeekExecutor>) -> Self {
        ScannerOptions {
            executor: Some(executor),
            ..self
        }
    }

    /// Token whose cancellation interrupts a parallel seek wait.
    pub fn cancellation(self, cancellation: CancellationToken) -> Self {
        ScannerOptions {
            cancellation,
            ..self
        }
    }

    /// Fix the clock used for TTL and purge decisions, in epoch milliseconds.
    pub fn now_ms(self, now_ms: i64) -> Self {
        ScannerOptions {
            now_ms: Some(now_ms),
            ..self
        }
    }

    pub(crate) fn current_time_ms(&self) -> i64 {
        self.now_ms.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
                .unwrap_or(0)
        })
    }
}

impl fmt::Debug for ScannerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerOptions")
            .field("parallel_seek", &self.parallel_seek)
            .field("lazy_seek", &self.lazy_seek)
            .field("parallel_seek_timeout", &self.parallel_seek_timeout)
            .field("seek_workers", &self.seek_workers)
            .field("executor", &self.executor.is_some())
            .field("now_ms", &self.now_ms)
            .finish()
    }
}
