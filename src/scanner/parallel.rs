use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use flume::RecvTimeoutError;
use tokio_util::sync::CancellationToken;

use crate::{
    cell::Cell,
    cursor::{Cursor, CursorError},
    error::ScanError,
    executor::{ExecutorError, SeekExecutor},
    observability::log_warn,
};

const BARRIER_POLL: Duration = Duration::from_millis(10);

/// Owns a cursor while it travels to a worker and back; a cursor dropped on
/// the way is closed.
struct InFlight(Option<Box<dyn Cursor>>);

impl InFlight {
    fn into_cursor(mut self) -> Option<Box<dyn Cursor>> {
        self.0.take()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.0.take() {
            cursor.close();
        }
    }
}

type Outcome = (InFlight, Result<bool, CursorError>);

/// Fans seeks of segment cursors out to an executor and waits on the results.
pub(crate) struct ParallelSeeker {
    executor: Arc<dyn SeekExecutor>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ParallelSeeker {
    pub(crate) fn new(
        executor: Arc<dyn SeekExecutor>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            timeout,
            cancel,
        }
    }

    /// Seek every cursor to `key`. File cursors are seeked on the executor,
    /// the rest inline. On failure every cursor is closed and the first seek
    /// error is returned.
    pub(crate) fn seek_all(
        &self,
        cursors: Vec<Box<dyn Cursor>>,
        key: &Cell,
    ) -> Result<Vec<Box<dyn Cursor>>, ScanError> {
        let mut ready = Vec::with_capacity(cursors.len());
        let (done_tx, done_rx) = flume::unbounded::<Outcome>();
        let mut pending = 0usize;
        let mut failure: Option<ScanError> = None;

        let mut cursors = cursors.into_iter();
        for mut cursor in cursors.by_ref() {
            if !cursor.is_file_cursor() {
                if let Err(err) = cursor.seek(key) {
                    cursor.close();
                    failure = Some(err.into());
                    break;
                }
                ready.push(cursor);
                continue;
            }
            let job = InFlight(Some(cursor));
            let key = key.clone();
            let done = done_tx.clone();
            let spawned = self.executor.spawn(Box::new(move || {
                let mut job = job;
                let result = match job.0.as_mut() {
                    Some(cursor) => cursor.seek(&key),
                    None => Ok(false),
                };
                // A closed barrier hands the job back; dropping it closes the cursor.
                let _ = done.send((job, result));
            }));
            if let Err(err) = spawned {
                failure = Some(err.into());
                break;
            }
            pending += 1;
        }
        for mut cursor in cursors {
            cursor.close();
        }
        drop(done_tx);

        let deadline = Instant::now() + self.timeout;
        while failure.is_none() && pending > 0 {
            if self.cancel.is_cancelled() {
                failure = Some(ScanError::Interrupted);
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                failure = Some(ScanError::SeekTimeout(self.timeout));
                break;
            }
            match done_rx.recv_timeout((deadline - now).min(BARRIER_POLL)) {
                Ok((job, Ok(_))) => {
                    pending -= 1;
                    ready.extend(job.into_cursor());
                }
                Ok((_job, Err(source))) => {
                    pending -= 1;
                    log_warn!(
                        component = "scanner",
                        event = "parallel_seek_failed",
                        key = ?key,
                        error = %source,
                    );
                    failure = Some(ScanError::ParallelSeek { source });
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    failure = Some(ExecutorError::WorkerLost.into());
                }
            }
        }

        match failure {
            None => Ok(ready),
            Some(err) => {
                for mut cursor in ready {
                    cursor.close();
                }
                // Results already delivered close their cursors as they drop.
                drop(done_rx);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        cursor::Segment,
        executor::{Task, ThreadPoolExecutor},
    };

    struct FailingCursor {
        closes: Arc<AtomicUsize>,
    }

    impl Cursor for FailingCursor {
        fn peek(&self) -> Option<&Cell> {
            None
        }

        fn next(&mut self) -> Result<Option<Cell>, CursorError> {
            Ok(None)
        }

        fn seek(&mut self, _key: &Cell) -> Result<bool, CursorError> {
            Err(CursorError::Io(std::io::Error::other("disk gone")))
        }

        fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError> {
            self.seek(key)
        }

        fn sequence_id(&self) -> u64 {
            0
        }

        fn is_file_cursor(&self) -> bool {
            true
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    // Accepts tasks and never runs them.
    struct Black;

    impl SeekExecutor for Black {
        fn spawn(&self, task: Task) -> Result<(), ExecutorError> {
            std::mem::forget(task);
            Ok(())
        }
    }

    fn segments(n: u64) -> Vec<Box<dyn Cursor>> {
        (0..n)
            .map(|i| {
                let segment = Arc::new(Segment::from_cells(
                    i,
                    [Cell::put(format!("row{i}"), "cf", "q", 1, "v")],
                ));
                Box::new(segment.cursor()) as Box<dyn Cursor>
            })
            .collect()
    }

    #[test]
    fn seeks_every_cursor() {
        let pool: Arc<dyn SeekExecutor> = Arc::new(ThreadPoolExecutor::new(2).expect("pool"));
        let seeker = ParallelSeeker::new(pool, Duration::from_secs(5), CancellationToken::new());
        let cursors = seeker
            .seek_all(segments(4), &Cell::first_on_row("row2"))
            .expect("seek");
        assert_eq!(cursors.len(), 4);
        let positioned = cursors.iter().filter(|c| c.peek().is_some()).count();
        assert_eq!(positioned, 2);
    }

    #[test]
    fn first_failure_is_reported_and_cursors_closed() {
        let closes = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(ThreadPoolExecutor::new(2).expect("pool"));
        let seeker = ParallelSeeker::new(
            Arc::clone(&pool) as Arc<dyn SeekExecutor>,
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let mut cursors = segments(2);
        cursors.push(Box::new(FailingCursor {
            closes: Arc::clone(&closes),
        }));
        let err = seeker
            .seek_all(cursors, &Cell::first_on_row(""))
            .err()
            .expect("seek fails");
        assert!(matches!(err, ScanError::ParallelSeek { .. }), "{err}");
        drop(seeker);
        drop(pool);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_interrupts_the_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let seeker = ParallelSeeker::new(Arc::new(Black), Duration::from_secs(5), cancel);
        let err = seeker
            .seek_all(segments(2), &Cell::first_on_row(""))
            .err()
            .expect("interrupted");
        assert!(matches!(err, ScanError::Interrupted));
    }

    #[test]
    fn bounded_wait_times_out() {
        let seeker = ParallelSeeker::new(
            Arc::new(Black),
            Duration::from_millis(30),
            CancellationToken::new(),
        );
        let err = seeker
            .seek_all(segments(2), &Cell::first_on_row(""))
            .err()
            .expect("timed out");
        assert!(matches!(err, ScanError::SeekTimeout(_)));
    }

    #[test]
    fn dropped_tasks_surface_as_lost_workers() {
        struct Dropping;
        impl SeekExecutor for Dropping {
            fn spawn(&self, task: Task) -> Result<(), ExecutorError> {
                drop(task);
                Ok(())
            }
        }
        let seeker =
            ParallelSeeker::new(Arc::new(Dropping), Duration::from_secs(5), CancellationToken::new());
        let err = seeker
            .seek_all(segments(2), &Cell::first_on_row(""))
            .err()
            .expect("lost");
        assert!(matches!(err, ScanError::Executor(ExecutorError::WorkerLost)));
    }
}
