use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::WorkerHandle;

/// Runs a task every `interval` on its own thread until shut down.
///
/// Used for closing overdue contribution cycles. The first run happens one interval after
/// spawning. A failed run is logged and the schedule continues.
#[derive(Debug)]
pub struct SweepWorker;

impl SweepWorker {
    pub fn spawn<T, E>(name: &'static str, interval: Duration, mut task: T) -> io::Result<WorkerHandle>
    where
        T: FnMut() -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        debug!(worker = name, "sweep tick");
                        if let Err(err) = task() {
                            warn!(worker = name, error = ?err, "sweep run failed");
                        }
                    }
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn runs_periodically_until_shutdown() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let handle = SweepWorker::spawn("test-sweep", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ()>(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(120));
        handle.shutdown();
        let after_shutdown = runs.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2, "ran {after_shutdown} times");

        thread::sleep(Duration::from_millis(40));
        assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
    }

    #[test]
    fn failures_do_not_stop_the_schedule() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let handle = SweepWorker::spawn("failing-sweep", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("store unavailable")
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        handle.shutdown();
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
