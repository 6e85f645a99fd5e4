use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use ajo_events::{EventBus, Subscription};

use super::WorkerHandle;

/// Generic projection worker loop.
///
/// - Subscribes to an event bus
/// - Applies an idempotent handler for each message
/// - Supports graceful shutdown: messages already queued are delivered before exit
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes messages from a fresh bus subscription.
    ///
    /// `handler` must tolerate redelivery.
    pub fn spawn<M, B, H, E>(name: &'static str, bus: &B, mut handler: H) -> io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &mut handler))?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn worker_loop<M, H, E>(name: &'static str, sub: Subscription<M>, shutdown_rx: mpsc::Receiver<()>, handler: &mut H)
where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            // Messages published before shutdown was requested are still delivered.
            while let Ok(msg) = sub.try_recv() {
                deliver(name, handler, msg);
            }
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => deliver(name, handler, msg),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn deliver<M, H, E>(name: &'static str, handler: &mut H, msg: M)
where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    if let Err(err) = handler(msg) {
        warn!(worker = name, error = ?err, "projection worker handler failed");
    }
}
