use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use receipts_events::Subscription;

/// Handle to control and join a background worker.
///
/// Dropping the handle stops the worker as well.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generic signal-consuming worker loop.
///
/// - Owns one bus subscription
/// - Runs the handler for each message, in publish order
/// - Polls for shutdown every `poll_interval`
#[derive(Debug)]
pub struct SignalWorker;

impl SignalWorker {
    /// Spawn a named worker thread that feeds messages from `sub` to `handler`.
    ///
    /// The handler is dropped when the loop ends (shutdown requested or bus gone),
    /// so state it owns can observe the worker stopping.
    pub fn spawn<M, H, E>(
        name: &str,
        sub: Subscription<M>,
        poll_interval: Duration,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: Send + 'static,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let worker_name = name.to_string();

        let join = thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || {
                worker_loop(&worker_name, sub, shutdown_rx, poll_interval, &mut handler);
                debug!(worker = %worker_name, "worker stopped");
            })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tick: Duration,
    handler: &mut H,
) where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
