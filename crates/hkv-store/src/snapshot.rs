//! Background thread that periodically persists the index.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreResult;

/// Handle to a running snapshot thread.
///
/// The thread runs `task` once per `interval` until [`stop`](Self::stop) is
/// called or the handle is dropped.
pub(crate) struct SnapshotWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl SnapshotWorker {
    pub(crate) fn spawn<F>(name: &str, interval: Duration, task: F) -> StoreResult<Self>
    where
        F: Fn() -> StoreResult<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = format!("hkv-snapshot-{name}");

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut run_id = 0u64;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            run_id += 1;
                            if let Err(e) = task() {
                                warn!(worker = %thread_name, run_id, error = %e, "periodic index save failed");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!(worker = %thread_name, runs = run_id, "snapshot worker stopping");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { stop_tx, handle })
    }

    /// Signal the thread and wait for it to exit.
    ///
    /// A save that is already running completes first.
    pub(crate) fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("snapshot worker panicked");
        }
    }
}
