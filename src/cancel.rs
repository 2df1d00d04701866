use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// Cooperative stop request shared between the sample loop and the signal bridge.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block until cancelled or `timeout` elapses. Returns whether cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Route SIGINT, SIGTERM and SIGHUP to `token.cancel()`.
///
/// The handlers are registered before this returns; the signals are then
/// awaited on a dedicated thread, which does nothing but flip the token.
pub fn install_signal_bridge(token: CancellationToken) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (mut interrupt, mut terminate, mut hangup) = {
        let _guard = runtime.enter();
        (
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    thread::Builder::new()
        .name("signal-bridge".into())
        .spawn(move || {
            runtime.block_on(async {
                tokio::select! {
                    _ = interrupt.recv() => debug!("SIGINT received"),
                    _ = terminate.recv() => debug!("SIGTERM received"),
                    _ = hangup.recv() => debug!("SIGHUP received"),
                }
            });
            token.cancel();
        })?;
    Ok(())
}
