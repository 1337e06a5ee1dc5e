//! Shutdown Coordination
//!
//! Long-running commands (`consume`, `demo`) run inside
//! [`ShutdownCoordinator::guard`] and select on the shutdown receiver so the
//! queue can be closed before the process exits. A second signal forces an
//! immediate exit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Exit status used when a second signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Coordinates graceful shutdown across the application
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let coordinator = Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, shutdown_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Run `future_fn` with signal handlers installed
    ///
    /// The closure receives the coordinator, so it can trigger shutdown
    /// itself (e.g. when the broker gives up), and a receiver that fires on
    /// the first SIGINT/SIGTERM/SIGHUP/SIGQUIT.
    pub async fn guard<F, Fut, R, E>(future_fn: F) -> Result<R, E>
    where
        F: FnOnce(Self, broadcast::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = Result<R, E>>,
    {
        let (coordinator, shutdown_rx) = Self::new();
        coordinator.install_signal_handlers();
        future_fn(coordinator, shutdown_rx).await
    }

    fn install_signal_handlers(&self) {
        let signal_count = Arc::new(AtomicUsize::new(0));

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            // Restore default SIGPIPE so `courier ... | head` ends quietly.
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            let kinds = [
                ("SIGINT", SignalKind::interrupt()),
                ("SIGTERM", SignalKind::terminate()),
                ("SIGHUP", SignalKind::hangup()),
                ("SIGQUIT", SignalKind::quit()),
            ];
            for (name, kind) in kinds {
                let coordinator = self.clone();
                let signal_count = Arc::clone(&signal_count);
                tokio::spawn(async move {
                    let Ok(mut stream) = signal(kind) else {
                        log::debug!("Could not install {} handler", name);
                        return;
                    };
                    while stream.recv().await.is_some() {
                        coordinator.on_signal(name, &signal_count);
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    coordinator.on_signal("Ctrl-C", &signal_count);
                }
            });
        }
    }

    fn on_signal(&self, name: &str, signal_count: &AtomicUsize) {
        let previous = signal_count.fetch_add(1, Ordering::AcqRel);
        if previous >= 1 {
            log::warn!("{} received again; exiting immediately", name);
            std::process::exit(FORCED_EXIT_CODE);
        }
        log::info!("{} received; shutting down", name);
        self.trigger_shutdown();
    }
}
