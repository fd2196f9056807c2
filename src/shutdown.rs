use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cfg_if::cfg_if;
use futures::{future::Shared, FutureExt};
use std::future::Future;
use tokio::select;
use tokio::sync::Notify;
use tracing::info;

cfg_if! {
    if #[cfg(windows)] {
        use tokio::signal::windows::*;

        async fn raw_shutdown_signal() {
            let mut ctrl_c = ctrl_c().expect("Failed to attach Ctrl_C shutdown signal (windows)");
            let mut ctrl_close = ctrl_close().expect("Failed to attach Ctrl_close shutdown signal (windows)");
            let mut ctrl_shutdown = ctrl_shutdown().expect("Failed to attach Ctrl_shutdown shutdown signal (windows)");
            select! {
                _ = ctrl_c.recv() => (),
                _ = ctrl_close.recv() => (),
                _ = ctrl_shutdown.recv() => (),
            }
        }
    } else if #[cfg(unix)] {
        use tokio::signal::unix::*;

        async fn unix_shutdown_signal(signal_kind: SignalKind) {
            let mut signal = signal(signal_kind).expect("Failed to listen to unix shutdown signal");
            signal.recv().await;
        }

        async fn raw_shutdown_signal() {
            select! {
                _ = unix_shutdown_signal(SignalKind::interrupt()) => (),
                _ = unix_shutdown_signal(SignalKind::terminate()) => (),
                _ = unix_shutdown_signal(SignalKind::hangup()) => (),
            };
        }
    } else {
        compile_error!("Your OS does not support shutdown signal ! Are you targeting wasm ?");
    }
}

/// A cloneable future that resolves once when the process should stop
/// accepting new work.
pub type ShutdownSignal = Shared<Pin<Box<dyn Future<Output = ()> + Send>>>;

/// Shutdown signal driven by OS signals (SIGINT/SIGTERM/SIGHUP on unix).
pub fn shutdown_signal() -> ShutdownSignal {
    async {
        raw_shutdown_signal().await;
        info!("Shutdown signal detected. Attempting graceful shutdown...");
    }
    .boxed()
    .shared()
}

/// Shutdown signal that never resolves, for callers that manage their own
/// lifetime (tests, run-once style invocations).
pub fn never() -> ShutdownSignal {
    futures::future::pending::<()>().boxed().shared()
}

/// Combine two shutdown signals into one that resolves when either does.
pub fn either(a: ShutdownSignal, b: ShutdownSignal) -> ShutdownSignal {
    futures::future::select(a, b).map(|_| ()).boxed().shared()
}

/// Programmatic shutdown trigger.
///
/// One-shot: once [`ShutdownToken::shutdown`] has been called, every
/// [`ShutdownSignal`] produced by [`ShutdownToken::signal`] resolves,
/// whether it was created before or after the call, and no matter how many
/// of them are outstanding.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn signal(&self) -> ShutdownSignal {
        let inner = self.inner.clone();
        async move {
            // register before reading the flag so a trigger between the two
            // cannot be missed
            let mut notified = pin!(inner.notify.notified());
            notified.as_mut().enable();
            if inner.triggered.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
        .boxed()
        .shared()
    }
}
