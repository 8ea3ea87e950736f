// Graceful shutdown plugin: signal wiring, close coordination, timeout

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::plugin::Plugin;
use crate::scope::Scope;

/// Process signals the shutdown plugin can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        match self {
            ShutdownSignal::Interrupt => tokio::signal::unix::SignalKind::interrupt(),
            ShutdownSignal::Terminate => tokio::signal::unix::SignalKind::terminate(),
        }
    }

    #[cfg(unix)]
    fn signo(&self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => libc::SIGINT,
            ShutdownSignal::Terminate => libc::SIGTERM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    pub signals: Vec<ShutdownSignal>,
    pub timeout: Duration,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            signals: vec![ShutdownSignal::Interrupt, ShutdownSignal::Terminate],
            timeout: Duration::from_secs(30),
        }
    }
}

/// Once-latch: only the first signal starts a shutdown.
#[derive(Default)]
struct ShutdownState {
    shutting_down: AtomicBool,
}

impl ShutdownState {
    /// Returns true exactly once.
    fn begin(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Build the graceful-shutdown plugin (`skip_override`).
///
/// On the first configured signal: stop the adapter, run `close` hooks, and
/// tear down. If that takes longer than the timeout the process exits with
/// code 1. Signals received while a shutdown is in flight are ignored; after
/// a graceful completion the signal is re-raised with its default
/// disposition restored so the process exits with conventional semantics.
pub fn graceful_shutdown(opts: ShutdownOptions) -> Plugin {
    Plugin::new_sync("graceful-shutdown", move |scope, _plugin_opts| {
        let opts = opts.clone();
        let app = scope.root_scope();
        tokio::spawn(signal_task(app, opts));
        Ok(())
    })
    .skip_override()
}

/// Run the close sequence against the timeout. Returns false on timeout.
async fn close_within(app: &Scope, timeout: Duration) -> bool {
    tokio::select! {
        result = app.close() => {
            if let Err(e) = result {
                error!(error = %e, "close finished with an error");
            }
            true
        }
        _ = tokio::time::sleep(timeout) => false,
    }
}

#[cfg(unix)]
async fn signal_task(app: Scope, opts: ShutdownOptions) {
    let state = Arc::new(ShutdownState::default());
    let mut streams = Vec::new();
    for signal in &opts.signals {
        match tokio::signal::unix::signal(signal.kind()) {
            Ok(stream) => streams.push((stream, *signal)),
            Err(e) => error!(signal = signal.name(), error = %e, "failed to install signal listener"),
        }
    }
    if streams.is_empty() {
        return;
    }

    loop {
        let received = wait_any(&mut streams).await;
        if !state.begin() {
            info!(signal = received.name(), "shutdown already in progress, ignoring signal");
            continue;
        }

        info!(signal = received.name(), "shutting down");
        if !close_within(&app, opts.timeout).await {
            warn!(
                timeout_ms = opts.timeout.as_millis() as u64,
                "graceful shutdown timed out, terminating"
            );
            std::process::exit(1);
        }

        info!("graceful shutdown complete");
        // Dropping the streams detaches our listeners before the re-raise.
        drop(streams);
        reraise(received);
        break;
    }
    debug_assert!(state.is_shutting_down());
}

#[cfg(unix)]
async fn wait_any(
    streams: &mut [(tokio::signal::unix::Signal, ShutdownSignal)],
) -> ShutdownSignal {
    let futures = streams
        .iter_mut()
        .map(|(stream, signal)| {
            let signal = *signal;
            Box::pin(async move {
                stream.recv().await;
                signal
            })
        })
        .collect::<Vec<_>>();
    let (signal, _, _) = futures_util::future::select_all(futures).await;
    signal
}

#[cfg(unix)]
fn reraise(signal: ShutdownSignal) {
    // Restore the default disposition and re-deliver, so the parent observes
    // the conventional exit status. SIG_ERR here means another handler owns
    // the signal now; in that case it is theirs to handle.
    unsafe {
        let previous = libc::signal(signal.signo(), libc::SIG_DFL);
        if previous == libc::SIG_ERR {
            error!(signal = signal.name(), "could not restore default signal disposition");
            return;
        }
        libc::raise(signal.signo());
    }
}

#[cfg(not(unix))]
async fn signal_task(app: Scope, opts: ShutdownOptions) {
    // Non-unix platforms only expose ctrl-c.
    let state = Arc::new(ShutdownState::default());
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if !state.begin() {
            continue;
        }
        info!("shutting down");
        if !close_within(&app, opts.timeout).await {
            std::process::exit(1);
        }
        info!("graceful shutdown complete");
        break;
    }
}
