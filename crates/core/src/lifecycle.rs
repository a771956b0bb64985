//! Process-wide lifecycle state shared by the signal listener, the idle loop
//! and the enforcers.
//!
//! A [`Lifecycle`] owns the cancellation token and the healthcheck request
//! flag. It is created once at startup and cloned into every component that
//! needs either of them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// The literal line the supervising agent waits for after a healthcheck
/// request.
pub const HEALTHY_TOKEN: &str = "HEALTHY";

// ---------------------------------------------------------------------------
// Healthcheck request flag
// ---------------------------------------------------------------------------

/// Set by the signal listener when the parent asks for a healthcheck and
/// cleared by whoever reports it.
#[derive(Debug, Clone, Default)]
pub struct HealthcheckFlag(Arc<AtomicBool>);

impl HealthcheckFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a healthcheck as requested. Requests made before the next
    /// [`take`](Self::take) coalesce into one.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Atomically clear the flag, returning whether a request was pending.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Liveness reporting
// ---------------------------------------------------------------------------

/// Emits a liveness report to whatever the supervisor is watching.
///
/// Implementations must be cheap and must not block.
pub trait LivenessReporter: Send + Sync {
    fn report(&self);
}

/// Writes [`HEALTHY_TOKEN`] on its own line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutReporter;

impl LivenessReporter for StdoutReporter {
    fn report(&self) {
        println!("{HEALTHY_TOKEN}");
    }
}

// ---------------------------------------------------------------------------
// Lifecycle handle
// ---------------------------------------------------------------------------

/// Shared cancellation + healthcheck state.
///
/// Clones share the same state. [`scoped`](Self::scoped) returns a handle
/// whose cancellation is a child of this one.
#[derive(Clone)]
pub struct Lifecycle {
    cancel: CancellationToken,
    healthcheck: HealthcheckFlag,
    reporter: Arc<dyn LivenessReporter>,
}

impl Lifecycle {
    /// Create a fresh lifecycle that reports liveness through `reporter`.
    pub fn new(reporter: Arc<dyn LivenessReporter>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            healthcheck: HealthcheckFlag::new(),
            reporter,
        }
    }

    /// Lifecycle that reports to stdout, as used by the daemon.
    pub fn with_stdout() -> Self {
        Self::new(Arc::new(StdoutReporter))
    }

    /// A handle sharing the healthcheck flag and reporter, whose
    /// cancellation fires when this one does or when the scoped handle is
    /// shut down itself. Shutting down the scoped handle leaves this one
    /// untouched.
    pub fn scoped(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            healthcheck: self.healthcheck.clone(),
            reporter: self.reporter.clone(),
        }
    }

    /// Request shutdown. Firing more than once is a no-op.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn healthcheck(&self) -> &HealthcheckFlag {
        &self.healthcheck
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn LivenessReporter> {
        &self.reporter
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("healthcheck_requested", &self.healthcheck.is_requested())
            .finish()
    }
}
