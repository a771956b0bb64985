//! OS signal handling for the agent-syscfg process.
//!
//! A forwarder task owns the OS subscriptions and pushes raw signal numbers
//! into a bounded channel. A single [`SignalController`] consumes them in
//! arrival order and classifies each one:
//!
//! - SIGINT, SIGQUIT, SIGABRT, SIGTERM: request shutdown and stop listening
//! - SIGHUP: reserved for reload, currently a no-op
//! - SIGURG: ignored without logging
//! - SIGUSR1: healthcheck request from the parent agent
//! - anything else: logged at debug level
//!
//! SIGQUIT is never subscribed, so it keeps its default core-dumping
//! behaviour for debugging.

use std::io;
use std::os::raw::c_int;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::lifecycle::Lifecycle;

/// Capacity of the queue between the OS forwarder and the controller.
pub const SIGNAL_QUEUE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What a delivered signal means for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    Terminate,
    Reload,
    Ignore,
    HealthcheckRequest,
    Unknown,
}

/// Map a raw signal number to its [`SignalClass`].
pub fn classify(signum: c_int) -> SignalClass {
    match signum {
        libc::SIGINT | libc::SIGQUIT | libc::SIGABRT | libc::SIGTERM => SignalClass::Terminate,
        libc::SIGHUP => SignalClass::Reload,
        libc::SIGURG => SignalClass::Ignore,
        libc::SIGUSR1 => SignalClass::HealthcheckRequest,
        _ => SignalClass::Unknown,
    }
}

/// Short name used in log fields.
pub fn signal_name(signum: c_int) -> &'static str {
    match signum {
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGABRT => "SIGABRT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGHUP => "SIGHUP",
        libc::SIGURG => "SIGURG",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// State of the signal listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    TerminatingCleanup,
    Terminated,
}

/// Consumes signals from the forwarder queue and applies their effect to
/// the shared [`Lifecycle`].
pub struct SignalController {
    lifecycle: Lifecycle,
    rx: mpsc::Receiver<c_int>,
    state: ListenerState,
}

impl SignalController {
    pub fn new(lifecycle: Lifecycle, rx: mpsc::Receiver<c_int>) -> Self {
        Self {
            lifecycle,
            rx,
            state: ListenerState::Listening,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Apply a single signal. Once terminated, further signals are ignored.
    pub fn handle(&mut self, signum: c_int) -> ListenerState {
        if self.state != ListenerState::Listening {
            return self.state;
        }

        match classify(signum) {
            SignalClass::Terminate => {
                info!(signal = signal_name(signum), "exit signal received");
                self.state = ListenerState::TerminatingCleanup;
                // Firing the cancellation also makes the forwarder drop its
                // SIGINT/SIGTERM/SIGABRT subscriptions.
                self.lifecycle.shutdown();
                self.state = ListenerState::Terminated;
            }
            SignalClass::Reload => self.on_reload(signum),
            SignalClass::Ignore => {}
            SignalClass::HealthcheckRequest => {
                debug!("healthcheck requested");
                self.lifecycle.healthcheck().request();
            }
            SignalClass::Unknown => {
                debug!(signal = signum, "received unknown signal");
            }
        }

        self.state
    }

    /// Hook for SIGHUP. Restart-on-reload is not implemented; the signal is
    /// acknowledged and otherwise ignored.
    fn on_reload(&self, signum: c_int) {
        debug!(signal = signal_name(signum), "reload requested, not supported yet");
    }

    /// Process signals until a terminate-class signal arrives, shutdown is
    /// requested elsewhere, or the forwarder goes away.
    pub async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                signum = self.rx.recv() => signum,
                _ = self.lifecycle.cancelled() => None,
            };

            let Some(signum) = next else {
                debug!("signal listener stopping");
                self.state = ListenerState::Terminated;
                return;
            };

            if self.handle(signum) == ListenerState::Terminated {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OS subscriptions
// ---------------------------------------------------------------------------

struct Subscriptions {
    interrupt: Signal,
    terminate: Signal,
    abort: Signal,
    user1: Signal,
    hangup: Signal,
    urgent: Signal,
}

impl Subscriptions {
    fn register() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            abort: signal(SignalKind::from_raw(libc::SIGABRT))?,
            user1: signal(SignalKind::user_defined1())?,
            hangup: signal(SignalKind::hangup())?,
            urgent: signal(SignalKind::from_raw(libc::SIGURG))?,
        })
    }
}

async fn forward(mut subs: Subscriptions, tx: mpsc::Sender<c_int>, lifecycle: Lifecycle) {
    loop {
        let signum = tokio::select! {
            _ = lifecycle.cancelled() => break,
            Some(()) = subs.interrupt.recv() => libc::SIGINT,
            Some(()) = subs.terminate.recv() => libc::SIGTERM,
            Some(()) = subs.abort.recv() => libc::SIGABRT,
            Some(()) = subs.user1.recv() => libc::SIGUSR1,
            Some(()) = subs.hangup.recv() => libc::SIGHUP,
            Some(()) = subs.urgent.recv() => libc::SIGURG,
            else => break,
        };

        if tx.send(signum).await.is_err() {
            break;
        }
    }

    // tokio keeps its handlers installed after the streams are dropped, so
    // later SIGINT/SIGTERM/SIGABRT deliveries are swallowed rather than
    // re-entering shutdown or killing the process mid-cleanup.
    drop(subs);
    debug!("stopped forwarding OS signals");
}

/// Register OS signal handlers and start the listener.
///
/// Returns the controller's join handle; it completes once a terminate
/// signal has been handled or shutdown was requested some other way.
pub fn install(lifecycle: Lifecycle) -> io::Result<JoinHandle<()>> {
    let subs = Subscriptions::register()?;
    let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);

    tokio::spawn(forward(subs, tx, lifecycle.clone()));
    let controller = SignalController::new(lifecycle, rx);
    Ok(tokio::spawn(controller.run()))
}
