//! Interruptible sleep that keeps answering healthchecks.
//!
//! The main idle loop and long blocking operations (package installs) call
//! [`Lifecycle::healthy_sleep`] so that the parent agent still sees
//! `HEALTHY` while nothing else is happening.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lifecycle::{HealthcheckFlag, Lifecycle, LivenessReporter};

/// How often a pending healthcheck request is polled.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

impl Lifecycle {
    /// Sleep for `timeout` while reporting liveness whenever a healthcheck
    /// has been requested.
    ///
    /// Returns `true` if the timeout elapsed and `false` if shutdown was
    /// requested first. The reporting task is joined before returning, so no
    /// report is emitted after this returns.
    pub async fn healthy_sleep(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return true;
        }

        let stop = self.cancellation().child_token();
        // Stops the reporter even if this future is dropped before it
        // finishes.
        let _stop_on_drop = stop.clone().drop_guard();
        let reporter = tokio::spawn(report_healthchecks(
            stop.clone(),
            self.healthcheck().clone(),
            self.reporter().clone(),
        ));

        let elapsed = tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = time::sleep(timeout) => true,
        };

        stop.cancel();
        if let Err(e) = reporter.await {
            debug!(error = %e, "healthcheck reporter ended abnormally");
        }

        // A request that arrived between the last tick and the timeout is
        // still answered before control goes back to the caller.
        if elapsed && self.healthcheck().take() {
            self.reporter().report();
        }

        elapsed
    }
}

async fn report_healthchecks(
    stop: CancellationToken,
    flag: HealthcheckFlag,
    reporter: Arc<dyn LivenessReporter>,
) {
    let mut ticker = time::interval(REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                if flag.take() {
                    reporter.report();
                }
            }
        }
    }
}
