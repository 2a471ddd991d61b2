use futures::FutureExt;
use log::{error, info};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::notify::Notifier;
use crate::query::{self, DEFAULT_TIMEOUT};
use crate::report::Report;

/// Query timeout for a given poll interval: the configured timeout, capped
/// at 80% of the interval so a query always ends before the next poll is due.
#[must_use]
pub fn query_timeout_for(interval: Duration, configured: Duration) -> Duration {
    configured.min(interval.mul_f64(0.8))
}

/// Polls `endpoint` every `interval` until `token` is cancelled.
///
/// # Behavior
///
/// - Queries the server once per iteration with `timeout`
/// - Hands the resulting [`Report`] to every notifier, UP or DOWN alike
/// - Logs notifier failures and carries on
/// - Sleeps for `interval`; cancellation interrupts the sleep
///
/// A query that is already in flight when the token is cancelled runs to
/// completion and its report is still delivered.
pub async fn monitor_endpoint(
    endpoint: &Endpoint,
    interval: Duration,
    timeout: Duration,
    notifiers: &[Arc<dyn Notifier>],
    token: CancellationToken,
) {
    info!(
        "Monitoring {endpoint} every {}s (query timeout {}ms, {} sinks)",
        interval.as_secs_f64(),
        timeout.as_millis(),
        notifiers.len()
    );

    loop {
        // Check if we should shutdown before starting new cycle
        if token.is_cancelled() {
            info!("Shutdown requested, stopping monitor for {endpoint}");
            break;
        }

        let result = query::query(endpoint, timeout).await;
        let report = Report::new(endpoint.clone(), result);
        dispatch(&report, notifiers).await;

        // Interruptible sleep
        select! {
            () = sleep(interval) => {},
            () = token.cancelled() => {
                info!("Shutdown requested during sleep for {endpoint}");
                break;
            }
        }
    }

    info!("Monitoring of {endpoint} stopped gracefully");
}

/// Like [`monitor_endpoint`] with the default query timeout.
pub async fn monitor_endpoint_default(
    endpoint: &Endpoint,
    interval: Duration,
    notifiers: &[Arc<dyn Notifier>],
    token: CancellationToken,
) {
    let timeout = query_timeout_for(interval, DEFAULT_TIMEOUT);
    monitor_endpoint(endpoint, interval, timeout, notifiers, token).await;
}

/// Delivers `report` to every notifier. A sink that errors or panics is
/// logged and skipped; the others still run.
async fn dispatch(report: &Report, notifiers: &[Arc<dyn Notifier>]) {
    for notifier in notifiers {
        match AssertUnwindSafe(notifier.notify(report)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                "{} notification for {} failed: {e}",
                notifier.name(),
                report.endpoint
            ),
            Err(panic) => error!(
                "{} notification for {} panicked: {}",
                notifier.name(),
                report.endpoint,
                panic_message(panic.as_ref())
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
