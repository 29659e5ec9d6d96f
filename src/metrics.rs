//! Counters for the fixity pipeline.
//!
//! Recorded through the `metrics` facade; nothing is exported unless a
//! recorder is installed (see [`install_prometheus`]).

use std::net::SocketAddr;

use anyhow::Context;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Outcome label for a deposit or verification.
pub fn outcome(passed: bool) -> &'static str {
    if passed { "ok" } else { "failed" }
}

/// Record a completed deposit.
pub fn record_deposit(outcome: &'static str) {
    counter!("fixity_deposits_total", "outcome" => outcome).increment(1);
}

/// Record a completed verification.
pub fn record_verification(outcome: &'static str) {
    counter!("fixity_verifications_total", "outcome" => outcome).increment(1);
}

/// Record a notification handed to a notifier.
pub fn record_notification(kind: &'static str, delivered: bool) {
    counter!(
        "fixity_notifications_total",
        "kind" => kind,
        "delivered" => if delivered { "true" } else { "false" }
    )
    .increment(1);
}

/// Record the totals of one sweep.
pub fn record_sweep(processed: u64, failed: u64, errors: u64) {
    counter!("fixity_sweeps_total").increment(1);
    counter!("fixity_sweep_records_total", "result" => "processed").increment(processed);
    counter!("fixity_sweep_records_total", "result" => "failed").increment(failed);
    counter!("fixity_sweep_records_total", "result" => "error").increment(errors);
}

/// Record a trigger handled by the daemon.
pub fn record_trigger(kind: &'static str, result: &'static str) {
    counter!("fixity_triggers_total", "kind" => kind, "result" => result).increment(1);
}

/// Record ledger changes a feed subscriber missed by falling behind.
pub fn record_feed_lag(skipped: u64) {
    counter!("fixity_change_feed_lagged_total").increment(skipped);
}

/// Installs the Prometheus recorder with its own HTTP listener.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener cannot bind.
pub fn install_prometheus(listen: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(listen = %listen, "Prometheus metrics exporter listening");
    Ok(())
}
