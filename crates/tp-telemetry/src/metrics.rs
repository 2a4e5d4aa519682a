//! Prometheus metrics for the token ledger.
//!
//! All metrics follow the naming convention: `tp_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Tokens minted
    pub static ref TOKENS_MINTED: Counter = Counter::new(
        "tp_ledger_tokens_minted_total",
        "Total number of tokens minted"
    ).expect("metric creation failed");

    /// Points minted
    pub static ref POINTS_MINTED: Counter = Counter::new(
        "tp_ledger_points_minted_total",
        "Total points issued by mints"
    ).expect("metric creation failed");

    /// Sends completed
    pub static ref SENDS_COMPLETED: Counter = Counter::new(
        "tp_ledger_sends_completed_total",
        "Total number of completed sends"
    ).expect("metric creation failed");

    /// Points sent
    pub static ref POINTS_SENT: Counter = Counter::new(
        "tp_ledger_points_sent_total",
        "Total points transferred to recipients"
    ).expect("metric creation failed");

    /// Incoming tokens accepted into holdings
    pub static ref TOKENS_ACCEPTED: Counter = Counter::new(
        "tp_receive_tokens_accepted_total",
        "Incoming tokens accepted into holdings"
    ).expect("metric creation failed");

    /// Points carried by accepted incoming tokens
    pub static ref POINTS_RECEIVED: Counter = Counter::new(
        "tp_receive_points_accepted_total",
        "Points carried by accepted incoming tokens"
    ).expect("metric creation failed");

    /// Incoming tokens rejected, by reason
    pub static ref TOKENS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("tp_receive_tokens_rejected_total", "Incoming tokens rejected"),
        &["reason"]  // malformed, not_mine, unverified, duplicate, overflow, payload
    ).expect("metric creation failed");

    /// Current balance
    pub static ref BALANCE: Gauge = Gauge::new(
        "tp_ledger_balance_points",
        "Points currently held"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Calling it again is a
/// no-op.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TOKENS_MINTED.clone()),
        Box::new(POINTS_MINTED.clone()),
        Box::new(SENDS_COMPLETED.clone()),
        Box::new(POINTS_SENT.clone()),
        Box::new(TOKENS_ACCEPTED.clone()),
        Box::new(POINTS_RECEIVED.clone()),
        Box::new(TOKENS_REJECTED.clone()),
        Box::new(BALANCE.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all registered metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// A mint completed.
pub fn record_mint(points: u64) {
    TOKENS_MINTED.inc();
    POINTS_MINTED.inc_by(points as f64);
}

/// A send completed.
pub fn record_send(points: u64) {
    SENDS_COMPLETED.inc();
    POINTS_SENT.inc_by(points as f64);
}

/// An incoming token was accepted.
pub fn record_accepted(points: u64) {
    TOKENS_ACCEPTED.inc();
    POINTS_RECEIVED.inc_by(points as f64);
}

/// An incoming token was rejected.
pub fn record_rejected(reason: &str) {
    TOKENS_REJECTED.with_label_values(&[reason]).inc();
}

/// Balance after a mutation of the holdings.
pub fn set_balance(points: u64) {
    BALANCE.set(points as f64);
}
