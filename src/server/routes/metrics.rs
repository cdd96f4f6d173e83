//! Metrics endpoint

use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, instrument, warn};

use crate::exposition::{CONTENT_TYPE, render, render_build_info};
use crate::server::state::AppState;

/// Header Prometheus sets to announce its scrape timeout
pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

/// Headroom left between the end of probing and the caller giving up
pub const SCRAPE_TIMEOUT_OFFSET: Duration = Duration::from_millis(500);

/// Probe deadline derived from the scrape timeout announced by the caller.
///
/// [`SCRAPE_TIMEOUT_OFFSET`] is subtracted so the response still arrives in
/// time; timeouts shorter than the offset are used unchanged.
pub fn scrape_deadline(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(SCRAPE_TIMEOUT_HEADER)?;
    let timeout = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok());

    let Some(timeout) = timeout else {
        warn!("ignoring invalid {SCRAPE_TIMEOUT_HEADER} header: {value:?}");
        return None;
    };

    match timeout.checked_sub(SCRAPE_TIMEOUT_OFFSET) {
        Some(deadline) if !deadline.is_zero() => Some(deadline),
        _ => Some(timeout),
    }
}

/// GET <telemetry path>
///
/// Runs a full probing round and renders whatever it produced. Failing
/// targets only drop out of the output; the response is always 200.
#[instrument(skip_all)]
pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (tx, mut rx) = unbounded_channel();

    let report = state.collector.collect(tx, scrape_deadline(&headers)).await;

    let mut samples = Vec::new();
    while let Some(sample) = rx.recv().await {
        samples.push(sample);
    }

    debug!(
        "rendering {} samples ({} targets failed)",
        samples.len(),
        report.failed().count()
    );

    let mut body = render(&samples);
    body.push_str(&render_build_info());

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}
