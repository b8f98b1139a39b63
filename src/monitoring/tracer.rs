/*!
 * Structured Tracing
 * Subscriber setup and spans for worker invocations
 */

use std::time::Duration;
use tracing::{info, span, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - BROKER_TRACE_JSON: Enable JSON output (default: false)
///
/// Installing a second global subscriber is ignored.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("BROKER_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Generate a unique trace ID for correlating one invocation's events
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one worker from spawn to cleanup
pub fn worker_span(pid: u32, timeout: Duration) -> Span {
    span!(
        Level::INFO,
        "worker",
        trace_id = %generate_trace_id(),
        pid,
        timeout_ms = timeout.as_millis() as u64
    )
}
