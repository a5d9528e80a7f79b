use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().add_global_label("service", "medcbt").install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP responses by status code");
    describe_histogram!("http_request_duration_seconds", Unit::Seconds, "HTTP request latency");
    describe_counter!("exam_sessions_started_total", "Exam attempts started");
    describe_counter!("exam_sessions_abandoned_total", "Exam attempts abandoned by the student");
    describe_counter!("exam_results_recorded_total", "Results written, by status and finalize mode");
    describe_counter!(
        "exam_result_persist_failures_total",
        "Results that could not be stored and were returned unsaved"
    );
    describe_counter!("expired_sessions_closed_total", "Attempts auto-submitted by the expiry sweep");
    describe_counter!("questions_imported_total", "Questions committed through batch import");
    describe_counter!("questions_deduplicated_total", "Duplicate questions removed");
    describe_counter!("ai_extraction_total", "PDF extraction calls by outcome");
    describe_histogram!("ai_extraction_seconds", Unit::Seconds, "PDF extraction latency");
    describe_histogram!("analytics_report_seconds", Unit::Seconds, "Analytics report build time");
    describe_counter!("decode_failures_total", "Stored documents that failed to decode");
    describe_counter!("auth_signups_total", "Student accounts created");
    describe_counter!("auth_login_failures_total", "Rejected sign-in attempts");
    describe_counter!("auth_rate_limited_total", "Auth requests refused by the rate limiter");
    describe_gauge!("live_subscriptions", "Open live-view subscriptions by topic");
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
