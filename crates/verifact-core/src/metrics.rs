use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct CheckMetrics {
    checks: Counter<u64>,
    duration_ms: Histogram<f64>,
    tasks: Counter<u64>,
}

static METRICS: OnceCell<CheckMetrics> = OnceCell::new();

fn handles() -> &'static CheckMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("verifact.checks");
        CheckMetrics {
            checks: meter
                .u64_counter("verifact_checks_total")
                .with_description("Fact checks by mode, status and verdict")
                .init(),
            duration_ms: meter
                .f64_histogram("verifact_check_duration_ms")
                .with_description("Fact check runtime in milliseconds")
                .init(),
            tasks: meter
                .u64_counter("verifact_tasks_total")
                .with_description("Crew tasks executed")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("VERIFACT_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "VERIFACT_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export check metrics."
        );
    }
}

/// Record OTEL metrics for one check (no-op if no provider installed).
pub fn record_check_metrics(mode: &str, status: &str, verdict: &str, tasks: usize, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("mode", mode.to_string()),
        KeyValue::new("status", status.to_string()),
        KeyValue::new("verdict", verdict.to_string()),
    ];

    metrics.checks.add(1, &attrs);
    metrics.duration_ms.record(duration_ms as f64, &attrs);
    metrics.tasks.add(tasks as u64, &attrs[..1]);
}
