use anyhow::Result;
use tracing::info;

pub fn init_telemetry(endpoint: &str) -> Result<()> {
    info!(
        target = "telemetry.gui",
        endpoint,
        "OpenTelemetry endpoint configured; forward tracing spans via collector-side subscriber"
    );
    verifact_core::init_metrics_from_env("verifact-gui");
    Ok(())
}

pub fn check_started(check_id: &str, mode: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        check_id,
        mode,
        running_checks = running,
        available_permits,
        event = "check_started"
    );
}

pub fn check_finished(check_id: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        check_id,
        running_checks = running,
        available_permits,
        event = "check_finished"
    );
}

pub fn report_downloaded(check_id: &str, bytes: usize) {
    info!(
        target = "telemetry.gui",
        check_id,
        bytes,
        event = "report_downloaded"
    );
}

pub fn stream_opened(check_id: &str, active_streams: usize) {
    info!(
        target = "telemetry.gui",
        check_id,
        active_streams,
        event = "stream_opened"
    );
}
