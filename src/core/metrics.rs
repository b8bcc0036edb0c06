use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// One processed upload, labelled by reading mode (`ai`/`classic`) and outcome.
pub(crate) fn record_sheet_processed(mode: &'static str, outcome: &'static str) {
    metrics::counter!("answer_sheets_processed_total", "mode" => mode, "outcome" => outcome)
        .increment(1);
}

pub(crate) fn record_ai_read_duration(elapsed: Duration) {
    metrics::histogram!("ai_sheet_read_duration_seconds").record(elapsed.as_secs_f64());
}
