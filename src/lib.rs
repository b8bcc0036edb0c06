pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::ai_reader::{AnswerSheetReader, OpenAiSheetReader};
use crate::services::sheet_vision::ocr::{TesseractCli, TextRecognizer};
use crate::services::storage::StorageService;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("S3 storage is not configured; uploaded sheet images will not be kept");
    }

    let sheet_reader: Arc<dyn AnswerSheetReader> = Arc::new(OpenAiSheetReader::from_settings(&settings)?);
    let text_recognizer: Option<Arc<dyn TextRecognizer>> = if settings.vision().ocr_enabled {
        Some(Arc::new(TesseractCli::new(settings.vision().tesseract_bin.clone())))
    } else {
        tracing::info!("OCR disabled; classic uploads need an explicit sheet_code");
        None
    };

    let state = AppState::new(settings, db_pool, storage, sheet_reader, text_recognizer);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Gabarito API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}
