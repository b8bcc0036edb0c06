use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::ai_reader::AnswerSheetReader;
use crate::services::sheet_vision::ocr::TextRecognizer;
use crate::services::storage::StorageService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
    sheet_reader: Arc<dyn AnswerSheetReader>,
    text_recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        storage: Option<StorageService>,
        sheet_reader: Arc<dyn AnswerSheetReader>,
        text_recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState { settings, db, storage, sheet_reader, text_recognizer }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn sheet_reader(&self) -> &dyn AnswerSheetReader {
        self.inner.sheet_reader.as_ref()
    }

    pub(crate) fn text_recognizer(&self) -> Option<&dyn TextRecognizer> {
        self.inner.text_recognizer.as_deref()
    }
}
