use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use thiserror::Error;

use crate::core::config::LayoutKind;
use crate::db::models::{AnswerMap, Exam};
use crate::services::ai_reader::{AiReadError, AnswerSheetReader, SheetReadRequest};
use crate::services::sheet_decode::encode_jpeg;
use crate::services::sheet_pdf;
use crate::services::sheet_vision::layout::{LayoutStrategy, RowMajorLayout};
use crate::services::sheet_vision::ocr::{extract_sheet_code, TextRecognizer};
use crate::services::sheet_vision::quality::{self, QualityVerdict};
use crate::services::sheet_vision::{detect_answers, DetectionParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ReadingMode {
    #[default]
    Ai,
    Classic,
}

impl ReadingMode {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ai" => Some(Self::Ai),
            "classic" => Some(Self::Classic),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Classic => "classic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetReading {
    /// Code found on the sheet, if any.
    pub(crate) sheet_code: Option<String>,
    pub(crate) answers: AnswerMap,
}

#[derive(Debug, Error)]
pub(crate) enum ReadError {
    #[error("{0}")]
    Quality(&'static str),
    #[error(transparent)]
    Ai(#[from] AiReadError),
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Sheet processing task failed: {0}")]
    Task(String),
}

pub(crate) fn layout_for(kind: LayoutKind, exam: &Exam) -> Box<dyn LayoutStrategy> {
    match kind {
        LayoutKind::RowMajor => Box::new(RowMajorLayout),
        LayoutKind::Template => Box::new(sheet_pdf::template_layout(exam.num_questions, exam.num_options)),
    }
}

pub(crate) async fn read_with_ai(
    reader: &dyn AnswerSheetReader,
    exam: &Exam,
    image: DynamicImage,
) -> Result<SheetReading, ReadError> {
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&image))
        .await
        .map_err(|err| ReadError::Task(err.to_string()))??;

    let request = SheetReadRequest {
        image_base64: STANDARD.encode(jpeg),
        num_questions: exam.num_questions,
        option_letters: exam.option_letters(),
    };

    let reply = reader.read_sheet(&request).await?;
    Ok(SheetReading { sheet_code: Some(reply.sheet_code), answers: reply.answers })
}

pub(crate) async fn read_classic(
    recognizer: Option<&dyn TextRecognizer>,
    layout: Box<dyn LayoutStrategy>,
    exam: &Exam,
    image: DynamicImage,
) -> Result<SheetReading, ReadError> {
    let timer = Instant::now();
    let (num_questions, num_options) = (exam.num_questions, exam.num_options);

    let (gray, answers) = tokio::task::spawn_blocking(move || {
        let gray = image.to_luma8();
        if let QualityVerdict::Rejected(reason) = quality::assess(&gray) {
            return Err(ReadError::Quality(reason));
        }
        let reading = detect_answers(
            &gray,
            num_questions,
            num_options,
            layout.as_ref(),
            &DetectionParams::default(),
        );
        Ok((gray, reading.answers))
    })
    .await
    .map_err(|err| ReadError::Task(err.to_string()))??;

    let sheet_code = match recognizer {
        Some(recognizer) => extract_sheet_code(recognizer, &gray).await,
        None => None,
    };

    tracing::info!(
        exam_id = %exam.id,
        answered = answers.len(),
        code_found = sheet_code.is_some(),
        duration_ms = timer.elapsed().as_millis() as u64,
        "Classic sheet reading finished"
    );

    Ok(SheetReading { sheet_code, answers })
}
