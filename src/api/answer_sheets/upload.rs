use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use image::DynamicImage;

use crate::api::errors::ApiError;
use crate::api::validation::{clean_student_name, validate_sheet_filename};
use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, StudentAnswerSheet};
use crate::repositories;
use crate::schemas::answer_sheet::UploadResponse;
use crate::services::grading::record_and_score;
use crate::services::sheet_codes::normalize_sheet_code;
use crate::services::sheet_decode::{decode_upload, encode_jpeg, PdfRasterizer};
use crate::services::sheet_reading::{layout_for, read_classic, read_with_ai, ReadingMode, SheetReading};
use crate::services::storage::sheet_image_key;

#[derive(Debug, Default)]
struct UploadForm {
    image: Option<Vec<u8>>,
    filename: Option<String>,
    exam: Option<String>,
    mode: ReadingMode,
    sheet_code: Option<String>,
    student_name: Option<String>,
}

pub(super) async fn upload_answer_sheet(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let form = read_form(&state, multipart).await?;
    let mode = form.mode;

    let result = process_upload(&state, form).await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(err) if err.status().is_client_error() => "rejected",
        Err(_) => "failed",
    };
    metrics::record_sheet_processed(mode.as_str(), outcome);

    result.map(|response| (StatusCode::CREATED, Json(response)))
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let max_mb = state.settings().storage().max_upload_size_mb;
    let max_bytes = max_mb * 1024 * 1024;
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "sheet_image" {
            form.filename = field.file_name().map(|s| s.to_string());
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                    return Err(ApiError::BadRequest(format!("File size exceeds {max_mb}MB limit")));
                }
                bytes.extend_from_slice(&chunk);
            }
            form.image = Some(bytes);
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|_| ApiError::BadRequest(format!("Invalid value for field '{name}'")))?;
        match name.as_str() {
            "exam" | "exam_id" => form.exam = Some(text.trim().to_string()).filter(|s| !s.is_empty()),
            "mode" => {
                form.mode = ReadingMode::parse(&text).ok_or_else(|| {
                    ApiError::BadRequest("mode must be either 'ai' or 'classic'".to_string())
                })?;
            }
            "sheet_code" => form.sheet_code = Some(text),
            "student_name" => form.student_name = Some(text),
            _ => {}
        }
    }

    Ok(form)
}

async fn process_upload(state: &AppState, form: UploadForm) -> Result<UploadResponse, ApiError> {
    let bytes = form
        .image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No image was uploaded.".to_string()))?;
    let exam_id = form.exam.ok_or_else(|| ApiError::BadRequest("exam is required".to_string()))?;

    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    validate_sheet_filename(form.filename.as_deref(), &state.settings().storage().allowed_image_extensions)?;
    let image = decode_upload(&PdfRasterizer::from_settings(state.settings()), &bytes).await?;
    let kept_image = state.storage().map(|_| image.clone());

    let (reading, sheet_code) = match form.mode {
        ReadingMode::Ai => {
            let reading = read_with_ai(state.sheet_reader(), &exam, image).await?;
            let raw = reading.sheet_code.clone().unwrap_or_default();
            let code = normalize_sheet_code(&raw)
                .ok_or_else(|| ApiError::UnknownSheetCode(raw.trim().to_string()))?;
            (reading, code)
        }
        ReadingMode::Classic => {
            let layout = layout_for(state.settings().vision().layout, &exam);
            let reading = read_classic(state.text_recognizer(), layout, &exam, image).await?;
            let code = reading
                .sheet_code
                .as_deref()
                .and_then(normalize_sheet_code)
                .or_else(|| form.sheet_code.as_deref().and_then(normalize_sheet_code))
                .ok_or_else(|| {
                    ApiError::BadRequest(
                        "Sheet code could not be read from the image; provide sheet_code".to_string(),
                    )
                })?;
            (reading, code)
        }
    };

    let sheet = repositories::answer_sheets::find_by_code(state.db(), &sheet_code)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer sheet"))?
        .ok_or_else(|| ApiError::UnknownSheetCode(sheet_code.clone()))?;
    if sheet.exam_id != exam.id {
        return Err(ApiError::BadRequest(format!(
            "Sheet code '{sheet_code}' belongs to another exam"
        )));
    }

    let scored =
        save_reading(state, &exam, &sheet.id, &reading, form.student_name.as_deref()).await?;
    if let Some(image) = kept_image {
        attach_image(state, &exam, &sheet, image).await?;
    }

    tracing::info!(
        exam_id = %exam.id,
        sheet_code = %sheet_code,
        mode = form.mode.as_str(),
        answered = reading.answers.len(),
        accuracy = scored.accuracy_percentage,
        "Answer sheet processed"
    );

    let message = match form.mode {
        ReadingMode::Ai => "Answer sheet processed successfully by AI.",
        ReadingMode::Classic => "Answer sheet processed successfully.",
    };
    Ok(UploadResponse {
        message: message.to_string(),
        sheet_code,
        detected_answers: reading.answers,
        correct_items: scored.correct_items,
        incorrect_items: scored.incorrect_items,
        accuracy_percentage: scored.accuracy_percentage,
    })
}

async fn store_image(
    state: &AppState,
    exam: &Exam,
    sheet_code: &str,
    image: DynamicImage,
) -> Result<String, ApiError> {
    let Some(storage) = state.storage() else {
        return Err(ApiError::Internal("Storage is not configured".to_string()));
    };

    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&image))
        .await
        .map_err(|e| ApiError::internal(e, "Image encoding task failed"))?
        .map_err(|e| ApiError::internal(e, "Failed to encode sheet image"))?;

    let stored = storage
        .upload_bytes(&sheet_image_key(&exam.id, sheet_code), "image/jpeg", jpeg)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store sheet image"))?;
    tracing::info!(
        exam_id = %exam.id,
        key = %stored.key,
        size = stored.size,
        sha256 = %stored.sha256,
        "Stored sheet image"
    );
    Ok(stored.key)
}

/// Stores the image of an already committed reading and points the sheet at it.
async fn attach_image(
    state: &AppState,
    exam: &Exam,
    sheet: &StudentAnswerSheet,
    image: DynamicImage,
) -> Result<(), ApiError> {
    let key = store_image(state, exam, &sheet.sheet_code, image).await?;

    if let Err(err) =
        repositories::answer_sheets::set_image(state.db(), &sheet.id, &key, primitive_now_utc()).await
    {
        // Same key as an earlier upload means the object is still referenced.
        if sheet.sheet_image.is_none() {
            if let Some(storage) = state.storage() {
                if let Err(delete_err) = storage.delete_object(&key).await {
                    tracing::warn!(error = %delete_err, key = %key, "Failed to discard sheet image");
                }
            }
        }
        return Err(ApiError::internal(err, "Failed to record sheet image"));
    }
    Ok(())
}

async fn save_reading(
    state: &AppState,
    exam: &Exam,
    sheet_id: &str,
    reading: &SheetReading,
    student_name: Option<&str>,
) -> Result<StudentAnswerSheet, ApiError> {
    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let mut sheet = record_and_score(&mut *tx, exam, sheet_id, &reading.answers)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to score answer sheet"))?;

    let now = primitive_now_utc();
    if let Some(name) = clean_student_name(student_name) {
        sheet = repositories::answer_sheets::update_student_name(&mut *tx, sheet_id, Some(&name), now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update student name"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer sheet"))?;
    Ok(sheet)
}
