use axum::{extract::Query, http::StatusCode, Json};

use crate::api::errors::ApiError;
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::{clean_student_name, exam_answers, validate_payload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::StudentAnswerSheet;
use crate::repositories;
use crate::repositories::answer_sheets::{SheetFilter, SheetOrdering};
use crate::schemas::answer_sheet::{
    AnswerSheetCreate, AnswerSheetResponse, AnswerSheetUpdate, ListAnswerSheetsQuery,
};
use crate::services::grading::record_and_score;
use crate::services::sheet_codes::generate_sheet_code;

const MAX_CODE_ATTEMPTS: usize = 32;

fn sheet_not_found() -> ApiError {
    ApiError::NotFound("Answer sheet not found".to_string())
}

/// Attaches a presigned image URL when storage is configured.
pub(super) async fn to_response(state: &AppState, sheet: StudentAnswerSheet) -> AnswerSheetResponse {
    let url = match (state.storage(), sheet.sheet_image.as_deref()) {
        (Some(storage), Some(key)) => match storage.presign_get(key).await {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(error = %err, key, "Failed to presign sheet image");
                None
            }
        },
        _ => None,
    };
    AnswerSheetResponse::new(sheet, url)
}

pub(super) async fn list_answer_sheets(
    Query(params): Query<ListAnswerSheetsQuery>,
    state: axum::extract::State<AppState>,
) -> Result<Json<PaginatedResponse<AnswerSheetResponse>>, ApiError> {
    let ordering = match params.ordering.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => SheetOrdering::parse(value)
            .ok_or_else(|| ApiError::BadRequest(format!("Unsupported ordering '{value}'")))?,
        None => SheetOrdering::default(),
    };
    let filter = SheetFilter { exam_id: params.exam, search: params.search };

    let sheets =
        repositories::answer_sheets::list(state.db(), &filter, ordering, params.skip, params.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list answer sheets"))?;
    let total = repositories::answer_sheets::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count answer sheets"))?;

    let mut items = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        items.push(to_response(&state, sheet).await);
    }
    Ok(Json(PaginatedResponse::new(items, total, params.skip, params.limit)))
}

pub(super) async fn create_answer_sheet(
    state: axum::extract::State<AppState>,
    Json(payload): Json<AnswerSheetCreate>,
) -> Result<(StatusCode, Json<AnswerSheetResponse>), ApiError> {
    validate_payload(&payload)?;
    let student_name = clean_student_name(payload.student_name.as_deref());

    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let exam = repositories::exams::find_by_id(&mut *tx, &payload.exam)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    let answers = payload
        .student_answers
        .as_ref()
        .map(|raw| exam_answers(&exam, raw))
        .transpose()?;

    let now = primitive_now_utc();
    let mut created = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let sheet_id = uuid::Uuid::new_v4().to_string();
        let code = generate_sheet_code();
        created = repositories::answer_sheets::insert_if_code_free(
            &mut *tx,
            repositories::answer_sheets::CreateAnswerSheet {
                id: &sheet_id,
                exam_id: &exam.id,
                sheet_code: &code,
                student_name: student_name.as_deref(),
                submitted_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create answer sheet"))?;
        if created.is_some() {
            break;
        }
    }
    let mut sheet = created.ok_or_else(|| {
        ApiError::internal("code space exhausted", "Failed to allocate a unique sheet code")
    })?;

    if let Some(answers) = &answers {
        sheet = record_and_score(&mut *tx, &exam, &sheet.id, answers)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to score answer sheet"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer sheet"))?;

    tracing::info!(exam_id = %exam.id, sheet_code = %sheet.sheet_code, "Answer sheet created");
    Ok((StatusCode::CREATED, Json(AnswerSheetResponse::new(sheet, None))))
}

pub(super) async fn get_answer_sheet(
    axum::extract::Path(sheet_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<Json<AnswerSheetResponse>, ApiError> {
    let sheet = repositories::answer_sheets::find_by_id(state.db(), &sheet_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer sheet"))?
        .ok_or_else(sheet_not_found)?;

    Ok(Json(to_response(&state, sheet).await))
}

/// PUT and PATCH both touch only the fields present in the body.
pub(super) async fn update_answer_sheet(
    axum::extract::Path(sheet_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    Json(payload): Json<AnswerSheetUpdate>,
) -> Result<Json<AnswerSheetResponse>, ApiError> {
    validate_payload(&payload)?;

    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let mut sheet = repositories::answer_sheets::find_by_id(&mut *tx, &sheet_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer sheet"))?
        .ok_or_else(sheet_not_found)?;

    if let Some(name) = payload.student_name.as_deref() {
        sheet = repositories::answer_sheets::update_student_name(
            &mut *tx,
            &sheet.id,
            clean_student_name(Some(name)).as_deref(),
            primitive_now_utc(),
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update answer sheet"))?;
    }

    if let Some(raw) = &payload.student_answers {
        let exam = repositories::exams::find_by_id(&mut *tx, &sheet.exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
            .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
        let answers = exam_answers(&exam, raw)?;
        sheet = record_and_score(&mut *tx, &exam, &sheet.id, &answers)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to score answer sheet"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer sheet"))?;

    Ok(Json(to_response(&state, sheet).await))
}

pub(super) async fn delete_answer_sheet(
    axum::extract::Path(sheet_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<StatusCode, ApiError> {
    let sheet = repositories::answer_sheets::delete_by_id(state.db(), &sheet_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete answer sheet"))?
        .ok_or_else(sheet_not_found)?;

    if let (Some(storage), Some(key)) = (state.storage(), sheet.sheet_image.as_deref()) {
        if let Err(err) = storage.delete_object(key).await {
            tracing::warn!(error = %err, key, "Failed to delete sheet image");
        }
    }

    tracing::info!(sheet_id = %sheet.id, sheet_code = %sheet.sheet_code, "Answer sheet deleted");
    Ok(StatusCode::NO_CONTENT)
}
