use axum::{extract::Query, http::StatusCode, Json};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::pagination::{default_limit, PaginatedResponse};
use crate::api::validation::{exam_answers, require_text, validate_payload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::exam::{ExamCreate, ExamResponse, ExamUpdate};
use crate::services::grading::rescore_exam;

#[derive(Debug, Deserialize)]
pub(super) struct ListExamsQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub(super) async fn create_exam(
    state: axum::extract::State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_payload(&payload)?;
    let subject_name = require_text(&payload.subject_name, "subject_name")?;

    let now = primitive_now_utc();
    let exam_id = uuid::Uuid::new_v4().to_string();
    let exam = repositories::exams::create(
        state.db(),
        repositories::exams::CreateExam {
            id: &exam_id,
            subject_name: &subject_name,
            num_questions: payload.num_questions,
            num_options: payload.num_options,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(
        exam_id = %exam.id,
        num_questions = exam.num_questions,
        num_options = exam.num_options,
        "Exam created"
    );

    Ok((StatusCode::CREATED, Json(ExamResponse::from(exam))))
}

pub(super) async fn list_exams(
    Query(params): Query<ListExamsQuery>,
    state: axum::extract::State<AppState>,
) -> Result<Json<PaginatedResponse<ExamResponse>>, ApiError> {
    let exams = repositories::exams::list(state.db(), params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total = repositories::exams::count(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    let items = exams.into_iter().map(ExamResponse::from).collect();
    Ok(Json(PaginatedResponse::new(items, total, params.skip, params.limit)))
}

pub(super) async fn get_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    Ok(Json(ExamResponse::from(exam)))
}

pub(super) async fn replace_exam(
    path: axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<Json<ExamResponse>, ApiError> {
    validate_payload(&payload)?;
    apply_update(path, state, ExamUpdate::from(payload)).await
}

pub(super) async fn update_exam(
    path: axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    validate_payload(&payload)?;
    apply_update(path, state, payload).await
}

/// Changing the shape re-validates the stored key and rescores when the question
/// count moves.
async fn apply_update(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    payload: ExamUpdate,
) -> Result<Json<ExamResponse>, ApiError> {
    let subject_name =
        payload.subject_name.as_deref().map(|s| require_text(s, "subject_name")).transpose()?;

    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let exam = repositories::exams::find_for_update(&mut *tx, &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let mut reshaped = exam.clone();
    reshaped.num_questions = payload.num_questions.unwrap_or(exam.num_questions);
    reshaped.num_options = payload.num_options.unwrap_or(exam.num_options);
    let shape_changed =
        reshaped.num_questions != exam.num_questions || reshaped.num_options != exam.num_options;

    let key = repositories::answer_keys::find_by_exam(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer key"))?;

    if let (true, Some(key)) = (shape_changed, key.as_ref()) {
        exam_answers(&reshaped, key.answers.0.iter()).map_err(|_| {
            ApiError::BadRequest(
                "The answer key does not fit the new exam shape; update the key first".to_string(),
            )
        })?;
    }

    let updated = repositories::exams::update(
        &mut *tx,
        &exam.id,
        repositories::exams::UpdateExam {
            subject_name,
            num_questions: payload.num_questions,
            num_options: payload.num_options,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    if let (true, Some(key)) = (updated.num_questions != exam.num_questions, key.as_ref()) {
        rescore_exam(&mut *tx, &updated, &key.answers.0)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to rescore answer sheets"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit exam update"))?;

    Ok(Json(ExamResponse::from(updated)))
}

pub(super) async fn delete_exam(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<StatusCode, ApiError> {
    let images: Vec<String> = repositories::answer_sheets::list_ranked_for_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer sheets"))?
        .into_iter()
        .filter_map(|sheet| sheet.sheet_image)
        .collect();

    let deleted = repositories::exams::delete_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;
    if !deleted {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    if let Some(storage) = state.storage() {
        for key in &images {
            if let Err(err) = storage.delete_object(key).await {
                tracing::warn!(error = %err, key = %key, "Failed to delete sheet image");
            }
        }
    }

    tracing::info!(exam_id = %exam_id, images = images.len(), "Exam deleted");
    Ok(StatusCode::NO_CONTENT)
}
