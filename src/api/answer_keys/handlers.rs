use std::collections::BTreeMap;

use axum::{extract::Query, http::StatusCode, Json};
use sqlx::{PgConnection, Postgres, Transaction};

use crate::api::errors::ApiError;
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::exam_answers;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerMap, CorrectAnswerSheet, Exam};
use crate::repositories;
use crate::schemas::answer_key::{
    AnswerKeyCreate, AnswerKeyPatch, AnswerKeyReplace, AnswerKeyResponse, ListAnswerKeysQuery,
};
use crate::services::grading::rescore_exam;

fn exam_not_found() -> ApiError {
    ApiError::NotFound("Exam not found".to_string())
}

fn key_not_found() -> ApiError {
    ApiError::NotFound("Answer key not found".to_string())
}

pub(super) async fn create_answer_key(
    state: axum::extract::State<AppState>,
    Json(payload): Json<AnswerKeyCreate>,
) -> Result<(StatusCode, Json<AnswerKeyResponse>), ApiError> {
    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let exam = repositories::exams::find_for_update(&mut *tx, &payload.exam)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(exam_not_found)?;
    let answers = exam_answers(&exam, &payload.answers)?;

    let now = primitive_now_utc();
    let key_id = uuid::Uuid::new_v4().to_string();
    let key = repositories::answer_keys::create(
        &mut *tx,
        repositories::answer_keys::CreateAnswerKey {
            id: &key_id,
            exam_id: &exam.id,
            answers: &answers,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create answer key"))?
    .ok_or_else(|| ApiError::Conflict("This exam already has an answer key".to_string()))?;

    rescore_exam(&mut *tx, &exam, &answers)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to rescore answer sheets"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer key"))?;

    tracing::info!(exam_id = %exam.id, key_id = %key.id, entries = answers.len(), "Answer key created");
    Ok((StatusCode::CREATED, Json(AnswerKeyResponse::from(key))))
}

pub(super) async fn list_answer_keys(
    Query(params): Query<ListAnswerKeysQuery>,
    state: axum::extract::State<AppState>,
) -> Result<Json<PaginatedResponse<AnswerKeyResponse>>, ApiError> {
    let exam = params.exam.as_deref();
    let keys = repositories::answer_keys::list(state.db(), exam, params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list answer keys"))?;
    let total = repositories::answer_keys::count(state.db(), exam)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count answer keys"))?;

    let items = keys.into_iter().map(AnswerKeyResponse::from).collect();
    Ok(Json(PaginatedResponse::new(items, total, params.skip, params.limit)))
}

pub(super) async fn get_answer_key(
    axum::extract::Path(key_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    let key = repositories::answer_keys::find_by_id(state.db(), &key_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer key"))?
        .ok_or_else(key_not_found)?;

    Ok(Json(AnswerKeyResponse::from(key)))
}

pub(super) async fn replace_answer_key(
    axum::extract::Path(key_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    Json(payload): Json<AnswerKeyReplace>,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    let (key, exam) = load_key_and_exam(&mut tx, &key_id).await?;

    if payload.exam.as_deref().is_some_and(|exam_id| exam_id != key.exam_id) {
        return Err(ApiError::BadRequest("An answer key cannot be moved to another exam".to_string()));
    }

    let answers = exam_answers(&exam, &payload.answers)?;
    let key = save_answers(&mut *tx, &exam, &key.id, &answers).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer key"))?;

    Ok(Json(AnswerKeyResponse::from(key)))
}

pub(super) async fn patch_answer_key(
    axum::extract::Path(key_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    Json(payload): Json<AnswerKeyPatch>,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    let (key, exam) = load_key_and_exam(&mut tx, &key_id).await?;

    let answers = merge_answers(&exam, key.answers.0, &payload.answers)?;
    let key = save_answers(&mut *tx, &exam, &key.id, &answers).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer key"))?;

    Ok(Json(AnswerKeyResponse::from(key)))
}

/// Sheets keep their last computed counters when the key goes away.
pub(super) async fn delete_answer_key(
    axum::extract::Path(key_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::answer_keys::delete_by_id(state.db(), &key_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete answer key"))?;
    if !deleted {
        return Err(key_not_found());
    }

    tracing::info!(key_id = %key_id, "Answer key deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_key_and_exam(
    tx: &mut Transaction<'_, Postgres>,
    key_id: &str,
) -> Result<(CorrectAnswerSheet, Exam), ApiError> {
    let key = repositories::answer_keys::find_by_id(&mut **tx, key_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer key"))?
        .ok_or_else(key_not_found)?;
    let exam = repositories::exams::find_for_update(&mut **tx, &key.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(exam_not_found)?;
    Ok((key, exam))
}

async fn save_answers(
    conn: &mut PgConnection,
    exam: &Exam,
    key_id: &str,
    answers: &AnswerMap,
) -> Result<CorrectAnswerSheet, ApiError> {
    let key = repositories::answer_keys::update_answers(&mut *conn, key_id, answers, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update answer key"))?;
    rescore_exam(conn, exam, answers)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to rescore answer sheets"))?;

    tracing::info!(exam_id = %exam.id, key_id = %key.id, entries = answers.len(), "Answer key updated");
    Ok(key)
}

/// Non-blank entries overwrite, blank entries remove the question.
fn merge_answers(
    exam: &Exam,
    mut current: AnswerMap,
    patch: &BTreeMap<String, String>,
) -> Result<AnswerMap, ApiError> {
    let (cleared, updated): (Vec<_>, Vec<_>) =
        patch.iter().partition(|(_, value)| value.trim().is_empty());

    for (question, _) in cleared {
        let number: u32 = question
            .trim()
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid answers: '{question}' is not a question number")))?;
        current.remove(&number.to_string());
    }

    current.extend(exam_answers(exam, updated)?);
    Ok(current)
}
