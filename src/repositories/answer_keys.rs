use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{AnswerMap, CorrectAnswerSheet};

pub(crate) const COLUMNS: &str = "id, exam_id, answers, created_at, updated_at";

pub(crate) struct CreateAnswerKey<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) answers: &'a AnswerMap,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Inserts the key unless the exam already has one; `None` on conflict.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAnswerKey<'_>,
) -> Result<Option<CorrectAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, CorrectAnswerSheet>(&format!(
        "INSERT INTO correct_answer_sheets (id, exam_id, answers, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5)
         ON CONFLICT (exam_id) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(Json(params.answers))
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<CorrectAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, CorrectAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM correct_answer_sheets WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Option<CorrectAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, CorrectAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM correct_answer_sheets WHERE exam_id = $1"
    ))
    .bind(exam_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    exam_id: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<CorrectAnswerSheet>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM correct_answer_sheets"));

    if let Some(exam_id) = exam_id {
        builder.push(" WHERE exam_id = ");
        builder.push_bind(exam_id);
    }

    builder.push(" ORDER BY created_at DESC, id OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<CorrectAnswerSheet>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, exam_id: Option<&str>) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM correct_answer_sheets");

    if let Some(exam_id) = exam_id {
        builder.push(" WHERE exam_id = ");
        builder.push_bind(exam_id);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

pub(crate) async fn update_answers(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    answers: &AnswerMap,
    updated_at: PrimitiveDateTime,
) -> Result<CorrectAnswerSheet, sqlx::Error> {
    sqlx::query_as::<_, CorrectAnswerSheet>(&format!(
        "UPDATE correct_answer_sheets SET answers = $1, updated_at = $2
         WHERE id = $3
         RETURNING {COLUMNS}"
    ))
    .bind(Json(answers))
    .bind(updated_at)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM correct_answer_sheets WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
