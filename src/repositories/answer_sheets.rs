use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{AnswerMap, StudentAnswerSheet};
use crate::services::scoring::ScoreSummary;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, sheet_code, student_name, student_answers, correct_items, \
    incorrect_items, accuracy_percentage, sheet_image, submitted_at, updated_at";

pub(crate) struct CreateAnswerSheet<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) sheet_code: &'a str,
    pub(crate) student_name: Option<&'a str>,
    pub(crate) submitted_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SheetOrdering {
    SubmittedAtAsc,
    #[default]
    SubmittedAtDesc,
    AccuracyAsc,
    AccuracyDesc,
    SheetCodeAsc,
    SheetCodeDesc,
}

impl SheetOrdering {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted_at" => Some(Self::SubmittedAtAsc),
            "-submitted_at" => Some(Self::SubmittedAtDesc),
            "accuracy_percentage" => Some(Self::AccuracyAsc),
            "-accuracy_percentage" => Some(Self::AccuracyDesc),
            "sheet_code" => Some(Self::SheetCodeAsc),
            "-sheet_code" => Some(Self::SheetCodeDesc),
            _ => None,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::SubmittedAtAsc => "submitted_at ASC, id",
            Self::SubmittedAtDesc => "submitted_at DESC, id",
            Self::AccuracyAsc => "accuracy_percentage ASC, submitted_at DESC, id",
            Self::AccuracyDesc => "accuracy_percentage DESC, submitted_at DESC, id",
            Self::SheetCodeAsc => "sheet_code ASC",
            Self::SheetCodeDesc => "sheet_code DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SheetFilter {
    pub(crate) exam_id: Option<String>,
    /// Case-insensitive substring of the sheet code.
    pub(crate) search: Option<String>,
}

/// Inserts a sheet unless its code is taken; `None` on a code collision.
pub(crate) async fn insert_if_code_free(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAnswerSheet<'_>,
) -> Result<Option<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "INSERT INTO student_answer_sheets (
            id, exam_id, sheet_code, student_name, submitted_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$5)
         ON CONFLICT (sheet_code) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.sheet_code)
    .bind(params.student_name)
    .bind(params.submitted_at)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM student_answer_sheets WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_code(
    executor: impl sqlx::PgExecutor<'_>,
    sheet_code: &str,
) -> Result<Option<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM student_answer_sheets WHERE sheet_code = $1"
    ))
    .bind(sheet_code)
    .fetch_optional(executor)
    .await
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &SheetFilter) {
    let mut separator = " WHERE ";

    if let Some(exam_id) = &filter.exam_id {
        builder.push(separator);
        builder.push("exam_id = ");
        builder.push_bind(exam_id.clone());
        separator = " AND ";
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(separator);
        builder.push("sheet_code ILIKE ");
        builder.push_bind(format!("%{}%", escape_like(search)));
    }
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &SheetFilter,
    ordering: SheetOrdering,
    skip: i64,
    limit: i64,
) -> Result<Vec<StudentAnswerSheet>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM student_answer_sheets"));
    push_filter(&mut builder, filter);

    builder.push(" ORDER BY ");
    builder.push(ordering.order_by());
    builder.push(" OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<StudentAnswerSheet>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &SheetFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM student_answer_sheets");
    push_filter(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Every sheet of an exam, best accuracy first, latest submission breaking ties.
pub(crate) async fn list_ranked_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM student_answer_sheets
         WHERE exam_id = $1
         ORDER BY accuracy_percentage DESC, submitted_at DESC, sheet_code"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_answered_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM student_answer_sheets
         WHERE exam_id = $1 AND student_answers IS NOT NULL"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn update_student_name(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    student_name: Option<&str>,
    updated_at: PrimitiveDateTime,
) -> Result<StudentAnswerSheet, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "UPDATE student_answer_sheets SET student_name = $1, updated_at = $2
         WHERE id = $3
         RETURNING {COLUMNS}"
    ))
    .bind(student_name)
    .bind(updated_at)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn record_answers(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    answers: &AnswerMap,
    updated_at: PrimitiveDateTime,
) -> Result<StudentAnswerSheet, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "UPDATE student_answer_sheets SET student_answers = $1, updated_at = $2
         WHERE id = $3
         RETURNING {COLUMNS}"
    ))
    .bind(Json(answers))
    .bind(updated_at)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_score(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: ScoreSummary,
    updated_at: PrimitiveDateTime,
) -> Result<StudentAnswerSheet, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "UPDATE student_answer_sheets SET
            correct_items = $1,
            incorrect_items = $2,
            accuracy_percentage = $3,
            updated_at = $4
         WHERE id = $5
         RETURNING {COLUMNS}"
    ))
    .bind(score.correct_items)
    .bind(score.incorrect_items)
    .bind(score.accuracy_percentage)
    .bind(updated_at)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn set_image(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    image_key: &str,
    updated_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE student_answer_sheets SET sheet_image = $1, updated_at = $2 WHERE id = $3")
        .bind(image_key)
        .bind(updated_at)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<StudentAnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, StudentAnswerSheet>(&format!(
        "DELETE FROM student_answer_sheets WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_parses_known_fields() {
        assert_eq!(SheetOrdering::parse("-accuracy_percentage"), Some(SheetOrdering::AccuracyDesc));
        assert_eq!(SheetOrdering::parse("sheet_code"), Some(SheetOrdering::SheetCodeAsc));
        assert_eq!(SheetOrdering::parse("student_name"), None);
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("A_%"), "A\\_\\%");
    }

    #[test]
    fn filter_builds_where_clause() {
        let filter = SheetFilter { exam_id: Some("e1".to_string()), search: Some(" ab ".to_string()) };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM student_answer_sheets");
        push_filter(&mut builder, &filter);
        assert_eq!(
            builder.sql(),
            "SELECT 1 FROM student_answer_sheets WHERE exam_id = $1 AND sheet_code ILIKE $2"
        );
    }
}
