use sqlx::PgConnection;

use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerMap, Exam, StudentAnswerSheet};
use crate::repositories;
use crate::services::scoring::score_answers;

/// Stores a sheet's answers and scores them when the exam has a key.
pub(crate) async fn record_and_score(
    conn: &mut PgConnection,
    exam: &Exam,
    sheet_id: &str,
    answers: &AnswerMap,
) -> Result<StudentAnswerSheet, sqlx::Error> {
    let now = primitive_now_utc();
    let sheet = repositories::answer_sheets::record_answers(&mut *conn, sheet_id, answers, now).await?;

    let Some(key) = repositories::answer_keys::find_by_exam(&mut *conn, &exam.id).await? else {
        tracing::debug!(exam_id = %exam.id, sheet_id, "No answer key yet, scoring skipped");
        return Ok(sheet);
    };

    let score = score_answers(answers, &key.answers.0, exam.num_questions);
    repositories::answer_sheets::update_score(&mut *conn, sheet_id, score, now).await
}

/// Rescores every answered sheet of the exam against `key`.
pub(crate) async fn rescore_exam(
    conn: &mut PgConnection,
    exam: &Exam,
    key: &AnswerMap,
) -> Result<usize, sqlx::Error> {
    let sheets = repositories::answer_sheets::list_answered_for_exam(&mut *conn, &exam.id).await?;
    let now = primitive_now_utc();

    let mut rescored = 0;
    for sheet in &sheets {
        let Some(answers) = &sheet.student_answers else {
            continue;
        };
        let score = score_answers(&answers.0, key, exam.num_questions);
        repositories::answer_sheets::update_score(&mut *conn, &sheet.id, score, now).await?;
        rescored += 1;
    }

    tracing::info!(exam_id = %exam.id, rescored, "Rescored answer sheets");
    Ok(rescored)
}
