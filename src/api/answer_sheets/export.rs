use axum::{extract::Query, http::HeaderMap};

use crate::api::attachments::{attachment_filename, attachment_headers, XLSX_CONTENT_TYPE};
use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::answer_sheet::ExportQuery;
use crate::services::results_export::{build_report, render_xlsx};

/// Workbook with a summary sheet and, unless `detailed=false`, per-question answers.
pub(super) async fn export_results(
    Query(params): Query<ExportQuery>,
    state: axum::extract::State<AppState>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let detailed = params.is_detailed();
    let exam_id = params
        .exam_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("exam_id is required".to_string()))?;

    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    let key = repositories::answer_keys::find_by_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer key"))?;
    let sheets = repositories::answer_sheets::list_ranked_for_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch answer sheets"))?;

    let filename = attachment_filename("results", &exam.subject_name, "xlsx");
    let rows = sheets.len();
    let workbook = tokio::task::spawn_blocking(move || {
        let report = build_report(&exam, key.as_ref().map(|key| &key.answers.0), &sheets, detailed);
        render_xlsx(&report)
    })
    .await
    .map_err(|e| ApiError::internal(e, "Export task failed"))?
    .map_err(|e| ApiError::internal(e, "Failed to build results workbook"))?;

    tracing::info!(exam_id = %exam_id, rows, detailed, "Results exported");
    Ok((attachment_headers(&filename, XLSX_CONTENT_TYPE)?, workbook))
}
