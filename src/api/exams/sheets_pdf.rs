use axum::{body::Bytes, http::HeaderMap};

use crate::api::attachments::{attachment_filename, attachment_headers, insert_header, PDF_CONTENT_TYPE};
use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::exam::GenerateSheetsRequest;
use crate::services::sheet_codes::generate_sheet_code;
use crate::services::sheet_pdf::render_answer_sheets;

const MAX_CODE_ATTEMPTS: usize = 32;
const SHEET_CODES_HEADER: &str = "x-sheet-codes";

fn parse_request(body: &[u8]) -> Result<GenerateSheetsRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateSheetsRequest { quantity: 1 });
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

/// Registers `quantity` blank sheets with fresh codes and returns them as one PDF.
pub(super) async fn generate_answer_sheets(
    axum::extract::Path(exam_id): axum::extract::Path<String>,
    state: axum::extract::State<AppState>,
    body: Bytes,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let request = parse_request(&body)?;
    let max_quantity = state.settings().sheets().max_sheets_per_batch;
    if request.quantity == 0 || request.quantity > max_quantity {
        return Err(ApiError::BadRequest(format!("quantity must be between 1 and {max_quantity}")));
    }

    let mut tx = state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let exam = repositories::exams::find_by_id(&mut *tx, &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let now = primitive_now_utc();
    let mut codes = Vec::with_capacity(request.quantity as usize);
    for _ in 0..request.quantity {
        let mut created = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_sheet_code();
            let sheet_id = uuid::Uuid::new_v4().to_string();
            created = repositories::answer_sheets::insert_if_code_free(
                &mut *tx,
                repositories::answer_sheets::CreateAnswerSheet {
                    id: &sheet_id,
                    exam_id: &exam.id,
                    sheet_code: &code,
                    student_name: None,
                    submitted_at: now,
                },
            )
            .await
            .map_err(|e| ApiError::internal(e, "Failed to register answer sheet"))?;
            if created.is_some() {
                break;
            }
            tracing::debug!(code = %code, "Sheet code collision, regenerating");
        }

        let sheet = created.ok_or_else(|| ApiError::internal("code space exhausted", "Failed to allocate a unique sheet code"))?;
        codes.push(sheet.sheet_code);
    }

    let subject = exam.subject_name.clone();
    let (num_questions, num_options) = (exam.num_questions, exam.num_options);
    let render_codes = codes.clone();
    let pdf = tokio::task::spawn_blocking(move || {
        render_answer_sheets(&subject, num_questions, num_options, &render_codes)
    })
    .await
    .map_err(|e| ApiError::internal(e, "Answer sheet rendering task failed"))?
    .map_err(|e| ApiError::internal(e, "Failed to render answer sheets"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit answer sheets"))?;

    tracing::info!(exam_id = %exam.id, quantity = codes.len(), "Answer sheets generated");

    let filename = attachment_filename("answer_sheets", &exam.subject_name, "pdf");
    let mut headers = attachment_headers(&filename, PDF_CONTENT_TYPE)?;
    insert_header(&mut headers, SHEET_CODES_HEADER, &codes.join(","))?;
    Ok((headers, pdf))
}
