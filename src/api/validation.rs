use std::path::Path;

use validator::Validate;

use crate::api::errors::ApiError;
use crate::db::models::{AnswerMap, Exam};
use crate::services::scoring::normalize_answers;

pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(errors.to_string()))
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// Optional name: blank input clears it.
pub(crate) fn clean_student_name(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|name| !name.is_empty()).map(str::to_string)
}

/// Validates a question -> letter mapping against the exam shape.
pub(crate) fn exam_answers<'a, I>(exam: &Exam, raw: I) -> Result<AnswerMap, ApiError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    normalize_answers(raw, exam.num_questions, &exam.option_letters())
        .map_err(|err| ApiError::BadRequest(format!("Invalid answers: {err}")))
}

/// Uploads with an extension must use one of the configured ones; the content
/// itself is checked when decoding.
pub(crate) fn validate_sheet_filename(
    filename: Option<&str>,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let Some(extension) = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
    else {
        return Ok(());
    };

    if allowed_extensions.iter().any(|allowed| allowed == &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")))
    }
}
