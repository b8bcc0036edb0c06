use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerMap, StudentAnswerSheet};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSheetCreate {
    #[serde(alias = "exam_id")]
    pub(crate) exam: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "student_name must be at most 255 characters"))]
    pub(crate) student_name: Option<String>,
    #[serde(default)]
    pub(crate) student_answers: Option<BTreeMap<String, String>>,
}

/// Editable fields; the code and the computed score are never accepted.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct AnswerSheetUpdate {
    #[serde(default)]
    #[validate(length(max = 255, message = "student_name must be at most 255 characters"))]
    pub(crate) student_name: Option<String>,
    #[serde(default)]
    pub(crate) student_answers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerSheetResponse {
    pub(crate) id: String,
    pub(crate) exam: String,
    pub(crate) sheet_code: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_answers: Option<AnswerMap>,
    pub(crate) correct_items: i32,
    pub(crate) incorrect_items: i32,
    pub(crate) accuracy_percentage: f64,
    pub(crate) sheet_image: Option<String>,
    pub(crate) sheet_image_url: Option<String>,
    pub(crate) submitted_at: String,
    pub(crate) updated_at: String,
}

impl AnswerSheetResponse {
    pub(crate) fn new(sheet: StudentAnswerSheet, sheet_image_url: Option<String>) -> Self {
        Self {
            id: sheet.id,
            exam: sheet.exam_id,
            sheet_code: sheet.sheet_code,
            student_name: sheet.student_name,
            student_answers: sheet.student_answers.map(|answers| answers.0),
            correct_items: sheet.correct_items,
            incorrect_items: sheet.incorrect_items,
            accuracy_percentage: sheet.accuracy_percentage,
            sheet_image: sheet.sheet_image,
            sheet_image_url,
            submitted_at: format_primitive(sheet.submitted_at),
            updated_at: format_primitive(sheet.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) message: String,
    pub(crate) sheet_code: String,
    pub(crate) detected_answers: AnswerMap,
    pub(crate) correct_items: i32,
    pub(crate) incorrect_items: i32,
    pub(crate) accuracy_percentage: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAnswerSheetsQuery {
    #[serde(default, alias = "exam_id")]
    pub(crate) exam: Option<String>,
    #[serde(default)]
    pub(crate) search: Option<String>,
    #[serde(default)]
    pub(crate) ordering: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportQuery {
    #[serde(default)]
    pub(crate) exam_id: Option<String>,
    #[serde(default)]
    pub(crate) detailed: Option<String>,
}

impl ExportQuery {
    /// Detailed unless explicitly switched off.
    pub(crate) fn is_detailed(&self) -> bool {
        self.detailed.as_deref().map_or(true, |value| value.trim().eq_ignore_ascii_case("true"))
    }
}
