use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Exam;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[serde(alias = "subjectName")]
    #[validate(length(min = 1, max = 255, message = "subject_name must be 1-255 characters"))]
    pub(crate) subject_name: String,
    #[serde(alias = "numQuestions")]
    #[validate(range(min = 0, message = "num_questions must be non-negative"))]
    pub(crate) num_questions: i32,
    #[serde(alias = "numOptions")]
    #[validate(range(min = 1, max = 26, message = "num_options must be between 1 and 26"))]
    pub(crate) num_options: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default, alias = "subjectName")]
    #[validate(length(min = 1, max = 255, message = "subject_name must be 1-255 characters"))]
    pub(crate) subject_name: Option<String>,
    #[serde(default, alias = "numQuestions")]
    #[validate(range(min = 0, message = "num_questions must be non-negative"))]
    pub(crate) num_questions: Option<i32>,
    #[serde(default, alias = "numOptions")]
    #[validate(range(min = 1, max = 26, message = "num_options must be between 1 and 26"))]
    pub(crate) num_options: Option<i32>,
}

impl From<ExamCreate> for ExamUpdate {
    fn from(value: ExamCreate) -> Self {
        Self {
            subject_name: Some(value.subject_name),
            num_questions: Some(value.num_questions),
            num_options: Some(value.num_options),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) subject_name: String,
    pub(crate) num_questions: i32,
    pub(crate) num_options: i32,
    pub(crate) option_letters: Vec<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            option_letters: exam.option_letters(),
            id: exam.id,
            subject_name: exam.subject_name,
            num_questions: exam.num_questions,
            num_options: exam.num_options,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
        }
    }
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateSheetsRequest {
    #[serde(default = "default_quantity")]
    pub(crate) quantity: u32,
}
