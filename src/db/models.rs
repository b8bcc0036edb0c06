use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

/// Question number (as a decimal string) to option letter.
pub(crate) type AnswerMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) subject_name: String,
    pub(crate) num_questions: i32,
    pub(crate) num_options: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CorrectAnswerSheet {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) answers: Json<AnswerMap>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentAnswerSheet {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) sheet_code: String,
    pub(crate) student_name: Option<String>,
    pub(crate) student_answers: Option<Json<AnswerMap>>,
    pub(crate) correct_items: i32,
    pub(crate) incorrect_items: i32,
    pub(crate) accuracy_percentage: f64,
    pub(crate) sheet_image: Option<String>,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Exam {
    /// Option letters for this exam: `A`, `B`, ... up to `num_options`.
    pub(crate) fn option_letters(&self) -> Vec<String> {
        option_letters(self.num_options)
    }
}

pub(crate) fn option_letters(num_options: i32) -> Vec<String> {
    (0..num_options.clamp(0, 26) as u8).map(|index| char::from(b'A' + index).to_string()).collect()
}
