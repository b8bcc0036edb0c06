use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{AnswerMap, CorrectAnswerSheet};

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerKeyCreate {
    #[serde(alias = "exam_id")]
    pub(crate) exam: String,
    pub(crate) answers: BTreeMap<String, String>,
}

/// Body of PUT: the whole key is replaced.
#[derive(Debug, Deserialize)]
pub(crate) struct AnswerKeyReplace {
    #[serde(default, alias = "exam_id")]
    pub(crate) exam: Option<String>,
    pub(crate) answers: BTreeMap<String, String>,
}

/// Body of PATCH: entries are merged, a blank letter removes the question.
#[derive(Debug, Deserialize)]
pub(crate) struct AnswerKeyPatch {
    #[serde(default)]
    pub(crate) answers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyResponse {
    pub(crate) id: String,
    pub(crate) exam: String,
    pub(crate) answers: AnswerMap,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<CorrectAnswerSheet> for AnswerKeyResponse {
    fn from(key: CorrectAnswerSheet) -> Self {
        Self {
            id: key.id,
            exam: key.exam_id,
            answers: key.answers.0,
            created_at: format_primitive(key.created_at),
            updated_at: format_primitive(key.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAnswerKeysQuery {
    #[serde(default, alias = "exam_id")]
    pub(crate) exam: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}
