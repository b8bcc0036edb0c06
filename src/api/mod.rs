pub(crate) mod answer_keys;
pub(crate) mod answer_sheets;
pub(crate) mod attachments;
pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod router;
pub(crate) mod validation;
