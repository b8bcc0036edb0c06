pub(crate) mod answer_keys;
pub(crate) mod answer_sheets;
pub(crate) mod exams;
pub(crate) mod health;
