pub(crate) mod ai_reader;
pub(crate) mod grading;
pub(crate) mod results_export;
pub(crate) mod scoring;
pub(crate) mod sheet_codes;
pub(crate) mod sheet_decode;
pub(crate) mod sheet_pdf;
pub(crate) mod sheet_reading;
pub(crate) mod sheet_vision;
pub(crate) mod storage;
