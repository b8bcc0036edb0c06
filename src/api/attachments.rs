use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::api::errors::ApiError;

pub(crate) const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub(crate) const PDF_CONTENT_TYPE: &str = "application/pdf";

/// `<prefix>_<subject>.<extension>` with the subject reduced to a header-safe form.
pub(crate) fn attachment_filename(prefix: &str, subject: &str, extension: &str) -> String {
    let subject: String = subject
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    format!("{prefix}_{subject}.{extension}")
}

pub(crate) fn attachment_headers(filename: &str, content_type: &'static str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|err| ApiError::internal(err, "Failed to build attachment header"))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(headers)
}

pub(crate) fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|err| ApiError::internal(err, "Failed to build response header"))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_header_safe() {
        assert_eq!(attachment_filename("results", "Física \"II\"", "xlsx"), "results_F_sica__II_.xlsx");
        assert_eq!(attachment_filename("answer_sheets", "Math-1", "pdf"), "answer_sheets_Math-1.pdf");
    }

    #[test]
    fn attachment_headers_set_disposition() {
        let headers = attachment_headers("results_Math.xlsx", XLSX_CONTENT_TYPE).expect("headers");
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
            Some("attachment; filename=\"results_Math.xlsx\"")
        );
    }
}
