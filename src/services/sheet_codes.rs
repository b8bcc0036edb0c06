use uuid::Uuid;

pub(crate) const SHEET_CODE_LEN: usize = 5;
const MAX_LOOKUP_CODE_LEN: usize = 20;

/// Fresh sheet code: the first five hex digits of a random UUID, upper-cased.
pub(crate) fn generate_sheet_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(SHEET_CODE_LEN);
    code.make_ascii_uppercase();
    code
}

pub(crate) fn is_valid_sheet_code(code: &str) -> bool {
    code.len() == SHEET_CODE_LEN
        && code.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_lowercase())
}

/// Canonical form of a code read from a sheet or typed by a user.
pub(crate) fn normalize_sheet_code(raw: &str) -> Option<String> {
    let code: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect::<String>().to_uppercase();
    if code.is_empty() || code.chars().count() > MAX_LOOKUP_CODE_LEN {
        return None;
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_codes_are_five_uppercase_hex_chars() {
        for _ in 0..200 {
            let code = generate_sheet_code();
            assert!(is_valid_sheet_code(&code), "unexpected code {code}");
        }
    }

    #[test]
    fn generated_codes_rarely_repeat() {
        let codes: HashSet<String> = (0..50).map(|_| generate_sheet_code()).collect();
        assert!(codes.len() > 45);
    }

    #[test]
    fn validation_rejects_lowercase_and_wrong_length() {
        assert!(is_valid_sheet_code("A1B2C"));
        assert!(!is_valid_sheet_code("a1b2c"));
        assert!(!is_valid_sheet_code("A1B2"));
        assert!(!is_valid_sheet_code("A1B2G"));
    }

    #[test]
    fn normalize_strips_spaces_and_uppercases() {
        assert_eq!(normalize_sheet_code(" a1 b2c ").as_deref(), Some("A1B2C"));
        assert_eq!(normalize_sheet_code("   "), None);
        assert_eq!(normalize_sheet_code(&"F".repeat(30)), None);
    }
}
