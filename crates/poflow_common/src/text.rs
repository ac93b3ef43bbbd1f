/// Tokens spreadsheet exports and dataframe dumps use for "no value".
const NULL_TOKENS: &[&str] = &["nan", "none", "null", "nat", "n/a", "#n/a", "-"];

pub fn is_null_token(s: &str) -> bool {
    let lowered = s.trim().to_lowercase();
    NULL_TOKENS.contains(&lowered.as_str())
}

/// Trims a text cell; empty and null-like values become `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_null_token(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Cleans an identifier cell (PO, requisition, material codes).
///
/// Spreadsheets routinely turn `4500123` into `4500123.0`; the trailing zero
/// fraction is dropped so the same key matches across CSV and XLSX sources.
pub fn clean_code(raw: &str) -> Option<String> {
    let text = clean_text(raw)?;
    if let Some(int_part) = text.strip_suffix(".0").or_else(|| text.strip_suffix(",0"))
        && !int_part.is_empty()
        && int_part.chars().all(|c| c.is_ascii_digit())
    {
        return Some(int_part.to_string());
    }
    Some(text)
}

/// Renders a float cell used as an identifier.
pub fn code_from_f64(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{}", value as i64))
    } else {
        Some(format!("{}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_cleanup() {
        assert_eq!(clean_text("  Filtro  "), Some("Filtro".to_string()));
        assert_eq!(clean_text(""), None);
        assert_eq!(clean_text("NaN"), None);
        assert_eq!(clean_text("None"), None);
    }

    #[test]
    fn code_cleanup() {
        assert_eq!(clean_code("4500123.0"), Some("4500123".to_string()));
        assert_eq!(clean_code("OC-1"), Some("OC-1".to_string()));
        assert_eq!(clean_code("12.5"), Some("12.5".to_string()));
        assert_eq!(code_from_f64(4500123.0), Some("4500123".to_string()));
        assert_eq!(code_from_f64(f64::NAN), None);
    }
}
