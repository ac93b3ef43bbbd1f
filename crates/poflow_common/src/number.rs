use rust_decimal::Decimal;
use std::str::FromStr;

use crate::text::is_null_token;

/// Parses a number written either with a dot decimal separator (`1234.56`,
/// `1,234.56`) or in the pt-BR style (`1.234,56`, `1234,56`).
///
/// Currency prefixes and embedded spaces are tolerated. Anything that still
/// does not look like a number yields `None`.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_null_token(trimmed) {
        return None;
    }

    let mut cleaned: String = trimmed
        .trim_start_matches("R$")
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();

    let negative_parens = cleaned.starts_with('(') && cleaned.ends_with(')');
    if negative_parens {
        cleaned = format!("-{}", &cleaned[1..cleaned.len() - 1]);
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => {
            if cleaned.matches(',').count() > 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (Some(_), None) => {
            if cleaned.matches('.').count() > 1 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    if !canonical
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
    {
        return Decimal::from_scientific(&canonical).ok();
    }

    Decimal::from_str(&canonical).ok()
}

/// Like [`parse_decimal`], but for counts: a lone dot followed by exactly three
/// digits is a pt-BR thousands separator, so `1.500` is 1500 and not 1.5.
pub fn parse_quantity(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if let Some((int, frac)) = digits.split_once('.')
        && (1..=3).contains(&int.len())
        && frac.len() == 3
        && int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit())
    {
        return parse_decimal(&trimmed.replace('.', ""));
    }
    parse_decimal(trimmed)
}

/// Converts a spreadsheet float into a decimal using its shortest textual form,
/// so `0.1` stays `0.1` instead of picking up binary noise.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    let text = format!("{}", value);
    Decimal::from_str(&text)
        .ok()
        .or_else(|| Decimal::from_scientific(&format!("{:e}", value)).ok())
}

/// Renders a decimal without trailing zeros. Used wherever values are
/// compared or stored as text.
pub fn format_decimal(value: &Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_dot_and_comma_forms() {
        assert_eq!(parse_decimal("1234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal("1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal("1234,5"), Some(dec!(1234.5)));
        assert_eq!(parse_decimal("1.234.567"), Some(dec!(1234567)));
        assert_eq!(parse_decimal("R$ 2.000,00"), Some(dec!(2000)));
        assert_eq!(parse_decimal("(10,50)"), Some(dec!(-10.5)));
    }

    #[test]
    fn quantities_read_lone_dot_as_thousands() {
        assert_eq!(parse_quantity("1.500"), Some(dec!(1500)));
        assert_eq!(parse_quantity("12.000"), Some(dec!(12000)));
        assert_eq!(parse_quantity("1.5"), Some(dec!(1.5)));
        assert_eq!(parse_quantity("2.25"), Some(dec!(2.25)));
        assert_eq!(parse_quantity("1.500,5"), Some(dec!(1500.5)));
        assert_eq!(parse_quantity("0,250"), Some(dec!(0.25)));
        assert_eq!(parse_decimal("1.500"), Some(dec!(1.5)));
    }

    #[test]
    fn null_like_values_become_none() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("  "), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("None"), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn floats_keep_their_short_form() {
        assert_eq!(decimal_from_f64(0.1), Some(dec!(0.1)));
        assert_eq!(decimal_from_f64(150.0), Some(dec!(150)));
        assert_eq!(decimal_from_f64(f64::NAN), None);
        assert_eq!(format_decimal(&dec!(100.00)), "100");
    }
}
