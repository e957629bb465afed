//! Coerce-or-default(0) for raw sensor and form values.
//!
//! The bridge sends loosely typed JSON and the manual test form holds plain
//! text. Both are turned into `f64` here before anything is compared, so the
//! classifier itself only ever sees finite-or-infinite numbers, never NaN.

use serde_json::Value;

/// Returns the numeric value of `value` if it has one.
///
/// Numbers pass through; strings holding a number (surrounding whitespace
/// allowed) are parsed. `null`, booleans, blank strings, arrays and objects
/// have no numeric value here. NaN never comes back.
pub fn numeric_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| !v.is_nan())
}

/// Parses a form field, treating blank or unparseable text as `0.0`.
pub fn parse_or_zero(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_nan() => v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_and_numeric_strings_have_values() {
        assert_eq!(numeric_value(&json!(7.25)), Some(7.25));
        assert_eq!(numeric_value(&json!(12)), Some(12.0));
        assert_eq!(numeric_value(&json!(" 6.8 ")), Some(6.8));
    }

    #[test]
    fn test_non_numeric_values_have_none() {
        assert_eq!(numeric_value(&Value::Null), None);
        assert_eq!(numeric_value(&json!("")), None);
        assert_eq!(numeric_value(&json!("abc")), None);
        assert_eq!(numeric_value(&json!("NaN")), None);
        assert_eq!(numeric_value(&json!([1, 2])), None);
        assert_eq!(numeric_value(&json!(true)), None);
    }

    #[test]
    fn test_parse_or_zero_handles_blank_form_fields() {
        assert_eq!(parse_or_zero(""), 0.0);
        assert_eq!(parse_or_zero("   "), 0.0);
        assert_eq!(parse_or_zero("7.5"), 7.5);
        assert_eq!(parse_or_zero("seven"), 0.0);
        assert_eq!(parse_or_zero("-2"), -2.0);
    }
}
