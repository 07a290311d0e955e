//! Built-in value transforms that need no destination lookups

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

use super::value::value_as_i64;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Unix seconds or a date string to `YYYY-MM-DD HH:MM:SS` (UTC)
///
/// Zero, blank and NULL become NULL. Strings that parse as neither
/// the destination format nor RFC 3339 pass through unchanged.
pub fn datetime(value: &Value) -> Value {
    if let Value::String(s) = value {
        let s = s.trim();
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
            return Value::String(parsed.format(DATETIME_FORMAT).to_string());
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
            return Value::String(parsed.naive_utc().format(DATETIME_FORMAT).to_string());
        }
        if s.parse::<i64>().is_err() {
            return Value::String(s.to_string());
        }
    }

    match value_as_i64(value) {
        Some(0) | None => Value::Null,
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .map(|dt| Value::String(dt.naive_utc().format(DATETIME_FORMAT).to_string()))
            .unwrap_or(Value::Null),
    }
}

/// Lowercase ASCII slug; runs of other characters collapse to one dash
pub fn slug(value: &Value) -> Value {
    let text = match value {
        Value::Null => return Value::Null,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }

    Value::String(out)
}

/// Normalize CRLF line endings and trim surrounding whitespace
pub fn html(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()),
        other => other.clone(),
    }
}

pub fn non_zero(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() || s.trim() == "0" => Value::Null,
        v if value_as_i64(v) == Some(0) => Value::Null,
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datetime_from_unix_seconds() {
        assert_eq!(datetime(&json!(1_000_000_000)), json!("2001-09-09 01:46:40"));
        assert_eq!(datetime(&json!("1000000000")), json!("2001-09-09 01:46:40"));
        assert_eq!(datetime(&json!(0)), Value::Null);
        assert_eq!(datetime(&Value::Null), Value::Null);
    }

    #[test]
    fn test_datetime_from_strings() {
        assert_eq!(datetime(&json!("2010-02-03 04:05:06")), json!("2010-02-03 04:05:06"));
        assert_eq!(datetime(&json!("2010-02-03T04:05:06+01:00")), json!("2010-02-03 03:05:06"));
        assert_eq!(datetime(&json!("last tuesday")), json!("last tuesday"));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug(&json!("General Chat!")), json!("general-chat"));
        assert_eq!(slug(&json!("  --Rust & C++--  ")), json!("rust-c"));
        assert_eq!(slug(&json!(42)), json!("42"));
    }

    #[test]
    fn test_html_and_non_zero() {
        assert_eq!(html(&json!(" a\r\nb \r\n")), json!("a\nb"));
        assert_eq!(non_zero(&json!(0)), Value::Null);
        assert_eq!(non_zero(&json!("0")), Value::Null);
        assert_eq!(non_zero(&json!(5)), json!(5));
    }
}
