//! Lenient input coercion: malformed optional values read as absent
//! instead of failing the request.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    Time,
};

pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// A positive count, e.g. a result limit.
pub fn positive_count(n: Option<f64>) -> Option<usize> {
    n.filter(|n| *n >= 1.0).map(|n| n as usize)
}

fn number_from_value(value: Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => parse_number(Some(&s)),
        _ => None,
    }
}

/// Accepts a JSON number or numeric string; anything else is `None`.
pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(number_from_value))
}

/// Like [`number`], but an explicit `null` is `Some(None)`. Absent or
/// malformed values are `None`.
pub fn nullable_number<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Some(None),
        other => number_from_value(other).map(Some),
    })
}

/// Accepts a JSON string (trimmed, empty is `None`) or a number rendered as text.
pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => non_empty(Some(s)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_instant(raw: &str, day_time: Time) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()?;
    Some(date.with_time(day_time).assume_utc())
}

/// `YYYY-MM-DD` as the start of that day (UTC), or a full RFC 3339 instant.
pub fn day_start(raw: &str) -> Option<OffsetDateTime> {
    parse_instant(raw, Time::MIDNIGHT)
}

/// `YYYY-MM-DD` as the last second of that day (UTC), or a full RFC 3339 instant.
pub fn day_end(raw: &str) -> Option<OffsetDateTime> {
    let end = Time::from_hms(23, 59, 59).ok()?;
    parse_instant(raw, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "number")]
        n: Option<f64>,
        #[serde(default, deserialize_with = "text")]
        t: Option<String>,
    }

    fn probe(json: &str) -> Probe {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn numbers_accept_numeric_strings_and_drop_garbage() {
        assert_eq!(probe(r#"{"n": 10}"#).n, Some(10.0));
        assert_eq!(probe(r#"{"n": " 2.5 "}"#).n, Some(2.5));
        assert_eq!(probe(r#"{"n": ""}"#).n, None);
        assert_eq!(probe(r#"{"n": "ten"}"#).n, None);
        assert_eq!(probe(r#"{"n": null}"#).n, None);
        assert_eq!(probe(r#"{"n": [1]}"#).n, None);
        assert_eq!(probe(r#"{}"#).n, None);
    }

    #[test]
    fn text_trims_and_treats_blank_as_absent() {
        assert_eq!(probe(r#"{"t": "  jazz "}"#).t.as_deref(), Some("jazz"));
        assert_eq!(probe(r#"{"t": "   "}"#).t, None);
        assert_eq!(probe(r#"{"t": 42}"#).t.as_deref(), Some("42"));
        assert_eq!(probe(r#"{"t": false}"#).t, None);
    }

    #[test]
    fn query_string_numbers() {
        assert_eq!(parse_number(Some("5000")), Some(5000.0));
        assert_eq!(parse_number(Some("inf")), None);
        assert_eq!(parse_number(Some("abc")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn counts_must_be_positive() {
        assert_eq!(positive_count(Some(3.0)), Some(3));
        assert_eq!(positive_count(Some(0.0)), None);
        assert_eq!(positive_count(Some(-4.0)), None);
    }

    #[test]
    fn day_bounds_cover_the_whole_day() {
        assert_eq!(day_start("2030-05-01"), Some(datetime!(2030-05-01 00:00 UTC)));
        assert_eq!(day_end("2030-05-01"), Some(datetime!(2030-05-01 23:59:59 UTC)));
        assert_eq!(day_start("2030-05-01T10:30:00+02:00"), Some(datetime!(2030-05-01 08:30 UTC)));
        assert_eq!(day_start("05/01/2030"), None);
        assert_eq!(day_end(""), None);
    }
}
