//! Value coercion per simple type
//!
//! Raw operands arrive as JSON and are coerced before an operator sees them.
//! An empty string means "no value" for every type except strings.

use crate::fields::types::SimpleType;
use crate::orm::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Coerce one non-list value to `simple`; the error is a human reason
pub fn coerce_scalar(simple: SimpleType, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if simple != SimpleType::String && value.as_str().map_or(false, |s| s.trim().is_empty()) {
        return Ok(Value::Null);
    }
    match simple {
        SimpleType::String => match value {
            Value::Str(_) => Ok(value.clone()),
            Value::List(_) => Err("expected a single value".to_string()),
            other => Ok(Value::Str(other.to_string())),
        },
        SimpleType::Number => match value {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) if f.is_finite() => Ok(Value::Float(*f)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(|| format!("{:?} is not a number", s)),
            other => Err(format!("{} is not a number", other)),
        },
        SimpleType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("{:?} is not a boolean", s)),
            },
            other => Err(format!("{} is not a boolean", other)),
        },
        SimpleType::Date => match value {
            Value::Date(_) => Ok(value.clone()),
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            Value::Str(s) => parse_date(s.trim())
                .map(Value::Date)
                .ok_or_else(|| format!("{:?} is not a date", s)),
            other => Err(format!("{} is not a date", other)),
        },
        SimpleType::DateTime => match value {
            Value::DateTime(_) => Ok(value.clone()),
            Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
            Value::Str(s) => parse_datetime(s.trim())
                .map(Value::DateTime)
                .ok_or_else(|| format!("{:?} is not a datetime", s)),
            other => Err(format!("{} is not a datetime", other)),
        },
        SimpleType::Time => match value {
            Value::Time(_) => Ok(value.clone()),
            Value::DateTime(dt) => Ok(Value::Time(dt.time())),
            Value::Str(s) => parse_time(s.trim())
                .map(Value::Time)
                .ok_or_else(|| format!("{:?} is not a time", s)),
            other => Err(format!("{} is not a time", other)),
        },
        SimpleType::Key => match value {
            Value::Int(_) => Ok(value.clone()),
            Value::Float(_) => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| format!("{} is not a key", value)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("{:?} is not a key", s)),
            other => Err(format!("{} is not a key", other)),
        },
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        assert_eq!(coerce_scalar(SimpleType::Number, &Value::Int(5)), Ok(Value::Float(5.0)));
        assert_eq!(coerce_scalar(SimpleType::Number, &"2.5".into()), Ok(Value::Float(2.5)));
        assert_eq!(coerce_scalar(SimpleType::Number, &"".into()), Ok(Value::Null));
        assert!(coerce_scalar(SimpleType::Number, &"abc".into()).is_err());
        assert!(coerce_scalar(SimpleType::Number, &"NaN".into()).is_err());
        assert!(coerce_scalar(SimpleType::Number, &Value::Bool(true)).is_err());
    }

    #[test]
    fn test_boolean() {
        assert_eq!(coerce_scalar(SimpleType::Boolean, &"True".into()), Ok(Value::Bool(true)));
        assert_eq!(coerce_scalar(SimpleType::Boolean, &"0".into()), Ok(Value::Bool(false)));
        assert_eq!(coerce_scalar(SimpleType::Boolean, &Value::Int(1)), Ok(Value::Bool(true)));
        assert!(coerce_scalar(SimpleType::Boolean, &"maybe".into()).is_err());
    }

    #[test]
    fn test_string_keeps_empty() {
        assert_eq!(coerce_scalar(SimpleType::String, &"".into()), Ok(Value::Str(String::new())));
        assert_eq!(coerce_scalar(SimpleType::String, &Value::Int(3)), Ok("3".into()));
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2012, 3, 4).unwrap();
        assert_eq!(coerce_scalar(SimpleType::Date, &"2012-03-04".into()), Ok(Value::Date(date)));
        assert_eq!(
            coerce_scalar(SimpleType::DateTime, &"2012-03-04 10:30".into()),
            Ok(Value::DateTime(date.and_hms_opt(10, 30, 0).unwrap()))
        );
        assert_eq!(
            coerce_scalar(SimpleType::DateTime, &"2012-03-04".into()),
            Ok(Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap()))
        );
        assert_eq!(
            coerce_scalar(SimpleType::Time, &"08:15:00".into()),
            Ok(Value::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap()))
        );
        assert!(coerce_scalar(SimpleType::Date, &"04/03/2012".into()).is_err());
    }

    #[test]
    fn test_key() {
        assert_eq!(coerce_scalar(SimpleType::Key, &"12".into()), Ok(Value::Int(12)));
        assert_eq!(coerce_scalar(SimpleType::Key, &Value::Float(3.0)), Ok(Value::Int(3)));
        assert!(coerce_scalar(SimpleType::Key, &Value::Float(3.5)).is_err());
    }
}
