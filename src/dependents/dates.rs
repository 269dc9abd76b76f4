//! Date parsing for the formats found in legacy exports.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::snapshot::{Record, RecordError};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parses a timestamp; a bare date means midnight.
///
/// RFC 3339 values are converted to UTC.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| parse_bare_date(value).map(|date| date.and_time(NaiveTime::MIN)))
}

/// Parses a calendar date; a timestamp is truncated to its date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    parse_bare_date(value).or_else(|| parse_datetime(value).map(|dt| dt.date()))
}

fn parse_bare_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Date column of a record rendered as `YYYY-MM-DD`.
pub fn date_field(record: &Record, field: &str) -> Result<Option<String>, RecordError> {
    record
        .text(field)
        .map(|value| {
            parse_date(&value)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .ok_or_else(|| RecordError::MalformedDate {
                    field: field.to_string(),
                    value,
                })
        })
        .transpose()
}

/// Timestamp column of a record rendered as `YYYY-MM-DDTHH:MM:SS`.
pub fn datetime_field(record: &Record, field: &str) -> Result<Option<String>, RecordError> {
    record
        .text(field)
        .map(|value| {
            parse_datetime(&value)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                .ok_or_else(|| RecordError::MalformedDate {
                    field: field.to_string(),
                    value,
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2019, 3, 12);
        assert_eq!(parse_date("2019-03-12"), expected);
        assert_eq!(parse_date("12/03/2019"), expected);
        assert_eq!(parse_date("2019-03-12 08:30"), expected);
        assert_eq!(parse_date("2019-03-12T23:30:00-03:00"), NaiveDate::from_ymd_opt(2019, 3, 13));
        assert_eq!(parse_date("31/02/2019"), None);
        assert_eq!(parse_date("ontem"), None);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let at = |h, m| {
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .and_then(|d| d.and_hms_opt(h, m, 0))
        };
        assert_eq!(parse_datetime("2024-01-02 08:00"), at(8, 0));
        assert_eq!(parse_datetime("2024-01-02 08:00:00"), at(8, 0));
        assert_eq!(parse_datetime("02/01/2024 08:00"), at(8, 0));
        assert_eq!(parse_datetime("2024-01-02T10:00:00+02:00"), at(8, 0));
        assert_eq!(parse_datetime("2024-01-02"), at(0, 0));
    }

    #[test]
    fn test_date_field() {
        let record = Record::new(
            json!({"birth_date": "12/03/2019", "bad": "13/13/2019", "empty": ""})
                .as_object()
                .cloned()
                .unwrap(),
        );

        assert_eq!(
            date_field(&record, "birth_date").unwrap().as_deref(),
            Some("2019-03-12")
        );
        assert_eq!(date_field(&record, "empty").unwrap(), None);
        assert_eq!(date_field(&record, "missing").unwrap(), None);
        assert!(matches!(
            date_field(&record, "bad"),
            Err(RecordError::MalformedDate { .. })
        ));
    }
}
