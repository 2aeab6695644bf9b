//! Timestamp parsing and the fixed formats used on the wire and in exports.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Format of exported session timestamps
pub const EXPORT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format of exported day dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format the aggregated endpoint expects for `startTime`
const QUERY_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse an API timestamp as wall-clock time.
///
/// RFC 3339 input keeps its local wall-clock reading and drops the offset.
pub fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a timestamp as an absolute instant. Input without an offset is UTC.
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a CLI date: either `YYYY-MM-DD` or a full timestamp truncated to its date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_naive(s).map(|dt| dt.date()))
}

/// `startTime` query value for the first second of `date`
pub fn query_start_time(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN)
        .format(QUERY_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_naive_variants() {
        let expected = NaiveDate::from_ymd_opt(2019, 12, 3)
            .unwrap()
            .and_hms_opt(1, 4, 34)
            .unwrap();
        assert_eq!(parse_naive("2019-12-03 01:04:34").unwrap(), expected);
        assert_eq!(parse_naive("2019-12-03T01:04:34").unwrap(), expected);
        assert_eq!(
            parse_naive("2019-12-03 01:04:34.440").unwrap().second(),
            34
        );
        assert_eq!(parse_naive("2019-12-03T01:04:34-08:00").unwrap(), expected);
        assert!(parse_naive("yesterday").is_none());
    }

    #[test]
    fn test_parse_utc_applies_offset() {
        let dt = parse_utc("2019-12-03T01:04:34-08:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2019-12-03T09:04:34+00:00");

        let naive = parse_utc("2019-12-03 01:04:34").unwrap();
        assert_eq!(naive.hour(), 1);
    }

    #[test]
    fn test_parse_date() {
        let d = NaiveDate::from_ymd_opt(2019, 12, 1).unwrap();
        assert_eq!(parse_date("2019-12-01"), Some(d));
        assert_eq!(parse_date("2019-12-01T23:59:00"), Some(d));
        assert_eq!(parse_date("12/01/2019"), None);
    }

    #[test]
    fn test_query_start_time() {
        let d = NaiveDate::from_ymd_opt(2019, 12, 1).unwrap();
        assert_eq!(query_start_time(d), "12/01/2019 00:00:00");
    }
}
