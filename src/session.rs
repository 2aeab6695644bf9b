//! Sessions rebuilt from the per-level records of the aggregated endpoint.

use crate::error::{Result, SnooError};
use crate::time::{self, EXPORT_FORMAT};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One raw level as the API sends it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLevel {
    #[serde(deserialize_with = "id_as_string")]
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_time: String,
    /// Seconds spent in this state
    pub state_duration: f64,
}

/// Session ids show up as strings or numbers depending on the endpoint version
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid session id {}",
            other
        ))),
    }
}

/// Longest single level accepted from the API: one week
const MAX_LEVEL_SECONDS: f64 = 604_800.0;

/// A level with its start time resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub kind: String,
    pub start_time: NaiveDateTime,
    pub duration: Duration,
}

impl Level {
    pub fn from_raw(raw: &RawLevel) -> Result<Self> {
        let start_time = time::parse_naive(&raw.start_time)
            .ok_or_else(|| SnooError::format("level startTime", raw.start_time.as_str()))?;
        if !(0.0..=MAX_LEVEL_SECONDS).contains(&raw.state_duration) {
            return Err(SnooError::format(
                "level stateDuration",
                raw.state_duration.to_string(),
            ));
        }
        Ok(Self {
            kind: raw.kind.clone(),
            start_time,
            duration: Duration::milliseconds((raw.state_duration * 1000.0).round() as i64),
        })
    }

    fn is(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    levels: Vec<Level>,
}

impl Session {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            levels: Vec::new(),
        }
    }

    /// Levels in arrival order
    #[cfg(test)]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Earliest level start; `None` for a session with no levels
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.levels.iter().map(|l| l.start_time).min()
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.start_time()
            .and_then(|start| start.checked_add_signed(self.duration()))
    }

    pub fn duration(&self) -> Duration {
        self.levels
            .iter()
            .fold(Duration::zero(), |acc, l| acc + l.duration)
    }

    pub fn asleep_duration(&self) -> Duration {
        self.duration_of("asleep")
    }

    pub fn soothing_duration(&self) -> Duration {
        self.duration_of("soothing")
    }

    fn duration_of(&self, kind: &str) -> Duration {
        self.levels
            .iter()
            .filter(|l| l.is(kind))
            .fold(Duration::zero(), |acc, l| acc + l.duration)
    }

    pub fn to_row(&self) -> Option<SessionRow> {
        let start = self.start_time()?;
        let end = self.end_time()?;
        Some(SessionRow {
            start_time: start.format(EXPORT_FORMAT).to_string(),
            end_time: end.format(EXPORT_FORMAT).to_string(),
            duration: self.duration().num_seconds(),
            asleep: self.asleep_duration().num_seconds(),
            soothing: self.soothing_duration().num_seconds(),
        })
    }
}

/// Exported shape of a session; field order is the CSV column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub start_time: String,
    pub end_time: String,
    pub duration: i64,
    pub asleep: i64,
    pub soothing: i64,
}

/// Every session seen during one export run, keyed by session id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `level` to the session `session_id`, creating it if needed.
    /// Levels are not deduplicated: ingesting the same record twice counts it twice.
    pub fn ingest(&mut self, session_id: &str, level: Level) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id))
            .levels
            .push(level);
    }

    #[cfg(test)]
    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions with at least one level, oldest first
    pub fn export(&self) -> Vec<SessionRow> {
        let mut sessions: Vec<(NaiveDateTime, &Session)> = self
            .sessions
            .values()
            .filter_map(|s| s.start_time().map(|start| (start, s)))
            .collect();
        // Tie-break on id so equal start times export in a stable order
        sessions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        sessions.into_iter().filter_map(|(_, s)| s.to_row()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn level(kind: &str, start: &str, secs: i64) -> Level {
        Level {
            kind: kind.to_string(),
            start_time: time::parse_naive(start).unwrap(),
            duration: Duration::seconds(secs),
        }
    }

    #[test]
    fn test_duration_and_start_time() {
        let mut registry = SessionRegistry::new();
        // Arrival order differs from chronological order
        registry.ingest("s1", level("soothing", "2019-12-03 01:30:00", 300));
        registry.ingest("s1", level("asleep", "2019-12-03 01:00:00", 1800));
        registry.ingest("s1", level("asleep", "2019-12-03 01:35:00", 600));

        let session = registry.get("s1").unwrap();
        assert_eq!(session.levels().len(), 3);
        assert_eq!(session.levels()[0].kind, "soothing");
        assert_eq!(session.duration(), Duration::seconds(2700));
        assert_eq!(session.asleep_duration(), Duration::seconds(2400));
        assert_eq!(session.soothing_duration(), Duration::seconds(300));
        assert_eq!(
            session.start_time(),
            time::parse_naive("2019-12-03 01:00:00")
        );
        assert_eq!(session.end_time(), time::parse_naive("2019-12-03 01:45:00"));
    }

    #[test]
    fn test_level_kind_match_ignores_case() {
        let mut registry = SessionRegistry::new();
        registry.ingest("s1", level("ASLEEP", "2019-12-03 01:00:00", 60));
        registry.ingest("s1", level("baseline", "2019-12-03 01:01:00", 60));

        let session = registry.get("s1").unwrap();
        assert_eq!(session.asleep_duration(), Duration::seconds(60));
        assert_eq!(session.soothing_duration(), Duration::zero());
        assert_eq!(session.duration(), Duration::seconds(120));
    }

    #[test]
    fn test_empty_session_has_no_times() {
        let session = Session::new("empty");
        assert!(session.start_time().is_none());
        assert!(session.end_time().is_none());
        assert!(session.to_row().is_none());
    }

    #[test]
    fn test_export_sorted_and_formatted() {
        let mut registry = SessionRegistry::new();
        registry.ingest("late", level("asleep", "2019-12-03 20:00:00", 3600));
        registry.ingest("early", level("soothing", "2019-12-03 08:00:00.500", 90));
        registry.ingest("early", level("asleep", "2019-12-03 08:01:30.500", 30));

        let rows = registry.export();
        assert_eq!(
            rows,
            vec![
                SessionRow {
                    start_time: "2019-12-03T08:00:00".to_string(),
                    end_time: "2019-12-03T08:02:00".to_string(),
                    duration: 120,
                    asleep: 30,
                    soothing: 90,
                },
                SessionRow {
                    start_time: "2019-12-03T20:00:00".to_string(),
                    end_time: "2019-12-03T21:00:00".to_string(),
                    duration: 3600,
                    asleep: 3600,
                    soothing: 0,
                },
            ]
        );
    }

    #[test]
    fn test_double_ingest_counts_twice() {
        let mut registry = SessionRegistry::new();
        let l = level("asleep", "2019-12-03 01:00:00", 100);
        registry.ingest("s1", l.clone());
        registry.ingest("s1", l);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("s1").unwrap().duration(), Duration::seconds(200));
    }

    #[test]
    fn test_raw_level_parsing() {
        let raw: RawLevel = serde_json::from_value(json!({
            "sessionId": 1234,
            "type": "asleep",
            "startTime": "2019-12-03 01:04:34.440",
            "stateDuration": 1980,
            "isActive": false
        }))
        .unwrap();
        assert_eq!(raw.session_id, "1234");

        let level = Level::from_raw(&raw).unwrap();
        assert_eq!(level.kind, "asleep");
        assert_eq!(level.duration, Duration::seconds(1980));
    }

    #[test]
    fn test_raw_level_bad_start_time() {
        let raw = RawLevel {
            session_id: "s".to_string(),
            kind: "asleep".to_string(),
            start_time: "not a time".to_string(),
            state_duration: 1.0,
        };
        let err = Level::from_raw(&raw).unwrap_err();
        assert!(err.to_string().contains("startTime"));
    }

    #[test]
    fn test_raw_level_duration_out_of_range() {
        for state_duration in [-1.0, 1e13, f64::NAN, f64::INFINITY] {
            let raw = RawLevel {
                session_id: "s".to_string(),
                kind: "asleep".to_string(),
                start_time: "2019-12-03 01:00:00".to_string(),
                state_duration,
            };
            let err = Level::from_raw(&raw).unwrap_err();
            assert!(
                matches!(err, SnooError::Format { field: "level stateDuration", .. }),
                "{} gave {:?}",
                state_duration,
                err
            );
        }
    }

    #[test]
    fn test_week_long_level_is_accepted() {
        let raw = RawLevel {
            session_id: "s".to_string(),
            kind: "asleep".to_string(),
            start_time: "2019-12-03 01:00:00".to_string(),
            state_duration: MAX_LEVEL_SECONDS,
        };
        let level = Level::from_raw(&raw).unwrap();
        assert_eq!(level.duration, Duration::weeks(1));
    }
}
