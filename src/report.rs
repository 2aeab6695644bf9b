//! Status line and CSV rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// What the device reports about the latest session
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSession {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds since the session ended, or since it started if still running
    pub duration: i64,
    pub level: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Awake,
    Asleep,
    Soothing,
}

impl Status {
    pub fn of(session: &CurrentSession) -> Self {
        if session.end_time.is_some() {
            Self::Awake
        } else if is_baseline(&session.level) {
            Self::Asleep
        } else {
            Self::Soothing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awake => "Awake",
            Self::Asleep => "Asleep",
            Self::Soothing => "Soothing",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `BASELINE` and its variants (e.g. `WEANING_BASELINE`) mean asleep without motion
fn is_baseline(level: &str) -> bool {
    let level = level.to_ascii_uppercase();
    level == "BASELINE" || level.ends_with("_BASELINE")
}

/// e.g. "Asleep 1h 5m"
pub fn current_status(session: &CurrentSession) -> String {
    format!("{} {}", Status::of(session), humanize(session.duration))
}

/// Format seconds as "Xm" or "Xh Ym", rounding down to whole minutes
pub fn humanize(seconds: i64) -> String {
    if seconds <= 0 {
        return "0m".to_string();
    }
    let minutes = seconds / 60;
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Serialize records into CSV rows; field order follows the struct
pub fn rows_of<T: Serialize>(records: &[T]) -> serde_json::Result<Vec<Map<String, Value>>> {
    records
        .iter()
        .map(|r| match serde_json::to_value(r)? {
            Value::Object(map) => Ok(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
        })
        .collect()
}

/// Render rows as CSV. The header is the first row's keys in order; later rows
/// are laid out against that header, missing keys becoming empty cells.
///
/// Returns `None` when there are no rows, since there is no header to print.
pub fn to_csv(rows: &[Map<String, Value>]) -> Option<String> {
    let header: Vec<&String> = rows.first()?.keys().collect();

    let mut out = String::new();
    push_line(&mut out, header.iter().map(|k| escape(k)));
    for row in rows {
        push_line(
            &mut out,
            header
                .iter()
                .map(|k| row.get(k.as_str()).map(cell).unwrap_or_default()),
        );
    }
    Some(out)
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>) {
    let line: Vec<String> = cells.collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape(s),
        other => escape(&other.to_string()),
    }
}

fn escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
