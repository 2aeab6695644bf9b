//! Calendar days: the vendor's per-day summary plus the sessions seen that day.

use crate::error::{Result, SnooError};
use crate::session::{Level, RawLevel, SessionRegistry};
use crate::time::DATE_FORMAT;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Day {
    pub date: NaiveDate,
    /// Session ids in first-seen order
    session_ids: Vec<String>,
    /// Every response field except `levels`, in response order
    summary: Map<String, Value>,
}

impl Day {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            session_ids: Vec::new(),
            summary: Map::new(),
        }
    }

    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    #[cfg(test)]
    pub fn summary(&self) -> &Map<String, Value> {
        &self.summary
    }

    fn add_session(&mut self, id: &str) {
        if !self.session_ids.iter().any(|s| s == id) {
            self.session_ids.push(id.to_string());
        }
    }

    /// `{date, ...summary}`; a vendor field named `date` is overridden
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert(
            "date".to_string(),
            Value::String(self.date.format(DATE_FORMAT).to_string()),
        );
        for (key, value) in &self.summary {
            if key != "date" {
                row.insert(key.clone(), value.clone());
            }
        }
        row
    }
}

/// Days keyed by date; one entry per distinct requested date
#[derive(Debug, Default)]
pub struct DayRegistry {
    days: BTreeMap<NaiveDate, Day>,
}

impl DayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the aggregated response for `date`, routing its levels into `sessions`.
    ///
    /// Ingesting a date again replaces its summary; levels are appended again.
    pub fn ingest(
        &mut self,
        date: NaiveDate,
        response: Value,
        sessions: &mut SessionRegistry,
    ) -> Result<()> {
        let mut summary = match response {
            Value::Object(map) => map,
            other => {
                return Err(SnooError::format(
                    "aggregated response",
                    other.to_string(),
                ))
            }
        };

        let raw_levels: Vec<RawLevel> = match summary.remove("levels") {
            None | Some(Value::Null) => Vec::new(),
            Some(levels) => serde_json::from_value(levels.clone())
                .map_err(|_| SnooError::format("levels", levels.to_string()))?,
        };

        // Resolve every level before touching either registry
        let levels = raw_levels
            .iter()
            .map(|raw| Level::from_raw(raw).map(|level| (raw.session_id.as_str(), level)))
            .collect::<Result<Vec<_>>>()?;

        let day = self.days.entry(date).or_insert_with(|| Day::new(date));
        for (session_id, level) in levels {
            sessions.ingest(session_id, level);
            day.add_session(session_id);
        }
        day.summary = summary;
        Ok(())
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Day> {
        self.days.get(&date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Rows ordered by date
    pub fn export(&self) -> Vec<Map<String, Value>> {
        self.days.values().map(Day::to_row).collect()
    }
}

/// The registries for one export run
#[derive(Debug, Default)]
pub struct History {
    pub sessions: SessionRegistry,
    pub days: DayRegistry,
}

impl History {
    pub fn new() -> Self {
        Self {
            sessions: SessionRegistry::new(),
            days: DayRegistry::new(),
        }
    }

    pub fn ingest_day(&mut self, date: NaiveDate, response: Value) -> Result<()> {
        self.days.ingest(date, response, &mut self.sessions)
    }
}
