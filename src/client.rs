use crate::auth::{CredentialPrompt, TokenManager};
use crate::config::ConfigStore;
use crate::day::History;
use crate::error::{Result, SnooError};
use crate::http::{Gateway, Method, Transport, UreqTransport};
use crate::report::{self, CurrentSession};
use crate::time;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub const CURRENT_ENDPOINT: &str = "/ss/v2/sessions/last";
pub const DATA_ENDPOINT: &str = "/ss/v2/sessions/aggregated";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastSessionResponse {
    start_time: String,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    levels: Vec<LastSessionLevel>,
}

#[derive(Debug, Deserialize)]
struct LastSessionLevel {
    #[serde(default)]
    level: String,
}

/// Every vendor API operation the CLI needs
pub struct Client<T: Transport = UreqTransport> {
    store: ConfigStore,
    gateway: Gateway<T>,
    tokens: TokenManager,
}

impl Client<UreqTransport> {
    pub fn new(store: ConfigStore, prompt: Box<dyn CredentialPrompt>) -> Self {
        Self::with_transport(store, prompt, UreqTransport::new())
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(
        store: ConfigStore,
        prompt: Box<dyn CredentialPrompt>,
        transport: T,
    ) -> Self {
        let gateway = Gateway::new(&store.config.default.base_url, transport);
        Self {
            store,
            gateway,
            tokens: TokenManager::new(prompt),
        }
    }

    /// Make sure a valid token is cached, logging in if needed
    pub fn authenticate(&mut self, now: DateTime<Utc>) -> Result<String> {
        self.tokens.get_token(&mut self.store, &self.gateway, now)
    }

    pub fn request(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let token = self.authenticate(now)?;
        self.gateway
            .request(endpoint, None, params, Method::Get, Some(&token))
    }

    /// The current session, served from the config while it is fresh
    pub fn current_session(&mut self, now: DateTime<Utc>) -> Result<CurrentSession> {
        let interval = i64::try_from(self.store.config.default.update_interval)
            .ok()
            .and_then(Duration::try_seconds);
        if let Some(cached) = self.store.config.session.snapshot() {
            // An interval past chrono's range counts as stale
            let fresh_until = interval.and_then(|i| cached.last_updated.checked_add_signed(i));
            if fresh_until.is_some_and(|t| t > now) {
                debug!(last_updated = %cached.last_updated, "using cached session");
                return Ok(cached);
            }
        }

        let data = self.request(CURRENT_ENDPOINT, &[], now)?;
        let session = parse_current_session(data, now)?;
        self.store.config.session.store(&session);
        self.store.save()?;
        Ok(session)
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> Result<String> {
        let session = self.current_session(now)?;
        Ok(report::current_status(&session))
    }

    /// Fetch every day from `start` to `end` inclusive, one request per day
    pub fn history(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<History> {
        let mut history = History::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            info!(%date, "fetching day");
            let data = self.request(
                DATA_ENDPOINT,
                &[("startTime", time::query_start_time(date))],
                now,
            )?;
            history.ingest_day(date, data)?;
            if let Some(day) = history.days.get(date) {
                debug!(%date, sessions = day.session_ids().len(), "ingested day");
            }
        }
        info!(
            days = history.days.len(),
            sessions = history.sessions.len(),
            "history fetched"
        );
        Ok(history)
    }

    /// Sessions overlapping the range as CSV; `None` if there were none
    pub fn export_sessions(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let history = self.history(start, end, now)?;
        if history.sessions.is_empty() {
            return Ok(None);
        }
        let rows = report::rows_of(&history.sessions.export())
            .map_err(|e| SnooError::format("session row", e.to_string()))?;
        Ok(report::to_csv(&rows))
    }

    /// Per-day summaries as CSV; `None` if the range was empty
    pub fn export_days(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let history = self.history(start, end, now)?;
        if history.days.is_empty() {
            return Ok(None);
        }
        Ok(report::to_csv(&history.days.export()))
    }
}

fn parse_current_session(data: Value, now: DateTime<Utc>) -> Result<CurrentSession> {
    let last: LastSessionResponse =
        serde_json::from_value(data).map_err(|source| SnooError::Decode {
            endpoint: CURRENT_ENDPOINT.to_string(),
            source,
        })?;

    let start_time = time::parse_utc(&last.start_time)
        .ok_or_else(|| SnooError::format("startTime", last.start_time.as_str()))?;
    let end_time = match last.end_time.as_deref() {
        None | Some("") => None,
        Some(s) => Some(time::parse_utc(s).ok_or_else(|| SnooError::format("endTime", s))?),
    };
    let since = end_time.unwrap_or(start_time);
    let level = last.levels.last().map(|l| l.level.clone()).unwrap_or_default();

    Ok(CurrentSession {
        start_time,
        end_time,
        duration: (now - since).num_seconds(),
        level,
        last_updated: now,
    })
}
