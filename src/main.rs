mod auth;
mod client;
mod config;
mod day;
mod error;
mod http;
mod report;
mod session;
mod time;

use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Print the current session state
    Status,
    /// Export per-session totals as CSV
    Sessions,
    /// Export per-day summaries as CSV
    Days,
}

#[derive(Parser, Debug)]
#[command(name = "snoo", about = "SNOO CLI")]
pub struct Args {
    #[arg(value_enum, default_value = "status")]
    pub command: Command,

    #[arg(
        short,
        long,
        value_parser = parse_date_arg,
        help = "Start date for exports, eg. 2019-12-01 (default: yesterday)"
    )]
    pub start: Option<NaiveDate>,

    #[arg(
        short,
        long,
        value_parser = parse_date_arg,
        help = "End date for exports, eg. 2019-12-03 (default: today)"
    )]
    pub end: Option<NaiveDate>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SNOO_USERNAME",
        help = "Account username (overrides the config file)"
    )]
    pub username: Option<String>,

    #[arg(
        long,
        env = "SNOO_PASSWORD",
        hide_env_values = true,
        help = "Account password (overrides the config file)"
    )]
    pub password: Option<String>,

    #[arg(short, long, help = "Verbose output (log HTTP requests and cache decisions)")]
    pub verbose: bool,
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    time::parse_date(s).ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

impl Args {
    /// Export range, defaulting to yesterday through today
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = self.start.unwrap_or(today - Duration::days(1));
        let end = self.end.unwrap_or(today);
        (start, end)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "snoo=debug" } else { "snoo=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    let store = match &args.config {
        Some(path) => config::ConfigStore::open_at(path)?,
        None => config::ConfigStore::open()?,
    };
    debug!(path = %store.path().display(), "loaded config");

    let prompt = auth::PresetCredentials::new(
        args.username.clone(),
        args.password.clone(),
        auth::TerminalPrompt,
    );
    let mut client = client::Client::new(store, Box::new(prompt));

    let now = Utc::now();
    let (start, end) = args.range(Local::now().date_naive());
    if args.command != Command::Status && start > end {
        return Err(anyhow!("start date {} is after end date {}", start, end));
    }

    let output = match args.command {
        Command::Status => Some(client.status(now)?),
        Command::Sessions => client.export_sessions(start, end, now)?,
        Command::Days => client.export_days(start, end, now)?,
    };

    match output {
        Some(text) => println!("{}", text.trim_end()),
        None => warn!(%start, %end, "no data in range"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_command_is_status() {
        let args = Args::try_parse_from(["snoo"]).unwrap();
        assert_eq!(args.command, Command::Status);
        assert!(args.start.is_none());
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Args::try_parse_from(["snoo", "naps"]).is_err());
    }

    #[test]
    fn test_date_flags() {
        let args =
            Args::try_parse_from(["snoo", "days", "-s", "2019-12-01", "--end", "2019-12-03T08:00:00"])
                .unwrap();
        assert_eq!(args.command, Command::Days);
        assert_eq!(
            args.range(date(2020, 1, 1)),
            (date(2019, 12, 1), date(2019, 12, 3))
        );
    }

    #[test]
    fn test_bad_date_rejected() {
        assert!(Args::try_parse_from(["snoo", "sessions", "-s", "yesterday"]).is_err());
    }

    #[test]
    fn test_default_range_is_yesterday_to_today() {
        let args = Args::try_parse_from(["snoo", "sessions"]).unwrap();
        assert_eq!(
            args.range(date(2020, 3, 1)),
            (date(2020, 2, 29), date(2020, 3, 1))
        );
    }
}
