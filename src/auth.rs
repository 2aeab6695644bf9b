//! Credential resolution and the cached bearer token.
//!
//! A cached token is used until its expiry; after that a fresh login is made
//! with credentials taken from the command line, the config, or a prompt,
//! in that order.

use crate::config::{AuthSection, ConfigStore};
use crate::error::{Result, SnooError};
use crate::http::{Gateway, Method, Transport};
use chrono::{DateTime, Duration, Utc};
use rustyline::completion::Completer;
use rustyline::config::{ColorMode, Configurer};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{DefaultEditor, Editor, Helper};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, info};

pub const LOGIN_ENDPOINT: &str = "/us/login";

/// Source of credentials that aren't in the config yet
pub trait CredentialPrompt {
    fn username(&self) -> Result<String>;
    fn password(&self) -> Result<String>;

    /// A username given explicitly, which overrides the stored one
    fn preset_username(&self) -> Option<String> {
        None
    }

    /// A password given explicitly, which overrides the stored one
    fn preset_password(&self) -> Option<String> {
        None
    }
}

/// Prompts on the terminal; the password is echoed as `*`
pub struct TerminalPrompt;

/// Masks every typed character
struct MaskingHelper;

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Completer for MaskingHelper {
    type Candidate = String;
}

impl Hinter for MaskingHelper {
    type Hint = String;
}

impl Validator for MaskingHelper {}

impl Helper for MaskingHelper {}

fn readline_error(e: ReadlineError) -> SnooError {
    match e {
        ReadlineError::Interrupted | ReadlineError::Eof => {
            SnooError::Credentials("input cancelled".to_string())
        }
        other => SnooError::Credentials(format!("cannot read from terminal: {}", other)),
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn username(&self) -> Result<String> {
        let mut rl = DefaultEditor::new().map_err(readline_error)?;
        rl.readline("SNOO Username: ").map_err(readline_error)
    }

    fn password(&self) -> Result<String> {
        let mut rl: Editor<MaskingHelper, DefaultHistory> =
            Editor::new().map_err(readline_error)?;
        rl.set_helper(Some(MaskingHelper));
        // Masking happens in the highlighter, which only runs with colors on
        rl.set_color_mode(ColorMode::Forced);
        rl.set_auto_add_history(false);
        rl.readline("Password: ").map_err(readline_error)
    }
}

/// Credentials supplied up front (flags or environment), falling back to
/// another prompt for whatever is missing
pub struct PresetCredentials<P: CredentialPrompt> {
    username: Option<String>,
    password: Option<String>,
    fallback: P,
}

impl<P: CredentialPrompt> PresetCredentials<P> {
    pub fn new(username: Option<String>, password: Option<String>, fallback: P) -> Self {
        Self {
            username,
            password,
            fallback,
        }
    }
}

impl<P: CredentialPrompt> CredentialPrompt for PresetCredentials<P> {
    fn username(&self) -> Result<String> {
        match &self.username {
            Some(u) => Ok(u.clone()),
            None => self.fallback.username(),
        }
    }

    fn password(&self) -> Result<String> {
        match &self.password {
            Some(p) => Ok(p.clone()),
            None => self.fallback.password(),
        }
    }

    fn preset_username(&self) -> Option<String> {
        self.username.clone()
    }

    fn preset_password(&self) -> Option<String> {
        self.password.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Take each credential from `prompt`'s preset, else the config, else
    /// ask `prompt` for it, and write the result back into `auth`.
    pub fn resolve(auth: &mut AuthSection, prompt: &dyn CredentialPrompt) -> Result<Self> {
        let username = match (prompt.preset_username(), &auth.username) {
            (Some(u), _) => non_empty("username", u.trim().to_string())?,
            (None, Some(u)) => u.clone(),
            (None, None) => non_empty("username", prompt.username()?.trim().to_string())?,
        };
        let password = match (prompt.preset_password(), &auth.password) {
            (Some(p), _) => non_empty("password", p)?,
            (None, Some(p)) => p.clone(),
            (None, None) => non_empty("password", prompt.password()?)?,
        };

        auth.username = Some(username.clone());
        auth.password = Some(password.clone());
        Ok(Self { username, password })
    }
}

fn non_empty(what: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(SnooError::Credentials(format!("{} must not be empty", what)));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Hands out bearer tokens, logging in again once the cached one expires
pub struct TokenManager {
    prompt: Box<dyn CredentialPrompt>,
}

impl TokenManager {
    pub fn new(prompt: Box<dyn CredentialPrompt>) -> Self {
        Self { prompt }
    }

    /// The cached token if it is still valid at `now`
    pub fn cached(auth: &AuthSection, now: DateTime<Utc>) -> Option<&str> {
        match (&auth.token, auth.token_expiry) {
            (Some(token), Some(expiry)) if expiry > now => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn get_token<T: Transport>(
        &self,
        store: &mut ConfigStore,
        gateway: &Gateway<T>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if let Some(token) = Self::cached(&store.config.auth, now) {
            debug!("using cached token");
            return Ok(token.to_string());
        }

        let credentials = Credentials::resolve(&mut store.config.auth, self.prompt.as_ref())?;
        self.login(store, gateway, &credentials, now)
    }

    fn login<T: Transport>(
        &self,
        store: &mut ConfigStore,
        gateway: &Gateway<T>,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<String> {
        info!(username = %credentials.username, "logging in");
        let payload = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let data = gateway.request(LOGIN_ENDPOINT, Some(&payload), &[], Method::Post, None)?;
        let login: LoginResponse =
            serde_json::from_value(data).map_err(|source| SnooError::Decode {
                endpoint: LOGIN_ENDPOINT.to_string(),
                source,
            })?;

        let expiry = Duration::try_seconds(login.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| SnooError::format("expires_in", login.expires_in.to_string()))?;

        let auth = &mut store.config.auth;
        auth.token = Some(login.access_token.clone());
        auth.token_expiry = Some(expiry);
        auth.refresh_token = login.refresh_token;
        store.save()?;

        Ok(login.access_token)
    }
}
