//! Configuration management for spotstats.
//!
//! Values come from environment variables, optionally pre-populated from
//! `.env` files. Resolution order:
//! 1. Environment variables (highest priority)
//! 2. `.env` in the working directory
//! 3. `.env` in the local data directory
//! 4. Application defaults (where applicable)

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::{error::ConfigError, spotify::retry::RetryPolicy};

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SCOPE: &str =
    "playlist-read-private playlist-read-collaborative user-library-read user-top-read";

/// Loads environment variables from `.env` files.
///
/// The file in the platform-specific local data directory is read first:
/// - Linux: `~/.local/share/spotstats/.env`
/// - macOS: `~/Library/Application Support/spotstats/.env`
/// - Windows: `%LOCALAPPDATA%/spotstats/.env`
///
/// A `.env` in the working directory is loaded afterwards. Variables that
/// are already set are never overwritten, and missing files are fine.
///
/// # Errors
///
/// Fails if the data directory cannot be created or an existing `.env`
/// file cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }

    match dotenv::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Directory holding the `.env` file and the default database.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotstats");
    path
}

pub fn default_database_path() -> PathBuf {
    data_dir().join("spotstats.db")
}

/// Database location for commands that only read local data and need no
/// provider credentials.
pub fn database_path() -> PathBuf {
    env::var("DATABASE_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_database_path)
}

/// OAuth client registration and provider endpoints.
#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_addr: SocketAddr,
    pub database_path: PathBuf,
    pub spotify: SpotifySettings,
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_margin: Duration,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub cookie_secure: bool,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let server_addr = parse_or(
            "SERVER_ADDRESS",
            get("SERVER_ADDRESS"),
            DEFAULT_SERVER_ADDRESS.parse().ok(),
        )?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let spotify = SpotifySettings {
            client_id: required("SPOTIFY_API_AUTH_CLIENT_ID")?,
            client_secret: get("SPOTIFY_API_AUTH_CLIENT_SECRET"),
            redirect_uri: required("SPOTIFY_API_REDIRECT_URI")?,
            scope: get("SPOTIFY_API_AUTH_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            auth_url: get("SPOTIFY_API_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            token_url: get("SPOTIFY_API_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            api_url: get("SPOTIFY_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        };

        let refresh_margin = Duration::from_secs(parse_or(
            "TOKEN_REFRESH_MARGIN_SECS",
            get("TOKEN_REFRESH_MARGIN_SECS"),
            Some(30),
        )?);
        let http_timeout = Duration::from_secs(parse_or(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            Some(10),
        )?);

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(
                "RATE_LIMIT_MAX_RETRIES",
                get("RATE_LIMIT_MAX_RETRIES"),
                Some(defaults.max_retries),
            )?,
            initial_backoff: Duration::from_millis(parse_or(
                "RATE_LIMIT_INITIAL_BACKOFF_MS",
                get("RATE_LIMIT_INITIAL_BACKOFF_MS"),
                Some(defaults.initial_backoff.as_millis() as u64),
            )?),
            max_backoff: Duration::from_secs(parse_or(
                "RATE_LIMIT_MAX_BACKOFF_SECS",
                get("RATE_LIMIT_MAX_BACKOFF_SECS"),
                Some(defaults.max_backoff.as_secs()),
            )?),
            multiplier: defaults.multiplier,
        };

        let cookie_secure = parse_or("COOKIE_SECURE", get("COOKIE_SECURE"), Some(false))?;

        Ok(Self {
            server_addr,
            database_path,
            spotify,
            refresh_margin,
            http_timeout,
            retry,
            cookie_secure,
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}
