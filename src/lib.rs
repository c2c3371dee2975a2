//! Spotify playlist statistics.
//!
//! Logs a user in through the provider's OAuth flow, mirrors their playlists
//! into a local SQLite database and builds frequency reports from the
//! mirrored data.
//!
//! # Modules
//!
//! - `api` - HTTP handlers and the session cookie
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - Error types per concern
//! - `management` - Session storage and the SQLite persistence layer
//! - `report` - Top-N rankings, bar charts and data export
//! - `server` - Router and shared state of the HTTP server
//! - `spotify` - OAuth session manager and Web API client
//! - `sync` - Library sync from the provider into the local store
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod management;
pub mod report;
pub mod server;
pub mod spotify;
pub mod sync;
pub mod types;
pub mod utils;

// Console output of the CLI. Library code logs through `tracing` instead.

/// `[o] message` in blue.
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// `[✓] message` in green, after a command finished.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints `[!] message` in red to stderr and exits with status 1.
///
/// Evaluates to `!`, so it can end a `match` arm that has no value to
/// return:
///
/// ```ignore
/// let store = match SqliteStore::new(&path) {
///     Ok(store) => store,
///     Err(e) => error!("Failed to open database. Err: {}", e),
/// };
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// `[!] message` in yellow, for results the user should look at.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
