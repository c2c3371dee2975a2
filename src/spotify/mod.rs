//! # Spotify Integration Module
//!
//! Everything that talks to the provider lives here:
//!
//! - [`auth`] - OAuth 2.0 authorization code flow with PKCE, token refresh
//!   and the per-session state machine ([`auth::OAuthSessionManager`]).
//! - [`client`] - read-only Web API access for the current user, their
//!   playlists and playlist tracks, with full pagination.
//! - [`retry`] - the bounded exponential backoff every provider request goes
//!   through. `429 Too Many Requests` honours the `Retry-After` header.
//!
//! The token endpoint and the library API are both behind traits
//! ([`auth::TokenEndpoint`], [`client::RemoteLibrary`]) so the session and
//! sync logic can run against fakes.

pub mod auth;
pub mod client;
pub mod retry;
