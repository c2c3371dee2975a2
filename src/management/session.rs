use std::{
    collections::HashMap,
    fmt,
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{error::PersistenceError, types::Token, utils};

/// Opaque identifier carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(utils::generate_session_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization started via `/authorize` and not yet completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    pub next_url: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub pending: Option<PendingAuthorization>,
    pub token: Option<Token>,
    /// Provider user id, resolved once after login.
    pub user_id: Option<String>,
}

/// Per-session storage of the OAuth token pair.
pub trait TokenStore: Send + Sync {
    fn get(&self, session: &SessionId) -> Result<Option<SessionRecord>, PersistenceError>;

    fn set(&self, session: &SessionId, record: &SessionRecord) -> Result<(), PersistenceError>;

    /// Removes the record. Clearing an unknown session is not an error.
    fn clear(&self, session: &SessionId) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, session: &SessionId) -> Result<Option<SessionRecord>, PersistenceError> {
        let sessions = self.sessions.read().map_err(|_| PersistenceError::Poisoned)?;
        Ok(sessions.get(session).cloned())
    }

    fn set(&self, session: &SessionId, record: &SessionRecord) -> Result<(), PersistenceError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| PersistenceError::Poisoned)?;
        sessions.insert(session.clone(), record.clone());
        Ok(())
    }

    fn clear(&self, session: &SessionId) -> Result<(), PersistenceError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| PersistenceError::Poisoned)?;
        sessions.remove(session);
        Ok(())
    }
}
