//! Persisted login session.
//!
//! The backend issues a bearer token at login; it is kept in
//! `session.json` under the config directory so later invocations stay
//! logged in.

use crate::api::{AuthResponse, BearerToken};
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub username: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    #[must_use]
    pub fn from_auth(response: &AuthResponse) -> Self {
        Self {
            token: response.token.clone(),
            username: response.user.username.clone(),
            saved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn bearer(&self) -> BearerToken {
        BearerToken::new(self.token.clone())
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("token", &"[REDACTED]")
            .field("username", &self.username)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

/// JSON file holding at most one session.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store in the default config directory.
    pub fn new() -> Result<Self> {
        let dir = Config::config_dir();
        fs::create_dir_all(&dir)?;
        Ok(Self::at(dir.join("session.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let session = serde_json::from_str(&content)
            .map_err(|e| Error::Session(format!("{}: {e}", self.path.display())))?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
