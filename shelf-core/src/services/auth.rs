//! Auth service - login gate and the persisted session file
//!
//! `session.json` holds the front-end's `AuthState`. It is not part of the
//! library database and is removed on logout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::{Error, Result};
use crate::domain::{AuthState, Session};

pub const SESSION_FILE: &str = "session.json";

pub struct AuthService {
    store: Arc<DuckDbStore>,
    session_path: PathBuf,
}

impl AuthService {
    pub fn new(store: Arc<DuckDbStore>, shelf_dir: &Path) -> Self {
        Self {
            store,
            session_path: shelf_dir.join(SESSION_FILE),
        }
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Check the credentials and persist the new session
    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let admin = self
            .store
            .get_admin_by_username(username.trim())?
            .filter(|admin| admin.password_matches(password))
            .ok_or(Error::Unauthenticated)?;

        let session = Session::new(admin.profile(), Utc::now());
        self.write_state(&AuthState::logged_in(&session))?;
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        match fs::remove_file(&self.session_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Restore the persisted session.
    ///
    /// A missing or unreadable file, or an admin that no longer exists,
    /// counts as logged out.
    pub fn current_session(&self) -> Result<Option<Session>> {
        let state = self.read_state();
        let Some(user) = state.user.filter(|_| state.is_authenticated) else {
            return Ok(None);
        };

        let Some(admin) = self.store.get_admin(&user.id)? else {
            return Ok(None);
        };
        if admin.username != user.username {
            return Ok(None);
        }

        let started_at = state.started_at.unwrap_or_else(Utc::now);
        Ok(Some(Session::new(admin.profile(), started_at)))
    }

    pub fn require_session(&self) -> Result<Session> {
        self.current_session()?.ok_or(Error::Unauthenticated)
    }

    pub fn auth_state(&self) -> Result<AuthState> {
        Ok(match self.current_session()? {
            Some(session) => AuthState::logged_in(&session),
            None => AuthState::logged_out(),
        })
    }

    pub fn change_password(&self, session: &Session, old: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(Error::validation("new password cannot be empty"));
        }
        let mut admin = self
            .store
            .get_admin(&session.admin().id)?
            .ok_or_else(|| Error::not_found(format!("admin {}", session.username())))?;
        if !admin.password_matches(old) {
            return Err(Error::Unauthenticated);
        }
        admin.password = new.to_string();
        self.store.put_admin(&admin)?;
        Ok(())
    }

    fn read_state(&self) -> AuthState {
        fs::read_to_string(&self.session_path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write_state(&self, state: &AuthState) -> Result<()> {
        if let Some(parent) = self.session_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.session_path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}
