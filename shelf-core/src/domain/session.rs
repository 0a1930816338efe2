//! Logged-in session and its persisted form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::admin::AdminProfile;

/// Proof that a staff member logged in.
///
/// Only `AuthService` creates sessions; lending entry points take one as an
/// argument instead of reading ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    admin: AdminProfile,
    started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(admin: AdminProfile, started_at: DateTime<Utc>) -> Self {
        Self { admin, started_at }
    }

    pub fn admin(&self) -> &AdminProfile {
        &self.admin
    }

    pub fn username(&self) -> &str {
        &self.admin.username
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// On-disk session file (`session.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<AdminProfile>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl AuthState {
    pub fn logged_in(session: &Session) -> Self {
        Self {
            is_authenticated: true,
            user: Some(session.admin.clone()),
            started_at: Some(session.started_at),
        }
    }

    pub fn logged_out() -> Self {
        Self::default()
    }
}
