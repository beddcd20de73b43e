use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// The application's own record of a requester or approver. Not a directory account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, FromRow, ToSchema)]
pub struct SystemUser {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub is_active: bool,
    pub created_date: DateTime<Utc>,
}

/// Row synthesized the first time a username acts on the desk.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSystemUser {
    pub username: String,
    pub display_name: String,
    pub email: String,
}

impl NewSystemUser {
    /// `email` falls back to `<username>@<email_domain>` when the directory has none.
    pub fn synthesize(username: &str, email: Option<String>, email_domain: &str) -> Self {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| fallback_email(username, email_domain));
        Self {
            username: username.to_string(),
            display_name: username.to_string(),
            email,
        }
    }
}

pub fn fallback_email(username: &str, email_domain: &str) -> String {
    format!("{}@{}", username, email_domain)
}

/// Usernames are matched case-insensitively by the directory, so the desk stores them folded.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
