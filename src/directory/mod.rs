// Directory Client Port.
//
// The desk never talks a directory protocol itself; it consumes this
// capability. Every call distinguishes "object not found" from "operation
// failed" through [`DirectoryError`].

pub mod cache;
pub mod http;
pub mod password;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory object not found: {0}")]
    NotFound(String),

    #[error("directory operation failed: {0}")]
    OperationFailed(String),

    #[error("directory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("directory service unavailable: {0}")]
    Unavailable(String),
}

pub const USER_SEARCH_LIMIT: usize = 50;
pub const GROUP_SEARCH_LIMIT: usize = 20;

/// Groups that must never be granted or revoked through the desk.
pub const BUILTIN_GROUPS: &[&str] = &[
    "Domain Admins",
    "Enterprise Admins",
    "Schema Admins",
    "Administrators",
    "Account Operators",
    "Backup Operators",
    "Server Operators",
    "Print Operators",
    "Domain Controllers",
    "Domain Users",
    "Domain Computers",
    "Domain Guests",
    "Group Policy Creator Owners",
];

pub fn is_builtin_group(name: &str) -> bool {
    let name = name.trim();
    BUILTIN_GROUPS.iter().any(|g| g.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserDetails {
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryUser {
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryGroup {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct NewDirectoryAccount {
    pub username: String,
    pub given_name: String,
    pub surname: String,
    pub display_name: String,
    pub email: String,
    pub title: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub manager: Option<String>,
    pub company: Option<String>,
    pub container: String,
    pub password: String,
}

impl fmt::Debug for NewDirectoryAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewDirectoryAccount")
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("container", &self.container)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

pub trait DirectoryClient: Send + Sync + 'static {
    fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = DirectoryResult<bool>> + Send;

    fn user_exists(&self, username: &str) -> impl Future<Output = DirectoryResult<bool>> + Send;

    fn is_member_of_group(
        &self,
        username: &str,
        group: &str,
    ) -> impl Future<Output = DirectoryResult<bool>> + Send;

    fn get_user_email(&self, username: &str) -> impl Future<Output = DirectoryResult<Option<String>>> + Send;

    fn get_user_details(
        &self,
        username: &str,
    ) -> impl Future<Output = DirectoryResult<Option<UserDetails>>> + Send;

    fn search_users(&self, term: &str) -> impl Future<Output = DirectoryResult<Vec<DirectoryUser>>> + Send;

    fn search_groups(&self, term: &str) -> impl Future<Output = DirectoryResult<Vec<DirectoryGroup>>> + Send;

    fn create_user(&self, account: &NewDirectoryAccount) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn disable_user(&self, username: &str) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn update_attributes(
        &self,
        username: &str,
        attributes: &BTreeMap<String, String>,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    /// Adding a present member succeeds without change.
    fn add_to_group(&self, username: &str, group: &str) -> impl Future<Output = DirectoryResult<()>> + Send;

    /// Removing an absent member succeeds without change.
    fn remove_from_group(&self, username: &str, group: &str) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn reset_password(
        &self,
        username: &str,
        new_password: &str,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;

    fn force_password_change_at_next_logon(
        &self,
        username: &str,
    ) -> impl Future<Output = DirectoryResult<()>> + Send;
}

/// User search for forms: short terms return nothing, results are bounded.
pub async fn lookup_users<D: DirectoryClient>(directory: &D, term: &str) -> DirectoryResult<Vec<DirectoryUser>> {
    let term = term.trim();
    if term.chars().count() < 2 {
        return Ok(Vec::new());
    }
    let mut users = directory.search_users(term).await?;
    users.truncate(USER_SEARCH_LIMIT);
    Ok(users)
}

/// Group search for forms; built-in groups are never offered.
pub async fn lookup_groups<D: DirectoryClient>(directory: &D, term: &str) -> DirectoryResult<Vec<DirectoryGroup>> {
    let term = term.trim();
    if term.chars().count() < 2 {
        return Ok(Vec::new());
    }
    let mut groups: Vec<DirectoryGroup> = directory
        .search_groups(term)
        .await?
        .into_iter()
        .filter(|group| !is_builtin_group(&group.name))
        .collect();
    groups.truncate(GROUP_SEARCH_LIMIT);
    Ok(groups)
}
