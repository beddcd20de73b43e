use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Target organisation for account creation; `ou_path` is the directory container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, FromRow, ToSchema)]
pub struct Company {
    pub id: i32,
    pub company_name: String,
    pub ou_path: Option<String>,
    pub is_active: bool,
}

impl Company {
    pub fn container<'a>(&'a self, default_ou: &'a str) -> &'a str {
        match self.ou_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => path,
            _ => default_ou,
        }
    }
}
