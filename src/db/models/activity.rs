use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// Append-only audit row. One per committed create, approve or reject.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, FromRow, ToSchema)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivityLog {
    pub user_id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ActivityFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub limit: Option<u32>,
}
