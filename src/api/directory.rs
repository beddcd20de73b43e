use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::app_state::AppState;
use crate::directory::{DirectoryGroup, DirectoryUser};
use crate::utils::api_response::ApiResponse;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// At least two characters; shorter terms return nothing
    #[serde(default)]
    pub term: String,
}

pub fn directory_routes() -> Router<AppState> {
    Router::new()
        .route("/directory/users", get(search_users))
        .route("/directory/groups", get(search_groups))
}

#[utoipa::path(
    get,
    path = "/directory/users",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching directory accounts, at most 50", body = [DirectoryUser]),
        (status = 502, description = "Directory unavailable")
    ),
    tag = "Directory",
    security(("bearerAuth" = []))
)]
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Vec<DirectoryUser>>, ApiResponse<()>> {
    let users = state.desk.search_users(&query.term).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Directory users retrieved", users))
}

#[utoipa::path(
    get,
    path = "/directory/groups",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching groups, built-in groups excluded, at most 20", body = [DirectoryGroup]),
        (status = 502, description = "Directory unavailable")
    ),
    tag = "Directory",
    security(("bearerAuth" = []))
)]
pub async fn search_groups(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Vec<DirectoryGroup>>, ApiResponse<()>> {
    let groups = state.desk.search_groups(&query.term).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Directory groups retrieved", groups))
}

#[derive(OpenApi)]
#[openapi(
    paths(search_users, search_groups),
    components(schemas(DirectoryUser, DirectoryGroup)),
    tags(
        (name = "Directory", description = "Account and group lookups for request forms")
    )
)]
pub struct DirectoryDoc;
