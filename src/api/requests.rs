use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::db::models::activity::{ActivityFilter, ActivityLog};
use crate::db::models::company::Company;
use crate::db::models::dashboard::{DashboardCounts, RequestSummary};
use crate::db::models::requests::{
    CreatedRequest, RejectRequestBody, RequestDetails, RequestKind, RequestPayload, RequestRecord,
};
use crate::lifecycle::Transition;
use crate::middleware::auth::{require_approver, Identity};
use crate::utils::api_response::ApiResponse;

pub fn request_routes(state: AppState) -> Router<AppState> {
    let closing = Router::new()
        .route("/requests/{kind}/{id}/approve", post(approve_request))
        .route("/requests/{kind}/{id}/reject", post(reject_request))
        .route_layer(from_fn_with_state(state, require_approver));

    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/pending", get(list_pending))
        .route("/requests/mine", get(list_mine))
        .route("/requests/{kind}/{id}", get(get_request))
        .route("/dashboard", get(dashboard))
        .route("/companies", get(list_companies))
        .route("/activity", get(list_activity))
        .merge(closing)
}

fn parse_kind(kind: &str) -> Result<RequestKind, ApiResponse<()>> {
    RequestKind::parse(kind).ok_or_else(|| {
        ApiResponse::error(
            StatusCode::NOT_FOUND,
            format!("Unknown request kind '{kind}'"),
            None,
        )
    })
}

fn completed(transition: Transition) -> Result<RequestRecord, ApiResponse<()>> {
    match transition {
        Transition::Completed(record) => Ok(record),
        Transition::NotActionable(reason) => Err(reason.into()),
    }
}

#[utoipa::path(
    post,
    path = "/requests",
    request_body = RequestPayload,
    responses(
        (status = 201, description = "Request filed as Pending", body = CreatedRequest),
        (status = 400, description = "Request failed validation"),
        (status = 500, description = "Failed to store the request")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn create_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<RequestPayload>,
) -> Result<ApiResponse<CreatedRequest>, ApiResponse<()>> {
    let created = state.desk.create_request(payload, &identity.actor()).await?;
    Ok(ApiResponse::success(
        StatusCode::CREATED,
        format!("Request {} submitted", created.request_number),
        created,
    ))
}

#[utoipa::path(
    get,
    path = "/requests/pending",
    responses(
        (status = 200, description = "Pending requests of every kind, newest first", body = [RequestSummary])
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_pending(State(state): State<AppState>) -> Result<ApiResponse<Vec<RequestSummary>>, ApiResponse<()>> {
    let pending = state.desk.list_pending().await?;
    Ok(ApiResponse::success(StatusCode::OK, "Pending requests retrieved", pending))
}

#[utoipa::path(
    get,
    path = "/requests/mine",
    responses(
        (status = 200, description = "Requests filed by the caller, newest first", body = [RequestSummary])
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<ApiResponse<Vec<RequestSummary>>, ApiResponse<()>> {
    let mine = state.desk.list_for_requester(&identity.username).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Your requests retrieved", mine))
}

#[utoipa::path(
    get,
    path = "/requests/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "creation, deletion, attribute, password, group or network"),
        ("id" = i32, Path, description = "Request id within its kind")
    ),
    responses(
        (status = 200, description = "Request with requester, approver and company", body = RequestDetails),
        (status = 404, description = "Request not found")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<ApiResponse<RequestDetails>, ApiResponse<()>> {
    let kind = parse_kind(&kind)?;
    match state.desk.get_request(kind, id).await? {
        Some(details) => Ok(ApiResponse::success(StatusCode::OK, "Request retrieved", details)),
        None => Err(ApiResponse::error(StatusCode::NOT_FOUND, "Request not found", None)),
    }
}

#[utoipa::path(
    post,
    path = "/requests/{kind}/{id}/approve",
    params(
        ("kind" = String, Path, description = "Request kind"),
        ("id" = i32, Path, description = "Request id within its kind")
    ),
    responses(
        (status = 200, description = "Directory change applied and request approved", body = RequestRecord),
        (status = 403, description = "Approver role required"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already approved or rejected"),
        (status = 502, description = "Directory action failed; request left Pending")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<ApiResponse<RequestRecord>, ApiResponse<()>> {
    let kind = parse_kind(&kind)?;
    let record = completed(state.desk.approve(kind, id, &identity.actor()).await?)?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("Request {} approved", record.request_number),
        record,
    ))
}

#[utoipa::path(
    post,
    path = "/requests/{kind}/{id}/reject",
    params(
        ("kind" = String, Path, description = "Request kind"),
        ("id" = i32, Path, description = "Request id within its kind")
    ),
    request_body = RejectRequestBody,
    responses(
        (status = 200, description = "Request rejected", body = RequestRecord),
        (status = 400, description = "Reason missing or too long"),
        (status = 403, description = "Approver role required"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already approved or rejected")
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((kind, id)): Path<(String, i32)>,
    Json(body): Json<RejectRequestBody>,
) -> Result<ApiResponse<RequestRecord>, ApiResponse<()>> {
    let kind = parse_kind(&kind)?;
    let record = completed(state.desk.reject(kind, id, &body.reason, &identity.actor()).await?)?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("Request {} rejected", record.request_number),
        record,
    ))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Pending, approved and rejected counts per kind", body = DashboardCounts)
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn dashboard(State(state): State<AppState>) -> Result<ApiResponse<DashboardCounts>, ApiResponse<()>> {
    let counts = state.desk.dashboard().await?;
    Ok(ApiResponse::success(StatusCode::OK, "Dashboard counts retrieved", counts))
}

#[utoipa::path(
    get,
    path = "/companies",
    responses(
        (status = 200, description = "Active companies accounts can be created for", body = [Company])
    ),
    tag = "Requests",
    security(("bearerAuth" = []))
)]
pub async fn list_companies(State(state): State<AppState>) -> Result<ApiResponse<Vec<Company>>, ApiResponse<()>> {
    let companies = state.desk.companies().await?;
    Ok(ApiResponse::success(StatusCode::OK, "Companies retrieved", companies))
}

#[utoipa::path(
    get,
    path = "/activity",
    params(ActivityFilter),
    responses(
        (status = 200, description = "Audit trail, newest first or for one entity", body = [ActivityLog])
    ),
    tag = "Activity",
    security(("bearerAuth" = []))
)]
pub async fn list_activity(
    State(state): State<AppState>,
    Query(filter): Query<ActivityFilter>,
) -> Result<ApiResponse<Vec<ActivityLog>>, ApiResponse<()>> {
    let entries = state.desk.activity(&filter).await?;
    Ok(ApiResponse::success(StatusCode::OK, "Activity retrieved", entries))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_request,
        list_pending,
        list_mine,
        get_request,
        approve_request,
        reject_request,
        dashboard,
        list_companies,
        list_activity
    ),
    components(schemas(
        RequestPayload, CreatedRequest, RequestRecord, RequestDetails, RejectRequestBody,
        RequestSummary, DashboardCounts, Company, ActivityLog
    )),
    tags(
        (name = "Requests", description = "File, review and close change requests"),
        (name = "Activity", description = "Audit trail")
    )
)]
pub struct RequestDoc;
