use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::db::store::StoreError;
use crate::directory::DirectoryError;
use crate::lifecycle::{LifecycleError, NotActionable};

/// Envelope shared by every JSON endpoint.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response
    pub fn success(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: Some(data),
            errors: None,
        }
    }

    /// Create an error response
    pub fn error(status: StatusCode, message: impl Into<String>, errors: Option<serde_json::Value>) -> Self {
        ApiResponse {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: None,
            errors,
        }
    }
}

impl From<LifecycleError> for ApiResponse<()> {
    fn from(err: LifecycleError) -> Self {
        match &err {
            LifecycleError::Validation(validation) => ApiResponse::error(
                StatusCode::BAD_REQUEST,
                "Request failed validation",
                Some(json!({ "error": validation.to_string() })),
            ),
            LifecycleError::DirectoryActionFailed { request_number, source } => ApiResponse::error(
                StatusCode::BAD_GATEWAY,
                format!("Directory action for {request_number} failed; the request is still pending"),
                Some(json!({ "error": source.to_string(), "retryable": err.is_retryable() })),
            ),
            LifecycleError::Storage(store) => store_error(store),
        }
    }
}

impl From<StoreError> for ApiResponse<()> {
    fn from(err: StoreError) -> Self {
        store_error(&err)
    }
}

impl From<DirectoryError> for ApiResponse<()> {
    fn from(err: DirectoryError) -> Self {
        let status = match err {
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DirectoryError::OperationFailed(_) | DirectoryError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        };
        ApiResponse::error(status, "Directory lookup failed", Some(json!({ "error": err.to_string() })))
    }
}

impl From<NotActionable> for ApiResponse<()> {
    fn from(reason: NotActionable) -> Self {
        match reason {
            NotActionable::NotFound => ApiResponse::error(StatusCode::NOT_FOUND, "Request not found", None),
            NotActionable::AlreadyProcessed(status) => ApiResponse::error(
                StatusCode::CONFLICT,
                format!("Request has already been {}", status.name().to_lowercase()),
                Some(json!({ "status": status.name() })),
            ),
        }
    }
}

fn store_error(err: &StoreError) -> ApiResponse<()> {
    match err {
        StoreError::NotFound => ApiResponse::error(StatusCode::NOT_FOUND, "Record not found", None),
        StoreError::Conflict(detail) => ApiResponse::error(
            StatusCode::CONFLICT,
            "Conflicting write",
            Some(json!({ "error": detail })),
        ),
        StoreError::Database(_) | StoreError::Corrupt { .. } => {
            error!(error = %err, "store failure");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal storage error", None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::requests::RequestStatus;
    use crate::lifecycle::ValidationError;
    use std::time::Duration;

    #[test]
    fn lifecycle_errors_map_to_status_codes() {
        let bad: ApiResponse<()> = LifecycleError::from(ValidationError::Missing { field: "username" }).into();
        assert_eq!(bad.status_code, 400);
        assert!(!bad.success);

        let gateway: ApiResponse<()> = LifecycleError::DirectoryActionFailed {
            request_number: "PWD20261018001".into(),
            source: DirectoryError::Timeout(Duration::from_secs(5)),
        }
        .into();
        assert_eq!(gateway.status_code, 502);
        assert_eq!(gateway.errors.unwrap()["retryable"], json!(true));

        let storage: ApiResponse<()> = LifecycleError::Storage(StoreError::Database("gone".into())).into();
        assert_eq!(storage.status_code, 500);
        assert!(storage.errors.is_none());
    }

    #[test]
    fn closed_requests_are_conflicts() {
        let response: ApiResponse<()> = NotActionable::AlreadyProcessed(RequestStatus::Approved).into();
        assert_eq!(response.status_code, 409);
        assert_eq!(response.message, "Request has already been approved");

        let missing: ApiResponse<()> = NotActionable::NotFound.into();
        assert_eq!(missing.status_code, 404);
    }
}
