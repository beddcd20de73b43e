// src/db/models/requests.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::company::Company;
use super::user::SystemUser;

/// The six request families handled by the desk. Each one lives in its own table.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Creation,
    Deletion,
    Attribute,
    Password,
    Group,
    Network,
}

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        RequestKind::Creation,
        RequestKind::Deletion,
        RequestKind::Attribute,
        RequestKind::Password,
        RequestKind::Group,
        RequestKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Creation => "creation",
            RequestKind::Deletion => "deletion",
            RequestKind::Attribute => "attribute",
            RequestKind::Password => "password",
            RequestKind::Group => "group",
            RequestKind::Network => "network",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Human label used in audit actions and notification subjects.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Creation => "Account creation",
            RequestKind::Deletion => "Account deletion",
            RequestKind::Attribute => "Attribute change",
            RequestKind::Password => "Password reset",
            RequestKind::Group => "Group membership",
            RequestKind::Network => "Network",
        }
    }

    /// `EntityType` written to the activity log.
    pub fn entity_type(&self) -> &'static str {
        match self {
            RequestKind::Creation => "CreationRequest",
            RequestKind::Deletion => "DeletionRequest",
            RequestKind::Attribute => "AttributeRequest",
            RequestKind::Password => "PasswordResetRequest",
            RequestKind::Group => "GroupMembershipRequest",
            RequestKind::Network => "NetworkRequest",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            RequestKind::Creation => "creation_requests",
            RequestKind::Deletion => "deletion_requests",
            RequestKind::Attribute => "attribute_requests",
            RequestKind::Password => "password_requests",
            RequestKind::Group => "group_requests",
            RequestKind::Network => "network_requests",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirrors the immutable `request_statuses` reference rows.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub enum RequestStatus {
    Pending = 1,
    Approved = 2,
    Rejected = 3,
}

impl RequestStatus {
    pub fn id(&self) -> i32 {
        *self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(RequestStatus::Pending),
            2 => Some(RequestStatus::Approved),
            3 => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct CreationPayload {
    pub company_id: i32,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
}

impl CreationPayload {
    pub fn resolved_display_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", self.first_name.trim(), self.last_name.trim()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct DeletionPayload {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct AttributePayload {
    pub username: String,
    pub attribute_name: String,
    #[serde(default)]
    pub old_value: Option<String>,
    pub new_value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct PasswordPayload {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Where the new credentials are sent; looked up in the directory when absent.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupAction {
    Add,
    Remove,
}

impl GroupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupAction::Add => "add",
            GroupAction::Remove => "remove",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct GroupPayload {
    pub username: String,
    pub group_name: String,
    pub action_type: GroupAction,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOperation {
    DhcpReservation,
    DnsRecord,
}

impl NetworkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkOperation::DhcpReservation => "dhcp_reservation",
            NetworkOperation::DnsRecord => "dns_record",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum DnsRecordType {
    A,
    AAAA,
    CNAME,
    PTR,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::A => "A",
            DnsRecordType::AAAA => "AAAA",
            DnsRecordType::CNAME => "CNAME",
            DnsRecordType::PTR => "PTR",
        }
    }
}

/// DHCP reservations need `mac_address` + `ip_address`; DNS records need
/// `record_type` + `record_value`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
pub struct NetworkPayload {
    pub operation: NetworkOperation,
    pub hostname: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub record_type: Option<DnsRecordType>,
    #[serde(default)]
    pub record_value: Option<String>,
}

/// Kind-specific fields of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    Creation(CreationPayload),
    Deletion(DeletionPayload),
    Attribute(AttributePayload),
    Password(PasswordPayload),
    Group(GroupPayload),
    Network(NetworkPayload),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Creation(_) => RequestKind::Creation,
            RequestPayload::Deletion(_) => RequestKind::Deletion,
            RequestPayload::Attribute(_) => RequestKind::Attribute,
            RequestPayload::Password(_) => RequestKind::Password,
            RequestPayload::Group(_) => RequestKind::Group,
            RequestPayload::Network(_) => RequestKind::Network,
        }
    }

    /// Directory account (or host, for network requests) the request is about.
    pub fn subject(&self) -> &str {
        match self {
            RequestPayload::Creation(p) => &p.username,
            RequestPayload::Deletion(p) => &p.username,
            RequestPayload::Attribute(p) => &p.username,
            RequestPayload::Password(p) => &p.username,
            RequestPayload::Group(p) => &p.username,
            RequestPayload::Network(p) => &p.hostname,
        }
    }

    pub fn company_id(&self) -> Option<i32> {
        match self {
            RequestPayload::Creation(p) => Some(p.company_id),
            _ => None,
        }
    }

    /// Decodes the JSON image of a table row into the payload for `kind`.
    /// Shared columns in the image are ignored.
    pub fn from_row_json(kind: RequestKind, row: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RequestKind::Creation => RequestPayload::Creation(serde_json::from_value(row)?),
            RequestKind::Deletion => RequestPayload::Deletion(serde_json::from_value(row)?),
            RequestKind::Attribute => RequestPayload::Attribute(serde_json::from_value(row)?),
            RequestKind::Password => RequestPayload::Password(serde_json::from_value(row)?),
            RequestKind::Group => RequestPayload::Group(serde_json::from_value(row)?),
            RequestKind::Network => RequestPayload::Network(serde_json::from_value(row)?),
        })
    }
}

/// One row of any of the six request tables.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RequestRecord {
    pub id: i32,
    pub request_number: String,
    pub payload: RequestPayload,
    pub requested_by_id: i32,
    pub requested_date: DateTime<Utc>,
    pub status: RequestStatus,
    pub approved_by_id: Option<i32>,
    pub approved_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl RequestRecord {
    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }
}

/// A request with its references resolved through explicit joins.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct RequestDetails {
    pub record: RequestRecord,
    pub requested_by: SystemUser,
    pub approved_by: Option<SystemUser>,
    pub company: Option<Company>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub request_number: String,
    pub payload: RequestPayload,
    pub requested_by_id: i32,
    pub requested_date: DateTime<Utc>,
}

/// Closing write applied by approve or reject. Only ever lands on a Pending row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: RequestStatus,
    pub actor_id: i32,
    pub at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

impl StatusChange {
    pub fn approve(actor_id: i32, at: DateTime<Utc>) -> Self {
        Self { status: RequestStatus::Approved, actor_id, at, rejection_reason: None }
    }

    pub fn reject(actor_id: i32, at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Rejected,
            actor_id,
            at,
            rejection_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct CreatedRequest {
    pub id: i32,
    pub kind: RequestKind,
    pub request_number: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectRequestBody {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_decodes_from_row_image_with_extra_columns() {
        let row = json!({
            "id": 7,
            "request_number": "GRP20261018001",
            "status_id": 1,
            "username": "jdoe",
            "group_name": "VPN Users",
            "action_type": "remove"
        });

        let payload = RequestPayload::from_row_json(RequestKind::Group, row).unwrap();
        assert_eq!(
            payload,
            RequestPayload::Group(GroupPayload {
                username: "jdoe".into(),
                group_name: "VPN Users".into(),
                action_type: GroupAction::Remove,
            })
        );
    }

    #[test]
    fn tagged_payload_reports_its_kind() {
        let payload: RequestPayload = serde_json::from_value(json!({
            "kind": "password",
            "username": "jdoe"
        }))
        .unwrap();
        assert_eq!(payload.kind(), RequestKind::Password);
        assert_eq!(payload.subject(), "jdoe");
    }

    #[test]
    fn display_name_defaults_to_first_and_last() {
        let payload = CreationPayload {
            company_id: 1,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            display_name: Some("  ".into()),
            username: "jdoe".into(),
            email: None,
            title: None,
            department: None,
            phone: None,
            manager: None,
        };
        assert_eq!(payload.resolved_display_name(), "Jane Doe");
    }

    #[test]
    fn status_ids_match_reference_rows() {
        for status in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert_eq!(RequestStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(RequestStatus::from_id(4), None);
        assert!(RequestStatus::Rejected.is_terminal());
    }
}
