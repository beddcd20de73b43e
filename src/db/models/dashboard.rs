use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::requests::{RequestKind, RequestStatus};

/// Normalized, kind-agnostic view of one request for listings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RequestSummary {
    pub id: i32,
    pub request_number: String,
    pub kind: RequestKind,
    pub display_name: String,
    pub username: String,
    pub email: Option<String>,
    /// Company name for creation requests, a short description of the change otherwise.
    pub company: String,
    pub status: String,
    pub requested_date: DateTime<Utc>,
    pub requested_by_display_name: String,
    pub approved_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub struct StatusCount {
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
pub struct KindCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub struct KindBreakdown {
    pub kind: RequestKind,
    pub counts: KindCounts,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, ToSchema)]
pub struct DashboardCounts {
    pub pending_creation: i64,
    pub pending_deletion: i64,
    pub approved_creation: i64,
    pub approved_deletion: i64,
    pub rejected_creation: i64,
    pub rejected_deletion: i64,
    pub total_requests: i64,
    pub by_kind: Vec<KindBreakdown>,
}

impl DashboardCounts {
    pub fn from_counts(counts: &[StatusCount]) -> Self {
        let mut by_kind: Vec<KindBreakdown> = RequestKind::ALL
            .iter()
            .map(|kind| KindBreakdown { kind: *kind, counts: KindCounts::default() })
            .collect();

        for count in counts {
            if let Some(slot) = by_kind.iter_mut().find(|b| b.kind == count.kind) {
                match count.status {
                    RequestStatus::Pending => slot.counts.pending += count.count,
                    RequestStatus::Approved => slot.counts.approved += count.count,
                    RequestStatus::Rejected => slot.counts.rejected += count.count,
                }
            }
        }

        let of = |kind: RequestKind| {
            by_kind
                .iter()
                .find(|b| b.kind == kind)
                .map(|b| b.counts)
                .unwrap_or_default()
        };
        let creation = of(RequestKind::Creation);
        let deletion = of(RequestKind::Deletion);

        Self {
            pending_creation: creation.pending,
            pending_deletion: deletion.pending,
            approved_creation: creation.approved,
            approved_deletion: deletion.approved,
            rejected_creation: creation.rejected,
            rejected_deletion: deletion.rejected,
            total_requests: counts.iter().map(|c| c.count).sum(),
            by_kind,
        }
    }
}
