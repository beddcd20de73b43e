// Aggregation / Query Service.
//
// Listings across the six request tables. The merged single-query path is
// tried first; if it fails the same result is assembled table by table with
// batch-loaded users and companies. Both paths share one summarizer and one
// ordering, so callers cannot tell which one ran.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::db::models::dashboard::{DashboardCounts, RequestSummary};
use crate::db::models::requests::{
    GroupAction, NetworkOperation, RequestDetails, RequestKind, RequestPayload, RequestRecord,
};
use crate::db::models::user::normalize_username;
use crate::db::store::{RequestStore, StoreError, StoreResult};

#[derive(Clone)]
pub struct AggregationService<S> {
    store: S,
}

impl<S: RequestStore> AggregationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Pending requests of every kind, newest first.
    pub async fn list_pending(&self) -> StoreResult<Vec<RequestSummary>> {
        let details = match self.store.merged_pending().await {
            Ok(details) => details,
            Err(err) => {
                warn!(error = %err, "merged pending query failed; querying each request table");
                let mut records = Vec::new();
                for kind in RequestKind::ALL {
                    records.extend(self.store.query_pending(kind).await?);
                }
                self.resolve(records).await?
            }
        };
        Ok(summarize_all(&details))
    }

    /// Everything `username` has filed, newest first. Unknown users have filed nothing.
    pub async fn list_for_requester(&self, username: &str) -> StoreResult<Vec<RequestSummary>> {
        let username = normalize_username(username);
        let Some(requester) = self.store.find_requester_by_username(&username).await? else {
            return Ok(Vec::new());
        };

        let details = match self.store.merged_by_requester(requester.id).await {
            Ok(details) => details,
            Err(err) => {
                warn!(error = %err, %username, "merged requester query failed; querying each request table");
                let mut records = Vec::new();
                for kind in RequestKind::ALL {
                    records.extend(self.store.query_by_requester(kind, requester.id).await?);
                }
                self.resolve(records).await?
            }
        };
        Ok(summarize_all(&details))
    }

    pub async fn dashboard_counts(&self) -> StoreResult<DashboardCounts> {
        let counts = self.store.status_counts().await?;
        Ok(DashboardCounts::from_counts(&counts))
    }

    /// Batch-loads the users and companies referenced by `records`.
    async fn resolve(&self, records: Vec<RequestRecord>) -> StoreResult<Vec<RequestDetails>> {
        let user_ids: Vec<i32> = records
            .iter()
            .flat_map(|r| std::iter::once(r.requested_by_id).chain(r.approved_by_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let company_ids: Vec<i32> = records
            .iter()
            .filter_map(|r| r.payload.company_id())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let users: HashMap<i32, _> = self
            .store
            .users_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let companies: HashMap<i32, _> = if company_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .companies_by_ids(&company_ids)
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        records
            .into_iter()
            .map(|record| {
                let requested_by = users.get(&record.requested_by_id).cloned().ok_or_else(|| StoreError::Corrupt {
                    table: record.kind().table(),
                    reason: format!("requested_by_id {} has no user row", record.requested_by_id),
                })?;
                let approved_by = record.approved_by_id.and_then(|id| users.get(&id).cloned());
                let company = record.payload.company_id().and_then(|id| companies.get(&id).cloned());
                Ok(RequestDetails { record, requested_by, approved_by, company })
            })
            .collect()
    }
}

fn summarize_all(details: &[RequestDetails]) -> Vec<RequestSummary> {
    let mut summaries: Vec<RequestSummary> = details.iter().map(summarize).collect();
    summaries.sort_by(|a, b| {
        b.requested_date
            .cmp(&a.requested_date)
            .then_with(|| b.request_number.cmp(&a.request_number))
    });
    summaries
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn summarize(details: &RequestDetails) -> RequestSummary {
    let record = &details.record;
    let (display_name, email, company) = match &record.payload {
        RequestPayload::Creation(p) => (
            p.resolved_display_name(),
            p.email.clone(),
            details
                .company
                .as_ref()
                .map(|c| c.company_name.clone())
                .unwrap_or_else(|| format!("Company #{}", p.company_id)),
        ),
        RequestPayload::Deletion(p) => (
            non_blank(&p.display_name).unwrap_or(p.username.as_str()).to_string(),
            None,
            "Account disable".to_string(),
        ),
        RequestPayload::Attribute(p) => (p.username.clone(), None, format!("Attribute: {}", p.attribute_name)),
        RequestPayload::Password(p) => (
            non_blank(&p.display_name).unwrap_or(p.username.as_str()).to_string(),
            p.email.clone(),
            "Password reset".to_string(),
        ),
        RequestPayload::Group(p) => (
            p.username.clone(),
            None,
            match p.action_type {
                GroupAction::Add => format!("Add to {}", p.group_name),
                GroupAction::Remove => format!("Remove from {}", p.group_name),
            },
        ),
        RequestPayload::Network(p) => (
            p.hostname.clone(),
            None,
            match p.operation {
                NetworkOperation::DhcpReservation => {
                    format!("DHCP reservation {}", p.ip_address.as_deref().unwrap_or_default())
                }
                NetworkOperation::DnsRecord => format!(
                    "DNS {} record",
                    p.record_type.map(|t| t.as_str()).unwrap_or_default()
                ),
            },
        ),
    };

    RequestSummary {
        id: record.id,
        request_number: record.request_number.clone(),
        kind: record.kind(),
        display_name,
        username: record.payload.subject().to_string(),
        email,
        company,
        status: record.status.name().to_string(),
        requested_date: record.requested_date,
        requested_by_display_name: details.requested_by.display_name.clone(),
        approved_date: record.approved_date,
    }
}
