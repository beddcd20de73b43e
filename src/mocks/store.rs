// In-memory [`RequestStore`].
//
// A transaction takes the store lock for its whole life and works on a copy
// of the state; commit writes the copy back, drop discards it. Transactions
// are therefore serialized, which is enough to observe the status guard.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::activity::{ActivityLog, NewActivityLog};
use crate::db::models::company::Company;
use crate::db::models::dashboard::StatusCount;
use crate::db::models::requests::{
    NewRequest, RequestDetails, RequestKind, RequestPayload, RequestRecord, RequestStatus, StatusChange,
};
use crate::db::models::user::{NewSystemUser, SystemUser};
use crate::db::store::{RequestStore, StoreError, StoreResult, StoreTransaction};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    users: Vec<SystemUser>,
    companies: Vec<Company>,
    requests: BTreeMap<(RequestKind, i32), RequestRecord>,
    activity: Vec<ActivityLog>,
}

impl MemoryState {
    fn next_request_id(&self, kind: RequestKind) -> i32 {
        self.requests
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn user(&self, id: i32) -> Option<&SystemUser> {
        self.users.iter().find(|u| u.id == id)
    }

    fn details(&self, record: &RequestRecord) -> StoreResult<RequestDetails> {
        let requested_by = self.user(record.requested_by_id).cloned().ok_or_else(|| StoreError::Corrupt {
            table: record.kind().table(),
            reason: format!("requested_by_id {} has no user row", record.requested_by_id),
        })?;
        let approved_by = record.approved_by_id.and_then(|id| self.user(id).cloned());
        let company = record
            .payload
            .company_id()
            .and_then(|id| self.companies.iter().find(|c| c.id == id).cloned());
        Ok(RequestDetails { record: record.clone(), requested_by, approved_by, company })
    }

    fn merged<F: Fn(&RequestRecord) -> bool>(&self, filter: F) -> StoreResult<Vec<RequestDetails>> {
        let mut merged = self
            .requests
            .values()
            .filter(|r| filter(r))
            .map(|r| self.details(r))
            .collect::<StoreResult<Vec<_>>>()?;
        merged.sort_by(|a, b| {
            b.record
                .requested_date
                .cmp(&a.record.requested_date)
                .then_with(|| b.record.request_number.cmp(&a.record.request_number))
        });
        Ok(merged)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_merged: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Starts with the same reference data as a freshly migrated database:
    /// one active company, `Head Office`, with id 1.
    pub fn new() -> Self {
        let state = MemoryState {
            companies: vec![Company {
                id: 1,
                company_name: "Head Office".to_string(),
                ou_path: None,
                is_active: true,
            }],
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            fail_merged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes the single-query listings fail so callers take their fallback path.
    pub fn fail_merged_queries(&self, fail: bool) {
        self.fail_merged.store(fail, Ordering::SeqCst);
    }

    pub async fn add_company(&self, name: &str, ou_path: Option<&str>, is_active: bool) -> Company {
        let mut state = self.state.lock().await;
        let company = Company {
            id: state.companies.iter().map(|c| c.id).max().unwrap_or(0) + 1,
            company_name: name.to_string(),
            ou_path: ou_path.map(str::to_string),
            is_active,
        };
        state.companies.push(company.clone());
        company
    }

    pub async fn users(&self) -> Vec<SystemUser> {
        self.state.lock().await.users.clone()
    }

    pub async fn request(&self, kind: RequestKind, id: i32) -> Option<RequestRecord> {
        self.state.lock().await.requests.get(&(kind, id)).cloned()
    }

    pub async fn activity(&self) -> Vec<ActivityLog> {
        self.state.lock().await.activity.clone()
    }

    pub async fn activity_for(&self, kind: RequestKind, id: i32) -> Vec<ActivityLog> {
        self.activity_for_entity(kind.entity_type(), id).await.unwrap_or_default()
    }

    /// Backdates a request, for ordering tests.
    pub async fn set_requested_date(&self, kind: RequestKind, id: i32, at: DateTime<Utc>) {
        if let Some(record) = self.state.lock().await.requests.get_mut(&(kind, id)) {
            record.requested_date = at;
        }
    }

    fn merged_failure(&self) -> StoreResult<()> {
        if self.fail_merged.load(Ordering::SeqCst) {
            return Err(StoreError::Database("merged request query failed".to_string()));
        }
        Ok(())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

impl StoreTransaction for MemoryTransaction {
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<SystemUser>> {
        Ok(self.work.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_user(&mut self, id: i32) -> StoreResult<Option<SystemUser>> {
        Ok(self.work.user(id).cloned())
    }

    async fn upsert_system_user(&mut self, user: &NewSystemUser) -> StoreResult<SystemUser> {
        if let Some(existing) = self.work.users.iter().find(|u| u.username == user.username) {
            return Ok(existing.clone());
        }
        let stored = SystemUser {
            id: self.work.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            is_active: true,
            created_date: Utc::now(),
        };
        self.work.users.push(stored.clone());
        Ok(stored)
    }

    async fn get_company(&mut self, id: i32) -> StoreResult<Option<Company>> {
        Ok(self.work.companies.iter().find(|c| c.id == id).cloned())
    }

    async fn last_request_number(&mut self, kind: RequestKind, prefix: &str) -> StoreResult<Option<String>> {
        Ok(self
            .work
            .requests
            .values()
            .filter(|r| r.kind() == kind && r.request_number.starts_with(prefix))
            .map(|r| r.request_number.clone())
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b))))
    }

    async fn insert_request(&mut self, request: &NewRequest) -> StoreResult<i32> {
        let kind = request.payload.kind();
        if self
            .work
            .requests
            .values()
            .any(|r| r.kind() == kind && r.request_number == request.request_number)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate request_number {}",
                request.request_number
            )));
        }

        let mut payload = request.payload.clone();
        if let RequestPayload::Creation(p) = &mut payload {
            p.display_name = Some(p.resolved_display_name());
        }

        let id = self.work.next_request_id(kind);
        self.work.requests.insert(
            (kind, id),
            RequestRecord {
                id,
                request_number: request.request_number.clone(),
                payload,
                requested_by_id: request.requested_by_id,
                requested_date: request.requested_date,
                status: RequestStatus::Pending,
                approved_by_id: None,
                approved_date: None,
                rejection_reason: None,
            },
        );
        Ok(id)
    }

    async fn get_request(&mut self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestRecord>> {
        Ok(self.work.requests.get(&(kind, id)).cloned())
    }

    async fn update_request_status(&mut self, kind: RequestKind, id: i32, change: &StatusChange) -> StoreResult<bool> {
        match self.work.requests.get_mut(&(kind, id)) {
            Some(record) if record.status == RequestStatus::Pending => {
                record.status = change.status;
                record.approved_by_id = Some(change.actor_id);
                record.approved_date = Some(change.at);
                record.rejection_reason = change.rejection_reason.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_activity_log(&mut self, entry: &NewActivityLog) -> StoreResult<i64> {
        let id = self.work.activity.len() as i64 + 1;
        self.work.activity.push(ActivityLog {
            id,
            user_id: entry.user_id,
            action: entry.action.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id,
            details: entry.details.clone(),
            ip_address: entry.ip_address.clone(),
            created_date: entry.created_date,
        });
        Ok(id)
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTransaction { mut guard, work } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

impl RequestStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTransaction { guard, work })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_requester_by_username(&self, username: &str) -> StoreResult<Option<SystemUser>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn users_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<SystemUser>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn companies_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<Company>> {
        let state = self.state.lock().await;
        Ok(state.companies.iter().filter(|c| ids.contains(&c.id)).cloned().collect())
    }

    async fn list_active_companies(&self) -> StoreResult<Vec<Company>> {
        let state = self.state.lock().await;
        let mut companies: Vec<Company> = state.companies.iter().filter(|c| c.is_active).cloned().collect();
        companies.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        Ok(companies)
    }

    async fn get_request_by_id(&self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestDetails>> {
        let state = self.state.lock().await;
        state.requests.get(&(kind, id)).map(|r| state.details(r)).transpose()
    }

    async fn query_pending(&self, kind: RequestKind) -> StoreResult<Vec<RequestRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.kind() == kind && r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn query_by_requester(&self, kind: RequestKind, requester_id: i32) -> StoreResult<Vec<RequestRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.kind() == kind && r.requested_by_id == requester_id)
            .cloned()
            .collect())
    }

    async fn merged_pending(&self) -> StoreResult<Vec<RequestDetails>> {
        self.merged_failure()?;
        let state = self.state.lock().await;
        state.merged(|r| r.status == RequestStatus::Pending)
    }

    async fn merged_by_requester(&self, requester_id: i32) -> StoreResult<Vec<RequestDetails>> {
        self.merged_failure()?;
        let state = self.state.lock().await;
        state.merged(|r| r.requested_by_id == requester_id)
    }

    async fn status_counts(&self) -> StoreResult<Vec<StatusCount>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<(RequestKind, i32), i64> = BTreeMap::new();
        for record in state.requests.values() {
            *counts.entry((record.kind(), record.status.id())).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter_map(|((kind, status), count)| {
                RequestStatus::from_id(status).map(|status| StatusCount { kind, status, count })
            })
            .collect())
    }

    async fn recent_activity(&self, limit: u32) -> StoreResult<Vec<ActivityLog>> {
        let state = self.state.lock().await;
        Ok(state.activity.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn activity_for_entity(&self, entity_type: &str, entity_id: i32) -> StoreResult<Vec<ActivityLog>> {
        let state = self.state.lock().await;
        Ok(state
            .activity
            .iter()
            .filter(|a| a.entity_type == entity_type && a.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
