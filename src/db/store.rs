// Request Store capability.
//
// Writes go through a [`StoreTransaction`] obtained from [`RequestStore::begin`];
// dropping a transaction without committing rolls it back. Reads that do not
// take part in a lifecycle transition run directly against the store.

use std::future::Future;

use crate::db::models::activity::{ActivityLog, NewActivityLog};
use crate::db::models::company::Company;
use crate::db::models::dashboard::StatusCount;
use crate::db::models::requests::{
    NewRequest, RequestDetails, RequestKind, RequestRecord, StatusChange,
};
use crate::db::models::user::{NewSystemUser, SystemUser};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Writes spanning one lifecycle transition.
pub trait StoreTransaction: Send {
    fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> impl Future<Output = StoreResult<Option<SystemUser>>> + Send;

    fn get_user(&mut self, id: i32) -> impl Future<Output = StoreResult<Option<SystemUser>>> + Send;

    /// Insert-if-absent on the unique username; returns the stored row either way.
    fn upsert_system_user(
        &mut self,
        user: &NewSystemUser,
    ) -> impl Future<Output = StoreResult<SystemUser>> + Send;

    fn get_company(&mut self, id: i32) -> impl Future<Output = StoreResult<Option<Company>>> + Send;

    /// Last number of `kind` starting with `prefix`, ordered by length then
    /// lexically so a widened counter still sorts last. Serializes concurrent
    /// numbering of the same kind until the transaction ends.
    fn last_request_number(
        &mut self,
        kind: RequestKind,
        prefix: &str,
    ) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    fn insert_request(&mut self, request: &NewRequest) -> impl Future<Output = StoreResult<i32>> + Send;

    fn get_request(
        &mut self,
        kind: RequestKind,
        id: i32,
    ) -> impl Future<Output = StoreResult<Option<RequestRecord>>> + Send;

    /// Compare-and-set on the status: applies `change` only while the row is
    /// still Pending. `false` means another transition got there first.
    fn update_request_status(
        &mut self,
        kind: RequestKind,
        id: i32,
        change: &StatusChange,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn append_activity_log(
        &mut self,
        entry: &NewActivityLog,
    ) -> impl Future<Output = StoreResult<i64>> + Send;

    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}

pub trait RequestStore: Clone + Send + Sync + 'static {
    type Tx: StoreTransaction;

    fn begin(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;

    /// Cheap round trip used by readiness checks.
    fn ping(&self) -> impl Future<Output = StoreResult<()>> + Send;

    fn find_requester_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = StoreResult<Option<SystemUser>>> + Send;

    fn users_by_ids(&self, ids: &[i32]) -> impl Future<Output = StoreResult<Vec<SystemUser>>> + Send;

    fn companies_by_ids(&self, ids: &[i32]) -> impl Future<Output = StoreResult<Vec<Company>>> + Send;

    fn list_active_companies(&self) -> impl Future<Output = StoreResult<Vec<Company>>> + Send;

    /// Request with requester, approver and company resolved.
    fn get_request_by_id(
        &self,
        kind: RequestKind,
        id: i32,
    ) -> impl Future<Output = StoreResult<Option<RequestDetails>>> + Send;

    fn query_pending(&self, kind: RequestKind) -> impl Future<Output = StoreResult<Vec<RequestRecord>>> + Send;

    fn query_by_requester(
        &self,
        kind: RequestKind,
        requester_id: i32,
    ) -> impl Future<Output = StoreResult<Vec<RequestRecord>>> + Send;

    /// Pending requests of every kind in one round trip.
    fn merged_pending(&self) -> impl Future<Output = StoreResult<Vec<RequestDetails>>> + Send;

    /// Every request filed by `requester_id`, all kinds, one round trip.
    fn merged_by_requester(
        &self,
        requester_id: i32,
    ) -> impl Future<Output = StoreResult<Vec<RequestDetails>>> + Send;

    fn status_counts(&self) -> impl Future<Output = StoreResult<Vec<StatusCount>>> + Send;

    fn recent_activity(&self, limit: u32) -> impl Future<Output = StoreResult<Vec<ActivityLog>>> + Send;

    fn activity_for_entity(
        &self,
        entity_type: &str,
        entity_id: i32,
    ) -> impl Future<Output = StoreResult<Vec<ActivityLog>>> + Send;
}
