// PostgreSQL implementation of the Request Store.

pub mod activity;
pub mod company;
pub mod requests;
pub mod user;

use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::activity::{ActivityLog, NewActivityLog};
use crate::db::models::company::Company;
use crate::db::models::dashboard::StatusCount;
use crate::db::models::requests::{
    NewRequest, RequestDetails, RequestKind, RequestRecord, StatusChange,
};
use crate::db::models::user::{NewSystemUser, SystemUser};
use crate::db::store::{RequestStore, StoreResult, StoreTransaction};

#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl StoreTransaction for PgTransaction {
    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<SystemUser>> {
        user::find_by_username(&mut *self.tx, username).await
    }

    async fn get_user(&mut self, id: i32) -> StoreResult<Option<SystemUser>> {
        user::get(&mut *self.tx, id).await
    }

    async fn upsert_system_user(&mut self, new_user: &NewSystemUser) -> StoreResult<SystemUser> {
        user::upsert(&mut self.tx, new_user).await
    }

    async fn get_company(&mut self, id: i32) -> StoreResult<Option<Company>> {
        company::get(&mut *self.tx, id).await
    }

    async fn last_request_number(&mut self, kind: RequestKind, prefix: &str) -> StoreResult<Option<String>> {
        requests::last_request_number(&mut self.tx, kind, prefix).await
    }

    async fn insert_request(&mut self, request: &NewRequest) -> StoreResult<i32> {
        requests::insert_request(&mut self.tx, request).await
    }

    async fn get_request(&mut self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestRecord>> {
        requests::get_request(&mut *self.tx, kind, id).await
    }

    async fn update_request_status(
        &mut self,
        kind: RequestKind,
        id: i32,
        change: &StatusChange,
    ) -> StoreResult<bool> {
        requests::update_request_status(&mut self.tx, kind, id, change).await
    }

    async fn append_activity_log(&mut self, entry: &NewActivityLog) -> StoreResult<i64> {
        activity::append(&mut self.tx, entry).await
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl RequestStore for PgRequestStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_requester_by_username(&self, username: &str) -> StoreResult<Option<SystemUser>> {
        user::find_by_username(&self.pool, username).await
    }

    async fn users_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<SystemUser>> {
        user::by_ids(&self.pool, ids).await
    }

    async fn companies_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<Company>> {
        company::by_ids(&self.pool, ids).await
    }

    async fn list_active_companies(&self) -> StoreResult<Vec<Company>> {
        company::list_active(&self.pool).await
    }

    async fn get_request_by_id(&self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestDetails>> {
        requests::get_request_details(&self.pool, kind, id).await
    }

    async fn query_pending(&self, kind: RequestKind) -> StoreResult<Vec<RequestRecord>> {
        requests::query_pending(&self.pool, kind).await
    }

    async fn query_by_requester(&self, kind: RequestKind, requester_id: i32) -> StoreResult<Vec<RequestRecord>> {
        requests::query_by_requester(&self.pool, kind, requester_id).await
    }

    async fn merged_pending(&self) -> StoreResult<Vec<RequestDetails>> {
        requests::merged_pending(&self.pool).await
    }

    async fn merged_by_requester(&self, requester_id: i32) -> StoreResult<Vec<RequestDetails>> {
        requests::merged_by_requester(&self.pool, requester_id).await
    }

    async fn status_counts(&self) -> StoreResult<Vec<StatusCount>> {
        requests::status_counts(&self.pool).await
    }

    async fn recent_activity(&self, limit: u32) -> StoreResult<Vec<ActivityLog>> {
        activity::recent(&self.pool, limit).await
    }

    async fn activity_for_entity(&self, entity_type: &str, entity_id: i32) -> StoreResult<Vec<ActivityLog>> {
        activity::for_entity(&self.pool, entity_type, entity_id).await
    }
}
