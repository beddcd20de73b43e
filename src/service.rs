// Object-safe façade over the engine and the aggregation service.
//
// The HTTP layer holds an `Arc<dyn ApprovalDesk>` so handlers stay free of
// the store, directory and notifier type parameters.

use async_trait::async_trait;

use crate::aggregation::AggregationService;
use crate::db::models::activity::{ActivityFilter, ActivityLog};
use crate::db::models::company::Company;
use crate::db::models::dashboard::{DashboardCounts, RequestSummary};
use crate::db::models::requests::{CreatedRequest, RequestDetails, RequestKind, RequestPayload};
use crate::db::store::{RequestStore, StoreResult};
use crate::directory::{self, DirectoryClient, DirectoryGroup, DirectoryResult, DirectoryUser};
use crate::lifecycle::{ActorContext, LifecycleEngine, LifecycleError, Transition};
use crate::notify::Notifier;

pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
pub const MAX_ACTIVITY_LIMIT: u32 = 200;

#[async_trait]
pub trait ApprovalDesk: Send + Sync {
    async fn create_request(&self, payload: RequestPayload, actor: &ActorContext) -> Result<CreatedRequest, LifecycleError>;

    async fn approve(&self, kind: RequestKind, id: i32, actor: &ActorContext) -> Result<Transition, LifecycleError>;

    async fn reject(
        &self,
        kind: RequestKind,
        id: i32,
        reason: &str,
        actor: &ActorContext,
    ) -> Result<Transition, LifecycleError>;

    async fn get_request(&self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestDetails>>;

    async fn list_pending(&self) -> StoreResult<Vec<RequestSummary>>;

    async fn list_for_requester(&self, username: &str) -> StoreResult<Vec<RequestSummary>>;

    async fn dashboard(&self) -> StoreResult<DashboardCounts>;

    async fn companies(&self) -> StoreResult<Vec<Company>>;

    async fn activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLog>>;

    async fn search_users(&self, term: &str) -> DirectoryResult<Vec<DirectoryUser>>;

    async fn search_groups(&self, term: &str) -> DirectoryResult<Vec<DirectoryGroup>>;

    async fn ready(&self) -> StoreResult<()>;
}

pub struct Desk<S, D, N> {
    engine: LifecycleEngine<S, D, N>,
    aggregation: AggregationService<S>,
}

impl<S, D, N> Desk<S, D, N>
where
    S: RequestStore,
    D: DirectoryClient,
    N: Notifier,
{
    pub fn new(engine: LifecycleEngine<S, D, N>) -> Self {
        let aggregation = AggregationService::new(engine.store().clone());
        Self { engine, aggregation }
    }
}

#[async_trait]
impl<S, D, N> ApprovalDesk for Desk<S, D, N>
where
    S: RequestStore,
    D: DirectoryClient,
    N: Notifier,
{
    async fn create_request(&self, payload: RequestPayload, actor: &ActorContext) -> Result<CreatedRequest, LifecycleError> {
        self.engine.create(payload, actor).await
    }

    async fn approve(&self, kind: RequestKind, id: i32, actor: &ActorContext) -> Result<Transition, LifecycleError> {
        self.engine.approve(kind, id, actor).await
    }

    async fn reject(
        &self,
        kind: RequestKind,
        id: i32,
        reason: &str,
        actor: &ActorContext,
    ) -> Result<Transition, LifecycleError> {
        self.engine.reject(kind, id, reason, actor).await
    }

    async fn get_request(&self, kind: RequestKind, id: i32) -> StoreResult<Option<RequestDetails>> {
        self.engine.store().get_request_by_id(kind, id).await
    }

    async fn list_pending(&self) -> StoreResult<Vec<RequestSummary>> {
        self.aggregation.list_pending().await
    }

    async fn list_for_requester(&self, username: &str) -> StoreResult<Vec<RequestSummary>> {
        self.aggregation.list_for_requester(username).await
    }

    async fn dashboard(&self) -> StoreResult<DashboardCounts> {
        self.aggregation.dashboard_counts().await
    }

    async fn companies(&self) -> StoreResult<Vec<Company>> {
        self.engine.store().list_active_companies().await
    }

    async fn activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityLog>> {
        match (filter.entity_type.as_deref(), filter.entity_id) {
            (Some(entity_type), Some(entity_id)) => {
                self.engine.store().activity_for_entity(entity_type, entity_id).await
            }
            _ => {
                let limit = filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, MAX_ACTIVITY_LIMIT);
                self.engine.store().recent_activity(limit).await
            }
        }
    }

    async fn search_users(&self, term: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        directory::lookup_users(self.engine.directory(), term).await
    }

    async fn search_groups(&self, term: &str) -> DirectoryResult<Vec<DirectoryGroup>> {
        directory::lookup_groups(self.engine.directory(), term).await
    }

    async fn ready(&self) -> StoreResult<()> {
        self.engine.store().ping().await
    }
}
