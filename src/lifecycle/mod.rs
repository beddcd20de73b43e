// Request Lifecycle Engine.
//
// One engine serves all six request kinds. `create`, `approve` and `reject`
// each run in a single store transaction that also writes exactly one audit
// row. Approval runs the kind's directory action inside that transaction, so
// a request is only ever Approved when its action was applied. Notifications
// go out after commit and never change the result.

pub mod actions;
pub mod error;
pub mod validation;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::models::activity::NewActivityLog;
use crate::db::models::requests::{
    CreatedRequest, NewRequest, RequestKind, RequestPayload, RequestRecord, RequestStatus, StatusChange,
};
use crate::db::models::user::{normalize_username, NewSystemUser, SystemUser};
use crate::db::store::{RequestStore, StoreError, StoreResult, StoreTransaction};
use crate::directory::{DirectoryClient, DirectoryError};
use crate::notify::{NotificationResult, Notifier};
use crate::numbering::NumberingScheme;

use self::actions::{ActionContext, ActionEffect};
pub use self::error::{LifecycleError, ValidationError};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_ou: String,
    pub email_domain: String,
    pub directory_timeout: Duration,
    pub notification_timeout: Duration,
    pub temp_password_length: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_ou: config.default_ou.clone(),
            email_domain: config.email_domain.clone(),
            directory_timeout: config.directory_timeout,
            notification_timeout: config.notification_timeout,
            temp_password_length: config.temp_password_length,
        }
    }
}

/// Who is acting, and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub username: String,
    pub ip_address: Option<String>,
}

impl ActorContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), ip_address: None }
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotActionable {
    NotFound,
    AlreadyProcessed(RequestStatus),
}

/// Result of approve or reject. Acting on a closed or missing request is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Completed(RequestRecord),
    NotActionable(NotActionable),
}

impl Transition {
    pub fn is_completed(&self) -> bool {
        matches!(self, Transition::Completed(_))
    }
}

pub struct LifecycleEngine<S, D, N> {
    store: S,
    directory: D,
    notifier: N,
    settings: EngineSettings,
}

impl<S, D, N> LifecycleEngine<S, D, N>
where
    S: RequestStore,
    D: DirectoryClient,
    N: Notifier,
{
    pub fn new(store: S, directory: D, notifier: N, settings: EngineSettings) -> Self {
        Self { store, directory, notifier, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Files a new request as Pending and returns its identity.
    pub async fn create(&self, payload: RequestPayload, actor: &ActorContext) -> Result<CreatedRequest, LifecycleError> {
        let payload = validation::validate_payload(payload)?;
        let username = acting_username(actor, "requested_by")?;

        if let Some(company_id) = payload.company_id() {
            let companies = self.store.companies_by_ids(&[company_id]).await?;
            if !companies.iter().any(|c| c.id == company_id && c.is_active) {
                return Err(ValidationError::UnknownCompany(company_id).into());
            }
        }

        let payload = self.with_current_value(payload).await;
        let seed = self.user_seed(&username).await?;
        let kind = payload.kind();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let requester = tx.upsert_system_user(&seed).await?;

        let scheme = NumberingScheme::for_kind(kind);
        let prefix = scheme.period_prefix(now);
        let last = tx.last_request_number(kind, &prefix).await?;
        let request_number = scheme.next(&prefix, last.as_deref());

        let id = tx
            .insert_request(&NewRequest {
                request_number: request_number.clone(),
                payload: payload.clone(),
                requested_by_id: requester.id,
                requested_date: now,
            })
            .await?;

        tx.append_activity_log(&audit_entry(
            &requester,
            kind,
            id,
            "created",
            format!("{request_number} for {}", payload.subject()),
            actor,
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(%request_number, %kind, actor = %requester.username, "request created");

        self.deliver(
            &request_number,
            "new request",
            self.notifier.notify_new_request(kind, &request_number, id),
        )
        .await;

        Ok(CreatedRequest { id, kind, request_number })
    }

    /// Applies the request's directory action and closes it as Approved.
    pub async fn approve(&self, kind: RequestKind, id: i32, actor: &ActorContext) -> Result<Transition, LifecycleError> {
        let username = acting_username(actor, "approved_by")?;
        let seed = self.user_seed(&username).await?;

        let mut tx = self.store.begin().await?;
        let record = match tx.get_request(kind, id).await? {
            Some(record) if record.status == RequestStatus::Pending => record,
            other => {
                tx.rollback().await?;
                return Ok(Transition::NotActionable(not_actionable(other.as_ref())));
            }
        };

        let approver = tx.upsert_system_user(&seed).await?;
        let now = Utc::now();
        let change = StatusChange::approve(approver.id, now);
        if !tx.update_request_status(kind, id, &change).await? {
            let current = tx.get_request(kind, id).await?;
            tx.rollback().await?;
            debug!(request_number = %record.request_number, "lost the race to close the request");
            return Ok(Transition::NotActionable(not_actionable(current.as_ref())));
        }

        let requester = self.requester_of(&mut tx, &record).await?;
        let company = match record.payload.company_id() {
            Some(company_id) => tx.get_company(company_id).await?,
            None => None,
        };

        let ctx = ActionContext {
            request_number: &record.request_number,
            requester: &requester,
            company: company.as_ref(),
            default_ou: &self.settings.default_ou,
            email_domain: &self.settings.email_domain,
            temp_password_length: self.settings.temp_password_length,
        };
        let outcome = tokio::time::timeout(
            self.settings.directory_timeout,
            actions::apply_for(&record.payload, &self.directory, &ctx),
        )
        .await
        .unwrap_or(Err(DirectoryError::Timeout(self.settings.directory_timeout)));

        let effect = match outcome {
            Ok(effect) => effect,
            Err(source) => {
                error!(request_number = %record.request_number, %kind, error = %source, "directory action failed");
                if let Err(err) = tx.rollback().await {
                    warn!(request_number = %record.request_number, error = %err, "rollback after directory failure failed");
                }
                return Err(LifecycleError::DirectoryActionFailed {
                    request_number: record.request_number,
                    source,
                });
            }
        };

        tx.append_activity_log(&audit_entry(
            &approver,
            kind,
            id,
            "approved",
            format!("{} for {}", record.request_number, record.payload.subject()),
            actor,
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(request_number = %record.request_number, %kind, actor = %approver.username, "request approved");

        let record = closed(record, &change);
        self.after_approval(&record, &requester, effect).await;
        Ok(Transition::Completed(record))
    }

    /// Closes the request as Rejected. No directory call is made.
    pub async fn reject(
        &self,
        kind: RequestKind,
        id: i32,
        reason: &str,
        actor: &ActorContext,
    ) -> Result<Transition, LifecycleError> {
        let username = acting_username(actor, "rejected_by")?;
        let seed = self.user_seed(&username).await?;

        let mut tx = self.store.begin().await?;
        let record = match tx.get_request(kind, id).await? {
            Some(record) if record.status == RequestStatus::Pending => record,
            other => {
                tx.rollback().await?;
                return Ok(Transition::NotActionable(not_actionable(other.as_ref())));
            }
        };
        let reason = match validation::validate_reason(reason) {
            Ok(reason) => reason,
            Err(err) => {
                tx.rollback().await?;
                return Err(err.into());
            }
        };

        let rejecter = tx.upsert_system_user(&seed).await?;
        let now = Utc::now();
        let change = StatusChange::reject(rejecter.id, now, reason.clone());
        if !tx.update_request_status(kind, id, &change).await? {
            let current = tx.get_request(kind, id).await?;
            tx.rollback().await?;
            return Ok(Transition::NotActionable(not_actionable(current.as_ref())));
        }
        let requester = self.requester_of(&mut tx, &record).await?;

        tx.append_activity_log(&audit_entry(
            &rejecter,
            kind,
            id,
            "rejected",
            format!("{}: {reason}", record.request_number),
            actor,
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(request_number = %record.request_number, %kind, actor = %rejecter.username, "request rejected");

        self.deliver(
            &record.request_number,
            "rejection",
            self.notifier
                .notify_approval(&requester.email, &requester.username, &record.request_number, false, Some(&reason)),
        )
        .await;

        Ok(Transition::Completed(closed(record, &change)))
    }

    /// Row to upsert for `username`: the stored one if known, otherwise a new
    /// one addressed from the directory (or the fallback domain). Resolved
    /// before the transaction so no directory call holds a connection.
    async fn user_seed(&self, username: &str) -> StoreResult<NewSystemUser> {
        if let Some(user) = self.store.find_requester_by_username(username).await? {
            return Ok(NewSystemUser {
                username: user.username,
                display_name: user.display_name,
                email: user.email,
            });
        }

        let email = match tokio::time::timeout(self.settings.directory_timeout, self.directory.get_user_email(username)).await {
            Ok(Ok(email)) => email,
            Ok(Err(err)) => {
                debug!(%username, error = %err, "directory email lookup failed; using fallback address");
                None
            }
            Err(_) => {
                debug!(%username, "directory email lookup timed out; using fallback address");
                None
            }
        };
        Ok(NewSystemUser::synthesize(username, email, &self.settings.email_domain))
    }

    async fn requester_of(&self, tx: &mut S::Tx, record: &RequestRecord) -> StoreResult<SystemUser> {
        tx.get_user(record.requested_by_id)
            .await?
            .ok_or(StoreError::Corrupt {
                table: record.kind().table(),
                reason: format!("requested_by_id {} has no user row", record.requested_by_id),
            })
    }

    /// Attribute requests carry the directory's current value when it can be read.
    async fn with_current_value(&self, payload: RequestPayload) -> RequestPayload {
        let RequestPayload::Attribute(mut p) = payload else {
            return payload;
        };
        if p.old_value.is_some() {
            return RequestPayload::Attribute(p);
        }
        match tokio::time::timeout(self.settings.directory_timeout, self.directory.get_user_details(&p.username)).await {
            Ok(Ok(Some(details))) => {
                p.old_value = details
                    .attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&p.attribute_name))
                    .map(|(_, value)| value.clone());
            }
            Ok(Ok(None)) => debug!(username = %p.username, "attribute target not in directory"),
            Ok(Err(err)) => debug!(username = %p.username, error = %err, "could not read current attribute value"),
            Err(_) => debug!(username = %p.username, "current attribute value lookup timed out"),
        }
        RequestPayload::Attribute(p)
    }

    async fn after_approval(&self, record: &RequestRecord, requester: &SystemUser, effect: ActionEffect) {
        let number = &record.request_number;
        self.deliver(
            number,
            "approval",
            self.notifier.notify_approval(&requester.email, &requester.username, number, true, None),
        )
        .await;

        match effect {
            ActionEffect::Nothing => {}
            ActionEffect::Credentials { email, username, password } => {
                self.deliver(
                    number,
                    "credentials",
                    self.notifier.notify_new_credentials(&email, &username, &password),
                )
                .await;
            }
            ActionEffect::AttributeChanged { email, username, attribute, new_value } => {
                self.deliver(
                    number,
                    "attribute change",
                    self.notifier.notify_attribute_change(&email, &username, &attribute, &new_value, true),
                )
                .await;
            }
        }
    }

    /// Best effort: failures and slow relays are logged, never returned.
    async fn deliver(
        &self,
        request_number: &str,
        what: &str,
        send: impl Future<Output = NotificationResult<()>>,
    ) {
        match tokio::time::timeout(self.settings.notification_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%request_number, error = %err, "{what} notification failed"),
            Err(_) => warn!(
                %request_number,
                timeout = ?self.settings.notification_timeout,
                "{what} notification timed out"
            ),
        }
    }
}

fn acting_username(actor: &ActorContext, field: &'static str) -> Result<String, ValidationError> {
    let username = normalize_username(&actor.username);
    if username.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(username)
}

fn not_actionable(current: Option<&RequestRecord>) -> NotActionable {
    match current {
        Some(record) => NotActionable::AlreadyProcessed(record.status),
        None => NotActionable::NotFound,
    }
}

fn closed(mut record: RequestRecord, change: &StatusChange) -> RequestRecord {
    record.status = change.status;
    record.approved_by_id = Some(change.actor_id);
    record.approved_date = Some(change.at);
    record.rejection_reason = change.rejection_reason.clone();
    record
}

fn audit_entry(
    actor: &SystemUser,
    kind: RequestKind,
    entity_id: i32,
    verb: &str,
    details: String,
    context: &ActorContext,
    at: DateTime<Utc>,
) -> NewActivityLog {
    NewActivityLog {
        user_id: actor.id,
        action: format!("{} request {verb}", kind.label()),
        entity_type: kind.entity_type().to_string(),
        entity_id,
        details: Some(details),
        ip_address: context.ip_address.clone(),
        created_date: at,
    }
}
