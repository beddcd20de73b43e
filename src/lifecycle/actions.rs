// Directory side effect of approving each request kind.
//
// Every strategy runs inside the approval transaction: its failure rolls the
// status change back. What the engine must do after commit (mail credentials,
// tell the account owner about a new attribute value) comes back as an
// [`ActionEffect`].

use std::collections::BTreeMap;
use std::future::Future;

use tracing::{debug, info};

use crate::db::models::company::Company;
use crate::db::models::requests::{
    AttributePayload, CreationPayload, DeletionPayload, GroupAction, GroupPayload, NetworkPayload,
    PasswordPayload, RequestPayload,
};
use crate::db::models::user::{fallback_email, SystemUser};
use crate::directory::password::generate_temporary_password;
use crate::directory::{DirectoryClient, DirectoryError, DirectoryResult, NewDirectoryAccount};

pub struct ActionContext<'a> {
    pub request_number: &'a str,
    pub requester: &'a SystemUser,
    pub company: Option<&'a Company>,
    pub default_ou: &'a str,
    pub email_domain: &'a str,
    pub temp_password_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEffect {
    Nothing,
    Credentials { email: String, username: String, password: String },
    AttributeChanged { email: String, username: String, attribute: String, new_value: String },
}

pub trait DirectoryAction: Send + Sync {
    fn apply<D: DirectoryClient>(
        &self,
        directory: &D,
        ctx: &ActionContext<'_>,
    ) -> impl Future<Output = DirectoryResult<ActionEffect>> + Send;
}

pub struct CreateAccount<'p>(pub &'p CreationPayload);
pub struct DisableAccount<'p>(pub &'p DeletionPayload);
pub struct WriteAttribute<'p>(pub &'p AttributePayload);
pub struct ResetPassword<'p>(pub &'p PasswordPayload);
pub struct ChangeMembership<'p>(pub &'p GroupPayload);
/// DNS and DHCP automation is not wired to any system yet.
pub struct NetworkStub<'p>(pub &'p NetworkPayload);

impl DirectoryAction for CreateAccount<'_> {
    async fn apply<D: DirectoryClient>(&self, directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        let p = self.0;
        if directory.user_exists(&p.username).await? {
            return Err(DirectoryError::OperationFailed(format!(
                "account {} already exists",
                p.username
            )));
        }

        let container = match ctx.company {
            Some(company) => company.container(ctx.default_ou),
            None => ctx.default_ou,
        };
        let password = generate_temporary_password(ctx.temp_password_length);
        let account = NewDirectoryAccount {
            username: p.username.clone(),
            given_name: p.first_name.clone(),
            surname: p.last_name.clone(),
            display_name: p.resolved_display_name(),
            email: p
                .email
                .clone()
                .unwrap_or_else(|| fallback_email(&p.username, ctx.email_domain)),
            title: p.title.clone(),
            department: p.department.clone(),
            phone: p.phone.clone(),
            manager: p.manager.clone(),
            company: ctx.company.map(|c| c.company_name.clone()),
            container: container.to_string(),
            password: password.clone(),
        };

        directory.create_user(&account).await?;
        directory.force_password_change_at_next_logon(&p.username).await?;
        info!(username = %p.username, %container, request_number = ctx.request_number, "directory account created");

        Ok(ActionEffect::Credentials {
            email: ctx.requester.email.clone(),
            username: p.username.clone(),
            password,
        })
    }
}

impl DirectoryAction for DisableAccount<'_> {
    async fn apply<D: DirectoryClient>(&self, directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        directory.disable_user(&self.0.username).await?;
        info!(username = %self.0.username, request_number = ctx.request_number, "directory account disabled");
        Ok(ActionEffect::Nothing)
    }
}

impl DirectoryAction for WriteAttribute<'_> {
    async fn apply<D: DirectoryClient>(&self, directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        let p = self.0;
        let change = BTreeMap::from([(p.attribute_name.clone(), p.new_value.clone())]);
        directory.update_attributes(&p.username, &change).await?;

        // The write already happened; a failed address lookup only changes who is told.
        let email = match directory.get_user_email(&p.username).await {
            Ok(Some(email)) => email,
            Ok(None) => fallback_email(&p.username, ctx.email_domain),
            Err(err) => {
                debug!(username = %p.username, error = %err, "owner address lookup failed");
                fallback_email(&p.username, ctx.email_domain)
            }
        };

        Ok(ActionEffect::AttributeChanged {
            email,
            username: p.username.clone(),
            attribute: p.attribute_name.clone(),
            new_value: p.new_value.clone(),
        })
    }
}

impl DirectoryAction for ResetPassword<'_> {
    async fn apply<D: DirectoryClient>(&self, directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        let p = self.0;
        let password = generate_temporary_password(ctx.temp_password_length);
        directory.reset_password(&p.username, &password).await?;
        directory.force_password_change_at_next_logon(&p.username).await?;

        let email = match p.email.clone() {
            Some(email) => email,
            None => directory
                .get_user_email(&p.username)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| fallback_email(&p.username, ctx.email_domain)),
        };

        Ok(ActionEffect::Credentials { email, username: p.username.clone(), password })
    }
}

impl DirectoryAction for ChangeMembership<'_> {
    async fn apply<D: DirectoryClient>(&self, directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        let p = self.0;
        let member = directory.is_member_of_group(&p.username, &p.group_name).await?;
        match (p.action_type, member) {
            (GroupAction::Add, true) | (GroupAction::Remove, false) => {
                debug!(
                    username = %p.username,
                    group = %p.group_name,
                    action = p.action_type.as_str(),
                    "membership already in requested state"
                );
            }
            (GroupAction::Add, false) => directory.add_to_group(&p.username, &p.group_name).await?,
            (GroupAction::Remove, true) => directory.remove_from_group(&p.username, &p.group_name).await?,
        }
        info!(
            username = %p.username,
            group = %p.group_name,
            action = p.action_type.as_str(),
            request_number = ctx.request_number,
            "group membership applied"
        );
        Ok(ActionEffect::Nothing)
    }
}

impl DirectoryAction for NetworkStub<'_> {
    async fn apply<D: DirectoryClient>(&self, _directory: &D, ctx: &ActionContext<'_>) -> DirectoryResult<ActionEffect> {
        let p = self.0;
        info!(
            operation = p.operation.as_str(),
            hostname = %p.hostname,
            ip_address = p.ip_address.as_deref().unwrap_or("-"),
            mac_address = p.mac_address.as_deref().unwrap_or("-"),
            record_type = p.record_type.map(|t| t.as_str()).unwrap_or("-"),
            request_number = ctx.request_number,
            "network change recorded; no automation configured"
        );
        Ok(ActionEffect::Nothing)
    }
}

/// Runs the strategy matching the payload's kind.
pub async fn apply_for<D: DirectoryClient>(
    payload: &RequestPayload,
    directory: &D,
    ctx: &ActionContext<'_>,
) -> DirectoryResult<ActionEffect> {
    match payload {
        RequestPayload::Creation(p) => CreateAccount(p).apply(directory, ctx).await,
        RequestPayload::Deletion(p) => DisableAccount(p).apply(directory, ctx).await,
        RequestPayload::Attribute(p) => WriteAttribute(p).apply(directory, ctx).await,
        RequestPayload::Password(p) => ResetPassword(p).apply(directory, ctx).await,
        RequestPayload::Group(p) => ChangeMembership(p).apply(directory, ctx).await,
        RequestPayload::Network(p) => NetworkStub(p).apply(directory, ctx).await,
    }
}
