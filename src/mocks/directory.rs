use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::directory::{
    DirectoryClient, DirectoryError, DirectoryGroup, DirectoryResult, DirectoryUser, NewDirectoryAccount, UserDetails,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    ValidateCredentials(String),
    UserExists(String),
    IsMemberOfGroup(String, String),
    GetUserEmail(String),
    GetUserDetails(String),
    SearchUsers(String),
    SearchGroups(String),
    CreateUser(String),
    DisableUser(String),
    UpdateAttributes(String, BTreeMap<String, String>),
    AddToGroup(String, String),
    RemoveFromGroup(String, String),
    ResetPassword(String),
    ForcePasswordChange(String),
}

impl DirectoryCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            DirectoryCall::CreateUser(_)
                | DirectoryCall::DisableUser(_)
                | DirectoryCall::UpdateAttributes(..)
                | DirectoryCall::AddToGroup(..)
                | DirectoryCall::RemoveFromGroup(..)
                | DirectoryCall::ResetPassword(_)
                | DirectoryCall::ForcePasswordChange(_)
        )
    }
}

#[derive(Debug, Clone)]
struct MockAccount {
    details: UserDetails,
    password: Option<String>,
    created_as: Option<NewDirectoryAccount>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: BTreeMap<String, MockAccount>,
    groups: BTreeMap<String, BTreeSet<String>>,
    calls: Vec<DirectoryCall>,
    mutation_failure: Option<DirectoryError>,
    lookup_failure: Option<DirectoryError>,
    mutation_delay: Option<Duration>,
}

/// Scripted directory: holds accounts and groups in memory and records every call.
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

fn key(value: &str) -> String {
    value.trim().to_lowercase()
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, username: &str, display_name: &str, email: Option<&str>) {
        let details = UserDetails {
            username: username.to_string(),
            display_name: Some(display_name.to_string()),
            email: email.map(str::to_string),
            given_name: None,
            surname: None,
            title: None,
            department: None,
            enabled: true,
            attributes: BTreeMap::new(),
        };
        self.state()
            .accounts
            .insert(key(username), MockAccount { details, password: None, created_as: None });
    }

    pub fn set_attribute(&self, username: &str, attribute: &str, value: &str) {
        if let Some(account) = self.state().accounts.get_mut(&key(username)) {
            account.details.attributes.insert(attribute.to_string(), value.to_string());
        }
    }

    pub fn add_group(&self, name: &str) {
        self.state().groups.entry(name.to_string()).or_default();
    }

    pub fn add_member(&self, username: &str, group: &str) {
        self.state().groups.entry(group.to_string()).or_default().insert(key(username));
    }

    /// Every create/disable/update/membership/password call fails with `error` from now on.
    pub fn fail_mutations(&self, error: Option<DirectoryError>) {
        self.state().mutation_failure = error;
    }

    /// Lookups (exists, email, details, search) fail with `error` from now on.
    pub fn fail_lookups(&self, error: Option<DirectoryError>) {
        self.state().lookup_failure = error;
    }

    /// Mutations sleep this long before answering.
    pub fn delay_mutations(&self, delay: Option<Duration>) {
        self.state().mutation_delay = delay;
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.state().calls.clone()
    }

    pub fn mutations(&self) -> Vec<DirectoryCall> {
        self.calls().into_iter().filter(DirectoryCall::is_mutation).collect()
    }

    pub fn is_enabled(&self, username: &str) -> Option<bool> {
        self.state().accounts.get(&key(username)).map(|a| a.details.enabled)
    }

    pub fn is_member(&self, username: &str, group: &str) -> bool {
        self.state()
            .groups
            .get(group)
            .is_some_and(|members| members.contains(&key(username)))
    }

    pub fn attribute(&self, username: &str, attribute: &str) -> Option<String> {
        self.state()
            .accounts
            .get(&key(username))
            .and_then(|a| a.details.attributes.get(attribute).cloned())
    }

    pub fn password_of(&self, username: &str) -> Option<String> {
        self.state().accounts.get(&key(username)).and_then(|a| a.password.clone())
    }

    pub fn created_account(&self, username: &str) -> Option<NewDirectoryAccount> {
        self.state().accounts.get(&key(username)).and_then(|a| a.created_as.clone())
    }

    fn lookup(&self, call: DirectoryCall) -> DirectoryResult<MutexGuard<'_, DirectoryState>> {
        let mut state = self.state();
        state.calls.push(call);
        match state.lookup_failure.clone() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    async fn mutate<T>(
        &self,
        call: DirectoryCall,
        apply: impl FnOnce(&mut DirectoryState) -> DirectoryResult<T>,
    ) -> DirectoryResult<T> {
        let delay = {
            let mut state = self.state();
            state.calls.push(call);
            state.mutation_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if let Some(err) = state.mutation_failure.clone() {
            return Err(err);
        }
        apply(&mut state)
    }
}

fn account_mut<'s>(state: &'s mut DirectoryState, username: &str) -> DirectoryResult<&'s mut MockAccount> {
    state
        .accounts
        .get_mut(&key(username))
        .ok_or_else(|| DirectoryError::NotFound(username.to_string()))
}

fn members_mut<'s>(state: &'s mut DirectoryState, group: &str) -> DirectoryResult<&'s mut BTreeSet<String>> {
    state
        .groups
        .get_mut(group)
        .ok_or_else(|| DirectoryError::NotFound(group.to_string()))
}

impl DirectoryClient for MockDirectory {
    async fn validate_credentials(&self, username: &str, password: &str) -> DirectoryResult<bool> {
        let state = self.lookup(DirectoryCall::ValidateCredentials(username.to_string()))?;
        Ok(state
            .accounts
            .get(&key(username))
            .and_then(|a| a.password.as_deref())
            .is_some_and(|stored| stored == password))
    }

    async fn user_exists(&self, username: &str) -> DirectoryResult<bool> {
        let state = self.lookup(DirectoryCall::UserExists(username.to_string()))?;
        Ok(state.accounts.contains_key(&key(username)))
    }

    async fn is_member_of_group(&self, username: &str, group: &str) -> DirectoryResult<bool> {
        let state = self.lookup(DirectoryCall::IsMemberOfGroup(username.to_string(), group.to_string()))?;
        if !state.accounts.contains_key(&key(username)) {
            return Err(DirectoryError::NotFound(username.to_string()));
        }
        let members = state
            .groups
            .get(group)
            .ok_or_else(|| DirectoryError::NotFound(group.to_string()))?;
        Ok(members.contains(&key(username)))
    }

    async fn get_user_email(&self, username: &str) -> DirectoryResult<Option<String>> {
        let state = self.lookup(DirectoryCall::GetUserEmail(username.to_string()))?;
        Ok(state.accounts.get(&key(username)).and_then(|a| a.details.email.clone()))
    }

    async fn get_user_details(&self, username: &str) -> DirectoryResult<Option<UserDetails>> {
        let state = self.lookup(DirectoryCall::GetUserDetails(username.to_string()))?;
        Ok(state.accounts.get(&key(username)).map(|a| a.details.clone()))
    }

    async fn search_users(&self, term: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        let state = self.lookup(DirectoryCall::SearchUsers(term.to_string()))?;
        let term = key(term);
        Ok(state
            .accounts
            .values()
            .filter(|a| {
                a.details.username.to_lowercase().contains(&term)
                    || a.details
                        .display_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&term))
            })
            .map(|a| DirectoryUser {
                username: a.details.username.clone(),
                display_name: a.details.display_name.clone(),
                email: a.details.email.clone(),
            })
            .collect())
    }

    async fn search_groups(&self, term: &str) -> DirectoryResult<Vec<DirectoryGroup>> {
        let state = self.lookup(DirectoryCall::SearchGroups(term.to_string()))?;
        let term = key(term);
        Ok(state
            .groups
            .keys()
            .filter(|name| name.to_lowercase().contains(&term))
            .map(|name| DirectoryGroup { name: name.clone(), description: None })
            .collect())
    }

    async fn create_user(&self, account: &NewDirectoryAccount) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::CreateUser(account.username.clone()), |state| {
            let k = key(&account.username);
            if state.accounts.contains_key(&k) {
                return Err(DirectoryError::OperationFailed(format!(
                    "account {} already exists",
                    account.username
                )));
            }
            let details = UserDetails {
                username: account.username.clone(),
                display_name: Some(account.display_name.clone()),
                email: Some(account.email.clone()),
                given_name: Some(account.given_name.clone()),
                surname: Some(account.surname.clone()),
                title: account.title.clone(),
                department: account.department.clone(),
                enabled: true,
                attributes: BTreeMap::new(),
            };
            state.accounts.insert(
                k,
                MockAccount {
                    details,
                    password: Some(account.password.clone()),
                    created_as: Some(account.clone()),
                },
            );
            Ok(())
        })
        .await
    }

    async fn disable_user(&self, username: &str) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::DisableUser(username.to_string()), |state| {
            account_mut(state, username)?.details.enabled = false;
            Ok(())
        })
        .await
    }

    async fn update_attributes(&self, username: &str, attributes: &BTreeMap<String, String>) -> DirectoryResult<()> {
        self.mutate(
            DirectoryCall::UpdateAttributes(username.to_string(), attributes.clone()),
            |state| {
                let account = account_mut(state, username)?;
                for (name, value) in attributes {
                    account.details.attributes.insert(name.clone(), value.clone());
                }
                Ok(())
            },
        )
        .await
    }

    async fn add_to_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::AddToGroup(username.to_string(), group.to_string()), |state| {
            account_mut(state, username)?;
            members_mut(state, group)?.insert(key(username));
            Ok(())
        })
        .await
    }

    async fn remove_from_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::RemoveFromGroup(username.to_string(), group.to_string()), |state| {
            account_mut(state, username)?;
            members_mut(state, group)?.remove(&key(username));
            Ok(())
        })
        .await
    }

    async fn reset_password(&self, username: &str, new_password: &str) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::ResetPassword(username.to_string()), |state| {
            account_mut(state, username)?.password = Some(new_password.to_string());
            Ok(())
        })
        .await
    }

    async fn force_password_change_at_next_logon(&self, username: &str) -> DirectoryResult<()> {
        self.mutate(DirectoryCall::ForcePasswordChange(username.to_string()), |state| {
            account_mut(state, username)?;
            Ok(())
        })
        .await
    }
}
