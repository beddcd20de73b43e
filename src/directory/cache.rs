// Read-through cache in front of a [`DirectoryClient`].
//
// Lookups used while filling forms and resolving users are cached with a TTL;
// every mutation invalidates the affected account. Group membership is never
// cached because the membership action decides on it.

use std::collections::BTreeMap;
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use super::{
    DirectoryClient, DirectoryGroup, DirectoryResult, DirectoryUser, NewDirectoryAccount, UserDetails,
};

pub struct CachedDirectory<D> {
    inner: D,
    exists: Cache<String, bool>,
    emails: Cache<String, Option<String>>,
    details: Cache<String, Option<UserDetails>>,
    user_search: Cache<String, Vec<DirectoryUser>>,
    group_search: Cache<String, Vec<DirectoryGroup>>,
}

fn key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn build<V: Clone + Send + Sync + 'static>(ttl: Duration, capacity: u64) -> Cache<String, V> {
    Cache::builder().time_to_live(ttl).max_capacity(capacity).build()
}

impl<D: DirectoryClient> CachedDirectory<D> {
    pub fn new(inner: D, ttl: Duration, capacity: u64) -> Self {
        Self {
            inner,
            exists: build(ttl, capacity),
            emails: build(ttl, capacity),
            details: build(ttl, capacity),
            user_search: build(ttl, capacity),
            group_search: build(ttl, capacity),
        }
    }

    fn invalidate_user(&self, username: &str) {
        let k = key(username);
        self.exists.invalidate(&k);
        self.emails.invalidate(&k);
        self.details.invalidate(&k);
        // Display names and addresses in search results may be stale now.
        self.user_search.invalidate_all();
        debug!(username = %k, "directory cache invalidated");
    }
}

impl<D: DirectoryClient> DirectoryClient for CachedDirectory<D> {
    async fn validate_credentials(&self, username: &str, password: &str) -> DirectoryResult<bool> {
        self.inner.validate_credentials(username, password).await
    }

    async fn user_exists(&self, username: &str) -> DirectoryResult<bool> {
        let k = key(username);
        if let Some(hit) = self.exists.get(&k) {
            return Ok(hit);
        }
        let exists = self.inner.user_exists(username).await?;
        self.exists.insert(k, exists);
        Ok(exists)
    }

    async fn is_member_of_group(&self, username: &str, group: &str) -> DirectoryResult<bool> {
        self.inner.is_member_of_group(username, group).await
    }

    async fn get_user_email(&self, username: &str) -> DirectoryResult<Option<String>> {
        let k = key(username);
        if let Some(hit) = self.emails.get(&k) {
            return Ok(hit);
        }
        let email = self.inner.get_user_email(username).await?;
        self.emails.insert(k, email.clone());
        Ok(email)
    }

    async fn get_user_details(&self, username: &str) -> DirectoryResult<Option<UserDetails>> {
        let k = key(username);
        if let Some(hit) = self.details.get(&k) {
            return Ok(hit);
        }
        let details = self.inner.get_user_details(username).await?;
        self.details.insert(k, details.clone());
        Ok(details)
    }

    async fn search_users(&self, term: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        let k = key(term);
        if let Some(hit) = self.user_search.get(&k) {
            return Ok(hit);
        }
        let users = self.inner.search_users(term).await?;
        self.user_search.insert(k, users.clone());
        Ok(users)
    }

    async fn search_groups(&self, term: &str) -> DirectoryResult<Vec<DirectoryGroup>> {
        let k = key(term);
        if let Some(hit) = self.group_search.get(&k) {
            return Ok(hit);
        }
        let groups = self.inner.search_groups(term).await?;
        self.group_search.insert(k, groups.clone());
        Ok(groups)
    }

    async fn create_user(&self, account: &NewDirectoryAccount) -> DirectoryResult<()> {
        let result = self.inner.create_user(account).await;
        self.invalidate_user(&account.username);
        result
    }

    async fn disable_user(&self, username: &str) -> DirectoryResult<()> {
        let result = self.inner.disable_user(username).await;
        self.invalidate_user(username);
        result
    }

    async fn update_attributes(&self, username: &str, attributes: &BTreeMap<String, String>) -> DirectoryResult<()> {
        let result = self.inner.update_attributes(username, attributes).await;
        self.invalidate_user(username);
        result
    }

    async fn add_to_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        self.inner.add_to_group(username, group).await
    }

    async fn remove_from_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        self.inner.remove_from_group(username, group).await
    }

    async fn reset_password(&self, username: &str, new_password: &str) -> DirectoryResult<()> {
        self.inner.reset_password(username, new_password).await
    }

    async fn force_password_change_at_next_logon(&self, username: &str) -> DirectoryResult<()> {
        self.inner.force_password_change_at_next_logon(username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::directory::{DirectoryCall, MockDirectory};

    fn cached(directory: MockDirectory) -> CachedDirectory<MockDirectory> {
        CachedDirectory::new(directory, Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_directory_once() {
        let directory = MockDirectory::new();
        directory.add_user("jdoe", "Jane Doe", Some("jane.doe@corp.local"));
        let cache = cached(directory.clone());

        assert!(cache.user_exists("JDoe").await.unwrap());
        assert!(cache.user_exists("jdoe").await.unwrap());
        assert_eq!(
            cache.get_user_email("jdoe").await.unwrap().as_deref(),
            Some("jane.doe@corp.local")
        );
        assert_eq!(
            cache.get_user_email("jdoe ").await.unwrap().as_deref(),
            Some("jane.doe@corp.local")
        );

        let lookups = directory
            .calls()
            .into_iter()
            .filter(|call| matches!(call, DirectoryCall::UserExists(_) | DirectoryCall::GetUserEmail(_)))
            .count();
        assert_eq!(lookups, 2);
    }

    #[tokio::test]
    async fn disabling_invalidates_cached_details() {
        let directory = MockDirectory::new();
        directory.add_user("jdoe", "Jane Doe", None);
        let cache = cached(directory.clone());

        let before = cache.get_user_details("jdoe").await.unwrap().unwrap();
        assert!(before.enabled);

        cache.disable_user("jdoe").await.unwrap();
        let after = cache.get_user_details("jdoe").await.unwrap().unwrap();
        assert!(!after.enabled);
    }

    #[tokio::test]
    async fn membership_is_always_asked_fresh() {
        let directory = MockDirectory::new();
        directory.add_user("jdoe", "Jane Doe", None);
        directory.add_group("VPN Users");
        let cache = cached(directory.clone());

        assert!(!cache.is_member_of_group("jdoe", "VPN Users").await.unwrap());
        cache.add_to_group("jdoe", "VPN Users").await.unwrap();
        assert!(cache.is_member_of_group("jdoe", "VPN Users").await.unwrap());
    }

    #[tokio::test]
    async fn credential_checks_are_never_cached() {
        let directory = MockDirectory::new();
        directory.add_user("jdoe", "Jane Doe", None);
        let cache = cached(directory.clone());
        cache.reset_password("jdoe", "Tq7#mPw4xZ2k").await.unwrap();

        assert!(cache.validate_credentials("jdoe", "Tq7#mPw4xZ2k").await.unwrap());
        assert!(!cache.validate_credentials("jdoe", "wrong").await.unwrap());

        let checks = directory
            .calls()
            .into_iter()
            .filter(|call| matches!(call, DirectoryCall::ValidateCredentials(_)))
            .count();
        assert_eq!(checks, 2);
    }
}
