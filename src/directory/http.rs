// Directory gateway reached over HTTP.
//
// The gateway fronts the LDAP-compatible directory and exposes a small REST
// surface; every call shares the client-wide timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    DirectoryClient, DirectoryError, DirectoryGroup, DirectoryResult, DirectoryUser,
    NewDirectoryAccount, UserDetails, GROUP_SEARCH_LIMIT, USER_SEARCH_LIMIT,
};

#[derive(Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ValidationResponse {
    valid: bool,
}

#[derive(Deserialize)]
struct MembershipResponse {
    member: bool,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> DirectoryResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid directory url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::Unavailable(format!(
                "directory url {base_url} cannot be a base"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        Ok(Self { client, base_url, token, timeout })
    }

    fn endpoint(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Unavailable("directory url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> DirectoryResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> DirectoryResult<Response> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DirectoryError::Timeout(self.timeout)
            } else {
                DirectoryError::Unavailable(e.to_string())
            }
        })
    }

    /// 2xx passes through, 404 is `NotFound(subject)`, anything else is a failed operation.
    async fn expect_success(response: Response, subject: &str) -> DirectoryResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(subject.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::OperationFailed(format!("{status}: {body}")))
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> DirectoryResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| DirectoryError::OperationFailed(format!("malformed gateway response: {e}")))
    }

    async fn execute(&self, builder: RequestBuilder, subject: &str) -> DirectoryResult<()> {
        let response = self.send(builder).await?;
        Self::expect_success(response, subject).await?;
        Ok(())
    }
}

impl DirectoryClient for HttpDirectoryClient {
    async fn validate_credentials(&self, username: &str, password: &str) -> DirectoryResult<bool> {
        let builder = self
            .request(Method::POST, &["auth", "validate"])?
            .json(&json!({ "username": username, "password": password }));
        let response = self.send(builder).await?;
        let response = Self::expect_success(response, username).await?;
        Ok(Self::json::<ValidationResponse>(response).await?.valid)
    }

    async fn user_exists(&self, username: &str) -> DirectoryResult<bool> {
        Ok(self.get_user_details(username).await?.is_some())
    }

    async fn is_member_of_group(&self, username: &str, group: &str) -> DirectoryResult<bool> {
        let builder = self.request(Method::GET, &["users", username, "groups", group])?;
        let response = self.send(builder).await?;
        let response = Self::expect_success(response, username).await?;
        Ok(Self::json::<MembershipResponse>(response).await?.member)
    }

    async fn get_user_email(&self, username: &str) -> DirectoryResult<Option<String>> {
        Ok(self.get_user_details(username).await?.and_then(|details| details.email))
    }

    async fn get_user_details(&self, username: &str) -> DirectoryResult<Option<UserDetails>> {
        let builder = self.request(Method::GET, &["users", username])?;
        let response = self.send(builder).await?;
        match Self::expect_success(response, username).await {
            Ok(response) => Ok(Some(Self::json(response).await?)),
            Err(DirectoryError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn search_users(&self, term: &str) -> DirectoryResult<Vec<DirectoryUser>> {
        let limit = USER_SEARCH_LIMIT.to_string();
        let builder = self
            .request(Method::GET, &["users"])?
            .query(&[("search", term), ("limit", limit.as_str())]);
        let response = self.send(builder).await?;
        let response = Self::expect_success(response, term).await?;
        Self::json(response).await
    }

    async fn search_groups(&self, term: &str) -> DirectoryResult<Vec<DirectoryGroup>> {
        let limit = GROUP_SEARCH_LIMIT.to_string();
        let builder = self
            .request(Method::GET, &["groups"])?
            .query(&[("search", term), ("limit", limit.as_str())]);
        let response = self.send(builder).await?;
        let response = Self::expect_success(response, term).await?;
        Self::json(response).await
    }

    async fn create_user(&self, account: &NewDirectoryAccount) -> DirectoryResult<()> {
        debug!(username = %account.username, container = %account.container, "creating directory account");
        let builder = self.request(Method::POST, &["users"])?.json(account);
        let response = self.send(builder).await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(DirectoryError::OperationFailed(format!(
                "account {} already exists",
                account.username
            )));
        }
        Self::expect_success(response, &account.username).await?;
        Ok(())
    }

    async fn disable_user(&self, username: &str) -> DirectoryResult<()> {
        let builder = self.request(Method::POST, &["users", username, "disable"])?;
        self.execute(builder, username).await
    }

    async fn update_attributes(&self, username: &str, attributes: &BTreeMap<String, String>) -> DirectoryResult<()> {
        let builder = self
            .request(Method::PATCH, &["users", username, "attributes"])?
            .json(attributes);
        self.execute(builder, username).await
    }

    async fn add_to_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        let builder = self.request(Method::PUT, &["groups", group, "members", username])?;
        self.execute(builder, group).await
    }

    async fn remove_from_group(&self, username: &str, group: &str) -> DirectoryResult<()> {
        let builder = self.request(Method::DELETE, &["groups", group, "members", username])?;
        self.execute(builder, group).await
    }

    async fn reset_password(&self, username: &str, new_password: &str) -> DirectoryResult<()> {
        let builder = self
            .request(Method::POST, &["users", username, "password"])?
            .json(&json!({ "password": new_password }));
        self.execute(builder, username).await
    }

    async fn force_password_change_at_next_logon(&self, username: &str) -> DirectoryResult<()> {
        let builder = self.request(Method::POST, &["users", username, "password", "expire"])?;
        self.execute(builder, username).await
    }
}
