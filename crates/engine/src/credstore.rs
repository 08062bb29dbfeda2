//! Secret-store indirection for binding credentials.
//!
//! [`CredHubStore`] talks to a CredHub-compatible server, authenticating with
//! UAA client credentials. The blocking `ureq` calls run on
//! `tokio::task::spawn_blocking`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use broker_storage::JsonObject;

#[derive(Debug, thiserror::Error)]
pub enum CredStoreError {
    #[error("unexpected status code {status}, expecting {expected:?}, body: {body}")]
    UnexpectedStatus {
        status: u16,
        expected: Vec<u16>,
        body: String,
    },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("invalid credential store configuration: {0}")]
    Config(String),

    #[error("task join error: {0}")]
    Join(String),
}

/// Where credentials for bindings are kept when the broker is configured
/// not to hand them out directly.
#[async_trait]
pub trait CredStore: Send + Sync + 'static {
    /// Store `credentials` as a JSON credential at `path`.
    async fn put(&self, path: &str, credentials: &JsonObject) -> Result<(), CredStoreError>;

    async fn add_permission(
        &self,
        path: &str,
        actor: &str,
        operations: &[&str],
    ) -> Result<(), CredStoreError>;

    /// Remove every permission granted on `path`.
    async fn delete_permissions(&self, path: &str) -> Result<(), CredStoreError>;

    async fn delete(&self, path: &str) -> Result<(), CredStoreError>;
}

/// Connection settings for a CredHub server and its UAA.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredHubConfig {
    pub url: String,
    pub uaa_url: String,
    pub uaa_client_name: String,
    pub uaa_client_secret: String,
    pub skip_ssl_validation: bool,
    pub ca_cert_file: Option<PathBuf>,
}

impl CredHubConfig {
    /// CredHub is in use only when both a server and a UAA are named.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.uaa_url.is_empty()
    }
}

#[derive(Debug)]
struct Token {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<PermissionEntry>,
}

#[derive(Debug, Deserialize)]
struct PermissionEntry {
    actor: String,
}

#[derive(Debug, Deserialize)]
struct PermissionRecord {
    uuid: String,
}

struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn expect(self, expected: &[u16]) -> Result<Reply, CredStoreError> {
        if expected.contains(&self.status) {
            Ok(self)
        } else {
            Err(CredStoreError::UnexpectedStatus {
                status: self.status,
                expected: expected.to_vec(),
                body: self.body,
            })
        }
    }

    fn json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CredStoreError> {
        serde_json::from_str(&self.body).map_err(|e| CredStoreError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

struct CredHubClient {
    agent: ureq::Agent,
    url: String,
    uaa_url: String,
    client_name: String,
    client_secret: String,
    token: Mutex<Option<Token>>,
}

impl CredHubClient {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }

    fn fetch_token(&self) -> Result<Token, CredStoreError> {
        let url = format!("{}/oauth/token", self.uaa_url.trim_end_matches('/'));
        let response = self
            .agent
            .post(&url)
            .send_form([
                ("client_id", self.client_name.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("response_type", "token"),
            ])
            .map_err(|e| http_error(&url, e))?;
        let reply = read_reply(response).expect(&[200])?;
        let token: TokenResponse = reply.json(&url)?;
        Ok(Token {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// A cached bearer token, refreshed when expired or when `refresh` is set.
    fn bearer(&self, refresh: bool) -> Result<String, CredStoreError> {
        let mut cached = self.token.lock().unwrap_or_else(|e| e.into_inner());
        let stale = match cached.as_ref() {
            Some(token) => refresh || Instant::now() >= token.expires_at,
            None => true,
        };
        if stale {
            *cached = Some(self.fetch_token()?);
        }
        Ok(cached
            .as_ref()
            .map(|t| format!("Bearer {}", t.access_token))
            .unwrap_or_default())
    }

    /// Run an authenticated request, retrying once with a new token on 401.
    fn send<F>(&self, url: &str, request: F) -> Result<Reply, CredStoreError>
    where
        F: Fn(&ureq::Agent, &str) -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut refresh = false;
        loop {
            let bearer = self.bearer(refresh)?;
            let reply = read_reply(request(&self.agent, &bearer).map_err(|e| http_error(url, e))?);
            if reply.status == 401 && !refresh {
                tracing::debug!(url, "credhub token rejected, refreshing");
                refresh = true;
                continue;
            }
            return Ok(reply);
        }
    }

    fn put(&self, path: &str, credentials: &JsonObject) -> Result<(), CredStoreError> {
        let url = self.endpoint("/api/v1/data");
        let body = json!({"name": path, "type": "json", "value": credentials});
        self.send(&url, |agent, bearer| {
            agent
                .put(&url)
                .header("Authorization", bearer)
                .send_json(&body)
        })?
        .expect(&[200])?;
        Ok(())
    }

    fn add_permission(
        &self,
        path: &str,
        actor: &str,
        operations: &[String],
    ) -> Result<(), CredStoreError> {
        let url = self.endpoint("/api/v2/permissions");
        let body = json!({"path": path, "actor": actor, "operations": operations});
        self.send(&url, |agent, bearer| {
            agent
                .post(&url)
                .header("Authorization", bearer)
                .send_json(&body)
        })?
        .expect(&[201])?;
        Ok(())
    }

    fn delete_permissions(&self, path: &str) -> Result<(), CredStoreError> {
        let list_url = self.endpoint("/api/v1/permissions");
        let listed: PermissionList = self
            .send(&list_url, |agent, bearer| {
                agent
                    .get(&list_url)
                    .query("credential_name", path)
                    .header("Authorization", bearer)
                    .call()
            })?
            .expect(&[200])?
            .json(&list_url)?;

        let lookup_url = self.endpoint("/api/v2/permissions");
        for entry in listed.permissions {
            let record: PermissionRecord = self
                .send(&lookup_url, |agent, bearer| {
                    agent
                        .get(&lookup_url)
                        .query("actor", &entry.actor)
                        .query("path", path)
                        .header("Authorization", bearer)
                        .call()
                })?
                .expect(&[200])?
                .json(&lookup_url)?;

            let delete_url = self.endpoint(&format!("/api/v2/permissions/{}", record.uuid));
            self.send(&delete_url, |agent, bearer| {
                agent
                    .delete(&delete_url)
                    .header("Authorization", bearer)
                    .call()
            })?
            .expect(&[200, 204])?;
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), CredStoreError> {
        let url = self.endpoint("/api/v1/data");
        self.send(&url, |agent, bearer| {
            agent
                .delete(&url)
                .query("name", path)
                .header("Authorization", bearer)
                .call()
        })?
        .expect(&[204])?;
        Ok(())
    }
}

fn read_reply(mut response: ureq::http::Response<ureq::Body>) -> Reply {
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Reply { status, body }
}

fn http_error(url: &str, err: ureq::Error) -> CredStoreError {
    CredStoreError::Http {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// A [`CredStore`] backed by CredHub.
#[derive(Clone)]
pub struct CredHubStore {
    client: Arc<CredHubClient>,
}

impl CredHubStore {
    pub fn new(config: &CredHubConfig) -> Result<Self, CredStoreError> {
        if !config.is_configured() {
            return Err(CredStoreError::Config(
                "both url and uaa_url must be set".to_string(),
            ));
        }

        let mut tls = ureq::tls::TlsConfig::builder().disable_verification(config.skip_ssl_validation);
        if let Some(path) = &config.ca_cert_file {
            let pem = std::fs::read(path).map_err(|e| {
                CredStoreError::Config(format!("reading CA certificate {}: {e}", path.display()))
            })?;
            let cert = ureq::tls::Certificate::from_pem(&pem)
                .map_err(|e| CredStoreError::Config(format!("parsing CA certificate: {e}")))?;
            tls = tls.root_certs(ureq::tls::RootCerts::Specific(Arc::new(vec![
                cert.to_owned(),
            ])));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls.build())
            .build()
            .into();

        Ok(Self {
            client: Arc::new(CredHubClient {
                agent,
                url: config.url.clone(),
                uaa_url: config.uaa_url.clone(),
                client_name: config.uaa_client_name.clone(),
                client_secret: config.uaa_client_secret.clone(),
                token: Mutex::new(None),
            }),
        })
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, CredStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&CredHubClient) -> Result<T, CredStoreError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| CredStoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl CredStore for CredHubStore {
    async fn put(&self, path: &str, credentials: &JsonObject) -> Result<(), CredStoreError> {
        let path = path.to_string();
        let credentials = credentials.clone();
        self.blocking(move |client| client.put(&path, &credentials))
            .await
    }

    async fn add_permission(
        &self,
        path: &str,
        actor: &str,
        operations: &[&str],
    ) -> Result<(), CredStoreError> {
        let path = path.to_string();
        let actor = actor.to_string();
        let operations: Vec<String> = operations.iter().map(|s| s.to_string()).collect();
        self.blocking(move |client| client.add_permission(&path, &actor, &operations))
            .await
    }

    async fn delete_permissions(&self, path: &str) -> Result<(), CredStoreError> {
        let path = path.to_string();
        self.blocking(move |client| client.delete_permissions(&path))
            .await
    }

    async fn delete(&self, path: &str) -> Result<(), CredStoreError> {
        let path = path.to_string();
        self.blocking(move |client| client.delete(&path)).await
    }
}

impl std::fmt::Debug for CredHubStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredHubStore")
            .field("url", &self.client.url)
            .finish()
    }
}

/// The JSON a bind response carries in place of credentials kept in CredHub.
pub fn credential_reference(path: &str) -> Value {
    json!({ "credhub-ref": path })
}
