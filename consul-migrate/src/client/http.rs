use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::debug;
use url::Url;

use super::{ClientError, ClientResult, ConsulApi, PolicyStub, RoleStub, Scope, TokenStub};
use crate::config::ClientConfig;
use crate::error::{MigrateError, Result};
use crate::snapshot::{Namespace, Policy, Role, Token};

const TOKEN_HEADER: &str = "X-Consul-Token";

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Unreachable(err.to_string())
        }
    }
}

/// [`ConsulApi`] over the agent's HTTP API
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpClient {
    /// Build a client for the agent in `config`
    ///
    /// Async because a TLS server name override resolves the agent address up front.
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        let mut base_url = config.base_url()?;
        let token = config.resolve_token()?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("consul-migrate/", env!("CARGO_PKG_VERSION")));

        for pem in config.tls.ca_certificates()? {
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| MigrateError::Config(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(pem) = config.tls.client_identity()? {
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| MigrateError::Config(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        if config.tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(server_name) = &config.tls.server_name {
            // Dial the configured address but present server_name for SNI and verification.
            let addrs = resolve_addrs(&base_url).await?;
            builder = builder.resolve_to_addrs(server_name, &addrs);
            base_url
                .set_host(Some(server_name))
                .map_err(|e| MigrateError::Config(format!("invalid TLS server name '{}': {}", server_name, e)))?;
        }

        let http = builder
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(address = %base_url, "configured Consul HTTP client");
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str, scope: &Scope) -> ClientResult<Url> {
        let raw = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        let mut url = Url::parse(&raw).map_err(|e| ClientError::Unreachable(format!("invalid URL {}: {}", raw, e)))?;
        if let Some(ns) = scope.namespace_name() {
            url.query_pairs_mut().append_pair("ns", ns);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.header(TOKEN_HEADER, token),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, scope: &Scope) -> ClientResult<T> {
        let url = self.url(path, scope)?;
        debug!(%url, "GET");
        let resp = self.request(Method::GET, url).send().await?;
        decode(resp).await
    }

    async fn put<B, T>(&self, path: &str, scope: &Scope, body: &B) -> ClientResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path, scope)?;
        debug!(%url, "PUT");
        let resp = self.request(Method::PUT, url).json(body).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(resp.url().path().to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn resolve_addrs(url: &Url) -> Result<Vec<SocketAddr>> {
    let host = url
        .host_str()
        .ok_or_else(|| MigrateError::Config(format!("address '{}' has no host", url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| MigrateError::Config(format!("address '{}' has no port", url)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(MigrateError::Config(format!("address '{}' did not resolve", url)));
    }
    Ok(addrs)
}

#[async_trait]
impl ConsulApi for HttpClient {
    async fn agent_self(&self) -> ClientResult<serde_json::Value> {
        self.get("v1/agent/self", &Scope::global()).await
    }

    async fn list_namespaces(&self) -> ClientResult<Vec<Namespace>> {
        // Consul answers `null` rather than `[]` when nothing matches
        let list: Option<Vec<Namespace>> = self.get("v1/namespaces", &Scope::global()).await?;
        Ok(list.unwrap_or_default())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClientResult<Namespace> {
        self.put("v1/namespace", &Scope::global(), namespace).await
    }

    async fn list_policies(&self, scope: &Scope) -> ClientResult<Vec<PolicyStub>> {
        let list: Option<Vec<PolicyStub>> = self.get("v1/acl/policies", scope).await?;
        Ok(list.unwrap_or_default())
    }

    async fn read_policy(&self, id: &str, scope: &Scope) -> ClientResult<Policy> {
        self.get(&format!("v1/acl/policy/{}", id), scope).await
    }

    async fn create_policy(&self, policy: &Policy, scope: &Scope) -> ClientResult<Policy> {
        self.put("v1/acl/policy", scope, policy).await
    }

    async fn list_roles(&self, scope: &Scope) -> ClientResult<Vec<RoleStub>> {
        let list: Option<Vec<RoleStub>> = self.get("v1/acl/roles", scope).await?;
        Ok(list.unwrap_or_default())
    }

    async fn read_role(&self, id: &str, scope: &Scope) -> ClientResult<Role> {
        self.get(&format!("v1/acl/role/{}", id), scope).await
    }

    async fn create_role(&self, role: &Role, scope: &Scope) -> ClientResult<Role> {
        self.put("v1/acl/role", scope, role).await
    }

    async fn list_tokens(&self, scope: &Scope) -> ClientResult<Vec<TokenStub>> {
        let list: Option<Vec<TokenStub>> = self.get("v1/acl/tokens", scope).await?;
        Ok(list.unwrap_or_default())
    }

    async fn read_token(&self, accessor_id: &str, scope: &Scope) -> ClientResult<Token> {
        self.get(&format!("v1/acl/token/{}", accessor_id), scope).await
    }

    async fn create_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token> {
        self.put("v1/acl/token", scope, token).await
    }

    async fn update_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token> {
        self.put(&format!("v1/acl/token/{}", token.accessor_id), scope, token)
            .await
    }
}
