//! Connection configuration for a Consul agent
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! the `CONSUL_*` environment variables, then command-line flags (applied by
//! the caller on top of [`ClientConfig::from_env`] or [`ClientConfig::load`]).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{MigrateError, Result};

pub const ENV_HTTP_ADDR: &str = "CONSUL_HTTP_ADDR";
pub const ENV_HTTP_TOKEN: &str = "CONSUL_HTTP_TOKEN";
pub const ENV_HTTP_TOKEN_FILE: &str = "CONSUL_HTTP_TOKEN_FILE";
pub const ENV_HTTP_SSL: &str = "CONSUL_HTTP_SSL";
pub const ENV_HTTP_SSL_VERIFY: &str = "CONSUL_HTTP_SSL_VERIFY";
pub const ENV_CACERT: &str = "CONSUL_CACERT";
pub const ENV_CAPATH: &str = "CONSUL_CAPATH";
pub const ENV_CLIENT_CERT: &str = "CONSUL_CLIENT_CERT";
pub const ENV_CLIENT_KEY: &str = "CONSUL_CLIENT_KEY";
pub const ENV_TLS_SERVER_NAME: &str = "CONSUL_TLS_SERVER_NAME";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Agent address, with or without a scheme
    #[serde(default = "default_address")]
    pub address: String,
    /// Use https when the address carries no scheme
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_address() -> String {
    "127.0.0.1:8500".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            ssl: false,
            token: None,
            token_file: None,
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Directory of PEM encoded CA certificates
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Host name used for SNI and certificate verification
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl ClientConfig {
    /// Defaults overlaid with the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge_env(|key| std::env::var(key).ok());
        config
    }

    /// TOML file overlaid with the environment
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// TOML file overlaid with values from `lookup`
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&content).map_err(|e| {
            MigrateError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.merge_env(lookup);
        Ok(config)
    }

    /// Overlay values from an environment lookup; unset or empty values are ignored
    pub fn merge_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(addr) = get(ENV_HTTP_ADDR) {
            self.address = addr;
        }
        if let Some(token) = get(ENV_HTTP_TOKEN) {
            self.token = Some(token);
        }
        if let Some(file) = get(ENV_HTTP_TOKEN_FILE) {
            self.token_file = Some(PathBuf::from(file));
        }
        if let Some(ssl) = get(ENV_HTTP_SSL).and_then(|v| parse_bool(&v)) {
            self.ssl = ssl;
        }
        if let Some(verify) = get(ENV_HTTP_SSL_VERIFY).and_then(|v| parse_bool(&v)) {
            self.tls.insecure_skip_verify = !verify;
        }
        if let Some(ca) = get(ENV_CACERT) {
            self.tls.ca_file = Some(PathBuf::from(ca));
        }
        if let Some(ca) = get(ENV_CAPATH) {
            self.tls.ca_path = Some(PathBuf::from(ca));
        }
        if let Some(cert) = get(ENV_CLIENT_CERT) {
            self.tls.client_cert = Some(PathBuf::from(cert));
        }
        if let Some(key) = get(ENV_CLIENT_KEY) {
            self.tls.client_key = Some(PathBuf::from(key));
        }
        if let Some(name) = get(ENV_TLS_SERVER_NAME) {
            self.tls.server_name = Some(name);
        }
    }

    /// ACL token to send: a non-empty token file wins over the token
    pub fn resolve_token(&self) -> Result<Option<String>> {
        if let Some(path) = &self.token_file {
            let content = fs::read_to_string(path).map_err(|e| {
                MigrateError::Config(format!("failed to read token file {}: {}", path.display(), e))
            })?;
            let token = content.trim();
            if !token.is_empty() {
                return Ok(Some(token.to_string()));
            }
        }
        Ok(self.token.clone().filter(|t| !t.is_empty()))
    }

    /// Agent base URL; a bare `host:port` gets http, or https when TLS is requested
    pub fn base_url(&self) -> Result<Url> {
        let address = self.address.trim().trim_end_matches('/');
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else if self.ssl || self.tls.has_material() {
            format!("https://{}", address)
        } else {
            format!("http://{}", address)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| MigrateError::Config(format!("invalid address '{}': {}", self.address, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(MigrateError::Config(format!(
                "unsupported scheme '{}' in address '{}'",
                other, self.address
            ))),
        }
    }
}

impl TlsConfig {
    /// True when any certificate material is configured
    pub fn has_material(&self) -> bool {
        self.ca_file.is_some() || self.ca_path.is_some() || self.client_cert.is_some()
    }

    /// PEM contents of every configured CA certificate
    pub fn ca_certificates(&self) -> Result<Vec<Vec<u8>>> {
        let mut pems = Vec::new();
        if let Some(file) = &self.ca_file {
            pems.push(read_pem(file)?);
        }
        if let Some(dir) = &self.ca_path {
            let mut entries = fs::read_dir(dir)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.sort();
            for path in entries.into_iter().filter(|p| p.is_file()) {
                pems.push(read_pem(&path)?);
            }
        }
        Ok(pems)
    }

    /// Client certificate and key concatenated into one PEM bundle
    pub fn client_identity(&self) -> Result<Option<Vec<u8>>> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert)?;
                if !pem.ends_with(b"\n") {
                    pem.push(b'\n');
                }
                pem.extend(read_pem(key)?);
                Ok(Some(pem))
            }
            (None, None) => Ok(None),
            _ => Err(MigrateError::Config(
                "client certificate and client key must be given together".into(),
            )),
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| MigrateError::Config(format!("failed to read {}: {}", path.display(), e)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}
