pub mod export;
pub mod import;

pub use export::run_export;
pub use import::run_import;

use anyhow::{Context, Result};
use clap::Args;
use consul_migrate::{ClientConfig, HttpClient};
use std::path::{Path, PathBuf};

/// How to reach and authenticate to the Consul agent
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Address and port of the Consul HTTP agent [default: http://127.0.0.1:8500]
    #[arg(long, env = "CONSUL_HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// ACL token to use in the requests
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// File containing the ACL token to use instead of --token
    #[arg(long, env = "CONSUL_HTTP_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// CA file to use for TLS when communicating with Consul
    #[arg(long, env = "CONSUL_CACERT")]
    pub ca_file: Option<PathBuf>,

    /// Directory of CA certificates to use for TLS when communicating with Consul
    #[arg(long, env = "CONSUL_CAPATH")]
    pub ca_path: Option<PathBuf>,

    /// Client certificate file to use for TLS when verify_incoming is enabled
    #[arg(long, env = "CONSUL_CLIENT_CERT")]
    pub client_cert: Option<PathBuf>,

    /// Client key file to use for TLS when verify_incoming is enabled
    #[arg(long, env = "CONSUL_CLIENT_KEY")]
    pub client_key: Option<PathBuf>,

    /// Server name to use as the SNI host when connecting via TLS
    #[arg(long, env = "CONSUL_TLS_SERVER_NAME")]
    pub tls_server_name: Option<String>,

    /// TOML file with connection settings; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Config file (if any) and environment, overridden by explicit flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ClientConfig::from_env(),
        };

        if let Some(addr) = &self.http_addr {
            config.address = addr.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(file) = &self.token_file {
            config.token_file = Some(file.clone());
        }
        if let Some(ca) = &self.ca_file {
            config.tls.ca_file = Some(ca.clone());
        }
        if let Some(ca) = &self.ca_path {
            config.tls.ca_path = Some(ca.clone());
        }
        if let Some(cert) = &self.client_cert {
            config.tls.client_cert = Some(cert.clone());
        }
        if let Some(key) = &self.client_key {
            config.tls.client_key = Some(key.clone());
        }
        if let Some(name) = &self.tls_server_name {
            config.tls.server_name = Some(name.clone());
        }

        Ok(config)
    }

    pub async fn client(&self) -> Result<HttpClient> {
        let config = self.client_config()?;
        HttpClient::new(&config)
            .await
            .context("Error connecting to Consul agent")
    }
}

/// Log output selection
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct Verbosity {
    /// Enable verbose debugging output
    #[arg(long, conflicts_with = "silent")]
    pub verbose: bool,

    /// Disable all normal log output
    #[arg(long)]
    pub silent: bool,

    /// Emit log records as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Verbosity {
    pub fn level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.silent {
            "off"
        } else {
            "info"
        }
    }
}

/// `None` and `-` both mean stdio
pub(crate) fn is_stdio(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str() == "-")
}
