use crate::backend::Ldap3Connector;
use crate::changeset::MAX_ATTRS;
use crate::connection::Connection;
use crate::search::parse_scope;
use crate::tls;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub tls: Option<TlsConfig>,
    pub limits: Option<LimitsConfig>,
    pub search: Option<SearchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host name(s) or URI(s); several whitespace separated entries are tried in order.
    pub uri: String,
    /// Negotiate StartTLS after connecting (default false).
    pub starttls: Option<bool>,
    /// Connect and request timeout in seconds. 0 or unset blocks.
    pub timeout_secs: Option<f64>,
    /// Simple bind right after connecting. Omit for an unbound connection.
    pub bind: Option<BindConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    pub who: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM CA certificate or bundle, trusted in addition to the system roots.
    pub ca_file: Option<String>,
    /// Do not verify server certificates (only for tests/internal networks).
    pub skip_verify: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Modifications per add/modify and attributes per search (default 100).
    pub max_attrs: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Scope used when a search names none: base, onelevel or subtree (default subtree).
    pub default_scope: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "ldap://127.0.0.1:389".to_string(),
            starttls: Some(false),
            timeout_secs: None,
            bind: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn max_attrs(&self) -> usize {
        self.limits.as_ref().and_then(|l| l.max_attrs).unwrap_or(MAX_ATTRS)
    }

    /// Connector carrying the TLS settings of this config.
    pub fn connector(&self) -> Result<Ldap3Connector> {
        let mut connector = Ldap3Connector::new();
        if let Some(tls_cfg) = &self.tls {
            if let Some(ca_file) = tls_cfg.ca_file.as_deref() {
                tls::validate_ca_file(ca_file)?;
                connector = connector.with_tls_config(tls::load_client_config(Some(ca_file))?);
            }
            connector = connector.with_skip_verify(tls_cfg.skip_verify.unwrap_or(false));
        }
        Ok(connector)
    }

    /// Open, apply limits and default scope, then bind if configured.
    pub fn open(&self) -> Result<Connection> {
        let connector = self.connector()?;
        let conn_cfg = &self.connection;
        let conn = Connection::open_with(
            &connector,
            &conn_cfg.uri,
            conn_cfg.starttls.unwrap_or(false),
            conn_cfg.timeout_secs,
        )
        .with_context(|| format!("Failed to connect to {}", conn_cfg.uri))?;
        conn.set_max_attrs(self.max_attrs());
        let default_scope = self.search.as_ref().and_then(|s| s.default_scope.as_deref());
        if let Some(scope) = parse_scope(default_scope)? {
            conn.set_default_scope(scope);
        }
        if let Some(bind) = &conn_cfg.bind {
            conn.bind_simple(
                bind.who.as_deref().unwrap_or(""),
                bind.password.as_deref().unwrap_or(""),
            )
            .context("Bind failed")?;
            info!("Bound as {:?}", bind.who.as_deref().unwrap_or(""));
        }
        Ok(conn)
    }
}
