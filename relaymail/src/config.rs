//! Server configuration.
//!
//! One RON document describes the whole server. Every field has a default,
//! so an empty `()` document is a valid (if not very useful) configuration.
//! A handful of environment variables override file values at startup.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use relaymail_common::{
    UserId,
    config::{ClientTimeouts, ServerTimeouts},
};
use relaymail_delivery::{DnsConfig, RelayConfig, RelayRegistry, RetryPolicy};
use relaymail_smtp::{AdmissionPolicy, ListenerConfig, SessionConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RELAYMAIL_CONFIG";

/// Searched in order when no path is given explicitly.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./relaymail.config.ron",
    "/etc/relaymail/relaymail.config.ron",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Our mail domain, announced in the greeting and used in message ids.
    #[serde(default = "defaults::domain")]
    pub domain: String,

    #[serde(default = "defaults::banner")]
    pub banner: String,

    #[serde(default = "defaults::listeners")]
    pub listeners: Vec<ListenerConfig>,

    #[serde(default)]
    pub admission: AdmissionPolicy,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Largest accepted message in bytes; 0 disables the limit.
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub dns: DnsConfig,

    /// Skip certificate verification towards relays. Testing only.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub users: Vec<UserAccount>,

    #[serde(default)]
    pub mailboxes: Vec<MailboxEntry>,

    #[serde(default = "defaults::store_dir")]
    pub store_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default)]
    pub server: ServerTimeouts,
    #[serde(default)]
    pub client: ClientTimeouts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub default: Option<RelayConfig>,
    /// Relays by sender domain.
    #[serde(default)]
    pub domains: BTreeMap<String, RelayConfig>,
}

/// An account allowed to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    /// Login name.
    pub email: String,
    /// bcrypt hash (`relaymail hash-password`) or legacy plaintext.
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub address: String,
    pub user_id: UserId,
    #[serde(default = "defaults::active")]
    pub active: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: defaults::domain(),
            banner: defaults::banner(),
            listeners: defaults::listeners(),
            admission: AdmissionPolicy::default(),
            timeouts: Timeouts::default(),
            max_message_size: defaults::max_message_size(),
            retry: RetryPolicy::default(),
            relay: RelaySettings::default(),
            dns: DnsConfig::default(),
            accept_invalid_certs: false,
            users: Vec::new(),
            mailboxes: Vec::new(),
            store_dir: defaults::store_dir(),
        }
    }
}

impl Config {
    /// Parse a RON document.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        ron::from_str(content).context("Invalid configuration")
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_ron(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Apply overrides taken from the environment. Only `DOMAIN` is read
    /// here; relay variables are applied by [`Self::relay_registry`].
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            if key.as_ref() == "DOMAIN" && !value.as_ref().is_empty() {
                self.domain = value.as_ref().to_string();
            }
        }
    }

    /// Relays from the file, overlaid with `OUTBOUND_SMTP_*` and
    /// `DOMAIN_SMTP_*` variables from `vars`.
    pub fn relay_registry<I, K, V>(&self, vars: I) -> RelayRegistry
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let registry = RelayRegistry::new();
        registry.set_default(self.relay.default.clone());
        for (domain, relay) in &self.relay.domains {
            registry.insert(domain, relay.clone());
        }
        registry.apply_env(vars);
        registry
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::builder()
            .with_domain(self.domain.clone())
            .with_banner(self.banner.clone())
            .with_max_message_size(self.max_message_size)
            .with_timeouts(self.timeouts.server.clone())
            .build()
    }
}

/// Locate the configuration file.
///
/// Precedence: `explicit`, then [`CONFIG_ENV`], then [`DEFAULT_CONFIG_PATHS`].
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "Config file {} does not exist", path.display());
        return Ok(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(path);
    }

    if let Some(path) = DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    let tried = DEFAULT_CONFIG_PATHS
        .iter()
        .map(|path| format!("  - {path}"))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{tried}"
    )
}

mod defaults {
    use std::path::PathBuf;

    use relaymail_smtp::ListenerConfig;

    pub fn domain() -> String {
        "localhost".to_string()
    }

    pub fn banner() -> String {
        "Relaymail SMTP Server Ready".to_string()
    }

    pub fn listeners() -> Vec<ListenerConfig> {
        vec![ListenerConfig {
            socket: ([0, 0, 0, 0], 25).into(),
            tls: None,
        }]
    }

    pub const fn max_message_size() -> usize {
        25 * 1024 * 1024
    }

    pub fn store_dir() -> PathBuf {
        PathBuf::from("./mail")
    }

    pub const fn active() -> bool {
        true
    }
}
