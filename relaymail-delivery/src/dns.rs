//! MX resolution for direct delivery.
//!
//! Resolved sets are cached per domain in a `DashMap`. The cache lifetime is
//! the smallest record TTL, clamped to the configured bounds unless an
//! explicit override is set.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::{
    TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Standard SMTP port used for direct delivery.
pub const SMTP_PORT: u16 = 25;

#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain exists but publishes no MX records.
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),

    /// NXDOMAIN.
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),

    #[error("DNS query timed out for domain: {0}")]
    Timeout(String),
}

impl DnsError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::LookupFailed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Query timeout in seconds.
    #[serde(default = "DnsConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the record TTL for every cached entry.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    #[serde(default = "DnsConfig::default_min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,

    #[serde(default = "DnsConfig::default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,
}

impl DnsConfig {
    const fn default_timeout_secs() -> u64 {
        5
    }

    const fn default_min_cache_ttl_secs() -> u64 {
        60
    }

    const fn default_max_cache_ttl_secs() -> u64 {
        3600
    }

    fn cache_ttl(&self, record_ttl: u32) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or_else(|| {
            u64::from(record_ttl).clamp(self.min_cache_ttl_secs, self.max_cache_ttl_secs)
        }))
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
            cache_ttl_secs: None,
            min_cache_ttl_secs: Self::default_min_cache_ttl_secs(),
            max_cache_ttl_secs: Self::default_max_cache_ttl_secs(),
        }
    }
}

/// A mail exchanger with its preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServer {
    /// Host name without the trailing root dot.
    pub host: String,
    /// Lower is preferred.
    pub priority: u16,
    pub port: u16,
}

impl MailServer {
    #[must_use]
    pub fn new(host: impl Into<String>, priority: u16, port: u16) -> Self {
        Self {
            host: host.into(),
            priority,
            port,
        }
    }

    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The preferred exchanger: lowest priority, earliest on ties.
#[must_use]
pub fn preferred(servers: &[MailServer]) -> Option<&MailServer> {
    servers.iter().reduce(|best, candidate| {
        if candidate.priority < best.priority {
            candidate
        } else {
            best
        }
    })
}

/// Source of MX records, in the order the resolver returned them.
#[async_trait]
pub trait MxLookup: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError>;
}

#[derive(Debug, Clone)]
struct CachedResult {
    servers: Arc<Vec<MailServer>>,
    expires_at: Instant,
}

/// Caching MX resolver backed by the system resolver configuration.
#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
    cache: DashMap<String, CachedResult>,
    config: DnsConfig,
}

impl DnsResolver {
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be loaded.
    pub fn new() -> Result<Self, DnsError> {
        Self::with_dns_config(DnsConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be loaded.
    pub fn with_dns_config(config: DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            cache: DashMap::new(),
            config,
        })
    }

    /// Uses explicit name servers instead of the system configuration.
    #[must_use]
    pub fn with_resolver_config(
        resolver_config: ResolverConfig,
        opts: ResolverOpts,
        config: DnsConfig,
    ) -> Self {
        let resolver =
            TokioResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self {
            resolver,
            cache: DashMap::new(),
            config,
        }
    }

    /// Resolve the exchangers for `domain`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Fails when the domain does not exist, publishes no MX records, or
    /// the query fails.
    pub async fn resolve_mail_servers(
        &self,
        domain: &str,
    ) -> Result<Arc<Vec<MailServer>>, DnsError> {
        let key = domain.to_ascii_lowercase();

        if let Some(cached) = self.cache.get(&key) {
            if cached.expires_at > Instant::now() {
                debug!("Cache hit for {domain}, {} server(s)", cached.servers.len());
                return Ok(Arc::clone(&cached.servers));
            }
            debug!("Cache entry expired for {domain}");
        }

        let (servers, record_ttl) = self.resolve_uncached(domain).await?;
        let servers = Arc::new(servers);
        let cache_ttl = self.config.cache_ttl(record_ttl);

        self.cache.insert(
            key,
            CachedResult {
                servers: Arc::clone(&servers),
                expires_at: Instant::now() + cache_ttl,
            },
        );

        debug!(
            "Cached {} server(s) for {domain}, record TTL {record_ttl}s, cache TTL {}s",
            servers.len(),
            cache_ttl.as_secs()
        );
        Ok(servers)
    }

    async fn resolve_uncached(&self, domain: &str) -> Result<(Vec<MailServer>, u32), DnsError> {
        let lookup = match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(err) if err.is_nx_domain() => {
                return Err(DnsError::DomainNotFound(domain.to_string()));
            }
            Err(err) if err.is_no_records_found() => {
                return Err(DnsError::NoMailServers(domain.to_string()));
            }
            Err(err) => {
                warn!("MX lookup failed for {domain}: {err}");
                return Err(DnsError::LookupFailed(err));
            }
        };

        let min_ttl = lookup
            .as_lookup()
            .records()
            .iter()
            .map(hickory_resolver::proto::rr::Record::ttl)
            .min()
            .unwrap_or(300);

        let servers: Vec<MailServer> = lookup
            .iter()
            .map(|mx| {
                let host = mx.exchange().to_utf8();
                let host = host.trim_end_matches('.');
                debug!("Found MX record: {host} (priority: {})", mx.preference());
                MailServer::new(host, mx.preference(), SMTP_PORT)
            })
            .collect();

        if servers.is_empty() {
            return Err(DnsError::NoMailServers(domain.to_string()));
        }

        Ok((servers, min_ttl))
    }
}

#[async_trait]
impl MxLookup for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        self.resolve_mail_servers(domain).await
    }
}
