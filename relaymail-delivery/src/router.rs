use std::sync::Arc;

use relaymail_common::address::domain_of;
use tracing::debug;

use crate::relay::{RelayConfig, RelayConfigSource};

/// Chooses the relay for a sender address.
#[derive(Clone)]
pub struct DeliveryRouter {
    source: Arc<dyn RelayConfigSource>,
}

impl DeliveryRouter {
    pub fn new(source: Arc<dyn RelayConfigSource>) -> Self {
        Self { source }
    }

    /// The sender domain's relay, else the default relay.
    ///
    /// `None` means deliver directly to the recipient's exchanger. A sender
    /// without a usable domain only gets the default relay.
    #[must_use]
    pub fn resolve(&self, from: &str) -> Option<RelayConfig> {
        let relay = domain_of(from)
            .and_then(|domain| self.source.resolve_relay_config(domain))
            .or_else(|| self.source.resolve_default_relay_config());

        match &relay {
            Some(relay) => debug!(%from, relay = %relay.address(), "Routing through relay"),
            None => debug!(%from, "No relay configured, delivering directly"),
        }

        relay
    }
}

impl std::fmt::Debug for DeliveryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRouter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::relay::RelayRegistry;

    fn router(registry: RelayRegistry) -> DeliveryRouter {
        DeliveryRouter::new(Arc::new(registry))
    }

    #[test]
    fn domain_relay_wins() {
        let registry = RelayRegistry::new();
        registry.insert("corp.example", RelayConfig::new("smtp.corp.example", 465));
        registry.set_default(Some(RelayConfig::new("relay.example", 587)));

        assert_eq!(
            router(registry).resolve("alice@corp.example").unwrap().host,
            "smtp.corp.example"
        );
    }

    #[test]
    fn falls_back_to_default() {
        let registry = RelayRegistry::new();
        registry.insert("corp.example", RelayConfig::new("smtp.corp.example", 465));
        registry.set_default(Some(RelayConfig::new("relay.example", 587)));
        let router = router(registry);

        assert_eq!(router.resolve("bob@other.example").unwrap().host, "relay.example");
        assert_eq!(router.resolve("no-domain").unwrap().host, "relay.example");
    }

    #[test]
    fn nothing_configured_means_direct() {
        let registry = RelayRegistry::new();
        registry.insert("corp.example", RelayConfig::new("smtp.corp.example", 465));

        assert!(router(registry).resolve("bob@other.example").is_none());
    }
}
