//! Mock server assembly.
//!
//! Builds the routing engines, context registry, gateway, and publisher from
//! one configuration, sharing a single registry across all of them.

use crate::config::MockServerConfig;
use crate::engine::{MockClients, MockRoutingEngine};
use crate::error::ConfigError;
use crate::gateway::{BroadcastGateway, RealtimeTransport};
use crate::publisher::TickPublisher;
use crate::registry::ContextRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A configured mock server over a real-time transport.
pub struct MockServer<T> {
    config: MockServerConfig,
    clients: MockClients,
    gateway: Arc<BroadcastGateway<T>>,
    publisher: Arc<TickPublisher<T>>,
}

impl<T: RealtimeTransport> MockServer<T> {
    /// Validate the configuration and wire up every component.
    pub fn new(config: MockServerConfig, transport: Arc<T>) -> Result<Self, ConfigError> {
        config.validate()?;

        let clients = MockClients::new(config.settings.clone());
        let mut client_count = 0;
        for (name, rules) in config.client_rules() {
            clients.register(name, rules.to_vec())?;
            client_count += 1;
        }

        let registry = Arc::new(ContextRegistry::with_static(
            config.settings.unknown_context_policy,
            config.contexts.iter().map(|c| (c.name.clone(), c.active)),
        ));
        let gateway = Arc::new(BroadcastGateway::new(
            transport,
            registry,
            config.settings.track_dynamic_contexts,
        ));
        let publisher = Arc::new(TickPublisher::new(Arc::clone(&gateway), &config.contexts));

        info!(
            clients = client_count,
            contexts = config.contexts.len(),
            track_dynamic_contexts = config.settings.track_dynamic_contexts,
            "Mock server initialized"
        );

        Ok(Self {
            config,
            clients,
            gateway,
            publisher,
        })
    }

    pub fn config(&self) -> &MockServerConfig {
        &self.config
    }

    /// Engine for a named client.
    pub fn engine(&self, client: &str) -> Option<Arc<MockRoutingEngine>> {
        self.clients.get(client)
    }

    pub fn gateway(&self) -> &Arc<BroadcastGateway<T>> {
        &self.gateway
    }

    pub fn publisher(&self) -> &Arc<TickPublisher<T>> {
        &self.publisher
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.settings.tick_interval_ms.max(1))
    }
}
