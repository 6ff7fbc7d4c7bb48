//! Routing engine: the single entry point used by the transport layer.
//!
//! Matches each request against the registered rules and applies the matched
//! rule's directives. Unmatched requests pass through untouched.

use crate::config::GlobalSettings;
use crate::error::ConfigError;
use crate::matcher::RuleMatcher;
use crate::mutator;
use crate::request::MockRequest;
use crate::rule::{validate_rules, EndpointRule};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Matches and mutates requests for one client.
#[derive(Debug)]
pub struct MockRoutingEngine {
    rules: Arc<[EndpointRule]>,
    matcher: RuleMatcher,
    log_matches: bool,
    log_unmatched: bool,
}

impl MockRoutingEngine {
    /// Validate the rules and build an engine over them.
    pub fn new(rules: Vec<EndpointRule>) -> Result<Self, ConfigError> {
        Self::with_settings(rules, &GlobalSettings::default())
    }

    pub fn with_settings(
        rules: Vec<EndpointRule>,
        settings: &GlobalSettings,
    ) -> Result<Self, ConfigError> {
        validate_rules(&rules)?;
        let matcher = RuleMatcher::new(&rules);

        Ok(Self {
            rules: rules.into(),
            matcher,
            log_matches: settings.log_matches,
            log_unmatched: settings.log_unmatched,
        })
    }

    /// Route a request: mutate it if a rule matches, otherwise leave it as is.
    pub fn handle<R: MockRequest + ?Sized>(&self, request: &mut R) {
        let Some(result) = self
            .matcher
            .find_match(&self.rules, request.method(), request.path())
        else {
            if self.log_unmatched {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "No matching rule, passing through"
                );
            }
            return;
        };

        if self.log_matches {
            debug!(
                rule = result.index,
                pattern = %result.rule.path_pattern,
                method = %request.method(),
                path = %request.path(),
                "Request matched rule"
            );
        }

        mutator::mutate(result.rule, request);
    }

    /// Owned variant of [`handle`](Self::handle).
    pub fn route<R: MockRequest>(&self, mut request: R) -> R {
        self.handle(&mut request);
        request
    }

    /// Rules in registration order.
    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }
}

/// Routing engines registered per named client.
#[derive(Debug, Default)]
pub struct MockClients {
    settings: GlobalSettings,
    engines: RwLock<HashMap<String, Arc<MockRoutingEngine>>>,
}

impl MockClients {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            settings,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client's rules. Fails on invalid rules or a taken name.
    pub fn register(
        &self,
        name: &str,
        rules: Vec<EndpointRule>,
    ) -> Result<Arc<MockRoutingEngine>, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyClientName);
        }

        let engine = MockRoutingEngine::with_settings(rules, &self.settings)
            .map_err(|e| e.in_client(name))?;
        let engine = Arc::new(engine);

        let mut engines = self.engines.write();
        if engines.contains_key(name) {
            return Err(ConfigError::DuplicateClient(name.to_string()));
        }
        engines.insert(name.to_string(), Arc::clone(&engine));

        info!(client = %name, rules = engine.rules().len(), "Registered mock client");
        Ok(engine)
    }

    pub fn get(&self, name: &str) -> Option<Arc<MockRoutingEngine>> {
        self.engines.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{ERROR_CODE_HEADER, ERROR_MESSAGE_HEADER};
    use crate::request::RequestDescriptor;
    use crate::rule::EndpointRules;

    fn engine() -> MockRoutingEngine {
        let rules = EndpointRules::new()
            .endpoint("/users", |e| e.shape("UserList").cache_size(3))
            .endpoint("/error*", |e| e.error(500, Some("boom")))
            .build()
            .unwrap();
        MockRoutingEngine::new(rules).unwrap()
    }

    #[test]
    fn test_matched_request_is_mutated() {
        let engine = engine();
        let req = engine.route(RequestDescriptor::new("GET", "/users?page=1").unwrap());
        assert_eq!(req.query(), Some("page=1&shape=UserList&cache=3"));
    }

    #[test]
    fn test_error_rule_adds_headers() {
        let engine = engine();
        let mut req = RequestDescriptor::new("POST", "/error/foo").unwrap();
        engine.handle(&mut req);

        assert_eq!(req.header(ERROR_CODE_HEADER), Some("500"));
        assert_eq!(req.header(ERROR_MESSAGE_HEADER), Some("boom"));
    }

    #[test]
    fn test_unmatched_request_passes_through() {
        let engine = engine();
        let original = RequestDescriptor::new("DELETE", "https://h/models?x=1")
            .unwrap()
            .with_header("Authorization", "Bearer t")
            .unwrap()
            .with_body("{}");

        let routed = engine.route(original.clone());

        assert_eq!(routed, original);
    }

    #[test]
    fn test_invalid_rules_rejected_at_construction() {
        let mut bad = EndpointRule::new("/x");
        bad.error_config = Some(crate::rule::ErrorConfig::new(42));
        assert!(MockRoutingEngine::new(vec![bad]).is_err());
    }

    #[test]
    fn test_fragment_does_not_affect_matching() {
        let engine = engine();
        let req = engine.route(RequestDescriptor::new("GET", "/users#top").unwrap());
        assert_eq!(req.uri().to_string(), "/users?shape=UserList&cache=3");
    }

    #[test]
    fn test_client_registration() {
        let clients = MockClients::default();
        let rules = EndpointRules::new().endpoint("/v1/*", |e| e.backend("openai")).build().unwrap();

        let engine = clients.register("chat", rules.clone()).unwrap();
        assert_eq!(engine.rules().len(), 1);
        assert!(clients.get("chat").is_some());
        assert!(clients.get("other").is_none());

        assert_eq!(
            clients.register("chat", rules).unwrap_err(),
            ConfigError::DuplicateClient("chat".to_string())
        );
        assert_eq!(
            clients.register(" ", Vec::new()).unwrap_err(),
            ConfigError::EmptyClientName
        );
    }

    #[test]
    fn test_client_rule_errors_name_the_client() {
        let clients = MockClients::default();
        let err = clients
            .register("broken", vec![EndpointRule::new("")])
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
