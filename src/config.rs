//! Configuration for the mock server.
//!
//! Defines endpoint rules per client, static broadcast contexts, and global
//! settings.

use crate::error::ConfigError;
use crate::registry::UnknownContextPolicy;
use crate::rule::{validate_rules, EndpointRule};
use crate::template::check_payload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name under which `endpoints` are registered.
pub const DEFAULT_CLIENT: &str = "default";

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Rules for the default client, in registration order
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,

    /// Rules for additional named clients
    #[serde(default)]
    pub clients: BTreeMap<String, Vec<EndpointRule>>,

    /// Statically configured broadcast contexts
    #[serde(default)]
    pub contexts: Vec<ContextDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_rules(&self.endpoints).map_err(|e| e.in_client(DEFAULT_CLIENT))?;

        for (name, rules) in &self.clients {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyClientName);
            }
            if name == DEFAULT_CLIENT && !self.endpoints.is_empty() {
                return Err(ConfigError::DuplicateClient(name.clone()));
            }
            validate_rules(rules).map_err(|e| e.in_client(name))?;
        }

        let name_pattern = context_name_pattern();
        let mut seen: Vec<String> = Vec::with_capacity(self.contexts.len());
        for context in &self.contexts {
            if !name_pattern.is_match(&context.name) {
                return Err(ConfigError::InvalidContextName(context.name.clone()));
            }
            let key = context.name.to_lowercase();
            if seen.contains(&key) {
                return Err(ConfigError::DuplicateContext(context.name.clone()));
            }
            seen.push(key);

            if let Some(payload) = &context.payload {
                check_payload(payload).map_err(|reason| ConfigError::InvalidPayloadTemplate {
                    name: context.name.clone(),
                    reason,
                })?;
            }
        }

        Ok(())
    }

    /// All clients with their rules, the default client first.
    pub fn client_rules(&self) -> impl Iterator<Item = (&str, &[EndpointRule])> {
        let default = (!self.endpoints.is_empty())
            .then_some((DEFAULT_CLIENT, self.endpoints.as_slice()));
        default.into_iter().chain(
            self.clients
                .iter()
                .map(|(name, rules)| (name.as_str(), rules.as_slice())),
        )
    }
}

fn context_name_pattern() -> Regex {
    // Literal pattern, always compiles
    Regex::new(r"^[A-Za-z0-9_.:-]+$").expect("context name pattern")
}

/// A statically configured broadcast context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextDefinition {
    /// Context name (case-insensitive)
    pub name: String,

    /// Whether the context is discoverable
    #[serde(default = "default_true")]
    pub active: bool,

    /// Payload template broadcast on every tick
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalSettings {
    /// Count subscribers in the context registry
    #[serde(default = "default_true")]
    pub track_dynamic_contexts: bool,

    /// How unknown context names are handled on subscribe
    #[serde(default)]
    pub unknown_context_policy: UnknownContextPolicy,

    /// Log matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that passed through unmatched
    #[serde(default)]
    pub log_unmatched: bool,

    /// Interval between publisher ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            track_dynamic_contexts: true,
            unknown_context_policy: UnknownContextPolicy::default(),
            log_matches: true,
            log_unmatched: false,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}
