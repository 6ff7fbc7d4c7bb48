//! Endpoint rule definitions and the fluent builder used to register them.
//!
//! A rule describes one mock endpoint: which requests it applies to (path
//! pattern and optional method) and which directives are attached to those
//! requests (response shape, streaming mode, error injection, and extra
//! headers or query parameters).

use crate::error::ConfigError;
use crate::mutator::{BACKEND_HEADER, ERROR_DETAILS_HEADER, ERROR_MESSAGE_HEADER};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One registered mock endpoint.
///
/// Rules are immutable once registered: the routing engine shares them as
/// `Arc<[EndpointRule]>` and only ever borrows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointRule {
    /// Path pattern; a trailing `*` means prefix match
    pub path_pattern: String,

    /// HTTP method to match (absent = any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Response shape requested from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,

    /// Backend the mock should impersonate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Server-sent events mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_chunk: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_streaming: Option<bool>,

    /// Error injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_config: Option<ErrorConfig>,

    /// Headers added to matched requests
    #[serde(default, skip_serializing_if = "OrderedPairs::is_empty")]
    pub headers: OrderedPairs,

    /// Query parameters appended after the generated directives
    #[serde(default, skip_serializing_if = "OrderedPairs::is_empty")]
    pub query_parameters: OrderedPairs,
}

impl EndpointRule {
    /// Create a rule that only carries a path pattern.
    pub fn new(path_pattern: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            method: None,
            shape: None,
            backend: None,
            sse_mode: None,
            cache_size: None,
            continuous_interval_ms: None,
            max_items: None,
            continuous: None,
            auto_chunk: None,
            use_streaming: None,
            error_config: None,
            headers: OrderedPairs::default(),
            query_parameters: OrderedPairs::default(),
        }
    }

    /// Validate the rule at position `index` of its rule set.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.path_pattern.trim().is_empty() {
            return Err(ConfigError::EmptyPathPattern { index });
        }

        if let Some(method) = &self.method {
            if http::Method::from_bytes(method.as_bytes()).is_err() {
                return Err(ConfigError::InvalidMethod {
                    index,
                    method: method.clone(),
                });
            }
        }

        if let Some(error) = &self.error_config {
            if !(100..=599).contains(&error.status_code) {
                return Err(ConfigError::InvalidStatusCode {
                    index,
                    status: error.status_code,
                });
            }
        }

        // Header names compare case-insensitively, query keys do not
        self.headers.check_keys(index, "header", true)?;
        for (name, value) in self.headers.iter() {
            let valid = http::HeaderName::from_bytes(name.as_bytes()).is_ok()
                && http::HeaderValue::from_str(value).is_ok();
            if !valid {
                return Err(ConfigError::InvalidHeader {
                    index,
                    name: name.to_string(),
                });
            }
        }

        // Directives also carried as header values
        let error = self.error_config.as_ref();
        let carried = [
            (BACKEND_HEADER, self.backend.as_deref()),
            (ERROR_MESSAGE_HEADER, error.and_then(|e| e.message.as_deref())),
            (ERROR_DETAILS_HEADER, error.and_then(|e| e.details.as_deref())),
        ];
        for (name, value) in carried {
            if value.is_some_and(|v| http::HeaderValue::from_str(v).is_err()) {
                return Err(ConfigError::InvalidHeader {
                    index,
                    name: name.to_string(),
                });
            }
        }
        self.query_parameters
            .check_keys(index, "query parameter", false)?;

        Ok(())
    }
}

/// Validate every rule of an ordered rule set.
pub fn validate_rules(rules: &[EndpointRule]) -> Result<(), ConfigError> {
    rules
        .iter()
        .enumerate()
        .try_for_each(|(index, rule)| rule.validate(index))
}

/// Error injection directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ErrorConfig {
    /// HTTP status code the backend should answer with
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorConfig {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            message: None,
            details: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Insertion-ordered string mapping.
///
/// Serialized as a YAML/JSON map. Key uniqueness is checked by
/// [`EndpointRule::validate`] rather than silently collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedPairs(Vec<(String, String)>);

impl OrderedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn check_keys(
        &self,
        index: usize,
        kind: &'static str,
        case_insensitive: bool,
    ) -> Result<(), ConfigError> {
        let mut seen: Vec<String> = Vec::with_capacity(self.0.len());
        for (key, _) in &self.0 {
            if key.is_empty() {
                return Err(ConfigError::EmptyKey { index, kind });
            }
            let normalized = if case_insensitive {
                key.to_ascii_lowercase()
            } else {
                key.clone()
            };
            if seen.contains(&normalized) {
                return Err(ConfigError::DuplicateKey {
                    index,
                    kind,
                    key: key.clone(),
                });
            }
            seen.push(normalized);
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderedPairs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for OrderedPairs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedPairs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = OrderedPairs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of string keys to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    pairs.push((key, value));
                }
                Ok(OrderedPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

/// Fluent builder producing an ordered rule set.
///
/// ```
/// use llm_mock_server::rule::EndpointRules;
///
/// let rules = EndpointRules::new()
///     .endpoint("/users", |e| e.method("GET").shape("UserList").cache_size(3))
///     .endpoint("/error*", |e| e.error(500, Some("boom")))
///     .build()
///     .unwrap();
/// assert_eq!(rules.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct EndpointRules {
    rules: Vec<EndpointRule>,
}

impl EndpointRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; rules are matched in registration order.
    pub fn endpoint<F>(mut self, path_pattern: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(EndpointBuilder) -> EndpointBuilder,
    {
        let builder = configure(EndpointBuilder {
            rule: EndpointRule::new(path_pattern),
        });
        self.rules.push(builder.rule);
        self
    }

    /// Append an already constructed rule.
    pub fn rule(mut self, rule: EndpointRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate and return the rules in registration order.
    pub fn build(self) -> Result<Vec<EndpointRule>, ConfigError> {
        validate_rules(&self.rules)?;
        Ok(self.rules)
    }
}

/// Builder for a single endpoint, handed to [`EndpointRules::endpoint`].
#[derive(Debug)]
pub struct EndpointBuilder {
    rule: EndpointRule,
}

impl EndpointBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.rule.method = Some(method.into());
        self
    }

    pub fn shape(mut self, shape: impl Into<String>) -> Self {
        self.rule.shape = Some(shape.into());
        self
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.rule.backend = Some(backend.into());
        self
    }

    pub fn sse_mode(mut self, mode: impl Into<String>) -> Self {
        self.rule.sse_mode = Some(mode.into());
        self
    }

    pub fn cache_size(mut self, size: u32) -> Self {
        self.rule.cache_size = Some(size);
        self
    }

    pub fn continuous(mut self, interval_ms: Option<u64>) -> Self {
        self.rule.continuous = Some(true);
        self.rule.continuous_interval_ms = interval_ms;
        self
    }

    pub fn max_items(mut self, max: u32) -> Self {
        self.rule.max_items = Some(max);
        self
    }

    pub fn auto_chunk(mut self, enabled: bool) -> Self {
        self.rule.auto_chunk = Some(enabled);
        self
    }

    pub fn streaming(mut self, enabled: bool) -> Self {
        self.rule.use_streaming = Some(enabled);
        self
    }

    /// Inject an error with the given status and optional message.
    pub fn error(mut self, status_code: u16, message: Option<&str>) -> Self {
        let mut config = ErrorConfig::new(status_code);
        config.message = message.map(String::from);
        self.rule.error_config = Some(config);
        self
    }

    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.rule.error_config = Some(config);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.rule.headers.push(name, value);
        self
    }

    pub fn query_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.rule.query_parameters.push(key, value);
        self
    }
}
