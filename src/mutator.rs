//! Request mutation.
//!
//! Carries a matched rule's directives to the backend as extra headers and
//! query parameters. Mutation is additive and must be applied exactly once
//! per request: applying it again appends the query directives a second time.

use crate::request::MockRequest;
use crate::rule::EndpointRule;
use tracing::warn;

pub const BACKEND_HEADER: &str = "X-LLM-Backend";
pub const ERROR_CODE_HEADER: &str = "X-Error-Code";
pub const ERROR_MESSAGE_HEADER: &str = "X-Error-Message";
pub const ERROR_DETAILS_HEADER: &str = "X-Error-Details";

/// Apply a rule's directives to a request in place.
pub fn mutate<R: MockRequest + ?Sized>(rule: &EndpointRule, request: &mut R) {
    for (name, value) in rule.headers.iter() {
        request.add_header(name, value);
    }

    if let Some(backend) = &rule.backend {
        request.add_header(BACKEND_HEADER, backend);
    }

    if let Some(error) = &rule.error_config {
        request.add_header(ERROR_CODE_HEADER, &error.status_code.to_string());
        if let Some(message) = &error.message {
            request.add_header(ERROR_MESSAGE_HEADER, message);
        }
        if let Some(details) = &error.details {
            request.add_header(ERROR_DETAILS_HEADER, details);
        }
    }

    if let Some(fragment) = query_fragment(rule) {
        let query = match request.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{fragment}"),
            _ => fragment,
        };
        if !request.set_query(&query) {
            warn!(path = %request.path(), "Mutated query is not a valid URI, left unchanged");
        }
    }
}

/// Build the query directives for a rule, or `None` if it carries none.
pub fn query_fragment(rule: &EndpointRule) -> Option<String> {
    let mut params: Vec<(&str, String)> = Vec::new();

    if let Some(shape) = &rule.shape {
        params.push(("shape", shape.clone()));
    }
    if let Some(size) = rule.cache_size {
        params.push(("cache", size.to_string()));
    }
    if let Some(backend) = &rule.backend {
        params.push(("backend", backend.clone()));
    }
    if let Some(mode) = &rule.sse_mode {
        params.push(("sseMode", mode.clone()));
    }
    if let Some(continuous) = rule.continuous {
        params.push(("continuous", continuous.to_string()));
    }
    if let Some(interval) = rule.continuous_interval_ms {
        params.push(("interval", interval.to_string()));
    }
    if let Some(auto_chunk) = rule.auto_chunk {
        params.push(("autoChunk", auto_chunk.to_string()));
    }
    if let Some(max) = rule.max_items {
        params.push(("maxItems", max.to_string()));
    }

    let mut parts: Vec<String> = params
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(&value)))
        .collect();

    parts.extend(rule.query_parameters.iter().map(|(key, value)| {
        format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
    }));

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestDescriptor;
    use crate::rule::{EndpointRules, ErrorConfig};

    fn rule(build: impl FnOnce(crate::rule::EndpointBuilder) -> crate::rule::EndpointBuilder) -> EndpointRule {
        EndpointRules::new()
            .endpoint("/any", build)
            .build()
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_shape_and_cache_appended_to_existing_query() {
        let rule = rule(|e| e.shape("UserList").cache_size(3));
        let mut req = RequestDescriptor::new("GET", "/users?page=1").unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.query(), Some("page=1&shape=UserList&cache=3"));
    }

    #[test]
    fn test_query_set_when_absent() {
        let rule = rule(|e| e.shape("UserList").cache_size(3));
        let mut req = RequestDescriptor::new("GET", "/users").unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.uri().to_string(), "/users?shape=UserList&cache=3");
    }

    #[test]
    fn test_fixed_parameter_order() {
        let rule = rule(|e| {
            e.max_items(10)
                .auto_chunk(false)
                .continuous(Some(500))
                .sse_mode("chunked")
                .backend("openai")
                .cache_size(1)
                .shape("Chat")
                .query_parameter("z", "last")
                .query_parameter("a", "after z")
        });

        assert_eq!(
            query_fragment(&rule).unwrap(),
            "shape=Chat&cache=1&backend=openai&sseMode=chunked&continuous=true\
             &interval=500&autoChunk=false&maxItems=10&z=last&a=after%20z"
        );
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let rule = rule(|e| e.shape("a b&c=d").query_parameter("q key", "ü/?"));
        assert_eq!(
            query_fragment(&rule).unwrap(),
            "shape=a%20b%26c%3Dd&q%20key=%C3%BC%2F%3F"
        );
    }

    #[test]
    fn test_error_headers() {
        let rule = rule(|e| {
            e.error_config(
                ErrorConfig::new(500)
                    .with_message("boom")
                    .with_details("stack"),
            )
        });
        let mut req = RequestDescriptor::new("POST", "/error/foo").unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.header(ERROR_CODE_HEADER), Some("500"));
        assert_eq!(req.header(ERROR_MESSAGE_HEADER), Some("boom"));
        assert_eq!(req.header(ERROR_DETAILS_HEADER), Some("stack"));
        // Error injection alone adds no query directives
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_headers_added_without_overwrite() {
        let rule = rule(|e| e.header("X-Tenant", "mock").header("X-Extra", "1").backend("ollama"));
        let mut req = RequestDescriptor::new("GET", "/").unwrap()
            .with_header("x-tenant", "real")
            .unwrap()
            .with_header(BACKEND_HEADER, "vllm")
            .unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.header("X-Tenant"), Some("real"));
        assert_eq!(req.header("X-Extra"), Some("1"));
        assert_eq!(req.header(BACKEND_HEADER), Some("vllm"));
        assert_eq!(req.query(), Some("backend=ollama"));
    }

    #[test]
    fn test_method_and_body_untouched() {
        let rule = rule(|e| e.shape("S").header("X-A", "1"));
        let mut req = RequestDescriptor::new("PUT", "https://host/x").unwrap().with_body("payload");

        mutate(&rule, &mut req);

        assert_eq!(req.method(), "PUT");
        assert_eq!(req.body(), b"payload");
        assert_eq!(req.uri().scheme_str(), Some("https"));
        assert_eq!(req.uri().host(), Some("host"));
    }

    #[test]
    fn test_fragment_does_not_swallow_directives() {
        let rule = rule(|e| e.shape("UserList"));
        let mut req = RequestDescriptor::new("GET", "/users?page=1#top").unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.uri().to_string(), "/users?page=1&shape=UserList");
    }

    #[test]
    fn test_mutates_http_request() {
        let rule = rule(|e| e.shape("Chat").header("X-Tenant", "mock"));
        let mut req = http::Request::builder()
            .uri("http://llm.local/v1/chat?stream=1")
            .body(Vec::<u8>::new())
            .unwrap();

        mutate(&rule, &mut req);

        assert_eq!(req.uri().to_string(), "http://llm.local/v1/chat?stream=1&shape=Chat");
        assert_eq!(req.headers()["x-tenant"], "mock");
    }

    #[test]
    fn test_second_mutation_appends_again() {
        let rule = rule(|e| e.shape("S"));
        let mut req = RequestDescriptor::new("GET", "/x").unwrap();

        mutate(&rule, &mut req);
        mutate(&rule, &mut req);

        assert_eq!(req.query(), Some("shape=S&shape=S"));
    }

    #[test]
    fn test_rule_without_directives_leaves_request_alone() {
        let rule = rule(|e| e.streaming(true));
        let original = RequestDescriptor::new("GET", "/x?keep=1").unwrap();
        let mut req = original.clone();

        mutate(&rule, &mut req);

        assert_eq!(req, original);
    }
}
