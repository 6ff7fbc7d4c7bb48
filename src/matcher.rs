//! Request matching logic.
//!
//! Matches a request's method and path against the registered endpoint rules.
//! The first rule in registration order wins; there is no specificity scoring.

use crate::rule::EndpointRule;

/// Result of matching a request against the rule set.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    /// The matched rule
    pub rule: &'a EndpointRule,
    /// Position of the rule in registration order
    pub index: usize,
}

/// Rule matcher with case-folded patterns prepared once per rule set.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    compiled: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    method: Option<String>,
    path: CompiledPath,
}

#[derive(Debug, Clone)]
enum CompiledPath {
    /// Pattern ended with `*`; holds the part before it
    Prefix(String),
    /// Exact or suffix match
    Tail(String),
}

impl CompiledPath {
    fn parse(pattern: &str) -> Self {
        let folded = pattern.to_lowercase();
        match folded.strip_suffix('*') {
            Some(prefix) => CompiledPath::Prefix(prefix.to_string()),
            None => CompiledPath::Tail(folded),
        }
    }

    fn matches(&self, folded_path: &str) -> bool {
        match self {
            CompiledPath::Prefix(prefix) => folded_path.starts_with(prefix.as_str()),
            CompiledPath::Tail(pattern) => {
                folded_path == pattern || folded_path.ends_with(pattern.as_str())
            }
        }
    }
}

impl RuleMatcher {
    /// Create a matcher for the given rules.
    pub fn new(rules: &[EndpointRule]) -> Self {
        let compiled = rules
            .iter()
            .map(|rule| CompiledRule {
                method: rule.method.as_ref().map(|m| m.to_uppercase()),
                path: CompiledPath::parse(&rule.path_pattern),
            })
            .collect();

        Self { compiled }
    }

    /// Find the first rule matching the request.
    ///
    /// `rules` must be the same slice the matcher was created from.
    pub fn find_match<'a>(
        &self,
        rules: &'a [EndpointRule],
        method: &str,
        path: &str,
    ) -> Option<MatchResult<'a>> {
        let method_upper = method.to_uppercase();
        let folded_path = path.to_lowercase();

        self.compiled
            .iter()
            .zip(rules)
            .enumerate()
            .find(|(_, (compiled, _))| {
                compiled
                    .method
                    .as_ref()
                    .map_or(true, |m| *m == method_upper)
                    && compiled.path.matches(&folded_path)
            })
            .map(|(index, (_, rule))| MatchResult { rule, index })
    }

    /// Number of rules this matcher was built for.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Check a single pattern against a path, without preparing a matcher.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    CompiledPath::parse(pattern).matches(&path.to_lowercase())
}
