//! Allow-list deciding which translated events are forwarded

use serde::Deserialize;

pub const WILDCARD: &str = "*";

/// Configured event-kind patterns. Each pattern is `*`, an exact event kind
/// such as `repo:push`, or an unqualified prefix such as `repo`.
///
/// Patterns are trimmed and blank ones dropped, whether they come from the
/// config file or the environment. An empty policy emits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct EmissionPolicy {
    emitted_events: Vec<String>,
}

impl EmissionPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let emitted_events = patterns
            .into_iter()
            .filter_map(|p| {
                let p: String = p.into();
                let trimmed = p.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();
        Self { emitted_events }
    }

    pub fn patterns(&self) -> &[String] {
        &self.emitted_events
    }

    pub fn is_empty(&self) -> bool {
        self.emitted_events.is_empty()
    }

    pub fn should_emit(&self, event_type: &str) -> bool {
        let unqualified = event_type
            .split_once(':')
            .map(|(prefix, _)| prefix)
            .unwrap_or(event_type);
        self.emitted_events
            .iter()
            .any(|p| p == WILDCARD || p == event_type || p == unqualified)
    }
}

impl From<Vec<String>> for EmissionPolicy {
    fn from(patterns: Vec<String>) -> Self {
        Self::new(patterns)
    }
}
