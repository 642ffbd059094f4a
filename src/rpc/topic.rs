//! Command topic construction and MQTT filter matching.
//!
//! The server subscribes to one filter per policy instance:
//! `vehicles/<model_id>/commands/<client_id>/<command_name|+>`. The matcher
//! implements full MQTT wildcard semantics because brokers may rewrite
//! filters even though the builder only ever emits `+`.

use thiserror::Error;

const COMMAND_TOPIC_ROOT: &str = "vehicles";
const COMMAND_SEGMENT: &str = "commands";

/// Errors from command topic construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("model id must be nonempty")]
    EmptyModelId,
    #[error("client id must be nonempty")]
    EmptyClientId,
}

/// A validated command subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter(String);

impl SubscriptionFilter {
    /// Build the filter for one command endpoint.
    ///
    /// An empty `command_name` subscribes to every command for the client
    /// via a `+` level.
    pub fn for_command(
        model_id: &str,
        client_id: &str,
        command_name: &str,
    ) -> Result<Self, TopicError> {
        if model_id.is_empty() {
            return Err(TopicError::EmptyModelId);
        }
        if client_id.is_empty() {
            return Err(TopicError::EmptyClientId);
        }
        let command = if command_name.is_empty() {
            "+"
        } else {
            command_name
        };
        Ok(Self(format!(
            "{}/{}/{}/{}/{}",
            COMMAND_TOPIC_ROOT, model_id, COMMAND_SEGMENT, client_id, command
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `topic` is a concrete publication topic covered by this
    /// filter.
    pub fn matches(&self, topic: &str) -> bool {
        topic_matches_filter(&self.0, topic)
    }
}

impl std::fmt::Display for SubscriptionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check if an MQTT topic filter matches a concrete topic.
/// - `+` matches a single level
/// - `#` matches zero or more levels (must be last)
///
/// A malformed filter (`#` before the final level, or a wildcard sharing a
/// level with other bytes) matches nothing rather than erroring; the policy
/// is the only filter source, so that path is effectively unreachable.
pub fn topic_matches_filter(filter: &str, topic: &str) -> bool {
    if !filter_is_well_formed(filter) {
        return false;
    }

    let filter_parts: Vec<&str> = filter.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    let mut fi = 0;
    let mut ti = 0;

    while fi < filter_parts.len() {
        let fp = filter_parts[fi];

        if fp == "#" {
            return true;
        }

        if ti >= topic_parts.len() {
            return false;
        }

        if fp == "+" {
            fi += 1;
            ti += 1;
            continue;
        }

        if fp != topic_parts[ti] {
            return false;
        }

        fi += 1;
        ti += 1;
    }

    fi == filter_parts.len() && ti == topic_parts.len()
}

fn filter_is_well_formed(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let parts: Vec<&str> = filter.split('/').collect();
    for (idx, part) in parts.iter().enumerate() {
        if part.contains('#') && (*part != "#" || idx != parts.len() - 1) {
            return false;
        }
        if part.contains('+') && *part != "+" {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_named_command() {
        let filter = SubscriptionFilter::for_command("m1", "c1", "get").unwrap();
        assert_eq!(filter.as_str(), "vehicles/m1/commands/c1/get");
    }

    #[test]
    fn test_filter_for_any_command() {
        let filter = SubscriptionFilter::for_command("m1", "c1", "").unwrap();
        assert_eq!(filter.as_str(), "vehicles/m1/commands/c1/+");
        assert!(filter.matches("vehicles/m1/commands/c1/unlock"));
        assert!(!filter.matches("vehicles/m2/commands/c1/unlock"));
    }

    #[test]
    fn test_filter_rejects_empty_ids() {
        assert_eq!(
            SubscriptionFilter::for_command("", "c1", "get"),
            Err(TopicError::EmptyModelId)
        );
        assert_eq!(
            SubscriptionFilter::for_command("m1", "", "get"),
            Err(TopicError::EmptyClientId)
        );
    }

    #[test]
    fn test_topic_matches_exact_and_wildcards() {
        assert!(topic_matches_filter("a/b/c", "a/b/c"));
        assert!(!topic_matches_filter("a/b/c", "a/b/d"));
        assert!(topic_matches_filter("a/+/c", "a/b/c"));
        assert!(!topic_matches_filter("a/+/c", "a/b/x/c"));
        assert!(topic_matches_filter("a/#", "a/b/c"));
        assert!(topic_matches_filter("a/#", "a"));
        assert!(topic_matches_filter("#", "a/b/c"));
        assert!(topic_matches_filter("a/+", "a/"));
    }

    #[test]
    fn test_topic_matches_level_counts() {
        assert!(!topic_matches_filter("a/+", "a"));
        assert!(!topic_matches_filter("a/b", "a/b/c"));
        assert!(!topic_matches_filter("a/b/c", "a/b"));
    }

    #[test]
    fn test_malformed_filters_match_nothing() {
        assert!(!topic_matches_filter("a/#/b", "a/x/b"));
        assert!(!topic_matches_filter("a/b#", "a/b"));
        assert!(!topic_matches_filter("a/b+/c", "a/bx/c"));
        assert!(!topic_matches_filter("", "a"));
    }
}
