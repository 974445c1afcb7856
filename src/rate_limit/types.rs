use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_IDENTIFIER: &str = "rate_limit";
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_CEILING: u32 = 100;
/// Longest accepted window: one leap year
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Rate limit scope - which counter a call is charged against
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// All callers of an operation share one counter
    #[default]
    #[serde(alias = "default")]
    PerTarget,
    /// Every caller gets its own counter
    #[serde(alias = "ip")]
    PerClient,
}

/// Rate limit policy attached to a guarded operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Namespacing prefix for the counter key
    #[serde(default = "default_identifier", alias = "key")]
    pub identifier: String,
    /// Window length in seconds
    #[serde(default = "default_window_secs", alias = "time")]
    pub window_secs: u64,
    /// Maximum number of calls allowed per window
    #[serde(default = "default_ceiling", alias = "count")]
    pub ceiling: u32,
    /// Counter scope
    #[serde(default, alias = "limit_type")]
    pub scope: LimitScope,
}

fn default_identifier() -> String {
    DEFAULT_IDENTIFIER.to_string()
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_ceiling() -> u32 {
    DEFAULT_CEILING
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            window_secs: default_window_secs(),
            ceiling: default_ceiling(),
            scope: LimitScope::default(),
        }
    }
}

impl RateLimitPolicy {
    /// Create a policy with the default identifier
    pub fn new(window_secs: u64, ceiling: u32, scope: LimitScope) -> Self {
        Self {
            identifier: default_identifier(),
            window_secs,
            ceiling,
            scope,
        }
    }

    /// Replace the identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Reject policies that can never admit a call
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(GuardError::InvalidPolicy(
                "identifier cannot be empty".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(GuardError::InvalidPolicy(format!(
                "window must be > 0 for '{}'",
                self.identifier
            )));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(GuardError::InvalidPolicy(format!(
                "window of {}s exceeds the maximum of {}s for '{}'",
                self.window_secs, MAX_WINDOW_SECS, self.identifier
            )));
        }
        if self.ceiling == 0 {
            return Err(GuardError::InvalidPolicy(format!(
                "ceiling must be > 0 for '{}'",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// Per-call context handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Identity of the guarded operation, e.g. the endpoint path
    pub target: String,
    /// Identity of the caller, e.g. its IP address
    pub client: String,
    /// Additional dimensions carried for diagnostics
    pub extra: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(target: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            client: client.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Count reported by the store after this call's increment
    pub current_count: u64,
    /// Ceiling of the policy that was evaluated
    pub ceiling: u32,
}

impl Decision {
    /// Calls left in the current window
    pub fn remaining(&self) -> u64 {
        (self.ceiling as u64).saturating_sub(self.current_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.identifier, "rate_limit");
        assert_eq!(policy.window_secs, 60);
        assert_eq!(policy.ceiling, 100);
        assert_eq!(policy.scope, LimitScope::PerTarget);
        assert_eq!(policy.window(), Duration::from_secs(60));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_deserialize_with_defaults() {
        let policy: RateLimitPolicy = serde_yaml::from_str("ceiling: 3").unwrap();
        assert_eq!(policy.ceiling, 3);
        assert_eq!(policy.window_secs, 60);
        assert_eq!(policy.identifier, "rate_limit");
    }

    #[test]
    fn test_policy_deserialize_annotation_names() {
        let yaml = r#"
key: hello
time: 10
count: 3
limit_type: ip
"#;
        let policy: RateLimitPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.identifier, "hello");
        assert_eq!(policy.window_secs, 10);
        assert_eq!(policy.ceiling, 3);
        assert_eq!(policy.scope, LimitScope::PerClient);
    }

    #[test]
    fn test_scope_names() {
        let scope: LimitScope = serde_yaml::from_str("per_client").unwrap();
        assert_eq!(scope, LimitScope::PerClient);
        let scope: LimitScope = serde_yaml::from_str("default").unwrap();
        assert_eq!(scope, LimitScope::PerTarget);
    }

    #[test]
    fn test_policy_validation() {
        let zero_window = RateLimitPolicy::new(0, 3, LimitScope::PerTarget);
        assert!(matches!(
            zero_window.validate(),
            Err(GuardError::InvalidPolicy(_))
        ));

        let zero_ceiling = RateLimitPolicy::new(10, 0, LimitScope::PerClient);
        assert!(matches!(
            zero_ceiling.validate(),
            Err(GuardError::InvalidPolicy(_))
        ));

        let empty_identifier = RateLimitPolicy::default().with_identifier("");
        assert!(empty_identifier.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_oversized_window() {
        let yaml = r#"
window_secs: 18446744073709551615
ceiling: 3
"#;
        let policy: RateLimitPolicy = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            policy.validate(),
            Err(GuardError::InvalidPolicy(_))
        ));

        let just_over = RateLimitPolicy::new(MAX_WINDOW_SECS + 1, 3, LimitScope::PerTarget);
        assert!(just_over.validate().is_err());

        let longest = RateLimitPolicy::new(MAX_WINDOW_SECS, 3, LimitScope::PerTarget);
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_request_context_extra() {
        let ctx = RequestContext::new("/hello", "1.2.3.4").with_extra("method", "GET");
        assert_eq!(ctx.target, "/hello");
        assert_eq!(ctx.client, "1.2.3.4");
        assert_eq!(ctx.extra.get("method").map(String::as_str), Some("GET"));
    }

    #[test]
    fn test_decision_remaining() {
        let decision = Decision {
            allowed: true,
            current_count: 2,
            ceiling: 3,
        };
        assert_eq!(decision.remaining(), 1);

        let over = Decision {
            allowed: false,
            current_count: 5,
            ceiling: 3,
        };
        assert_eq!(over.remaining(), 0);
    }
}
