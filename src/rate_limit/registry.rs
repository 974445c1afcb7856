use super::types::{LimitScope, RateLimitPolicy};
use crate::error::{GuardError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operation identity to policy mapping, built once at startup.
///
/// Every policy is validated on registration, so the engine never sees a zero
/// window or ceiling at call time.
#[derive(Debug, Default, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<RateLimitPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a policy to an operation
    pub fn register(&mut self, operation: impl Into<String>, policy: RateLimitPolicy) -> Result<()> {
        let operation = operation.into();
        policy.validate()?;

        if self.policies.contains_key(&operation) {
            return Err(GuardError::Config(format!(
                "Operation '{}' already has a rate limit policy",
                operation
            )));
        }

        if policy.scope == LimitScope::PerClient {
            if let Some((other, _)) = self.policies.iter().find(|(_, existing)| {
                existing.scope == LimitScope::PerClient && existing.identifier == policy.identifier
            }) {
                warn!(
                    operation = %operation,
                    other = %other,
                    identifier = %policy.identifier,
                    "Per-client policies share an identifier and will share counters"
                );
            }
        }

        debug!(
            operation = %operation,
            identifier = %policy.identifier,
            window_secs = policy.window_secs,
            ceiling = policy.ceiling,
            scope = ?policy.scope,
            "Registered rate limit policy"
        );
        self.policies.insert(operation, Arc::new(policy));
        Ok(())
    }

    /// Build a registry from `(operation, policy)` pairs
    pub fn from_policies<I, S>(policies: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, RateLimitPolicy)>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for (operation, policy) in policies {
            registry.register(operation, policy)?;
        }
        Ok(registry)
    }

    /// Look up the policy guarding an operation
    pub fn get(&self, operation: &str) -> Option<Arc<RateLimitPolicy>> {
        self.policies.get(operation).cloned()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
