use super::types::{LimitScope, RateLimitPolicy, RequestContext};
use std::fmt;

/// Counter key derived from a policy and a request context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey(String);

impl LimitKey {
    /// Build the key for a call.
    ///
    /// `identifier:target` for [`LimitScope::PerTarget`], `identifier:client`
    /// for [`LimitScope::PerClient`]. Never fails.
    pub fn build(policy: &RateLimitPolicy, ctx: &RequestContext) -> Self {
        let discriminator = match policy.scope {
            LimitScope::PerTarget => &ctx.target,
            LimitScope::PerClient => &ctx.client,
        };

        Self(format!("{}:{}", policy.identifier, discriminator))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
