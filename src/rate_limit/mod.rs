//! Rate limiting module
//!
//! Fixed-window rate limiting for guarded operations:
//!
//! - [`LimitKey`] derives the counter key from a policy and a request context
//! - [`window::evaluate`] admits the N-th call of a window iff `N <= ceiling`
//! - [`RateLimiterEngine`] charges one call against a [`CounterStore`] and
//!   returns a [`Decision`]
//! - [`RateLimitGuard`] sits in front of the guarded work and turns a denied
//!   decision into a rejection
//!
//! Two counter stores ship: [`LocalCounterStore`] (in-process) and
//! [`RedisCounterStore`] (shared between instances).
//!
//! # Example
//!
//! ```rust,no_run
//! use endpoint_guard::rate_limit::{
//!     LimitScope, LocalCounterStore, RateLimitPolicy, RateLimiterEngine, RequestContext,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = RateLimiterEngine::new(Arc::new(LocalCounterStore::new()));
//!     let policy = RateLimitPolicy::new(10, 3, LimitScope::PerClient);
//!     let ctx = RequestContext::new("/hello", "1.2.3.4");
//!
//!     let decision = engine.check(&policy, &ctx).await.unwrap();
//!     assert!(decision.allowed);
//! }
//! ```

pub mod clock;
pub mod engine;
pub mod key;
pub mod local;
pub mod lua_scripts;
pub mod middleware;
pub mod redis;
pub mod registry;
pub mod store;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use clock::{Clock, MockClock, SystemClock};
pub use engine::RateLimiterEngine;
pub use key::LimitKey;
pub use local::LocalCounterStore;
pub use middleware::{rate_limit_middleware, Admission, DegradeMode, RateLimitGuard};
pub use redis::RedisCounterStore;
pub use registry::PolicyRegistry;
pub use store::CounterStore;
pub use types::{Decision, LimitScope, RateLimitPolicy, RequestContext};
