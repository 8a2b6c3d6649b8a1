// src/core/mod.rs

pub mod executor;
pub mod fallback;
pub mod health;
pub mod key_rotation;

pub use executor::{RequestExecutor, RetryPolicy};
pub use fallback::{ChainedFallback, FallbackPath, SecondaryProvider};
pub use health::{HealthPolicy, HealthTracker};
pub use key_rotation::{AdaptiveStrategy, KeyRotationStrategy, KeySelector, StickyStrategy};
