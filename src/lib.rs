//! mediavault - self-healing media storage resilience layer
//!
//! Protects uploaded files on an ephemeral primary volume by maintaining a
//! durable mirror, reconciling divergence on a schedule, restoring deletions
//! in real time, and serving reads through a primary-then-mirror fallback.

pub mod config;
pub mod error;
pub mod http;
pub mod mirror;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod serve;
pub mod stats;
pub mod types;
pub mod watcher;

pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use resolver::PathResolver;
pub use stats::StatsRegistry;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
