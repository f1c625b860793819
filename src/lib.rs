pub mod aggregate;
pub mod alerts;
pub mod cli;
pub mod config;
pub mod content;
pub mod entity_filter;
pub mod error;
pub mod export;
pub mod extractor;
pub mod logger;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod rate_limit;
pub mod registry;
pub mod search;

pub use error::{MonitorError, MonitorResult};
pub use model::{AlertTier, Entity, EntityType, MatchResult, RegistryRecord};
pub use pipeline::{Monitor, MonitorContext, RunReport, RunStats};
