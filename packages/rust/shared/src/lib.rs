//! Shared types, error model, and configuration for heirdesk.
//!
//! This crate is the foundation depended on by all other heirdesk crates.
//! It provides:
//! - [`HeirdeskError`], the unified error type
//! - Domain types ([`Entity`], [`FieldKey`], [`Fields`], [`Provenance`], [`SearchHit`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)
//! - The static seed registry
//! - [`HostThrottle`], per-host request spacing shared by the HTTP boundaries

pub mod config;
pub mod error;
pub mod seed;
pub mod throttle;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, CompletionConfig, FetchConfig, SearchConfig, config_dir,
    config_file_path, expand_home, init_config, load_api_keys, load_config, load_config_from,
};
pub use error::{HeirdeskError, Result};
pub use seed::{SEED_ENTITIES, seed_entities};
pub use throttle::HostThrottle;
pub use types::{
    DEGRADED_MARKER, Entity, FieldKey, Fields, LastUpdated, NO_DATA, Provenance, SearchHit,
    is_no_data, tag_degraded,
};
