//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Shared primitives and utilities for the core runtime."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Shared primitives for the station lifecycle workspace.
//! This crate exposes configuration loading, the platform identifier, and
//! the tracing bootstrap consumed across the workspace.

pub mod config;
pub mod logging;
pub mod platform;

pub use config::{
    AllocationConfig, AppConfig, BulkConfig, ComputeConfig, InventoryConfig, LoggingConfig,
    MetricsConfig, NetworkConfig, PlatformConfig, PlatformsConfig, StorageConfig,
    MAX_STATION_ID, MIN_STATION_ID,
};
pub use logging::{init_tracing, LogFormat};
pub use platform::{Platform, UnknownPlatform};
