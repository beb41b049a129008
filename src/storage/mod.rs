//! # Storage Layer
//!
//! On-disk configuration for texpilot.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML | `texpilot.toml`, found by walking up |
//! | Global config | TOML | `<config dir>/texpilot/config.toml` |
//!
//! ## Key Types
//!
//! - [`Config`] - Project and global configuration

mod config;

pub use config::{
    Config, ConfigError, ExpanderConfig, GlobalConfig, MathConfig, OutputFormat, PandocConfig,
    ProjectConfig, DEFAULT_EXPANDER, PROJECT_FILE,
};
