//! Configuration management for the VoiceStack worker.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every missing key
//!
//! The pipeline reads a snapshot of the settings once per job start and
//! never writes them back.
//!
//! # Example
//!
//! ```no_run
//! use voicestack_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("voicestack.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Catalog: {}", config.settings().paths.catalog_path().display());
//!
//! config.settings_mut().pipeline.similarity_threshold = 0.4;
//! config.update_section(ConfigSection::Pipeline).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AlignerKind, ArchiveSettings, AsrEngineKind, AsrEngineSettings, AsrSettings, ConfigSection,
    LoggingSettings, PathSettings, PipelineSettings, Settings, ToolCommand, ToolSettings,
};
