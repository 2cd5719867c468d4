//! Configuration management for wavalign.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//!
//! # Example
//!
//! ```no_run
//! use wavalign_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/wavalign.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Max offset: {}", config.settings().align.max_offset_frames);
//!
//! config.settings_mut().align.max_channels = 6;
//! config.update_section(ConfigSection::Align).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{AlignSettings, ConfigSection, LoggingSettings, Settings};
