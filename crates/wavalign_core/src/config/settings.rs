//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Offset search settings.
    #[serde(default)]
    pub align: AlignSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

/// Offset search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignSettings {
    /// Largest offset searched, in frames.
    #[serde(default = "default_max_offset_frames")]
    pub max_offset_frames: usize,

    /// Channel count the workspace is sized for.
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
}

fn default_max_offset_frames() -> usize {
    16 * 1024
}

fn default_max_channels() -> usize {
    2
}

impl Default for AlignSettings {
    fn default() -> Self {
        Self {
            max_offset_frames: default_max_offset_frames(),
            max_channels: default_max_channels(),
        }
    }
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Logging,
    Align,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 2] = [ConfigSection::Logging, ConfigSection::Align];

    /// TOML table name of this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Logging => "logging",
            ConfigSection::Align => "align",
        }
    }

    /// Comment written above the section.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Align => "Best-match offset search",
        }
    }
}
