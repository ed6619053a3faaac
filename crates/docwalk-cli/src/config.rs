//! Configuration file support for `.docwalk.toml`
//!
//! Configuration files can be placed in:
//! - User home directory: `~/.docwalk.toml` (user defaults)
//! - Project directory: `./.docwalk.toml` (project defaults)
//!
//! Precedence order (highest to lowest):
//! 1. Command-line arguments (`--max-length`, `--format`, etc.)
//! 2. Project config (`./.docwalk.toml`)
//! 3. User config (`~/.docwalk.toml`)
//! 4. Built-in defaults

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working and home directories
pub const CONFIG_FILE_NAME: &str = ".docwalk.toml";

/// Output format for the `extract` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One block per document: header line, metadata, content
    #[default]
    Text,
    /// The whole result set as a JSON object
    Json,
}

/// Top-level `.docwalk.toml` structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for the `extract` command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractConfig>,
}

/// `[extract]` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Character cap applied to every document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Wrap content in XHTML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml: Option<bool>,

    /// Record embedded failures instead of aborting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_embedded_errors: Option<bool>,

    /// Deepest nesting level visited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Output format (text or json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl ExtractConfig {
    /// Overlay `other` on top of `self`; set fields in `other` win.
    #[must_use = "returns the merged table"]
    pub fn overlay(self, other: Self) -> Self {
        Self {
            max_length: other.max_length.or(self.max_length),
            xml: other.xml.or(self.xml),
            catch_embedded_errors: other.catch_embedded_errors.or(self.catch_embedded_errors),
            max_depth: other.max_depth.or(self.max_depth),
            format: other.format.or(self.format),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML for this schema.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load user and project configs and merge them
    #[must_use = "returns the merged configuration"]
    pub fn discover() -> Self {
        let user = dirs::home_dir().and_then(|home| Self::load_optional(&home.join(CONFIG_FILE_NAME)));
        let project = Self::load_optional(&PathBuf::from(CONFIG_FILE_NAME));
        Self::merge(user, project)
    }

    /// Load a config file if it exists; a broken file is reported and ignored
    fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => {
                log::debug!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                eprintln!("{} {:#}", "Warning:".yellow().bold(), e);
                None
            }
        }
    }

    /// Merge configs with precedence: project config > user config
    #[must_use = "returns the merged configuration"]
    pub fn merge(user_config: Option<Self>, project_config: Option<Self>) -> Self {
        let user = user_config.and_then(|c| c.extract);
        let project = project_config.and_then(|c| c.extract);
        let extract = match (user, project) {
            (None, None) => None,
            (user, project) => Some(user.unwrap_or_default().overlay(project.unwrap_or_default())),
        };
        Self { extract }
    }

    /// `[extract]` table, empty if absent
    #[must_use = "returns the extract defaults"]
    pub fn extract_defaults(&self) -> ExtractConfig {
        self.extract.clone().unwrap_or_default()
    }
}
