//! Store settings
//!
//! Settings are loaded from (in order of priority):
//! 1. JSON file (~/.config/imapx/store-settings.json)
//! 2. Environment variables (IMAPX_*)
//! 3. Built-in defaults

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings filename in the imapx config directory
const SETTINGS_FILE: &str = "store-settings.json";

/// Per-account behaviour of the folder synchronizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Move junk messages into a real folder instead of only flagging them
    pub use_real_junk_path: bool,
    pub real_junk_path: Option<String>,
    /// Move deleted messages into a real folder instead of only flagging them
    pub use_real_trash_path: bool,
    pub real_trash_path: Option<String>,
    /// The store exposes a virtual trash, so the real trash folder is never expunged wholesale
    pub has_virtual_trash: bool,
    /// Folder path of the inbox, destination of messages marked not-junk
    pub inbox_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            use_real_junk_path: false,
            real_junk_path: None,
            use_real_trash_path: false,
            real_trash_path: None,
            has_virtual_trash: true,
            inbox_path: "INBOX".to_string(),
        }
    }
}

impl StoreSettings {
    /// Load settings from the config file, the environment, or defaults
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            debug!("Loading store settings from {}", SETTINGS_FILE);
            return config::load_json(SETTINGS_FILE);
        }

        Ok(Self::from_env())
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse store settings JSON")
    }

    /// Build settings from IMAPX_* environment variables over the defaults
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(value) = config::env_flag("IMAPX_USE_REAL_JUNK_PATH") {
            settings.use_real_junk_path = value;
        }
        if let Some(path) = config::env_var("IMAPX_REAL_JUNK_PATH") {
            settings.real_junk_path = Some(path);
        }
        if let Some(value) = config::env_flag("IMAPX_USE_REAL_TRASH_PATH") {
            settings.use_real_trash_path = value;
        }
        if let Some(path) = config::env_var("IMAPX_REAL_TRASH_PATH") {
            settings.real_trash_path = Some(path);
        }
        if let Some(value) = config::env_flag("IMAPX_VIRTUAL_TRASH") {
            settings.has_virtual_trash = value;
        }
        if let Some(path) = config::env_var("IMAPX_INBOX_PATH") {
            settings.inbox_path = path;
        }
        settings
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(SETTINGS_FILE, self)
    }

    /// Default settings file path (~/.config/imapx/store-settings.json)
    pub fn default_settings_path() -> Option<PathBuf> {
        config::config_path(SETTINGS_FILE)
    }

    /// Real junk folder path, if junk moves are enabled
    pub fn junk_destination(&self) -> Option<&str> {
        self.real_junk_path
            .as_deref()
            .filter(|p| self.use_real_junk_path && !p.is_empty())
    }

    /// Real trash folder path, if trash moves are enabled
    pub fn trash_destination(&self) -> Option<&str> {
        self.real_trash_path
            .as_deref()
            .filter(|p| self.use_real_trash_path && !p.is_empty())
    }
}
