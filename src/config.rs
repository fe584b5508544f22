// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format.
//! It keeps window geometry, the recently opened document list, offline mode,
//! and location overrides, with automatic migration from the legacy
//! single-document config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of entries kept in the recent document list
pub const MAX_RECENT_DOCUMENTS: usize = 10;

/// A document the viewer has opened before
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecentDocument {
    /// Unique identifier for this entry (stable across path edits)
    pub id: String,

    /// Filesystem path to the markup document
    pub path: String,

    /// When the document was last opened
    pub opened_at: DateTime<Utc>,
}

impl RecentDocument {
    /// Create a new entry with a generated UUID, stamped now
    pub fn new(path: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            opened_at: Utc::now(),
        }
    }
}

/// Legacy configuration format for migration (pre-recent-documents)
#[derive(Debug, Default, Serialize, Deserialize)]
struct LegacyAppConfig {
    last_document: Option<String>,
    window_width: Option<f32>,
    window_height: Option<f32>,
    offline: Option<bool>,
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Window width in logical pixels
    #[serde(default = "default_window_width")]
    pub window_width: f32,

    /// Window height in logical pixels
    #[serde(default = "default_window_height")]
    pub window_height: f32,

    /// Recently opened documents, most recent first
    #[serde(default)]
    pub recent_documents: Vec<RecentDocument>,

    /// Serve tiles from the disk cache only, never the network
    #[serde(default)]
    pub offline: bool,

    /// Override geolocation latitude (for machines without a usable fix)
    #[serde(default)]
    pub override_latitude: Option<f64>,

    /// Override geolocation longitude (for machines without a usable fix)
    #[serde(default)]
    pub override_longitude: Option<f64>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    2 // Current schema version
}

fn default_window_width() -> f32 {
    1400.0
}

fn default_window_height() -> f32 {
    800.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            recent_documents: Vec::new(),
            offline: false,
            override_latitude: None,
            override_longitude: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk with automatic migration from legacy format
    pub fn load() -> Result<Self, confy::ConfyError> {
        // Try to load as new format first
        let config: AppConfig = confy::load("leafmark", "config")?;

        // Check if we need to migrate from legacy format based on version
        // Version 0 or 1 indicates legacy format
        if config.config_version < 2 {
            if let Ok(legacy_config) = Self::try_load_legacy() {
                log::info!(
                    "Migrating from legacy configuration (version {})...",
                    config.config_version
                );
                let migrated = Self::migrate_from_legacy(legacy_config);

                // Save migrated config immediately
                migrated.save()?;
                log::info!("Configuration migrated successfully to version 2");

                return Ok(migrated);
            }
        }

        Ok(config)
    }

    /// Attempt to load legacy configuration format
    fn try_load_legacy() -> Result<LegacyAppConfig, confy::ConfyError> {
        confy::load("leafmark", "config")
    }

    /// Migrate from the legacy single-document format
    fn migrate_from_legacy(legacy: LegacyAppConfig) -> Self {
        // The one remembered document becomes the head of the recent list
        let recent_documents = match legacy.last_document {
            Some(path) => vec![RecentDocument::new(path)],
            None => Vec::new(),
        };

        Self {
            config_version: default_config_version(), // Set to latest version
            window_width: legacy.window_width.unwrap_or_else(default_window_width),
            window_height: legacy.window_height.unwrap_or_else(default_window_height),
            recent_documents,
            offline: legacy.offline.unwrap_or(false),
            override_latitude: None,
            override_longitude: None,
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store("leafmark", "config", self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path("leafmark", "config")
    }

    /// Record a document open, most recent first, deduplicated by path
    pub fn remember_document(&mut self, path: &str) {
        self.recent_documents.retain(|doc| doc.path != path);
        self.recent_documents
            .insert(0, RecentDocument::new(path.to_string()));
        self.recent_documents.truncate(MAX_RECENT_DOCUMENTS);
    }

    /// Get a recent document by ID
    #[allow(dead_code)]
    pub fn get_recent(&self, id: &str) -> Option<&RecentDocument> {
        self.recent_documents.iter().find(|d| d.id == id)
    }

    /// Remove a recent document by ID
    #[allow(dead_code)]
    pub fn remove_recent(&mut self, id: &str) -> bool {
        if let Some(pos) = self.recent_documents.iter().position(|d| d.id == id) {
            self.recent_documents.remove(pos);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_document_dedupes_by_path() {
        let mut config = AppConfig::default();
        config.remember_document("/tmp/a.html");
        config.remember_document("/tmp/b.html");
        config.remember_document("/tmp/a.html");

        assert_eq!(config.recent_documents.len(), 2);
        assert_eq!(config.recent_documents[0].path, "/tmp/a.html");
        assert_eq!(config.recent_documents[1].path, "/tmp/b.html");
    }

    #[test]
    fn test_remember_document_caps_list() {
        let mut config = AppConfig::default();
        for i in 0..15 {
            config.remember_document(&format!("/tmp/doc-{}.html", i));
        }

        assert_eq!(config.recent_documents.len(), MAX_RECENT_DOCUMENTS);
        assert_eq!(config.recent_documents[0].path, "/tmp/doc-14.html");
    }
}
