// src/config.rs

//! Program configuration
//!
//! A small TOML file under the platform config directory. It carries
//! the federation URLs (overridable for mirrors and for test servers)
//! and the most recently used file paths so repeat runs need fewer
//! arguments.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// URLs of the federation rating site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Urls {
    pub active_clubs: String,
    pub players_ratings: String,
    pub player_lookup: String,
    pub club_lookup: String,
    pub players_search: String,
    pub submit: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            active_clubs: "https://rating.englishchess.org.uk/v2/new/api.php?v2/clubs/all_active"
                .to_string(),
            players_ratings:
                "https://rating.englishchess.org.uk/v2/new/api.php?v2/players/all_ratings"
                    .to_string(),
            player_lookup: "https://rating.englishchess.org.uk/v2/new/api.php?v2/players/code/"
                .to_string(),
            club_lookup: "https://rating.englishchess.org.uk/v2/new/api.php?v2/clubs/code/"
                .to_string(),
            players_search: "https://rating.englishchess.org.uk/v2/new/api.php?v2/players/name/"
                .to_string(),
            submit: "https://rating.englishchess.org.uk/v2/submit/".to_string(),
        }
    }
}

/// Most recently used file paths, one slot per file kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Recent {
    pub database: Option<PathBuf>,
    pub import_file: Option<PathBuf>,
    pub submission_dir: Option<PathBuf>,
    pub feedback_file: Option<PathBuf>,
    pub source_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub urls: Urls,
    pub recent: Recent,
}

impl Config {
    /// Default on-disk location of the config file
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::ConfigError("no config directory on this platform".to_string()))?;
        Ok(base.join("gradebase").join("config.toml"))
    }

    /// Load from a path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigError(format!("{}: {e}", parent.display())))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("serialize: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.urls.active_clubs.contains("all_active"));
    }

    #[test]
    fn test_round_trip_preserves_recent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradebase").join("config.toml");
        let mut config = Config::default();
        config.recent.database = Some(PathBuf::from("/tmp/results.db"));
        config.urls.submit = "http://localhost:9999/submit/".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[recent]\ndatabase = \"/tmp/x.db\"\n").unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.recent.database, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(loaded.urls, Urls::default());
    }
}
