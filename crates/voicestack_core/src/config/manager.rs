//! Settings file manager.
//!
//! The file is rewritten through a temp file and a rename, so readers (other
//! workers taking a per-job snapshot) never see a half-written document.
//! `update_section` swaps one table in place with toml_edit and leaves the
//! operator's comments elsewhere alone. Unknown tables are dropped on load.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use toml_edit::DocumentMut;

use super::settings::{ConfigSection, Settings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file I/O failed: {0}")]
    ReadError(#[from] io::Error),

    #[error("Invalid settings: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Cannot encode settings: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Settings file is not editable TOML: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Settings file not found: {}", .0.display())]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the worker settings file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given file. Call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Changes are in memory until `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Errors if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Read a settings snapshot from disk without keeping a manager around.
    pub fn read_snapshot(path: &Path) -> ConfigResult<Settings> {
        let mut manager = Self::new(path);
        manager.load()?;
        Ok(manager.settings)
    }

    /// Load config from file, creating it with defaults if missing.
    ///
    /// Rewrites the file when sections were unknown or defaults were missing.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = Self::parse_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                tracing::info!(path = %self.config_path.display(), "Filling in config defaults");
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!(path = %self.config_path.display(), "Created default config");
        }
        Ok(())
    }

    /// Ensure all configured directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        let dirs = [
            paths.artifacts_dir(),
            paths.archive_dir(),
            paths.logs_dir(),
            paths.leases_dir(),
        ];

        for dir in dirs {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        if let Some(parent) = paths.catalog_path().parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(())
    }

    fn parse_and_clean(content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;
        let settings: Settings = toml::from_str(content)?;

        let has_unknown = doc.iter().any(|(key, _)| {
            !ConfigSection::ALL
                .iter()
                .any(|section| section.table_name() == key)
        });

        let missing = ConfigSection::ALL
            .iter()
            .any(|section| !doc.contains_key(section.table_name()));

        Ok((settings, has_unknown || missing))
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// Re-reads the file, replaces only that table and writes it back, so
    /// comments and other sections survive untouched.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        if let Some(table) = section_doc.get(section.table_name()) {
            doc[section.table_name()] = table.clone();
        }

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// One section under its own table header.
    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        match section {
            ConfigSection::Paths => table_toml(section, &s.paths),
            ConfigSection::Logging => table_toml(section, &s.logging),
            ConfigSection::Pipeline => table_toml(section, &s.pipeline),
            ConfigSection::Asr => table_toml(section, &s.asr),
            ConfigSection::Tools => table_toml(section, &s.tools),
            ConfigSection::Archive => table_toml(section, &s.archive),
        }
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::from(
            "# VoiceStack worker settings\n\
             # Read at the start of every job; edits apply to the next job.\n\n",
        );

        for section in ConfigSection::ALL {
            output.push_str(section.comment());
            output.push('\n');
            output.push_str(self.section_toml(section)?.trim_end());
            output.push_str("\n\n");
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Serialize one section under its own table header, nested tables included.
fn table_toml<T: Serialize>(section: ConfigSection, value: &T) -> ConfigResult<String> {
    let mut wrapper = BTreeMap::new();
    wrapper.insert(section.table_name(), value);
    Ok(toml::to_string_pretty(&wrapper)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("voicestack.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[pipeline]"));
        assert!(content.contains("[[asr.engines]]"));

        let reread = ConfigManager::read_snapshot(&config_path).unwrap();
        assert_eq!(reread.asr.engines.len(), 2);
        assert_eq!(reread.pipeline.lock_lease_secs, 1800);
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("voicestack.toml");
        fs::write(&config_path, "[pipeline]\nworker_count = 5\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().pipeline.worker_count, 5);
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("worker_count = 5"));
        assert!(content.contains("[archive]"));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("voicestack.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        manager.settings_mut().pipeline.similarity_threshold = 0.5;
        manager.settings_mut().logging.level = "debug".to_string();
        manager.update_section(ConfigSection::Pipeline).unwrap();

        let reread = ConfigManager::read_snapshot(&config_path).unwrap();
        assert!((reread.pipeline.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(reread.logging.level, "info");
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_layout() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("voicestack.toml"));
        manager.settings_mut().paths.data_root = dir.path().join("data").display().to_string();
        manager.ensure_dirs_exist().unwrap();

        assert!(dir.path().join("data/artifacts").is_dir());
        assert!(dir.path().join("data/leases").is_dir());
    }
}
