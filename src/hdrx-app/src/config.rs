// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for in every config location.
pub const CONFIG_FILE_NAME: &str = "hdrx.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Returns the default search paths for `hdrx.toml`
/// (current directory → XDG config → /etc).
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("hdrx").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/hdrx").join(CONFIG_FILE_NAME));
    paths
}

/// Extract and deserialize a named section from a TOML file.
///
/// Returns `Ok(None)` when the file parses but lacks the section.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

    let mut table: toml::Table = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.remove(key) else {
        return Ok(None);
    };

    section
        .try_into::<T>()
        .map(Some)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
}

/// A configuration struct living in one `[section]` of `hdrx.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `hdrx.toml` (e.g. `"hdrx-rx"`).
    fn section_key() -> &'static str;

    /// Semantic checks run after a successful parse.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Load the section from a specific file path.
    ///
    /// Fails if the file cannot be read, is not valid TOML, or has no
    /// `[<section_key>]` table.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the section from the first default location that has it.
    ///
    /// Returns `(Default::default(), None)` when no file provides the section.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }

    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in paths {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(path, Self::section_key())? {
                    return Ok((cfg, Some(path.clone())));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Load from `explicit` when given, otherwise from the default paths, and
    /// validate the result.
    fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (cfg, path) = match explicit {
            Some(path) => (Self::load_from_file(path)?, Some(path.to_path_buf())),
            None => Self::load_from_default_paths()?,
        };
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok((cfg, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Demo {
        name: String,
        level: u32,
    }

    impl ConfigFile for Demo {
        fn section_key() -> &'static str {
            "demo"
        }

        fn validate(&self) -> Result<(), String> {
            if self.level > 10 {
                return Err(format!("level {} out of range", self.level));
            }
            Ok(())
        }
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_section_with_defaults() {
        let file = write_config("[other]\nx = 1\n\n[demo]\nname = \"wabc\"\n");
        let cfg = Demo::load_from_file(file.path()).unwrap();
        assert_eq!(
            cfg,
            Demo {
                name: "wabc".into(),
                level: 0
            }
        );
    }

    #[test]
    fn missing_section_is_an_error_for_explicit_files() {
        let file = write_config("[other]\nx = 1\n");
        assert!(matches!(
            Demo::load_from_file(file.path()),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn search_skips_files_without_section() {
        let without = write_config("[other]\n");
        let with = write_config("[demo]\nlevel = 3\n");
        let paths = vec![
            PathBuf::from("/nonexistent/hdrx.toml"),
            without.path().to_path_buf(),
            with.path().to_path_buf(),
        ];
        let (cfg, found) = Demo::load_from_paths(&paths).unwrap();
        assert_eq!(cfg.level, 3);
        assert_eq!(found.as_deref(), Some(with.path()));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let file = write_config("[demo]\nlevel = 42\n");
        assert!(matches!(
            Demo::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_toml_reports_path() {
        let file = write_config("[demo\n");
        let err = Demo::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
