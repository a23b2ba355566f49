//! Configuration discovery and parsing

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::{config_file_names, CONFIG_SUBDIR};
use super::types::Config;
use super::validation::validate_config;

/// Syntax of a configuration file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Toml,
    Yaml,
}

impl Syntax {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }

    fn parse(self, path: &Path, text: &str) -> Result<Config> {
        let path = path.to_path_buf();
        match self {
            Self::Toml => toml::from_str(text).map_err(|source| ConfigError::Toml { path, source }),
            Self::Yaml => serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml { path, source }),
        }
    }
}

/// Read, parse and validate one configuration file
pub fn load_config(path: &Path) -> Result<Config> {
    let syntax = Syntax::of(path);
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = syntax.parse(path, &text)?;
    validate_config(&config)?;
    info!(path = %path.display(), ?syntax, "loaded config");
    Ok(config)
}

/// Candidate locations in one directory, in order of preference
fn candidates(dir: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    config_file_names()
        .into_iter()
        .flat_map(move |name| [dir.join(name), dir.join(CONFIG_SUBDIR).join(name)])
}

/// The nearest configuration file at or above `start_dir`
///
/// Each directory is checked for `simrun.toml`-style names directly and
/// inside `.simrun/` before moving on to its parent.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let found = start_dir
        .ancestors()
        .find_map(|dir| candidates(dir).find(|path| path.is_file()));
    debug!(start_dir = %start_dir.display(), found = ?found, "config search");
    found
}

/// Load the nearest configuration file, or the defaults when there is none
///
/// A file that exists but does not parse or validate is an error.
pub fn load_config_or_default(dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    match find_config(dir) {
        Some(path) => Ok((load_config(&path)?, Some(path))),
        None => {
            debug!(dir = %dir.display(), "no config file, using defaults");
            Ok((Config::default(), None))
        }
    }
}

/// Directory against which relative config paths are resolved
pub fn config_base_dir(config_path: Option<&Path>, fallback: &Path) -> PathBuf {
    let Some(path) = config_path else {
        return fallback.to_path_buf();
    };
    let parent = path.parent().unwrap_or(fallback);
    if parent.file_name().is_some_and(|n| n == CONFIG_SUBDIR) {
        parent.parent().unwrap_or(fallback).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}
