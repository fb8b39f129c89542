//! Environment capability
//!
//! Every read of process-wide state (environment variables, process
//! properties, the per-user settings directory) goes through the
//! [`Environment`] trait, so credential and proxy lookups can be exercised
//! against an in-memory double.
//!
//! # Implementations
//!
//! - `SystemEnvironment` - Real environment variables, properties from configuration
//! - `MemoryEnvironment` - Fully in-memory, for tests and embedding

use crate::config::Config;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Default name of the per-user settings directory, relative to the home directory
pub const DEFAULT_SETTINGS_DIR: &str = ".sbt";

/// Read-only view of process-wide configuration
pub trait Environment: Send + Sync + fmt::Debug {
    /// Environment variable value. Unset and blank values are both `None`.
    fn var(&self, name: &str) -> Option<String>;

    /// Process property value. Unset and blank values are both `None`.
    fn property(&self, name: &str) -> Option<String>;

    /// Per-user settings directory holding credential files
    fn settings_dir(&self) -> Option<PathBuf>;

    /// Read a file from the settings directory.
    ///
    /// Returns `Ok(None)` when the directory or file does not exist. The file
    /// is read in full and closed before returning.
    fn read_settings_file(&self, file_name: &str) -> io::Result<Option<String>> {
        let Some(dir) = self.settings_dir() else {
            return Ok(None);
        };

        match std::fs::read_to_string(dir.join(file_name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// The real process environment
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    properties: HashMap<String, String>,
    settings_dir: Option<PathBuf>,
}

impl SystemEnvironment {
    /// Create a system environment with explicit properties and settings directory
    pub fn new(properties: HashMap<String, String>, settings_dir: Option<PathBuf>) -> Self {
        Self {
            properties,
            settings_dir,
        }
    }

    /// Build from configuration.
    ///
    /// Uses the configured settings directory, falling back to
    /// `~/.sbt` when the home directory is known.
    pub fn from_config(config: &Config) -> Self {
        let settings_dir = config
            .settings_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(default_settings_dir);

        Self::new(config.properties.clone(), settings_dir)
    }
}

/// `~/.sbt`, if the home directory can be determined
pub fn default_settings_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_SETTINGS_DIR))
}

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        non_blank(std::env::var(name).ok().as_ref())
    }

    fn property(&self, name: &str) -> Option<String> {
        non_blank(self.properties.get(name))
    }

    fn settings_dir(&self) -> Option<PathBuf> {
        self.settings_dir.clone()
    }
}

/// In-memory environment.
///
/// Settings files live in a map keyed by file name; no disk access happens.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvironment {
    vars: HashMap<String, String>,
    properties: HashMap<String, String>,
    files: HashMap<String, String>,
}

impl MemoryEnvironment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Add a process property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add a settings file
    pub fn with_file(mut self, file_name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(file_name.into(), content.into());
        self
    }
}

impl Environment for MemoryEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        non_blank(self.vars.get(name))
    }

    fn property(&self, name: &str) -> Option<String> {
        non_blank(self.properties.get(name))
    }

    fn settings_dir(&self) -> Option<PathBuf> {
        None
    }

    fn read_settings_file(&self, file_name: &str) -> io::Result<Option<String>> {
        Ok(self.files.get(file_name).cloned())
    }
}
