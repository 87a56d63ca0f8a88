//! Layered configuration for the language server core.
//!
//! Settings are merged from, in increasing precedence: a per-user config
//! file (`solls.toml` in the platform config directory), `.solls.toml` in
//! the workspace root, and `solls.toml` in the workspace root.

use std::path::Path;

use config::{Config, ConfigError as ExternalConfigError, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
}

fn default_fetch_concurrency() -> usize {
    100
}

fn default_max_import_depth() -> usize {
    30
}

/// Tunables for workspace synchronization and dependency discovery.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on concurrent file-source fetches. Backpressure only:
    /// exceeding it delays fetches, it never drops them.
    pub fetch_concurrency: usize,
    /// Recursion bound for transitive import discovery.
    pub max_import_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            max_import_depth: default_max_import_depth(),
        }
    }
}

impl Settings {
    pub fn new(workspace_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("com.github", "solls", "solls")
            .map(|dirs| dirs.config_dir().join("solls.toml"));
        Self::load_from_paths(workspace_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        workspace_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(workspace_root.join(".solls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );
        builder = builder.add_source(
            File::from(workspace_root.join("solls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }
}
