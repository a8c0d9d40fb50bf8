//! Configuration loading and types

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

/// Top-level configuration for setuptask
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,
    /// Owners, in the order they are provisioned
    #[serde(default, rename = "owner")]
    pub owners: Vec<OwnerConfig>,
    /// File the configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for owners' stamp directories
    pub state_dir: Option<PathBuf>,
    /// Directory holding templates for template tasks
    pub templates_dir: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: None,
            templates_dir: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Root directory for stamp directories
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("setuptask")))
            .unwrap_or_else(|| PathBuf::from(".setuptask"))
    }
}

/// One provisionable owner and its tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    pub name: String,
    /// Stamp directory; defaults to `<state_dir>/<name>`
    pub stamp_path: Option<PathBuf>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
    #[serde(default, rename = "template")]
    pub templates: Vec<TemplateConfig>,
}

impl OwnerConfig {
    /// Stamp directory of this owner
    #[must_use]
    pub fn stamp_path(&self, settings: &Settings) -> PathBuf {
        self.stamp_path
            .clone()
            .unwrap_or_else(|| settings.state_dir().join(&self.name))
    }
}

/// A shell command run as a setup task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Shell command performing the work
    pub run: String,
    pub description: Option<String>,
    pub order: Option<i32>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
    /// Command whose success means the work is already done
    pub check: Option<String>,
    /// Files whose contents decide whether the task is stale
    #[serde(default)]
    pub hash_files: Vec<PathBuf>,
    /// Rerun on every invocation
    #[serde(default)]
    pub always: bool,
    pub timeout_secs: Option<u64>,
}

/// A template rendered into the owner's stamp directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    /// Template name relative to `templates_dir`
    pub template: String,
    /// Output path relative to the stamp directory
    pub output: Option<String>,
    #[serde(default)]
    pub vars: serde_json::Map<String, serde_json::Value>,
    pub order: Option<i32>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl Config {
    /// Load configuration from file
    ///
    /// Relative paths inside the file are resolved against its directory.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::parse(&content, path.parent())
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration text, resolving relative paths against `base`
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str, base: Option<&Path>) -> eyre::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        if let Some(base) = base.filter(|b| !b.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, `SETUPTASK_CONFIG`, or the default paths
    ///
    /// Falls back to an empty configuration when no file exists; `source`
    /// is `None` in that case.
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn resolve(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("SETUPTASK_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let mut paths = vec![
            PathBuf::from("setuptask.toml"),
            PathBuf::from("/etc/setuptask/setuptask.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("setuptask/setuptask.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }

    /// Look up an owner by name
    ///
    /// # Errors
    /// Returns error if no owner has that name
    pub fn owner(&self, name: &str) -> eyre::Result<&OwnerConfig> {
        self.owners
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| eyre::eyre!("unknown owner: {name}"))
    }

    fn validate(&self) -> eyre::Result<()> {
        for (i, owner) in self.owners.iter().enumerate() {
            if self.owners[..i].iter().any(|o| o.name == owner.name) {
                eyre::bail!("duplicate owner: {}", owner.name);
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        if let Some(dir) = self.settings.state_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.settings.templates_dir.as_mut() {
            resolve(dir);
        }
        for owner in &mut self.owners {
            if let Some(path) = owner.stamp_path.as_mut() {
                resolve(path);
            }
            for task in &mut owner.tasks {
                task.hash_files.iter_mut().for_each(&resolve);
            }
        }
    }
}
