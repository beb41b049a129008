//! Configuration handling for texpilot
//!
//! Configuration is stored in `texpilot.toml` (project, found by walking up
//! from the current directory) and `<config dir>/texpilot/config.toml`
//! (global). Relative paths in the project file are relative to the directory
//! holding it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin::{CodeSettings, DEFAULT_MATH_COMMAND};

/// Project configuration file name
pub const PROJECT_FILE: &str = "texpilot.toml";

/// Expander command used when none is configured
pub const DEFAULT_EXPANDER: &str = "texpilot-expand";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// The structural converter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PandocConfig {
    pub command: String,

    /// Bibliography file; enables citation processing
    pub bibliography: Option<PathBuf>,

    /// Citation style file
    pub csl: Option<PathBuf>,

    /// Extra arguments for the LaTeX → tree conversion
    pub extra_args: Vec<String>,
}

impl Default for PandocConfig {
    fn default() -> Self {
        Self {
            command: "pandoc".to_string(),
            bibliography: None,
            csl: None,
            extra_args: Vec::new(),
        }
    }
}

/// The external macro expander
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExpanderConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_EXPANDER.to_string(),
            args: Vec::new(),
        }
    }
}

/// The math renderer used by the `katex` plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MathConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_MATH_COMMAND.to_string(),
            args: Vec::new(),
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Plugin search directories, searched after the builtin plugins
    pub plugin_dirs: Vec<PathBuf>,

    /// Plugins to load at start besides the auto-load ones
    pub plugins: Vec<String>,

    /// Macro files applied after the plugins
    pub macro_files: Vec<PathBuf>,

    pub pandoc: PandocConfig,
    pub expander: ExpanderConfig,
    pub math: MathConfig,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Plugin directories searched before the project's
    pub plugin_dirs: Vec<PathBuf>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;

        let Some(root) = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_root(&dir))
        else {
            return Ok(Self {
                global,
                ..Self::default()
            });
        };

        let project = Self::load_project_file(&root.join(PROJECT_FILE))?;
        Ok(Self {
            project,
            global,
            project_root: Some(root),
        })
    }

    /// Loads the global configuration and an explicit project file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::Invalid(format!(
                "Configuration file not found: {}",
                path.display()
            ))
            .into());
        }

        let global = Self::load_global()?;
        let project = Self::load_project_file(path)?;
        let root = path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .map(Path::to_path_buf);

        Ok(Self {
            project,
            global,
            project_root: root,
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "texpilot", "texpilot")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads a project configuration file
    fn load_project_file(config_path: &Path) -> Result<ProjectConfig> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse project config: {}", config_path.display()))
    }

    /// Finds the project root by looking for `texpilot.toml` from `start` upwards
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(PROJECT_FILE).is_file() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns true if a project file was found
    pub fn is_in_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Resolves a project path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Plugin directories in search order: global, then project
    pub fn plugin_dirs(&self) -> Vec<PathBuf> {
        self.global
            .plugin_dirs
            .iter()
            .cloned()
            .chain(self.project.plugin_dirs.iter().map(|p| self.resolve(p)))
            .collect()
    }

    /// Macro files applied after the plugins, resolved
    pub fn macro_files(&self) -> Vec<PathBuf> {
        self.project
            .macro_files
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    /// Settings handed to plugin code objects
    pub fn code_settings(&self) -> CodeSettings {
        CodeSettings {
            math_command: self.project.math.command.clone(),
            math_args: self.project.math.args.clone(),
        }
    }
}
