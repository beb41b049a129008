use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    UnknownPlugin(String),

    #[error("Plugin '{plugin}' requires '{dependency}', which was not found")]
    UnresolvedDependency { plugin: String, dependency: String },

    #[error("Circular dependency detected while loading plugin '{0}'")]
    CircularDependency(String),

    #[error("Plugin '{plugin}' lists macro file '{file}', which is not in {}", .location.display())]
    MissingMacroFile {
        plugin: String,
        file: String,
        location: PathBuf,
    },

    #[error("Plugin '{plugin}' refers to unknown code object '{code}'")]
    UnknownCode { plugin: String, code: String },

    #[error("Invalid plugin manifest {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
