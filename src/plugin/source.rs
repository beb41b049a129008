//! Plugin search locations

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::error::PluginError;
use super::manifest::PluginManifest;
use crate::builtin;

/// Where plugins are searched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// A directory of `*.json` manifests and `*.tex`/`*.sty` macro files
    Directory(PathBuf),

    /// Manifests compiled into the binary
    Builtin,
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Directory(path) => write!(f, "{}", path.display()),
            PluginSource::Builtin => f.write_str("<builtin>"),
        }
    }
}

/// A plugin as found in a location, before loading
#[derive(Debug, Clone)]
pub struct Discovered {
    pub manifest: PluginManifest,
    pub macro_files: Vec<PathBuf>,
}

impl PluginSource {
    /// Reads every manifest in this location, in file name order
    pub fn scan(&self) -> Result<Vec<Discovered>> {
        match self {
            PluginSource::Builtin => builtin::MANIFESTS
                .iter()
                .map(|(stem, text)| -> Result<Discovered> {
                    let manifest = PluginManifest::parse(text, stem, Path::new(stem))?;
                    if let Some(file) = manifest.macro_files.first() {
                        return Err(PluginError::MissingMacroFile {
                            plugin: manifest.name.clone(),
                            file: file.clone(),
                            location: PathBuf::from(self.to_string()),
                        }
                        .into());
                    }
                    Ok(Discovered {
                        manifest,
                        macro_files: Vec::new(),
                    })
                })
                .collect(),
            PluginSource::Directory(dir) => scan_directory(dir),
        }
    }
}

fn scan_directory(dir: &Path) -> Result<Vec<Discovered>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Plugin directory does not exist, skipping");
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read plugin directory: {}", dir.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut manifests = Vec::new();
    let mut macro_files = HashMap::new();

    for path in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
                manifests.push(PluginManifest::parse(&text, &stem, &path)?);
            }
            Some("tex") | Some("sty") => {
                macro_files.insert(file_name.to_string(), path.clone());
            }
            _ => {}
        }
    }

    manifests
        .into_iter()
        .map(|manifest| -> Result<Discovered> {
            let files = manifest
                .macro_files
                .iter()
                .map(|file| {
                    macro_files
                        .get(file)
                        .cloned()
                        .ok_or_else(|| PluginError::MissingMacroFile {
                            plugin: manifest.name.clone(),
                            file: file.clone(),
                            location: dir.to_path_buf(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            debug!(plugin = %manifest.name, dir = %dir.display(), "Discovered plugin");
            Ok(Discovered {
                manifest,
                macro_files: files,
            })
        })
        .collect()
}
