//! # Orchestrator
//!
//! [`Pilot`] wires the plugin manager, the macro registry and the converter
//! into the per-document pipeline:
//!
//! ```text
//! source ─▶ expand ─▶ resolve slots ─▶ to_tree ─▶ filters ─▶ to_html
//! ```
//!
//! Each document gets a fresh [`DocumentState`]; the macro table and the
//! loaded plugins are shared by every document the pilot converts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::convert::{Converter, PandocConverter};
use crate::filter::FilterChain;
use crate::macros::{MacroRegistry, ProcessExpander};
use crate::plugin::PluginManager;
use crate::state::DocumentState;
use crate::storage::Config;

/// Output format handed to filters
const TARGET_FORMAT: &str = "html";

pub struct Pilot {
    manager: PluginManager,
    registry: MacroRegistry,
    converter: Box<dyn Converter>,
    plugins: Vec<String>,
    macro_files: Vec<PathBuf>,
    started: bool,
}

impl Pilot {
    pub fn new(
        manager: PluginManager,
        registry: MacroRegistry,
        converter: Box<dyn Converter>,
    ) -> Self {
        Self {
            manager,
            registry,
            converter,
            plugins: Vec::new(),
            macro_files: Vec::new(),
            started: false,
        }
    }

    /// Builds the pandoc pipeline described by a configuration.
    ///
    /// Nothing is started; plugin directories are searched after the builtin
    /// plugins.
    pub fn from_config(config: &Config) -> Self {
        let manager = plugin_manager(config);
        let expander = &config.project.expander;
        let registry = MacroRegistry::new(Box::new(
            ProcessExpander::new(expander.command.clone()).with_args(expander.args.clone()),
        ));
        let converter = PandocConverter::from_config(&config.project.pandoc, |p| config.resolve(p));

        let mut pilot = Self::new(manager, registry, Box::new(converter));
        for name in &config.project.plugins {
            pilot.require_plugin(name.clone());
        }
        pilot.macro_files.extend(config.macro_files());
        pilot
    }

    /// Adds a plugin to load at start, besides the auto-load ones
    pub fn require_plugin(&mut self, name: impl Into<String>) {
        self.plugins.push(name.into());
    }

    /// Adds a macro file applied after the plugins.
    ///
    /// Once started the file is loaded right away.
    pub fn add_macro_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if self.started {
            self.registry.load_file(&path)?;
        }
        self.macro_files.push(path);
        Ok(())
    }

    /// Discovers plugins, loads the auto-load ones in discovery order, then
    /// the required ones, then the macro files. Does nothing when started.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.manager.discover()?;
        self.manager.load_auto(&mut self.registry)?;
        for name in &self.plugins {
            self.manager
                .load(name, &mut self.registry)
                .with_context(|| format!("Failed to load plugin '{}'", name))?;
        }
        for file in &self.macro_files {
            self.registry.load_file(file)?;
        }

        self.started = true;
        info!(
            plugins = self.manager.loaded().len(),
            macros = self.registry.macros().len(),
            "Pipeline started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Loads one more plugin (and what it requires), starting first if needed
    pub fn load_plugin(&mut self, name: &str) -> Result<()> {
        self.start()?;
        self.manager.load(name, &mut self.registry)
    }

    /// Converts one LaTeX document to HTML
    pub fn process(&mut self, source: &str) -> Result<String> {
        self.start()?;
        self.manager.reset_all();

        let mut state = DocumentState::new();
        let expanded = self.registry.expand_document(source, &mut state)?;
        let expanded = state.resolve_slots(&expanded);
        debug!(bytes = expanded.len(), slots = state.slots().len(), "Document expanded");

        let doc = self
            .converter
            .to_tree(&expanded)
            .context("Failed to convert expanded document")?;

        let chain = FilterChain::from_entries(self.manager.filters());
        let doc = chain.apply(doc, TARGET_FORMAT, &mut state)?;

        self.converter
            .to_html(&doc)
            .context("Failed to render document")
    }

    /// Reads and converts a file
    pub fn process_file(&mut self, path: &Path) -> Result<String> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input: {}", path.display()))?;
        self.process(&source)
            .with_context(|| format!("Failed to process {}", path.display()))
    }

    /// Picks up an edited macro file.
    ///
    /// A file of a loaded plugin reloads that plugin; one of the pilot's own
    /// macro files is loaded again. Returns false for unrelated paths.
    pub fn refresh(&mut self, path: &Path) -> Result<bool> {
        if !self.started {
            return Ok(false);
        }

        let owner = self
            .manager
            .loaded()
            .iter()
            .filter_map(|name| self.manager.get(name))
            .find(|plugin| plugin.macro_files().iter().any(|f| same_file(f, path)))
            .map(|plugin| plugin.name().to_string());

        if let Some(name) = owner {
            self.manager.reload(&name, &mut self.registry)?;
            return Ok(true);
        }

        if self.macro_files.iter().any(|f| same_file(f, path)) {
            self.registry.load_file(path)?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Finalizes every loaded plugin, in load order.
    ///
    /// The pilot counts as stopped even if a plugin fails to finalize; the
    /// next document starts it again with fresh plugins.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        debug!("Stopping pipeline");
        self.started = false;
        self.manager.finalize_all()
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    /// Paths worth watching besides the input: plugin and pilot macro files
    pub fn watched_files(&self) -> Vec<PathBuf> {
        self.manager
            .loaded()
            .iter()
            .filter_map(|name| self.manager.get(name))
            .flat_map(|plugin| plugin.macro_files().iter().cloned())
            .chain(self.macro_files.iter().cloned())
            .collect()
    }
}

/// A manager searching the builtin plugins, then the configured directories
pub fn plugin_manager(config: &Config) -> PluginManager {
    let mut manager = PluginManager::with_builtins().with_settings(config.code_settings());
    for dir in config.plugin_dirs() {
        manager.add_dir(dir);
    }
    manager
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
