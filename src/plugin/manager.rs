//! Plugin discovery and dependency-ordered loading

use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::code::{CodeContext, CodeRegistry, CodeSettings, PluginCode};
use super::error::PluginError;
use super::graph::DependencyGraph;
use super::manifest::PluginManifest;
use super::source::PluginSource;
use crate::encode::CommandTable;
use crate::filter::FilterEntry;
use crate::macros::{diff_contribution, MacroRegistry, MacroTable};

/// Load progress of one plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotStarted,
    InProgress,
    Loaded,
}

/// A discovered plugin and everything its load step produced
pub struct Plugin {
    manifest: PluginManifest,
    source: PluginSource,
    macro_files: Vec<PathBuf>,
    code: Option<Box<dyn PluginCode>>,
    filters: Vec<FilterEntry>,
    contribution: MacroTable,
    state: LoadState,
}

impl Plugin {
    fn new(manifest: PluginManifest, source: PluginSource, macro_files: Vec<PathBuf>) -> Self {
        Self {
            manifest,
            source,
            macro_files,
            code: None,
            filters: Vec::new(),
            contribution: MacroTable::new(),
            state: LoadState::NotStarted,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// The location the plugin was discovered in
    pub fn source(&self) -> &PluginSource {
        &self.source
    }

    pub fn macro_files(&self) -> &[PathBuf] {
        &self.macro_files
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn filters(&self) -> &[FilterEntry] {
        &self.filters
    }

    /// Macro table entries this plugin added or re-defined when it loaded
    pub fn contribution(&self) -> &MacroTable {
        &self.contribution
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.manifest.name)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("contribution", &self.contribution.len())
            .finish_non_exhaustive()
    }
}

/// Discovers plugins and loads them in dependency order.
///
/// Load bookkeeping is process-wide and not synchronized: callers converting
/// documents concurrently must serialize `load` calls themselves.
pub struct PluginManager {
    sources: Vec<PluginSource>,
    plugins: IndexMap<String, Plugin>,
    loaded: Vec<String>,
    codes: CodeRegistry,
    commands: CommandTable,
    settings: CodeSettings,
}

impl PluginManager {
    /// Creates a manager resolving code keys through `codes`
    pub fn new(codes: CodeRegistry) -> Self {
        Self {
            sources: Vec::new(),
            plugins: IndexMap::new(),
            loaded: Vec::new(),
            codes,
            commands: CommandTable::new(),
            settings: CodeSettings::default(),
        }
    }

    /// A manager that knows the builtin codes and searches the builtin plugins first
    pub fn with_builtins() -> Self {
        let mut manager = Self::new(CodeRegistry::with_builtins());
        manager.add_source(PluginSource::Builtin);
        manager
    }

    pub fn with_settings(mut self, settings: CodeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds a search location; later locations override earlier ones by name
    pub fn add_source(&mut self, source: PluginSource) {
        self.sources.push(source);
    }

    pub fn add_dir(&mut self, dir: impl Into<PathBuf>) {
        self.add_source(PluginSource::Directory(dir.into()));
    }

    pub fn sources(&self) -> &[PluginSource] {
        &self.sources
    }

    pub fn codes_mut(&mut self) -> &mut CodeRegistry {
        &mut self.codes
    }

    /// The custom commands registered by loaded plugins
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Rebuilds the plugin set from every search location.
    ///
    /// A plugin overridden by a later location keeps its original position.
    pub fn discover(&mut self) -> Result<()> {
        self.plugins.clear();
        self.loaded.clear();

        for source in &self.sources {
            for found in source.scan()? {
                let name = found.manifest.name.clone();
                if self.plugins.contains_key(&name) {
                    debug!(plugin = %name, source = %source, "Overriding plugin");
                }
                self.plugins.insert(
                    name,
                    Plugin::new(found.manifest, source.clone(), found.macro_files),
                );
            }
        }

        debug!(count = self.plugins.len(), "Plugin discovery finished");
        Ok(())
    }

    /// Plugins in discovery order
    pub fn list(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Names of loaded plugins, in load order
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.get(name).is_some_and(Plugin::is_loaded)
    }

    /// Loads a plugin after everything it requires.
    ///
    /// Loading an already loaded plugin does nothing. Re-entering a plugin
    /// whose load is still in progress is a circular dependency; the marks of
    /// every plugin on the failed path are cleared again.
    pub fn load(&mut self, name: &str, registry: &mut MacroRegistry) -> Result<()> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;

        match plugin.state {
            LoadState::Loaded => return Ok(()),
            LoadState::InProgress => {
                return Err(PluginError::CircularDependency(name.to_string()).into())
            }
            LoadState::NotStarted => {}
        }

        let requires = plugin.manifest.requires.clone();
        if let Some(missing) = requires.iter().find(|r| !self.plugins.contains_key(*r)) {
            return Err(PluginError::UnresolvedDependency {
                plugin: name.to_string(),
                dependency: missing.clone(),
            }
            .into());
        }

        self.set_state(name, LoadState::InProgress);

        let result = requires
            .iter()
            .try_for_each(|dependency| self.load(dependency, registry))
            .and_then(|()| self.load_internal(name, registry));

        match result {
            Ok(()) => {
                self.set_state(name, LoadState::Loaded);
                self.loaded.push(name.to_string());
                debug!(plugin = %name, "Plugin loaded");
                Ok(())
            }
            Err(err) => {
                self.set_state(name, LoadState::NotStarted);
                Err(err)
            }
        }
    }

    fn set_state(&mut self, name: &str, state: LoadState) {
        if let Some(plugin) = self.plugins.get_mut(name) {
            plugin.state = state;
        }
    }

    /// The plugin's own load step: code macros, then macro files, then the
    /// contribution diff.
    ///
    /// On failure the macro table is restored and a code object created by
    /// this step is dropped, so a retried load starts over.
    fn load_internal(&mut self, name: &str, registry: &mut MacroRegistry) -> Result<()> {
        let before = registry.snapshot();

        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        let had_code = plugin.code.is_some();

        let result = (|| -> Result<()> {
            if plugin.code.is_none() {
                if let Some(key) = &plugin.manifest.code {
                    let ctx = CodeContext {
                        manifest: &plugin.manifest,
                        settings: &self.settings,
                        commands: &self.commands,
                    };
                    let mut code = self
                        .codes
                        .instantiate(key, &ctx)
                        .with_context(|| format!("Failed to start code of plugin '{}'", name))?;
                    let macros = code.macros(&ctx)?;
                    debug!(plugin = %name, code = %key, macros = macros.len(), "Code object ready");

                    registry.insert_all(macros);
                    plugin.filters = code.filters();
                    plugin.code = Some(code);
                }
            }

            for file in &plugin.macro_files {
                debug!(plugin = %name, file = %file.display(), "Loading macro file");
                registry.load_file(file)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                plugin.contribution = diff_contribution(&before, registry.macros());
                Ok(())
            }
            Err(err) => {
                registry.restore(before);
                if !had_code {
                    plugin.code = None;
                    plugin.filters.clear();
                }
                Err(err)
            }
        }
    }

    /// Loads every auto-load plugin, in discovery order
    pub fn load_auto(&mut self, registry: &mut MacroRegistry) -> Result<()> {
        let names: Vec<String> = self
            .plugins
            .values()
            .filter(|p| p.manifest.auto_load)
            .map(|p| p.manifest.name.clone())
            .collect();

        for name in names {
            self.load(&name, registry)?;
        }
        Ok(())
    }

    /// Replaces a loaded plugin's macros with freshly loaded ones.
    ///
    /// Entries it contributed that nobody re-defined since are removed, then
    /// its code macros and macro files are applied again.
    pub fn reload(&mut self, name: &str, registry: &mut MacroRegistry) -> Result<()> {
        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        if !plugin.is_loaded() {
            anyhow::bail!("Plugin '{}' is not loaded", name);
        }

        let removed = registry.retract(&plugin.contribution);
        let before = registry.snapshot();

        if let Some(code) = plugin.code.as_mut() {
            let ctx = CodeContext {
                manifest: &plugin.manifest,
                settings: &self.settings,
                commands: &self.commands,
            };
            registry.insert_all(code.macros(&ctx)?);
        }
        for file in &plugin.macro_files {
            registry.load_file(file)?;
        }

        plugin.contribution = diff_contribution(&before, registry.macros());
        debug!(plugin = %name, removed, added = plugin.contribution.len(), "Plugin reloaded");
        Ok(())
    }

    /// Filters of every loaded plugin, in load order
    pub fn filters(&self) -> Vec<FilterEntry> {
        self.loaded
            .iter()
            .filter_map(|name| self.plugins.get(name))
            .flat_map(|plugin| plugin.filters.iter().cloned())
            .collect()
    }

    /// Runs every loaded code object's reset hook
    pub fn reset_all(&mut self) {
        for name in &self.loaded {
            if let Some(code) = self.plugins.get_mut(name).and_then(|p| p.code.as_mut()) {
                code.reset();
            }
        }
    }

    /// Finalizes every loaded code object, in load order.
    ///
    /// All of them are finalized even if one fails; the first error is returned.
    pub fn finalize_all(&mut self) -> Result<()> {
        let mut first_error = None;

        for name in &self.loaded {
            if let Some(code) = self.plugins.get_mut(name).and_then(|p| p.code.as_mut()) {
                if let Err(err) = code.finalize() {
                    warn!(plugin = %name, error = %err, "Plugin finalize failed");
                    first_error.get_or_insert(
                        err.context(format!("Failed to finalize plugin '{}'", name)),
                    );
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Requires-graph of every discovered plugin
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_manifests(self.plugins.values().map(|p| &p.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{Expansion, MacroDef};
    use crate::testing::TableExpander;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry() -> MacroRegistry {
        MacroRegistry::new(Box::new(TableExpander))
    }

    fn write_plugin(dir: &TempDir, name: &str, manifest: &str) {
        fs::write(dir.path().join(format!("{name}.json")), manifest).unwrap();
    }

    fn manager_for(dir: &TempDir) -> PluginManager {
        let mut manager = PluginManager::new(CodeRegistry::new());
        manager.add_dir(dir.path());
        manager.discover().unwrap();
        manager
    }

    #[test]
    fn dependencies_load_first() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", "{}");
        write_plugin(&dir, "b", r#"{"requires": ["a"]}"#);

        let mut manager = manager_for(&dir);
        let mut registry = registry();
        manager.load("b", &mut registry).unwrap();

        assert_eq!(manager.loaded(), ["a", "b"]);
    }

    #[test]
    fn loading_twice_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", "{}");
        write_plugin(&dir, "b", r#"{"requires": ["a"]}"#);
        write_plugin(&dir, "c", r#"{"requires": ["a", "b"]}"#);

        let mut manager = manager_for(&dir);
        let mut registry = registry();
        manager.load("c", &mut registry).unwrap();
        manager.load("b", &mut registry).unwrap();
        manager.load("c", &mut registry).unwrap();

        assert_eq!(manager.loaded(), ["a", "b", "c"]);
    }

    #[test]
    fn cycle_fails_and_leaves_nothing_loaded() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"requires": ["b"]}"#);
        write_plugin(&dir, "b", r#"{"requires": ["a"]}"#);

        let mut manager = manager_for(&dir);
        let mut registry = registry();
        let err = manager.load("a", &mut registry).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::CircularDependency(name)) if name == "a"
        ));
        assert!(manager.loaded().is_empty());
        assert!(manager
            .list()
            .all(|p| p.state() == LoadState::NotStarted));
    }

    #[test]
    fn unresolved_dependency_is_reported() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"requires": ["ghost"]}"#);

        let mut manager = manager_for(&dir);
        let err = manager.load("a", &mut registry()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::UnresolvedDependency { plugin, dependency })
                if plugin == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn unknown_plugin_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_for(&dir);

        let err = manager.load("nope", &mut registry()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn later_locations_override_earlier_ones() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_plugin(&first, "a", r#"{"description": "first"}"#);
        write_plugin(&first, "b", "{}");
        write_plugin(&second, "a", r#"{"description": "second"}"#);

        let mut manager = PluginManager::new(CodeRegistry::new());
        manager.add_dir(first.path());
        manager.add_dir(second.path());
        manager.discover().unwrap();

        let names: Vec<_> = manager.list().map(Plugin::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(manager.get("a").unwrap().manifest().description, "second");
    }

    #[test]
    fn auto_load_follows_discovery_order() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"requires": ["c"]}"#);
        write_plugin(&dir, "b", r#"{"auto_load": false}"#);
        write_plugin(&dir, "c", "{}");

        let mut manager = manager_for(&dir);
        manager.load_auto(&mut registry()).unwrap();

        assert_eq!(manager.loaded(), ["c", "a"]);
        assert!(!manager.is_loaded("b"));
    }

    #[test]
    fn contribution_tracks_macro_files() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"macro_files": ["a.tex"]}"#);
        fs::write(dir.path().join("a.tex"), "define:alpha=A").unwrap();
        write_plugin(&dir, "b", r#"{"requires": ["a"], "macro_files": ["b.tex"]}"#);
        fs::write(dir.path().join("b.tex"), "define:beta=B\ndefine:alpha=A").unwrap();

        let mut manager = manager_for(&dir);
        let mut registry = registry();
        manager.load("b", &mut registry).unwrap();

        let a: Vec<_> = manager.get("a").unwrap().contribution().keys().collect();
        let b: Vec<_> = manager.get("b").unwrap().contribution().keys().collect();

        assert_eq!(a, vec!["alpha"]);
        // Re-defining alpha to the same body still counts
        assert_eq!(b, vec!["alpha", "beta"]);
    }

    struct Counting {
        loads: Arc<AtomicUsize>,
        finals: Arc<AtomicUsize>,
    }

    impl PluginCode for Counting {
        fn macros(&mut self, ctx: &CodeContext<'_>) -> Result<MacroTable> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let mut table = MacroTable::new();
            table.insert(
                format!("{}-native", ctx.manifest.name),
                Arc::new(MacroDef::native(0, |_, _| Ok(Expansion::Empty))),
            );
            Ok(table)
        }

        fn filters(&self) -> Vec<FilterEntry> {
            vec![FilterEntry::new("counting", 5, |_, _, _| {
                Ok(crate::tree::Action::Keep)
            })]
        }

        fn finalize(&mut self) -> Result<()> {
            self.finals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A manager for `dir` whose `test.counting` code reports into the counters
    fn counting_manager(
        dir: &TempDir,
        loads: &Arc<AtomicUsize>,
        finals: &Arc<AtomicUsize>,
    ) -> PluginManager {
        let mut codes = CodeRegistry::new();
        let loads = Arc::clone(loads);
        let finals = Arc::clone(finals);
        codes.register("test.counting", move |_| {
            Ok(Box::new(Counting {
                loads: Arc::clone(&loads),
                finals: Arc::clone(&finals),
            }))
        });

        let mut manager = PluginManager::new(codes);
        manager.add_dir(dir.path());
        manager.discover().unwrap();
        manager
    }

    #[test]
    fn code_objects_are_instantiated_once() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"code": "test.counting"}"#);

        let loads = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));
        let mut manager = counting_manager(&dir, &loads, &finals);
        let mut registry = registry();

        manager.load("a", &mut registry).unwrap();
        manager.load("a", &mut registry).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.contains("a-native"));
        assert_eq!(manager.filters().len(), 1);
        assert!(manager.get("a").unwrap().contribution().contains_key("a-native"));

        manager.finalize_all().unwrap();
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_macro_file_rolls_back_the_load() {
        let dir = TempDir::new().unwrap();
        write_plugin(
            &dir,
            "a",
            r#"{"code": "test.counting", "macro_files": ["a.tex"]}"#,
        );

        let loads = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));
        let mut manager = counting_manager(&dir, &loads, &finals);
        let mut registry = registry();

        assert!(manager.load("a", &mut registry).is_err());
        assert!(!registry.contains("a-native"));
        assert!(!manager.get("a").unwrap().has_code());
        assert!(manager.filters().is_empty());

        fs::write(dir.path().join("a.tex"), "define:alpha=A").unwrap();
        manager.load("a", &mut registry).unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        let keys: Vec<_> = manager.get("a").unwrap().contribution().keys().collect();
        assert_eq!(keys, vec!["a-native", "alpha"]);
    }

    #[test]
    fn unknown_code_fails_the_load() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"code": "nowhere.code"}"#);

        let mut manager = manager_for(&dir);
        let err = manager.load("a", &mut registry()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::UnknownCode { .. })
        ));
        assert!(!manager.is_loaded("a"));
    }

    #[test]
    fn reload_replaces_contribution() {
        let dir = TempDir::new().unwrap();
        write_plugin(&dir, "a", r#"{"macro_files": ["a.tex"]}"#);
        fs::write(dir.path().join("a.tex"), "define:old=1").unwrap();

        let mut manager = manager_for(&dir);
        let mut registry = registry();
        manager.load("a", &mut registry).unwrap();

        fs::write(dir.path().join("a.tex"), "define:new=2").unwrap();
        manager.reload("a", &mut registry).unwrap();

        assert!(!registry.contains("old"));
        assert!(registry.contains("new"));
        let keys: Vec<_> = manager.get("a").unwrap().contribution().keys().collect();
        assert_eq!(keys, vec!["new"]);
    }
}
