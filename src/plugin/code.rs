//! Plugin code objects
//!
//! A manifest's `code` field is a key into the [`CodeRegistry`], which maps it
//! to a factory registered at startup. The factory builds the plugin's
//! [`PluginCode`], the Rust side of the plugin.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;

use super::error::PluginError;
use super::manifest::PluginManifest;
use crate::encode::CommandTable;
use crate::filter::FilterEntry;
use crate::macros::MacroTable;

/// Default math renderer command
pub const DEFAULT_MATH_COMMAND: &str = "katex_json_cli";

/// Process-wide settings code objects may need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSettings {
    pub math_command: String,
    pub math_args: Vec<String>,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            math_command: DEFAULT_MATH_COMMAND.to_string(),
            math_args: Vec::new(),
        }
    }
}

/// What a code object sees while it is created and asked for macros
pub struct CodeContext<'a> {
    pub manifest: &'a PluginManifest,
    pub settings: &'a CodeSettings,

    /// Custom command registry shared by every plugin
    pub commands: &'a CommandTable,
}

/// The behavior a plugin implements in Rust
pub trait PluginCode: Send {
    /// Macros to merge into the shared table when the plugin loads
    fn macros(&mut self, _ctx: &CodeContext<'_>) -> Result<MacroTable> {
        Ok(MacroTable::new())
    }

    /// Tree filters this plugin contributes
    fn filters(&self) -> Vec<FilterEntry> {
        Vec::new()
    }

    /// Called before every document
    fn reset(&mut self) {}

    /// Called once when the pipeline stops
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds a code object for one plugin
pub type CodeFactory = Arc<dyn Fn(&CodeContext<'_>) -> Result<Box<dyn PluginCode>> + Send + Sync>;

/// Code key → factory
#[derive(Clone, Default)]
pub struct CodeRegistry {
    factories: IndexMap<String, CodeFactory>,
}

impl CodeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `builtin.*` codes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&CodeContext<'_>) -> Result<Box<dyn PluginCode>> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the code object named by `key`
    pub fn instantiate(&self, key: &str, ctx: &CodeContext<'_>) -> Result<Box<dyn PluginCode>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| PluginError::UnknownCode {
                plugin: ctx.manifest.name.clone(),
                code: key.to_string(),
            })?;

        factory(ctx)
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;
    impl PluginCode for Nothing {}

    #[test]
    fn instantiates_registered_code() {
        let mut registry = CodeRegistry::new();
        registry.register("test.nothing", |_| Ok(Box::new(Nothing)));

        let manifest = PluginManifest::new("p");
        let settings = CodeSettings::default();
        let commands = CommandTable::new();
        let ctx = CodeContext {
            manifest: &manifest,
            settings: &settings,
            commands: &commands,
        };

        let mut code = registry.instantiate("test.nothing", &ctx).unwrap();
        assert!(code.macros(&ctx).unwrap().is_empty());
        assert!(code.filters().is_empty());
    }

    #[test]
    fn unknown_key_is_reported() {
        let registry = CodeRegistry::new();
        let manifest = PluginManifest::new("p");
        let settings = CodeSettings::default();
        let commands = CommandTable::new();
        let ctx = CodeContext {
            manifest: &manifest,
            settings: &settings,
            commands: &commands,
        };

        let err = registry.instantiate("missing.code", &ctx).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::UnknownCode { code, .. }) if code == "missing.code"
        ));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = CodeRegistry::with_builtins();
        for key in [
            "builtin.core",
            "builtin.labels",
            "builtin.citations",
            "builtin.katex",
            "builtin.environments",
        ] {
            assert!(registry.contains(key), "{key} missing");
        }
    }
}
