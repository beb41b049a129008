//! The shared macro table and its expander

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::expander::MacroExpander;
use super::table::{MacroDef, MacroTable};
use crate::state::DocumentState;

/// Owns the process-wide macro table and the expander that uses it
pub struct MacroRegistry {
    macros: MacroTable,
    expander: Box<dyn MacroExpander>,
}

impl MacroRegistry {
    /// Creates an empty registry around an expander
    pub fn new(expander: Box<dyn MacroExpander>) -> Self {
        Self {
            macros: MacroTable::new(),
            expander,
        }
    }

    /// The current table
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// A copy of the current table (definitions stay shared)
    pub fn snapshot(&self) -> MacroTable {
        self.macros.clone()
    }

    /// Puts back a table taken with [`snapshot`](Self::snapshot)
    pub fn restore(&mut self, snapshot: MacroTable) {
        self.macros = snapshot;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MacroDef>> {
        self.macros.get(name)
    }

    /// Adds one definition, replacing any previous one
    pub fn insert(&mut self, name: impl Into<String>, def: MacroDef) {
        self.macros.insert(name.into(), Arc::new(def));
    }

    /// Merges a table of definitions
    pub fn insert_all(&mut self, macros: MacroTable) {
        self.macros.extend(macros);
    }

    /// Removes a definition
    pub fn remove(&mut self, name: &str) -> Option<Arc<MacroDef>> {
        self.macros.shift_remove(name)
    }

    /// Removes the entries of a contribution that are still the same definitions.
    ///
    /// Entries that were re-defined since the contribution was recorded are
    /// kept. Returns the number of removed entries.
    pub fn retract(&mut self, contribution: &MacroTable) -> usize {
        let before = self.macros.len();
        self.macros.retain(|name, def| match contribution.get(name) {
            Some(contributed) => !Arc::ptr_eq(contributed, def),
            None => true,
        });
        before - self.macros.len()
    }

    /// Runs a macro file through the expander so its definitions enter the table
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read macro file: {}", path.display()))?;

        self.load_source(&source)
            .with_context(|| format!("Failed to load macro file: {}", path.display()))
    }

    /// Runs macro definitions through the expander, discarding the output
    pub fn load_source(&mut self, source: &str) -> Result<()> {
        let mut scratch = DocumentState::new();
        self.expander.expand(source, &mut self.macros, &mut scratch)?;
        Ok(())
    }

    /// Expands a document.
    ///
    /// The document runs against a copy of the table, so definitions it makes
    /// are dropped afterwards and never reach the next document.
    pub fn expand_document(&mut self, source: &str, state: &mut DocumentState) -> Result<String> {
        let mut local = self.macros.clone();
        self.expander
            .expand(source, &mut local, state)
            .context("Macro expansion failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TableExpander;

    fn registry() -> MacroRegistry {
        MacroRegistry::new(Box::new(TableExpander))
    }

    #[test]
    fn document_definitions_do_not_leak() {
        let mut registry = registry();
        let mut state = DocumentState::new();

        registry
            .expand_document("define:local=1", &mut state)
            .unwrap();

        assert!(!registry.contains("local"));
    }

    #[test]
    fn load_source_keeps_definitions() {
        let mut registry = registry();
        registry.load_source("define:shared=1").unwrap();

        assert!(registry.contains("shared"));
    }

    #[test]
    fn retract_removes_only_identical_entries() {
        let mut registry = registry();
        registry.insert("a", MacroDef::template(0, "A"));
        registry.insert("b", MacroDef::template(0, "B"));
        let contribution = registry.snapshot();

        // "b" is re-defined by someone else afterwards
        registry.insert("b", MacroDef::template(0, "B2"));

        assert_eq!(registry.retract(&contribution), 1);
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
    }

    #[test]
    fn load_file_reports_missing_file() {
        let mut registry = registry();
        let err = registry
            .load_file(Path::new("/nonexistent/macros.tex"))
            .unwrap_err();

        assert!(err.to_string().contains("macros.tex"));
    }
}
