//! Tree filters and their composition
//!
//! Every loaded plugin contributes [`FilterEntry`] values. The pipeline
//! gathers them in load order, stable-sorts them by ascending priority and
//! applies them one after the other, each over the output of the previous one.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::state::DocumentState;
use crate::tree::{self, Action};

/// A filter callback: shown each element's kind and content, decides its fate
pub type FilterFn =
    Arc<dyn Fn(&mut FilterContext<'_>, &str, &Value) -> Result<Action> + Send + Sync>;

/// What a filter can see besides the element itself
pub struct FilterContext<'a> {
    /// The document's state, shared with the macro expansion that produced it
    pub state: &'a mut DocumentState,

    /// Target output format
    pub format: &'a str,

    /// Document metadata as it stood when this filter's pass began
    pub meta: &'a Value,
}

/// A filter with its priority; lower priorities run first
#[derive(Clone)]
pub struct FilterEntry {
    pub name: String,
    pub priority: i32,
    pub callback: FilterFn,
}

impl FilterEntry {
    pub fn new<F>(name: impl Into<String>, priority: i32, callback: F) -> Self
    where
        F: Fn(&mut FilterContext<'_>, &str, &Value) -> Result<Action> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The composed, ordered filter list
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    entries: Vec<FilterEntry>,
}

impl FilterChain {
    /// Orders entries by priority, keeping the given order among equal priorities
    pub fn from_entries(mut entries: Vec<FilterEntry>) -> Self {
        // sort_by_key is stable
        entries.sort_by_key(|entry| entry.priority);
        Self { entries }
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every filter over the document, in order
    pub fn apply(&self, mut doc: Value, format: &str, state: &mut DocumentState) -> Result<Value> {
        for entry in &self.entries {
            debug!(filter = %entry.name, priority = entry.priority, "Applying filter");

            let meta = doc.get("meta").cloned().unwrap_or(Value::Null);
            let mut ctx = FilterContext {
                state: &mut *state,
                format,
                meta: &meta,
            };
            let callback = &entry.callback;

            doc = tree::walk(doc, &mut |kind, content| callback(&mut ctx, kind, content))
                .with_context(|| format!("Filter '{}' failed", entry.name))?;
        }

        Ok(doc)
    }
}
