//! Per-document state
//!
//! Every document pass gets a fresh [`DocumentState`]. Plugin code keeps its
//! per-document data (label stack, citation table, environment stack) here
//! instead of in the plugin object, so two documents can never see each
//! other's state. The same value flows from macro expansion into the filter
//! pass, which is how a label recorded while expanding is visible to the
//! filter that rewrites links.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

use crate::macros::SlotArena;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackError {
    #[error("Cannot pop the {0} stack: no scope is open")]
    Underflow(&'static str),
}

/// Typed per-document storage shared by macros and filters
#[derive(Default)]
pub struct DocumentState {
    entries: HashMap<TypeId, Box<dyn Any + Send>>,
    slots: SlotArena,
}

impl DocumentState {
    /// Creates an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of type `T`, if any was created during this pass
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<T>())
    }

    /// Returns the state of type `T`, creating it from `Default` on first use
    pub fn get_mut<T: Any + Send + Default>(&mut self) -> &mut T {
        self.entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("entry is keyed by its own TypeId")
    }

    /// Returns true if state of type `T` exists
    pub fn contains<T: Any + Send>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Placeholder slots allocated during expansion
    pub fn slots(&self) -> &SlotArena {
        &self.slots
    }

    /// Mutable access to the placeholder slots
    pub fn slots_mut(&mut self) -> &mut SlotArena {
        &mut self.slots
    }

    /// Replaces every slot placeholder in `text` with the slot's final content
    pub fn resolve_slots(&self, text: &str) -> String {
        self.slots.resolve(text)
    }
}

impl std::fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentState")
            .field("entries", &self.entries.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}
