//! # Macro Registry Adapter
//!
//! The boundary to the external macro expander.
//!
//! texpilot never expands macros itself. It keeps the shared macro table,
//! lets plugins add definitions to it (template bodies or native Rust
//! callbacks), hands the table to an expander, and records which entries each
//! plugin contributed.
//!
//! ## Key Types
//!
//! - [`MacroTable`] - Name → shared definition, identity-compared
//! - [`MacroDef`] - Argument count, optional default, body
//! - [`MacroExpander`] - The external expander contract
//! - [`ExpansionContext`] - What native macros may use while running
//! - [`MacroRegistry`] - Owns the table and the expander
//! - [`ProcessExpander`] - Expander running as a child process
//! - [`SlotArena`] - Output placeholders that can be rewritten later

mod expander;
mod process;
mod registry;
mod slot;
mod table;

pub use expander::{ExpandError, ExpansionContext, MacroExpander};
pub use process::ProcessExpander;
pub use registry::MacroRegistry;
pub use slot::{SlotArena, SlotId};
pub use table::{
    diff_contribution, substitute_params, Expansion, MacroBody, MacroDef, MacroTable, NativeMacro,
};
