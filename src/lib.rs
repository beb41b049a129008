//! texpilot - plugin-driven LaTeX to HTML conversion around pandoc
//!
//! A document goes through an external macro expander, pandoc's LaTeX reader,
//! a chain of tree filters and pandoc's HTML writer. Plugins bundle the macro
//! definitions, custom commands and filters that shape each step, and are
//! loaded in dependency order.

pub mod builtin;
pub mod cli;
pub mod convert;
pub mod encode;
pub mod filter;
pub mod macros;
pub mod pipeline;
pub mod plugin;
pub mod state;
pub mod storage;
pub mod tree;

#[cfg(test)]
mod testing;

pub use convert::{Converter, PandocConverter};
pub use encode::{CommandSpec, CommandTable};
pub use filter::{FilterChain, FilterContext, FilterEntry};
pub use macros::{Expansion, MacroDef, MacroExpander, MacroRegistry, MacroTable};
pub use pipeline::Pilot;
pub use plugin::{PluginCode, PluginManager, PluginManifest};
pub use state::DocumentState;
pub use storage::Config;
pub use tree::Action;
