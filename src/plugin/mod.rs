//! # Plugin System
//!
//! Plugins add macros, custom commands and tree filters to the pipeline.
//!
//! ## Overview
//!
//! A plugin is a JSON manifest plus optional macro files and an optional code
//! object. Manifests are found in search locations; later locations override
//! earlier ones by name.
//!
//! | Location | Contents |
//! |----------|----------|
//! | Builtin | Manifests compiled into the binary (`core`, `labels`, ...) |
//! | Directory | `*.json` manifests, `*.tex`/`*.sty` macro files |
//!
//! ## Loading
//!
//! ```text
//! load(labels)
//!  ├── mark in progress
//!  ├── load(core)              every entry of `requires`, depth first
//!  ├── code object             instantiate, merge its macros
//!  ├── macro files             run through the expander, in order
//!  ├── contribution            table after minus table before
//!  └── mark loaded
//! ```
//!
//! Code objects are looked up by key in the [`CodeRegistry`]; there is no
//! runtime code loading.
//!
//! ## Key Types
//!
//! - [`PluginManager`] - Discovers plugins and loads them in dependency order
//! - [`PluginManifest`] - Declares a plugin
//! - [`PluginCode`] - Rust side of a plugin
//! - [`CodeRegistry`] - Code key → factory
//! - [`DependencyGraph`] - Whole-graph validation

mod code;
mod error;
mod graph;
mod manager;
mod manifest;
mod source;

pub use code::{
    CodeContext, CodeFactory, CodeRegistry, CodeSettings, PluginCode, DEFAULT_MATH_COMMAND,
};
pub use error::PluginError;
pub use graph::{DependencyGraph, GraphError};
pub use manager::{LoadState, Plugin, PluginManager};
pub use manifest::PluginManifest;
pub use source::{Discovered, PluginSource};
