//! # Structural Converter
//!
//! Turns expanded LaTeX into the intermediate tree and the filtered tree into
//! HTML.
//!
//! ```text
//! expanded LaTeX ──to_tree──▶ tree ──filters──▶ tree ──to_html──▶ HTML
//! ```
//!
//! The tree is pandoc's JSON document (`{"pandoc-api-version":..,"meta":..,"blocks":[..]}`).

mod pandoc;

use anyhow::Result;
use serde_json::Value;

pub use pandoc::{ConvertError, PandocConverter};

/// Converts between LaTeX, the intermediate tree and HTML
pub trait Converter: Send {
    /// Parses expanded LaTeX into a document tree
    fn to_tree(&self, latex: &str) -> Result<Value>;

    /// Renders a document tree as HTML
    fn to_html(&self, doc: &Value) -> Result<String>;
}
