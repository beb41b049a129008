//! # Built-in Plugins
//!
//! Plugins shipped inside the binary. Their manifests are embedded and their
//! code objects are registered under `builtin.*` keys.
//!
//! | Plugin | Code key | Provides |
//! |--------|----------|----------|
//! | `core` | `builtin.core` | Decode filter, `span`/`div`/`rawHTML`/`Div`, counters and control macros |
//! | `environments` | `builtin.environments` | `@pushenvir`, `@popenvir`, `@currenvir` |
//! | `labels` | `builtin.labels` | Label stack macros, link rewriting |
//! | `citations` | `builtin.citations` | Reference collection, `fullcite` |
//! | `katex` | `builtin.katex` | Math rendering through an external process |

mod citations;
mod control;
mod core;
mod environments;
mod katex;
mod labels;

pub use self::core::{html_element, raw_html, span_spec, CoreCode};
pub use citations::{CitationTable, CitationsCode};
pub use environments::{EnvironmentStack, EnvironmentsCode};
pub use katex::{KatexCode, MathError, MathRenderer};
pub use labels::{LabelState, LabelTarget, LabelsCode};

use crate::plugin::CodeRegistry;

/// Embedded manifests as (file stem, JSON text)
pub const MANIFESTS: &[(&str, &str)] = &[
    ("citations", include_str!("manifests/citations.json")),
    ("core", include_str!("manifests/core.json")),
    ("environments", include_str!("manifests/environments.json")),
    ("katex", include_str!("manifests/katex.json")),
    ("labels", include_str!("manifests/labels.json")),
];

/// Registers every built-in code object
pub fn register(registry: &mut CodeRegistry) {
    registry.register("builtin.core", |ctx| Ok(Box::new(CoreCode::new(ctx))));
    registry.register("builtin.environments", |_| Ok(Box::new(EnvironmentsCode)));
    registry.register("builtin.labels", |_| Ok(Box::new(LabelsCode)));
    registry.register("builtin.citations", |_| Ok(Box::new(CitationsCode)));
    registry.register("builtin.katex", |ctx| Ok(Box::new(KatexCode::start(ctx)?)));
}
