//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `render <input> [-o out]` | Convert one LaTeX file to HTML |
//! | `watch <input> -o out` | Re-render when the input or a macro file changes |
//! | `plugins list` | Discovered plugins, in discovery order |
//! | `plugins check` | Missing dependencies, cycles and a load order |
//! | `plugins show <name> [--load]` | One manifest, optionally with its contribution |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Library events go through `tracing` to stderr. `RUST_LOG` selects what is
//! shown (default `warn`); `--verbose` switches to `texpilot=debug`:
//! ```bash
//! texpilot --verbose render paper.tex -o paper.html
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod plugin_cmd;
mod render;
mod watch;

pub use app::{run, Cli, Commands, PipelineArgs};
pub use output::{Output, OutputFormat};
