//! The expander boundary
//!
//! Macro expansion itself is done by an external component. This module only
//! fixes the contract between that component and the plugin code:
//!
//! - the expander receives the macro table and may add definitions to it
//!   (`\newcommand` and friends in the source write back into the table);
//! - template bodies substitute `#1`..`#n`, and a definition with a `default`
//!   takes its first argument from an optional `[...]` group;
//! - environments `\begin{foo}`/`\end{foo}` map onto the macros `foo`/`endfoo`;
//! - native bodies are called through [`ExpansionContext`]: `Text` results are
//!   rescanned, `Verbatim` results are emitted untouched.

use thiserror::Error;

use super::table::MacroTable;
use crate::state::DocumentState;

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("Expander reported an error: {0}")]
    Remote(String),

    #[error("Expander called unknown native macro: {0}")]
    UnknownNative(String),

    #[error("Expander exited without producing output")]
    NoOutput,

    #[error("Expander exited with {0}")]
    Exit(std::process::ExitStatus),

    #[error("Invalid expander message: {0}")]
    Protocol(String),
}

/// Services an expander offers to native macros while they run
pub trait ExpansionContext {
    /// Expands `source` with the current macro table
    fn expand(&mut self, source: &str) -> anyhow::Result<String>;

    /// The macro table in effect
    fn macros(&self) -> &MacroTable;

    /// Mutable macro table, for macros that define other macros
    fn macros_mut(&mut self) -> &mut MacroTable;

    /// The state of the document being expanded
    fn state(&mut self) -> &mut DocumentState;
}

/// An external macro expander
pub trait MacroExpander: Send {
    /// Expands `source`, writing any definitions it makes back into `macros`
    fn expand(
        &mut self,
        source: &str,
        macros: &mut MacroTable,
        state: &mut DocumentState,
    ) -> anyhow::Result<String>;
}
