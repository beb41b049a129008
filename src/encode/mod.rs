//! # Custom Command Encoding
//!
//! Plugin-defined commands have to cross two stages this crate does not own:
//! macro expansion (text in, text out) and structural conversion (text in,
//! tree out). They cross as inert wrappers the converter keeps intact.
//!
//! ```text
//! \note{hello}
//!   ── expand ──▶ \begin{itemize}\item @PANDOCINTERRUPT \item note \item hello \end{itemize}
//!   ── convert ─▶ BulletList [[@PANDOCINTERRUPT], [note], [hello]]
//!   ── decode ──▶ callback("note", [hello])
//! ```
//!
//! Block commands ride in an itemized list, inline commands in a bold group of
//! braced spans. Every inline argument starts with a padding marker so an
//! empty argument still produces a span; the decoder strips it again.
//!
//! ## Key Types
//!
//! - [`CommandSpec`] - Name, arity and form of a command; builds its macros
//! - [`CommandTable`] - Shared registry of commands and their decode callbacks
//! - [`Argument`] - A decoded argument, viewable as text, inlines or blocks

mod spec;
mod table;

pub use spec::{CommandSpec, Form, INTERRUPT, PAD, PAD_INLINES};
pub use table::{Argument, CommandTable, CustomCommand, DecodeError, DecodeFn};
