//! Registered custom commands and the decode filter

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::spec::{CommandSpec, Form, INTERRUPT, PAD_INLINES};
use crate::filter::{FilterContext, FilterEntry};
use crate::macros::MacroTable;
use crate::tree::{self, Action};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Custom command '{0}' is not registered")]
    UnregisteredCommand(String),

    #[error("Malformed wrapper for custom command '{0}'")]
    Malformed(String),
}

/// Called with the decoded arguments; the returned action replaces the wrapper
pub type DecodeFn =
    Arc<dyn Fn(&mut FilterContext<'_>, &str, &[Argument]) -> Result<Action> + Send + Sync>;

/// One decoded argument of a custom command
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    form: Form,
    value: Value,
}

impl Argument {
    /// Wraps the raw wrapper child: a list item (blocks) or a `Span`
    pub fn new(form: Form, value: Value) -> Self {
        Self { form, value }
    }

    pub fn form(&self) -> Form {
        self.form
    }

    /// The raw tree fragment
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The argument's plain text
    pub fn text(&self) -> String {
        tree::stringify(&self.value)
    }

    /// The argument as inline content
    pub fn inlines(&self) -> Vec<Value> {
        match self.form {
            Form::Inline => span_inlines(&self.value).to_vec(),
            Form::Block => {
                let blocks = self.value.as_array().map(Vec::as_slice).unwrap_or_default();
                let mut out = Vec::new();
                for (i, block) in blocks.iter().enumerate() {
                    if i > 0 {
                        out.push(tree::space());
                    }
                    match tree::kind(block) {
                        Some("Plain") | Some("Para") => {
                            if let Some(inlines) = tree::content(block).and_then(Value::as_array) {
                                out.extend(inlines.iter().cloned());
                            }
                        }
                        _ => out.extend(tree::inlines_from_text(&tree::stringify(block))),
                    }
                }
                out
            }
        }
    }

    /// The argument as block content
    pub fn blocks(&self) -> Vec<Value> {
        match self.form {
            Form::Block => self.value.as_array().cloned().unwrap_or_default(),
            Form::Inline => {
                let inlines = self.inlines();
                if inlines.is_empty() {
                    Vec::new()
                } else {
                    vec![tree::plain(inlines)]
                }
            }
        }
    }
}

fn span_inlines(span: &Value) -> &[Value] {
    tree::content(span)
        .and_then(|c| c.get(1))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// A registered command
#[derive(Clone)]
pub struct CustomCommand {
    pub name: String,
    pub args: usize,
    pub form: Form,
    pub callback: DecodeFn,
}

impl fmt::Debug for CustomCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCommand")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("form", &self.form)
            .finish_non_exhaustive()
    }
}

/// Shared handle to the table of registered custom commands.
///
/// Cloning shares the table: plugins register through their copy, the decode
/// filter reads through its own.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: Arc<RwLock<IndexMap<String, CustomCommand>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a command and returns the macro definitions that encode it
    pub fn register<F>(&self, spec: CommandSpec, callback: F) -> MacroTable
    where
        F: Fn(&mut FilterContext<'_>, &str, &[Argument]) -> Result<Action> + Send + Sync + 'static,
    {
        let macros = spec.macros();
        debug!(command = %spec.name, args = spec.decoded_args(), "Registering custom command");

        self.commands.write().insert(
            spec.name.clone(),
            CustomCommand {
                name: spec.name.clone(),
                args: spec.decoded_args(),
                form: spec.form,
                callback: Arc::new(callback),
            },
        );

        macros
    }

    pub fn get(&self, name: &str) -> Option<CustomCommand> {
        self.commands.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Decodes one element if it is an encoded wrapper.
    ///
    /// Returns `Keep` for anything else.
    pub fn decode(&self, ctx: &mut FilterContext<'_>, kind: &str, content: &Value) -> Result<Action> {
        let form = match kind {
            "BulletList" => Form::Block,
            "Strong" => Form::Inline,
            _ => return Ok(Action::Keep),
        };

        let Some(children) = content.as_array() else {
            return Ok(Action::Keep);
        };
        match children.first() {
            Some(first) if tree::stringify(first) == INTERRUPT => {}
            _ => return Ok(Action::Keep),
        }

        let name = children
            .get(1)
            .map(tree::stringify)
            .ok_or_else(|| DecodeError::Malformed(INTERRUPT.to_string()))?;
        let name = name.trim().to_string();

        let command = self
            .get(&name)
            .ok_or_else(|| DecodeError::UnregisteredCommand(name.clone()))?;

        let args: Vec<Argument> = children[2..]
            .iter()
            .map(|child| match form {
                Form::Inline => Argument::new(form, strip_padding(child)),
                Form::Block => Argument::new(form, child.clone()),
            })
            .collect();

        if args.len() != command.args {
            warn!(
                command = %name,
                expected = command.args,
                found = args.len(),
                "Custom command argument count mismatch"
            );
        }

        (command.callback)(ctx, &name, &args)
    }

    /// The filter that decodes every wrapper, at priority 0
    pub fn decode_filter(&self) -> FilterEntry {
        let table = self.clone();
        FilterEntry::new("core.decode", 0, move |ctx, kind, content| {
            table.decode(ctx, kind, content)
        })
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.commands.read().keys()).finish()
    }
}

/// Drops the padding inlines from the front of an inline argument span
fn strip_padding(span: &Value) -> Value {
    let mut span = span.clone();
    if let Some(inlines) = span
        .get_mut("c")
        .and_then(|c| c.get_mut(1))
        .and_then(Value::as_array_mut)
    {
        let n = PAD_INLINES.min(inlines.len());
        inlines.drain(..n);
    }
    span
}
