//! The core plugin: custom command decoding, html elements, control macros

use anyhow::Result;

use super::control;
use crate::encode::{Argument, CommandSpec, CommandTable, Form};
use crate::filter::{FilterContext, FilterEntry};
use crate::macros::MacroTable;
use crate::plugin::{CodeContext, PluginCode};
use crate::tree::{self, Action};

/// `\span[attrs]{id}{classes}{content}`
pub fn span_spec() -> CommandSpec {
    CommandSpec::inline("span", 4).with_default("")
}

/// Parses `key="value", other='x'` into attribute pairs
fn parse_attributes(text: &str) -> Vec<(String, String)> {
    text.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Builds a `Div` (block form) or `Span` (inline form) from
/// `[attributes, id, classes, content]`
pub fn html_element(_: &mut FilterContext<'_>, _: &str, args: &[Argument]) -> Result<Action> {
    let text = |i: usize| args.get(i).map(Argument::text).unwrap_or_default();

    let pairs = parse_attributes(&text(0));
    let id = text(1).trim().to_string();
    let classes: Vec<String> = text(2).split_whitespace().map(str::to_string).collect();
    let attr = tree::attr(&id, &classes, &pairs);

    let Some(content) = args.get(3) else {
        return Ok(Action::Replace(match content_form(args) {
            Form::Block => tree::div(attr, Vec::new()),
            Form::Inline => tree::span(attr, Vec::new()),
        }));
    };

    Ok(Action::Replace(match content.form() {
        Form::Block => tree::div(attr, content.blocks()),
        Form::Inline => tree::span(attr, content.inlines()),
    }))
}

fn content_form(args: &[Argument]) -> Form {
    args.first().map_or(Form::Block, Argument::form)
}

/// Emits its argument's text as a raw HTML block
pub fn raw_html(_: &mut FilterContext<'_>, _: &str, args: &[Argument]) -> Result<Action> {
    let html = args.first().map(Argument::text).unwrap_or_default();
    Ok(Action::Replace(tree::raw_block("html", &html)))
}

/// Owns the decode filter every other custom command relies on
pub struct CoreCode {
    commands: CommandTable,
}

impl CoreCode {
    pub fn new(ctx: &CodeContext<'_>) -> Self {
        Self {
            commands: ctx.commands.clone(),
        }
    }
}

impl PluginCode for CoreCode {
    fn macros(&mut self, _ctx: &CodeContext<'_>) -> Result<MacroTable> {
        let mut table = control::macros();

        table.extend(self.commands.register(span_spec(), html_element));
        table.extend(
            self.commands
                .register(CommandSpec::block("div", 4).with_default(""), html_element),
        );
        table.extend(
            self.commands
                .register(CommandSpec::block("rawHTML", 1), raw_html),
        );
        table.extend(
            self.commands
                .register(CommandSpec::environment("Div", 3).with_default(""), html_element),
        );

        Ok(table)
    }

    fn filters(&self) -> Vec<FilterEntry> {
        vec![self.commands.decode_filter()]
    }
}
