//! Test doubles for unit tests

use std::sync::Arc;

use serde_json::Value;

use crate::macros::{Expansion, ExpansionContext, MacroBody, MacroDef, MacroExpander, MacroTable};
use crate::state::DocumentState;
use crate::tree;

/// Line-based expander: `define:name=body` lines define macros, other lines pass through
pub struct TableExpander;

impl MacroExpander for TableExpander {
    fn expand(
        &mut self,
        source: &str,
        macros: &mut MacroTable,
        _state: &mut DocumentState,
    ) -> anyhow::Result<String> {
        let mut out = Vec::new();
        for line in source.lines() {
            match line.strip_prefix("define:").and_then(|d| d.split_once('=')) {
                Some((name, body)) => {
                    macros.insert(name.to_string(), Arc::new(MacroDef::template(0, body)));
                }
                None => out.push(line),
            }
        }
        Ok(out.join("\n"))
    }
}

/// Context whose `expand` returns its input unchanged
#[derive(Default)]
pub struct StubContext {
    pub macros: MacroTable,
    pub state: DocumentState,
}

impl StubContext {
    pub fn with_macros(macros: MacroTable) -> Self {
        Self {
            macros,
            state: DocumentState::new(),
        }
    }

    /// Calls the native macro `name` with `args`
    pub fn call(&mut self, name: &str, args: &[&str]) -> anyhow::Result<Expansion> {
        let def = self
            .macros
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("macro {name} is not defined"));
        let MacroBody::Native(f) = &def.body else {
            panic!("macro {name} is not native");
        };
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        f(self, &args)
    }
}

impl ExpansionContext for StubContext {
    fn expand(&mut self, source: &str) -> anyhow::Result<String> {
        Ok(source.to_string())
    }

    fn macros(&self) -> &MacroTable {
        &self.macros
    }

    fn macros_mut(&mut self) -> &mut MacroTable {
        &mut self.macros
    }

    fn state(&mut self) -> &mut DocumentState {
        &mut self.state
    }
}

const LIST_OPEN: &str = r"\begin{itemize}";
const LIST_CLOSE: &str = r"\end{itemize}";
const BOLD_OPEN: &str = r"\textbf\begingroup";
const BOLD_CLOSE: &str = r"\endgroup{}";

/// Reads expanded text the way the structural converter treats the inert
/// wrappers: lists become `BulletList`, bold groups become `Strong` of `Span`s,
/// everything else becomes words in a paragraph.
pub fn read_encoded(source: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    let mut inlines: Vec<Value> = Vec::new();
    let mut rest = source;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix(LIST_OPEN) {
            if !inlines.is_empty() {
                blocks.push(tree::para(std::mem::take(&mut inlines)));
            }
            let (body, tail) = after.split_once(LIST_CLOSE).expect("unterminated list");
            let items = body
                .split(r"\item")
                .skip(1)
                .map(|item| {
                    let words = tree::inlines_from_text(item);
                    if words.is_empty() {
                        Vec::new()
                    } else {
                        vec![tree::plain(words)]
                    }
                })
                .collect();
            blocks.push(tree::bullet_list(items));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix(BOLD_OPEN) {
            let (body, tail) = after.split_once(BOLD_CLOSE).expect("unterminated bold group");
            let spans = body
                .split('{')
                .skip(1)
                .map(|group| {
                    let content = group.split('}').next().unwrap_or_default();
                    tree::span(tree::empty_attr(), tree::inlines_from_text(content))
                })
                .collect();
            inlines.push(tree::strong(spans));
            rest = tail;
        } else {
            let end = [LIST_OPEN, BOLD_OPEN]
                .iter()
                .filter_map(|marker| rest.find(marker))
                .min()
                .unwrap_or(rest.len());
            let segment = &rest[..end];
            if segment.starts_with(char::is_whitespace) && !inlines.is_empty() {
                inlines.push(tree::space());
            }
            inlines.extend(tree::inlines_from_text(segment));
            if segment.ends_with(char::is_whitespace) && !segment.trim().is_empty() {
                inlines.push(tree::space());
            }
            rest = &rest[end..];
        }
    }

    if !inlines.is_empty() {
        blocks.push(tree::para(inlines));
    }
    blocks
}
