//! Full citations taken from the converter's rendered bibliography

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::encode::{Argument, CommandSpec};
use crate::filter::{FilterContext, FilterEntry};
use crate::macros::MacroTable;
use crate::plugin::{CodeContext, PluginCode};
use crate::tree::{self, Action};

/// Id of the block holding the rendered references
const REFS_ID: &str = "refs";

/// Prefix the converter puts on every reference entry id
const REF_PREFIX: &str = "ref-";

/// Rendered bibliography entries of the current document, by entry id
#[derive(Debug, Default)]
pub struct CitationTable {
    entries: IndexMap<String, Value>,
}

impl CitationTable {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&format!("{REF_PREFIX}{key}"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Moves the children of the references block into the citation table
pub fn collect_references(
    ctx: &mut FilterContext<'_>,
    kind: &str,
    content: &Value,
) -> Result<Action> {
    if kind != "Div" || content.pointer("/0/0").and_then(Value::as_str) != Some(REFS_ID) {
        return Ok(Action::Keep);
    }

    let table = ctx.state.get_mut::<CitationTable>();
    for entry in content.get(1).and_then(Value::as_array).into_iter().flatten() {
        if let Some(id) = entry.pointer("/c/0/0").and_then(Value::as_str) {
            table.entries.insert(id.to_string(), entry.clone());
        }
    }

    debug!(count = table.len(), "Collected references");
    Ok(Action::delete())
}

/// Replaces `\fullcite{key}` with the rendered entry
pub fn fullcite(ctx: &mut FilterContext<'_>, _: &str, args: &[Argument]) -> Result<Action> {
    let key = args.first().map(Argument::text).unwrap_or_default();
    let key = key.trim();

    let entry = ctx
        .state
        .get::<CitationTable>()
        .and_then(|table| table.get(key))
        .cloned();

    Ok(Action::Replace(entry.unwrap_or_else(|| {
        warn!(key = %key, "No reference entry for citation");
        tree::para(tree::inlines_from_text(key))
    })))
}

pub struct CitationsCode;

impl PluginCode for CitationsCode {
    fn macros(&mut self, ctx: &CodeContext<'_>) -> Result<MacroTable> {
        Ok(ctx
            .commands
            .register(CommandSpec::block("fullcite", 1), fullcite))
    }

    fn filters(&self) -> Vec<FilterEntry> {
        vec![FilterEntry::new("citations.collect", -100, collect_references)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DocumentState;
    use serde_json::json;

    fn entry(id: &str, text: &str) -> Value {
        tree::div(tree::attr(id, &[], &[]), vec![tree::para(tree::inlines_from_text(text))])
    }

    fn refs_block() -> Value {
        json!([
            ["refs", ["references"], []],
            [entry("ref-knuth", "Knuth 1984"), entry("ref-lamport", "Lamport 1986")]
        ])
    }

    fn with_ctx<T>(state: &mut DocumentState, f: impl FnOnce(&mut FilterContext<'_>) -> T) -> T {
        let meta = Value::Null;
        let mut ctx = FilterContext {
            state,
            format: "html",
            meta: &meta,
        };
        f(&mut ctx)
    }

    #[test]
    fn references_block_is_collected_and_removed() {
        let mut state = DocumentState::new();

        let action = with_ctx(&mut state, |ctx| {
            collect_references(ctx, "Div", &refs_block()).unwrap()
        });

        assert_eq!(action, Action::delete());
        let table = state.get::<CitationTable>().unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("knuth").is_some());
    }

    #[test]
    fn other_divs_are_kept() {
        let mut state = DocumentState::new();
        let content = json!([["note", [], []], []]);

        let action = with_ctx(&mut state, |ctx| {
            collect_references(ctx, "Div", &content).unwrap()
        });

        assert_eq!(action, Action::Keep);
        assert!(state.get::<CitationTable>().is_none());
    }

    #[test]
    fn fullcite_inserts_entry_or_key() {
        let mut state = DocumentState::new();
        let key = |k: &str| {
            Argument::new(
                crate::encode::Form::Block,
                json!([tree::plain(vec![tree::text(k)])]),
            )
        };

        let (hit, miss) = with_ctx(&mut state, |ctx| {
            collect_references(ctx, "Div", &refs_block()).unwrap();
            (
                fullcite(ctx, "fullcite", &[key("knuth")]).unwrap(),
                fullcite(ctx, "fullcite", &[key("nobody")]).unwrap(),
            )
        });

        assert_eq!(hit, Action::Replace(entry("ref-knuth", "Knuth 1984")));
        assert_eq!(miss, Action::Replace(tree::para(vec![tree::text("nobody")])));
    }
}
