//! Label targets and cross references
//!
//! While a document expands, `\@labeltarget{content}{number}` marks content
//! that a later `\@wraptarget{label}` may wrap in an identifying span. The
//! marked content is emitted as a placeholder slot, so wrapping it afterwards
//! only rewrites the slot. `\@savelabel{label}{number}` records numbers for
//! the link filter, which replaces reference link text after conversion.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::core::span_spec;
use crate::filter::{FilterContext, FilterEntry};
use crate::macros::{Expansion, ExpansionContext, MacroDef, MacroTable, SlotId};
use crate::plugin::{CodeContext, PluginCode};
use crate::state::StackError;
use crate::tree::{self, Action};

/// Content marked as a label target and its rendered number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTarget {
    pub slot: SlotId,
    pub number: String,
}

/// Per-document label stack and label table
#[derive(Debug)]
pub struct LabelState {
    stack: Vec<Option<LabelTarget>>,
    labels: HashMap<String, String>,
}

impl Default for LabelState {
    fn default() -> Self {
        Self {
            stack: vec![None],
            labels: HashMap::new(),
        }
    }
}

impl LabelState {
    /// Opens a nested scope
    pub fn push(&mut self) {
        self.stack.push(None);
    }

    /// Closes the innermost scope; the base scope cannot be closed
    pub fn pop(&mut self) -> Result<(), StackError> {
        if self.stack.len() <= 1 {
            return Err(StackError::Underflow("label"));
        }
        self.stack.pop();
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Makes `target` the target of the innermost scope
    pub fn mark(&mut self, target: LabelTarget) {
        if let Some(top) = self.stack.last_mut() {
            *top = Some(target);
        }
    }

    /// The innermost scope's target, or the closest enclosing one
    pub fn nearest(&self) -> Option<&LabelTarget> {
        self.stack.iter().rev().find_map(Option::as_ref)
    }

    pub fn save(&mut self, label: impl Into<String>, number: impl Into<String>) {
        self.labels.insert(label.into(), number.into());
    }

    pub fn lookup(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }
}

fn push_label_stack(ctx: &mut dyn ExpansionContext, _: &[String]) -> Result<Expansion> {
    ctx.state().get_mut::<LabelState>().push();
    Ok(Expansion::Empty)
}

fn pop_label_stack(ctx: &mut dyn ExpansionContext, _: &[String]) -> Result<Expansion> {
    ctx.state().get_mut::<LabelState>().pop()?;
    Ok(Expansion::Empty)
}

fn label_target(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let content = ctx.expand(&args[0])?;
    let number = ctx.expand(&args[1])?.trim().to_string();

    let state = ctx.state();
    let slot = state.slots_mut().alloc(content);
    state.get_mut::<LabelState>().mark(LabelTarget { slot, number });

    Ok(Expansion::verbatim(slot.placeholder()))
}

fn wrap_target(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let label = ctx.expand(&args[0])?.trim().to_string();
    let state = ctx.state();

    let Some(target) = state.get_mut::<LabelState>().nearest().cloned() else {
        debug!(label = %label, "No label target in scope");
        return Ok(Expansion::Empty);
    };

    let content = state.slots().get(target.slot).unwrap_or_default().to_string();
    let wrapped = span_spec().render(&["", label.as_str(), "", content.as_str()]);
    state.slots_mut().set(target.slot, wrapped);

    Ok(Expansion::text(target.number))
}

fn save_label(ctx: &mut dyn ExpansionContext, args: &[String]) -> Result<Expansion> {
    let label = ctx.expand(&args[0])?.trim().to_string();
    let number = ctx.expand(&args[1])?.trim().to_string();
    ctx.state().get_mut::<LabelState>().save(label, number);
    Ok(Expansion::Empty)
}

/// The label a reference link points at
fn link_reference(attr: &Value) -> Option<&str> {
    let pairs = attr.get(2)?.as_array()?;

    let named = pairs.iter().find_map(|pair| match pair.get(0)?.as_str()? {
        "reference" => pair.get(1)?.as_str(),
        _ => None,
    });

    named.or_else(|| match pairs.as_slice() {
        [_, second] => second.get(1)?.as_str(),
        _ => None,
    })
}

/// Replaces the text of reference links with the label's number
pub fn resolve_links(ctx: &mut FilterContext<'_>, kind: &str, content: &Value) -> Result<Action> {
    if kind != "Link" {
        return Ok(Action::Keep);
    }

    let Some(reference) = content.get(0).and_then(link_reference) else {
        return Ok(Action::Keep);
    };

    let number = ctx
        .state
        .get::<LabelState>()
        .and_then(|labels| labels.lookup(reference));

    match number {
        Some(number) => Ok(Action::Replace(tree::element(
            "Link",
            json!([content[0], [tree::text(number)], content[2]]),
        ))),
        None => {
            warn!(label = %reference, "Reference to unknown label");
            Ok(Action::Keep)
        }
    }
}

pub struct LabelsCode;

impl PluginCode for LabelsCode {
    fn macros(&mut self, _ctx: &CodeContext<'_>) -> Result<MacroTable> {
        Ok([
            ("@pushlabelstack", MacroDef::native(0, push_label_stack)),
            ("@poplabelstack", MacroDef::native(0, pop_label_stack)),
            ("@labeltarget", MacroDef::native(2, label_target)),
            ("@wraptarget", MacroDef::native(1, wrap_target)),
            ("@savelabel", MacroDef::native(2, save_label)),
        ]
        .into_iter()
        .map(|(name, def)| (name.to_string(), std::sync::Arc::new(def)))
        .collect())
    }

    fn filters(&self) -> Vec<FilterEntry> {
        vec![FilterEntry::new("labels.links", 0, resolve_links)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DocumentState;
    use crate::testing::StubContext;

    fn context() -> StubContext {
        let mut code = LabelsCode;
        let manifest = crate::plugin::PluginManifest::new("labels");
        let settings = crate::plugin::CodeSettings::default();
        let commands = crate::encode::CommandTable::new();
        let ctx = CodeContext {
            manifest: &manifest,
            settings: &settings,
            commands: &commands,
        };
        StubContext::with_macros(code.macros(&ctx).unwrap())
    }

    #[test]
    fn stack_starts_with_one_unset_scope() {
        let mut labels = LabelState::default();
        assert_eq!(labels.depth(), 1);
        assert!(labels.nearest().is_none());
        assert_eq!(labels.pop(), Err(StackError::Underflow("label")));
    }

    #[test]
    fn nested_scopes_find_ancestor_targets() {
        let mut ctx = context();

        ctx.call("@labeltarget", &["Figure", "1"]).unwrap();
        ctx.call("@pushlabelstack", &[]).unwrap();
        ctx.call("@pushlabelstack", &[]).unwrap();

        let number = ctx.call("@wraptarget", &["fig:a"]).unwrap();
        assert_eq!(number, Expansion::text("1"));

        ctx.call("@poplabelstack", &[]).unwrap();
        ctx.call("@poplabelstack", &[]).unwrap();
        assert!(ctx.call("@poplabelstack", &[]).is_err());
    }

    #[test]
    fn short_calls_are_errors() {
        let mut ctx = context();

        let err = ctx.call("@labeltarget", &["Figure"]).unwrap_err();
        assert!(err.to_string().contains("expects 2 argument(s), got 1"));
        assert!(ctx.call("@wraptarget", &[]).is_err());
        assert!(ctx.call("@savelabel", &["fig:a"]).is_err());
    }

    #[test]
    fn innermost_target_wins() {
        let mut ctx = context();

        ctx.call("@labeltarget", &["Outer", "1"]).unwrap();
        ctx.call("@pushlabelstack", &[]).unwrap();
        ctx.call("@labeltarget", &["Inner", "1.1"]).unwrap();

        assert_eq!(ctx.call("@wraptarget", &["x"]).unwrap(), Expansion::text("1.1"));

        ctx.call("@poplabelstack", &[]).unwrap();
        assert_eq!(ctx.call("@wraptarget", &["y"]).unwrap(), Expansion::text("1"));
    }

    #[test]
    fn wrapping_rewrites_the_slot() {
        let mut ctx = context();

        let placeholder = match ctx.call("@labeltarget", &["Figure", "2"]).unwrap() {
            Expansion::Verbatim(text) => text,
            other => panic!("unexpected expansion: {other:?}"),
        };
        ctx.call("@wraptarget", &["fig:b"]).unwrap();

        let resolved = ctx.state.resolve_slots(&format!("See {placeholder}"));
        assert_eq!(
            resolved,
            format!("See {}", span_spec().render(&["", "fig:b", "", "Figure"]))
        );
    }

    #[test]
    fn missing_target_is_silent() {
        let mut ctx = context();
        assert_eq!(ctx.call("@wraptarget", &["x"]).unwrap(), Expansion::Empty);
    }

    fn link(pairs: Value, text: &str) -> Value {
        json!([["", [], pairs], [tree::text(text)], ["#x", ""]])
    }

    fn run_links(state: &mut DocumentState, content: &Value) -> Action {
        let meta = Value::Null;
        let mut ctx = FilterContext {
            state,
            format: "html",
            meta: &meta,
        };
        resolve_links(&mut ctx, "Link", content).unwrap()
    }

    #[test]
    fn links_take_saved_numbers() {
        let mut ctx = context();
        ctx.call("@savelabel", &["sec:intro", "3"]).unwrap();

        let content = link(json!([["reference-type", "ref"], ["reference", "sec:intro"]]), "[sec:intro]");
        let action = run_links(&mut ctx.state, &content);

        match action {
            Action::Replace(node) => assert_eq!(tree::stringify(&node), "3"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn unknown_links_are_kept() {
        let mut state = DocumentState::new();
        let content = link(json!([["a", "b"], ["c", "nowhere"]]), "[nowhere]");

        assert_eq!(run_links(&mut state, &content), Action::Keep);
    }
}
