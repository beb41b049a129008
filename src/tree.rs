//! Intermediate tree helpers
//!
//! The structural converter speaks pandoc's JSON AST: every element is an
//! object `{"t": kind, "c": content}` and children live in arrays. The tree is
//! kept as [`serde_json::Value`] so any converter version round-trips whatever
//! this crate does not touch.

use anyhow::Result;
use serde_json::{json, Value};

/// What a filter wants done with the element it was shown
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Leave the element as it is (its children are still visited)
    Keep,

    /// Put a single element in its place
    Replace(Value),

    /// Put any number of elements in its place; an empty list deletes it
    Splice(Vec<Value>),
}

impl Action {
    /// Removes the element
    pub fn delete() -> Self {
        Action::Splice(Vec::new())
    }
}

/// The kind (`"t"`) of an element, if `node` is one
pub fn kind(node: &Value) -> Option<&str> {
    node.get("t").and_then(Value::as_str)
}

/// The content (`"c"`) of an element
pub fn content(node: &Value) -> Option<&Value> {
    node.get("c")
}

/// Builds an element
pub fn element(kind: &str, content: Value) -> Value {
    if content.is_null() {
        json!({ "t": kind })
    } else {
        json!({ "t": kind, "c": content })
    }
}

/// Builds an attribute triple `[id, [classes], [[key, value]]]`
pub fn attr(id: &str, classes: &[String], pairs: &[(String, String)]) -> Value {
    let pairs: Vec<Value> = pairs.iter().map(|(k, v)| json!([k, v])).collect();
    json!([id, classes, pairs])
}

/// The empty attribute triple
pub fn empty_attr() -> Value {
    json!(["", [], []])
}

pub fn text(s: &str) -> Value {
    element("Str", json!(s))
}

pub fn space() -> Value {
    element("Space", Value::Null)
}

/// Turns plain text into `Str`/`Space` inlines
pub fn inlines_from_text(s: &str) -> Vec<Value> {
    let mut out = Vec::new();
    for (i, word) in s.split_whitespace().enumerate() {
        if i > 0 {
            out.push(space());
        }
        out.push(text(word));
    }
    out
}

pub fn para(inlines: Vec<Value>) -> Value {
    element("Para", Value::Array(inlines))
}

pub fn plain(inlines: Vec<Value>) -> Value {
    element("Plain", Value::Array(inlines))
}

pub fn div(attr: Value, blocks: Vec<Value>) -> Value {
    element("Div", json!([attr, blocks]))
}

pub fn span(attr: Value, inlines: Vec<Value>) -> Value {
    element("Span", json!([attr, inlines]))
}

pub fn strong(inlines: Vec<Value>) -> Value {
    element("Strong", Value::Array(inlines))
}

pub fn bullet_list(items: Vec<Vec<Value>>) -> Value {
    element("BulletList", json!(items))
}

pub fn raw_block(format: &str, text: &str) -> Value {
    element("RawBlock", json!([format, text]))
}

pub fn raw_inline(format: &str, text: &str) -> Value {
    element("RawInline", json!([format, text]))
}

/// Concatenates the text of a tree fragment.
///
/// `Str` contributes its text, `Code` and `Math` their source, and spaces and
/// line breaks a single space. Everything else contributes its children.
pub fn stringify(node: &Value) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Value, out: &mut String) {
    match node {
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        Value::Object(map) => match kind(node) {
            Some("Str") | Some("MetaString") => {
                if let Some(s) = map.get("c").and_then(Value::as_str) {
                    out.push_str(s);
                }
            }
            Some("Code") | Some("Math") => {
                if let Some(s) = map.get("c").and_then(|c| c.get(1)).and_then(Value::as_str) {
                    out.push_str(s);
                }
            }
            Some("Space") | Some("SoftBreak") | Some("LineBreak") => out.push(' '),
            Some(_) => {
                if let Some(c) = map.get("c") {
                    collect_text(c, out);
                }
            }
            None => map.values().for_each(|v| collect_text(v, out)),
        },
        _ => {}
    }
}

/// Walks the tree top-down through arrays, offering every element to `action`
/// before its children.
///
/// Elements are only visited where they sit in an array, which is where
/// pandoc keeps all blocks and inlines. Replacement elements are walked too,
/// so a filter also sees what it (or an earlier element) produced.
pub fn walk<F>(node: Value, action: &mut F) -> Result<Value>
where
    F: FnMut(&str, &Value) -> Result<Action>,
{
    match node {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let decision = match kind(&item) {
                    Some(k) => {
                        let c = item.get("c").cloned().unwrap_or(Value::Null);
                        action(k, &c)?
                    }
                    None => Action::Keep,
                };

                match decision {
                    Action::Keep => out.push(walk(item, action)?),
                    Action::Replace(replacement) => out.push(walk(replacement, action)?),
                    Action::Splice(replacements) => {
                        for replacement in replacements {
                            out.push(walk(replacement, action)?);
                        }
                    }
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, walk(value, action)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}
