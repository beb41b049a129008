//! Doubles for the external expander and the structural converter

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use texpilot::macros::{
    substitute_params, Expansion, ExpansionContext, MacroBody, MacroDef, MacroExpander, MacroTable,
};
use texpilot::state::DocumentState;
use texpilot::{tree, Converter};

const MAX_DEPTH: usize = 64;

/// A small TeX-like expander: `\newcommand`, template and native macros,
/// optional first arguments and `\begin{env}`/`\end{env}` as `env`/`endenv`
pub struct TestExpander;

impl MacroExpander for TestExpander {
    fn expand(
        &mut self,
        source: &str,
        macros: &mut MacroTable,
        state: &mut DocumentState,
    ) -> Result<String> {
        Scanner {
            macros,
            state,
            depth: 0,
        }
        .scan(source)
    }
}

struct Scanner<'a> {
    macros: &'a mut MacroTable,
    state: &'a mut DocumentState,
    depth: usize,
}

fn skip_spaces(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn control_name(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && (chars[*pos].is_ascii_alphabetic() || chars[*pos] == '@') {
        *pos += 1;
    }
    if *pos == start && *pos < chars.len() {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

/// A braced group's contents, or a single token
fn read_group(chars: &[char], pos: &mut usize) -> Option<String> {
    skip_spaces(chars, pos);
    match chars.get(*pos)? {
        '{' => {
            let mut depth = 0;
            let start = *pos + 1;
            while *pos < chars.len() {
                match chars[*pos] {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            let group = chars[start..*pos].iter().collect();
                            *pos += 1;
                            return Some(group);
                        }
                    }
                    _ => {}
                }
                *pos += 1;
            }
            None
        }
        '\\' => {
            *pos += 1;
            Some(format!("\\{}", control_name(chars, pos)))
        }
        c => {
            *pos += 1;
            Some(c.to_string())
        }
    }
}

/// A `[...]` group if one follows
fn read_optional(chars: &[char], pos: &mut usize) -> Option<String> {
    let mut probe = *pos;
    skip_spaces(chars, &mut probe);
    if chars.get(probe) != Some(&'[') {
        return None;
    }
    let end = chars[probe..].iter().position(|c| *c == ']')? + probe;
    *pos = end + 1;
    Some(chars[probe + 1..end].iter().collect())
}

impl Scanner<'_> {
    fn scan(&mut self, source: &str) -> Result<String> {
        let chars: Vec<char> = source.chars().collect();
        let mut out = String::new();
        let mut pos = 0;

        while pos < chars.len() {
            if chars[pos] != '\\' {
                out.push(chars[pos]);
                pos += 1;
                continue;
            }

            pos += 1;
            let name = control_name(&chars, &mut pos);
            match name.as_str() {
                "newcommand" | "renewcommand" => self.define(&chars, &mut pos)?,
                "begin" | "end" => {
                    let env = read_group(&chars, &mut pos).unwrap_or_default();
                    let macro_name = if name == "begin" {
                        env.clone()
                    } else {
                        format!("end{env}")
                    };
                    match self.macros.get(&macro_name).cloned() {
                        Some(def) => out.push_str(&self.invoke(&def, &chars, &mut pos)?),
                        None => out.push_str(&format!("\\{name}{{{env}}}")),
                    }
                }
                _ => match self.macros.get(&name).cloned() {
                    Some(def) => out.push_str(&self.invoke(&def, &chars, &mut pos)?),
                    None => {
                        out.push('\\');
                        out.push_str(&name);
                    }
                },
            }
        }

        Ok(out)
    }

    fn define(&mut self, chars: &[char], pos: &mut usize) -> Result<()> {
        let Some(name) = read_group(chars, pos) else {
            bail!("\\newcommand without a name");
        };
        let args = read_optional(chars, pos)
            .map(|n| n.trim().parse::<usize>())
            .transpose()?
            .unwrap_or(0);
        let default = read_optional(chars, pos);
        let body = read_group(chars, pos).unwrap_or_default();

        let mut def = MacroDef::template(args, body);
        def.default = default;
        self.macros
            .insert(name.trim_start_matches('\\').to_string(), Arc::new(def));
        Ok(())
    }

    fn invoke(&mut self, def: &MacroDef, chars: &[char], pos: &mut usize) -> Result<String> {
        let mut args = Vec::with_capacity(def.args);
        if def.args > 0 {
            if let Some(default) = &def.default {
                args.push(read_optional(chars, pos).unwrap_or_else(|| default.clone()));
            }
        }
        while args.len() < def.args {
            args.push(read_group(chars, pos).unwrap_or_default());
        }

        match &def.body {
            MacroBody::Template(body) => self.nested(&substitute_params(body, &args)),
            MacroBody::Native(f) => {
                let f = Arc::clone(f);
                match f(self, &args)? {
                    Expansion::Empty => Ok(String::new()),
                    Expansion::Text(text) => self.nested(&text),
                    Expansion::Verbatim(text) => Ok(text),
                }
            }
        }
    }

    fn nested(&mut self, source: &str) -> Result<String> {
        if self.depth >= MAX_DEPTH {
            bail!("macro expansion too deep");
        }
        self.depth += 1;
        let result = self.scan(source);
        self.depth -= 1;
        result
    }
}

impl ExpansionContext for Scanner<'_> {
    fn expand(&mut self, source: &str) -> Result<String> {
        self.nested(source)
    }

    fn macros(&self) -> &MacroTable {
        &*self.macros
    }

    fn macros_mut(&mut self) -> &mut MacroTable {
        &mut *self.macros
    }

    fn state(&mut self) -> &mut DocumentState {
        &mut *self.state
    }
}

const LIST_OPEN: &str = r"\begin{itemize}";
const LIST_CLOSE: &str = r"\end{itemize}";
const BOLD_OPEN: &str = r"\textbf\begingroup";
const BOLD_CLOSE: &str = r"\endgroup{}";
const REF_OPEN: &str = r"\ref{";

/// Reads expanded LaTeX the way pandoc treats the pieces the pipeline emits,
/// and renders trees as HTML. Bibliography entries, when given, are appended
/// as the `refs` block citation processing produces.
#[derive(Default)]
pub struct FakeConverter {
    pub references: Vec<(String, String)>,
}

impl FakeConverter {
    pub fn with_reference(mut self, key: &str, text: &str) -> Self {
        self.references.push((key.to_string(), text.to_string()));
        self
    }
}

impl Converter for FakeConverter {
    fn to_tree(&self, latex: &str) -> Result<Value> {
        let mut blocks = read_latex(latex)?;

        if !self.references.is_empty() {
            let entries = self
                .references
                .iter()
                .map(|(key, text)| {
                    tree::div(
                        tree::attr(&format!("ref-{key}"), &[], &[]),
                        vec![tree::para(tree::inlines_from_text(text))],
                    )
                })
                .collect();
            blocks.push(tree::div(
                tree::attr("refs", &["references".to_string()], &[]),
                entries,
            ));
        }

        Ok(json!({"pandoc-api-version": [1, 23], "meta": {}, "blocks": blocks}))
    }

    fn to_html(&self, doc: &Value) -> Result<String> {
        let mut out = String::new();
        for block in doc["blocks"].as_array().into_iter().flatten() {
            block_html(block, &mut out);
        }
        Ok(out)
    }
}

fn words(segment: &str, inlines: &mut Vec<Value>) {
    if segment.starts_with(char::is_whitespace) && !inlines.is_empty() {
        inlines.push(tree::space());
    }
    inlines.extend(tree::inlines_from_text(segment));
    if segment.ends_with(char::is_whitespace) && !segment.trim().is_empty() {
        inlines.push(tree::space());
    }
}

fn read_latex(source: &str) -> Result<Vec<Value>> {
    let mut blocks = Vec::new();
    let mut inlines: Vec<Value> = Vec::new();
    let mut rest = source;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix(LIST_OPEN) {
            if !inlines.is_empty() {
                blocks.push(tree::para(std::mem::take(&mut inlines)));
            }
            let Some((body, tail)) = after.split_once(LIST_CLOSE) else {
                bail!("unterminated itemize");
            };
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
            let Some((body, tail)) = after.split_once(BOLD_CLOSE) else {
                bail!("unterminated group");
            };
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
        } else if let Some(after) = rest.strip_prefix(REF_OPEN) {
            let Some((key, tail)) = after.split_once('}') else {
                bail!("unterminated reference");
            };
            let pairs = [
                ("reference-type".to_string(), "ref".to_string()),
                ("reference".to_string(), key.to_string()),
            ];
            inlines.push(tree::element(
                "Link",
                json!([
                    tree::attr("", &[], &pairs),
                    [tree::text(&format!("[{key}]"))],
                    [format!("#{key}"), ""]
                ]),
            ));
            rest = tail;
        } else {
            let end = [LIST_OPEN, BOLD_OPEN, REF_OPEN]
                .iter()
                .filter_map(|marker| rest.find(marker))
                .min()
                .unwrap_or(rest.len());
            words(&rest[..end], &mut inlines);
            rest = &rest[end..];
        }
    }

    if !inlines.is_empty() {
        blocks.push(tree::para(inlines));
    }
    Ok(blocks)
}

fn attr_html(attr: &Value, out: &mut String) {
    if let Some(id) = attr[0].as_str().filter(|id| !id.is_empty()) {
        out.push_str(&format!(" id=\"{id}\""));
    }
    let classes: Vec<&str> = attr[1]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if !classes.is_empty() {
        out.push_str(&format!(" class=\"{}\"", classes.join(" ")));
    }
    for pair in attr[2].as_array().into_iter().flatten() {
        if let (Some(k), Some(v)) = (pair[0].as_str(), pair[1].as_str()) {
            out.push_str(&format!(" {k}=\"{v}\""));
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn block_html(block: &Value, out: &mut String) {
    let c = &block["c"];
    match tree::kind(block) {
        Some("Para") => {
            out.push_str("<p>");
            inlines_html(c, out);
            out.push_str("</p>\n");
        }
        Some("Plain") => inlines_html(c, out),
        Some("Div") => {
            out.push_str("<div");
            attr_html(&c[0], out);
            out.push('>');
            for child in c[1].as_array().into_iter().flatten() {
                block_html(child, out);
            }
            out.push_str("</div>\n");
        }
        Some("BulletList") => {
            out.push_str("<ul>");
            for item in c.as_array().into_iter().flatten() {
                out.push_str("<li>");
                for child in item.as_array().into_iter().flatten() {
                    block_html(child, out);
                }
                out.push_str("</li>");
            }
            out.push_str("</ul>\n");
        }
        Some("RawBlock") if c[0] == "html" => {
            out.push_str(c[1].as_str().unwrap_or_default());
            out.push('\n');
        }
        _ => {}
    }
}

fn inlines_html(inlines: &Value, out: &mut String) {
    for inline in inlines.as_array().into_iter().flatten() {
        let c = &inline["c"];
        match tree::kind(inline) {
            Some("Str") => out.push_str(&escape(c.as_str().unwrap_or_default())),
            Some("Space") | Some("SoftBreak") => out.push(' '),
            Some("Strong") => {
                out.push_str("<strong>");
                inlines_html(c, out);
                out.push_str("</strong>");
            }
            Some("Span") => {
                out.push_str("<span");
                attr_html(&c[0], out);
                out.push('>');
                inlines_html(&c[1], out);
                out.push_str("</span>");
            }
            Some("Link") => {
                out.push_str(&format!("<a href=\"{}\">", c[2][0].as_str().unwrap_or_default()));
                inlines_html(&c[1], out);
                out.push_str("</a>");
            }
            Some("RawInline") if c[0] == "html" => out.push_str(c[1].as_str().unwrap_or_default()),
            _ => {}
        }
    }
}
