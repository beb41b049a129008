//! Macro definitions and tables

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::expander::ExpansionContext;

/// A native macro body, called by the expander with the raw argument text
pub type NativeMacro =
    Arc<dyn Fn(&mut dyn ExpansionContext, &[String]) -> anyhow::Result<Expansion> + Send + Sync>;

/// Name → definition, in insertion order.
///
/// Entries are shared through `Arc`; the pointer is the identity of a
/// definition, so re-defining a macro to an equal-looking body still counts as
/// a new definition.
pub type MacroTable = IndexMap<String, Arc<MacroDef>>;

/// What a native macro produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Nothing is emitted
    Empty,

    /// Emitted and scanned again for macro invocations
    Text(String),

    /// Emitted as-is, never expanded
    Verbatim(String),
}

impl Expansion {
    pub fn text(text: impl Into<String>) -> Self {
        Expansion::Text(text.into())
    }

    pub fn verbatim(text: impl Into<String>) -> Self {
        Expansion::Verbatim(text.into())
    }
}

/// The body of a macro
#[derive(Clone)]
pub enum MacroBody {
    /// Source text with `#1`..`#n` parameter references
    Template(String),

    /// Behavior implemented in Rust by plugin code
    Native(NativeMacro),
}

impl fmt::Debug for MacroBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroBody::Template(body) => f.debug_tuple("Template").field(body).finish(),
            MacroBody::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// A single macro definition
#[derive(Debug, Clone)]
pub struct MacroDef {
    /// Number of arguments, including the optional one
    pub args: usize,

    /// Default for the optional first argument; `None` means every argument is mandatory
    pub default: Option<String>,

    /// Expansion body
    pub body: MacroBody,
}

impl MacroDef {
    /// Creates a template macro
    pub fn template(args: usize, body: impl Into<String>) -> Self {
        Self {
            args,
            default: None,
            body: MacroBody::Template(body.into()),
        }
    }

    /// Creates a native macro.
    ///
    /// Calls with fewer than `args` arguments fail before `f` runs.
    pub fn native<F>(args: usize, f: F) -> Self
    where
        F: Fn(&mut dyn ExpansionContext, &[String]) -> anyhow::Result<Expansion>
            + Send
            + Sync
            + 'static,
    {
        let arity = args;
        let guarded = move |ctx: &mut dyn ExpansionContext, args: &[String]| {
            if args.len() < arity {
                anyhow::bail!("expects {} argument(s), got {}", arity, args.len());
            }
            f(ctx, args)
        };

        Self {
            args,
            default: None,
            body: MacroBody::Native(Arc::new(guarded)),
        }
    }

    /// Makes the first argument optional with the given default
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Returns the template body, if this is not a native macro
    pub fn template_body(&self) -> Option<&str> {
        match &self.body {
            MacroBody::Template(body) => Some(body),
            MacroBody::Native(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, MacroBody::Native(_))
    }
}

/// Returns the entries of `after` that are new or re-defined relative to `before`.
///
/// Identity, not value equality, decides: an entry counts when its name was
/// absent before or now points at a different definition.
pub fn diff_contribution(before: &MacroTable, after: &MacroTable) -> MacroTable {
    after
        .iter()
        .filter(|(name, def)| match before.get(*name) {
            Some(old) => !Arc::ptr_eq(old, def),
            None => true,
        })
        .map(|(name, def)| (name.clone(), Arc::clone(def)))
        .collect()
}

/// Substitutes `#1`..`#n` in a template body. Unknown parameters expand to nothing.
pub fn substitute_params(body: &str, args: &[impl AsRef<str>]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '#' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }

        match digits.parse::<usize>() {
            Ok(index) if index >= 1 => {
                if let Some(arg) = args.get(index - 1) {
                    out.push_str(arg.as_ref());
                }
            }
            _ => {
                out.push('#');
                out.push_str(&digits);
            }
        }
    }

    out
}
