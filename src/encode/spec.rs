//! Encoded forms of custom commands

use std::sync::Arc;

use crate::macros::{substitute_params, MacroDef, MacroTable};

/// First item of every encoded wrapper
pub const INTERRUPT: &str = "@PANDOCINTERRUPT";

/// Leading text of every inline argument; keeps empty arguments from vanishing
pub const PAD: &str = "X";

/// Number of inlines the padding turns into (`Str "X"`, `Space`)
pub const PAD_INLINES: usize = 2;

/// Which inert wrapper carries the command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// An itemized list; arguments are list items
    Block,

    /// A bold span; arguments are braced groups
    Inline,
}

/// Description of a custom command to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub args: usize,
    pub form: Form,
    pub default: Option<String>,
    environment: bool,
    math: bool,
}

impl CommandSpec {
    /// A block command, encoded as a list
    pub fn block(name: impl Into<String>, args: usize) -> Self {
        Self::new(name, args, Form::Block, false)
    }

    /// An inline command, encoded as a bold span
    pub fn inline(name: impl Into<String>, args: usize) -> Self {
        Self::new(name, args, Form::Inline, false)
    }

    /// A block environment: `\begin{name}` opens the wrapper and the
    /// environment's body becomes one extra, final argument
    pub fn environment(name: impl Into<String>, args: usize) -> Self {
        Self::new(name, args, Form::Block, true)
    }

    fn new(name: impl Into<String>, args: usize, form: Form, environment: bool) -> Self {
        Self {
            name: name.into(),
            args,
            form,
            default: None,
            environment,
            math: false,
        }
    }

    /// Makes the first argument optional
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Puts an environment's body in display math
    pub fn math(mut self) -> Self {
        self.math = true;
        self
    }

    pub fn is_environment(&self) -> bool {
        self.environment
    }

    /// Number of arguments the decoder hands to the callback
    pub fn decoded_args(&self) -> usize {
        if self.environment {
            self.args + 1
        } else {
            self.args
        }
    }

    /// Wrapper opening, the sentinel, the name and one slot per argument
    pub fn opening(&self) -> String {
        let mut body = match self.form {
            Form::Block => format!(r"\noexpand{{\begin{{itemize}}}}\item {INTERRUPT} \item {} ", self.name),
            Form::Inline => format!(r"\textbf\begingroup{{{INTERRUPT}}}{{{}}}", self.name),
        };

        for i in 1..=self.args {
            match self.form {
                Form::Block => body.push_str(&format!(r"\item #{i} ")),
                Form::Inline => body.push_str(&format!("{{{PAD} #{i}}}")),
            }
        }

        body
    }

    pub fn closing(&self) -> &'static str {
        match self.form {
            Form::Block => r"\noexpand{\end{itemize}}",
            Form::Inline => r"\endgroup{}",
        }
    }

    /// Macro definitions implementing the encoding
    pub fn macros(&self) -> MacroTable {
        let mut table = MacroTable::new();

        if self.environment {
            // The trailing space ends the control word before the body starts
            let mut open = self.opening();
            open.push_str(r"\item ");
            let mut close = self.closing().to_string();
            if self.math {
                open.push_str(r"\[");
                close.insert_str(0, r"\]");
            }

            table.insert(self.name.clone(), Arc::new(self.definition(open)));
            table.insert(
                format!("end{}", self.name),
                Arc::new(MacroDef::template(0, close)),
            );
        } else {
            let body = format!("{}{}", self.opening(), self.closing());
            table.insert(self.name.clone(), Arc::new(self.definition(body)));
        }

        table
    }

    fn definition(&self, body: String) -> MacroDef {
        let def = MacroDef::template(self.args, body);
        match &self.default {
            Some(default) => def.with_default(default.clone()),
            None => def,
        }
    }

    /// The text a command invocation expands to, with `\noexpand` already applied
    pub fn render(&self, args: &[impl AsRef<str>]) -> String {
        let body = format!("{}{}", self.opening(), self.closing());
        let body = match self.form {
            Form::Block => body
                .replace(r"\noexpand{\begin{itemize}}", r"\begin{itemize}")
                .replace(r"\noexpand{\end{itemize}}", r"\end{itemize}"),
            Form::Inline => body,
        };
        substitute_params(&body, args)
    }
}
