//! External expander process
//!
//! The expander runs as a child process per expansion and talks JSON, one
//! message per line:
//!
//! ```text
//! texpilot                                   expander
//!  ├── {"op":"expand","source":..,"macros":{..}} ─▶
//!  │◀── {"call":{"name":"@savelabel","args":[..]}}      native macro needed
//!  ├── {"text":..,"verbatim":false,"define":{..}} ─▶
//!  │◀── {"define":{"foo":{"args":1,"body":".."}}}        \newcommand seen
//!  │◀── {"output":".."}                                  done
//! ```
//!
//! While answering a `call`, a native macro may ask for a nested expansion;
//! that is another `{"op":"expand","source":..}` request on the same pipe,
//! answered before the reply to the call is sent.

use std::io::{BufRead, BufReader, Write};
use std::process::{ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::expander::{ExpandError, ExpansionContext, MacroExpander};
use super::table::{diff_contribution, Expansion, MacroBody, MacroDef, MacroTable};
use crate::state::DocumentState;

/// Definition as sent to the expander
#[derive(Debug, Serialize)]
struct OutgoingDef<'a> {
    args: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    native: bool,
}

impl<'a> From<&'a MacroDef> for OutgoingDef<'a> {
    fn from(def: &'a MacroDef) -> Self {
        Self {
            args: def.args,
            default: def.default.as_deref(),
            body: def.template_body(),
            native: def.is_native(),
        }
    }
}

/// Definition received from the expander
#[derive(Debug, Deserialize)]
struct IncomingDef {
    #[serde(default)]
    args: usize,

    #[serde(default)]
    default: Option<String>,

    body: String,
}

#[derive(Debug, Deserialize)]
struct NativeCall {
    name: String,

    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Output { output: String },
    Call { call: NativeCall },
    Define { define: IndexMap<String, IncomingDef> },
    Error { error: serde_json::Value },
}

#[derive(Debug, Serialize)]
struct ExpandRequest<'a> {
    op: &'static str,
    source: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    macros: Option<IndexMap<&'a str, OutgoingDef<'a>>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CallReply<'a> {
    Result {
        text: &'a str,
        verbatim: bool,
        define: IndexMap<&'a str, OutgoingDef<'a>>,
    },
    Error {
        error: String,
    },
}

/// Expander that delegates to an external command
#[derive(Debug, Clone)]
pub struct ProcessExpander {
    command: String,
    args: Vec<String>,
}

impl ProcessExpander {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl MacroExpander for ProcessExpander {
    fn expand(
        &mut self,
        source: &str,
        macros: &mut MacroTable,
        state: &mut DocumentState,
    ) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn expander: {}", self.command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to open expander stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to open expander stdout"))?;

        let result = {
            let mut session = Session {
                stdin,
                stdout: BufReader::new(stdout),
                macros,
                state,
            };
            session.request(source, true)
        };

        // stdin is closed by now, so the expander sees EOF and exits
        let status = child.wait().context("Failed to wait for expander")?;
        let output = result?;

        if !status.success() {
            return Err(ExpandError::Exit(status).into());
        }

        Ok(output)
    }
}

/// One conversation with a running expander
struct Session<'a> {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    macros: &'a mut MacroTable,
    state: &'a mut DocumentState,
}

impl Session<'_> {
    fn send(&mut self, message: &impl Serialize) -> Result<()> {
        let line = serde_json::to_string(message).context("Failed to serialize expander message")?;
        writeln!(self.stdin, "{}", line).context("Failed to write to expander")?;
        self.stdin.flush().context("Failed to write to expander")
    }

    fn receive(&mut self) -> Result<Reply> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("Failed to read expander response")?;

        if read == 0 {
            return Err(ExpandError::NoOutput.into());
        }

        serde_json::from_str(&line)
            .map_err(|e| ExpandError::Protocol(format!("{e}: {}", line.trim_end())).into())
    }

    fn request(&mut self, source: &str, with_macros: bool) -> Result<String> {
        let macros = self.macros.clone();
        let request = ExpandRequest {
            op: "expand",
            source,
            macros: with_macros.then(|| {
                macros
                    .iter()
                    .map(|(name, def)| (name.as_str(), OutgoingDef::from(def.as_ref())))
                    .collect()
            }),
        };
        self.send(&request)?;

        loop {
            match self.receive()? {
                Reply::Output { output } => return Ok(output),
                Reply::Error { error } => {
                    let message = match error {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    return Err(ExpandError::Remote(message).into());
                }
                Reply::Define { define } => {
                    for (name, def) in define {
                        let mut macro_def = MacroDef::template(def.args, def.body);
                        macro_def.default = def.default;
                        self.macros.insert(name, Arc::new(macro_def));
                    }
                }
                Reply::Call { call } => self.answer(call)?,
            }
        }
    }

    fn answer(&mut self, call: NativeCall) -> Result<()> {
        let native = self
            .macros
            .get(&call.name)
            .and_then(|def| match &def.body {
                MacroBody::Native(f) => Some(Arc::clone(f)),
                MacroBody::Template(_) => None,
            });

        let Some(native) = native else {
            let err = ExpandError::UnknownNative(call.name.clone());
            self.send(&CallReply::Error {
                error: err.to_string(),
            })?;
            return Err(err.into());
        };

        let before = self.macros.clone();
        let result = native(self, &call.args);

        match result {
            Ok(expansion) => {
                let changed = diff_contribution(&before, &*self.macros);
                let (text, verbatim) = match &expansion {
                    Expansion::Empty => ("", false),
                    Expansion::Text(text) => (text.as_str(), false),
                    Expansion::Verbatim(text) => (text.as_str(), true),
                };
                let reply = CallReply::Result {
                    text,
                    verbatim,
                    define: changed
                        .iter()
                        .map(|(name, def)| (name.as_str(), OutgoingDef::from(def.as_ref())))
                        .collect(),
                };
                self.send(&reply)
            }
            Err(err) => {
                self.send(&CallReply::Error {
                    error: format!("{:#}", err),
                })?;
                Err(err.context(format!("Macro \\{} failed", call.name)))
            }
        }
    }
}

impl ExpansionContext for Session<'_> {
    fn expand(&mut self, source: &str) -> Result<String> {
        self.request(source, false)
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
