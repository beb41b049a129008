//! Math rendering through a long-lived KaTeX process
//!
//! ```text
//! texpilot                                        renderer
//!  ├── {"input":"x^2","options":{"displayMode":true}} ─▶
//!  │◀── {"output":"<span class=\"katex\">..</span>"}
//! ```
//!
//! One request is in flight at a time; the renderer sits behind a mutex so
//! documents sharing it cannot interleave requests.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::filter::{FilterContext, FilterEntry};
use crate::plugin::{CodeContext, PluginCode};
use crate::tree::{self, Action};

#[derive(Debug, Error)]
pub enum MathError {
    #[error("Math renderer failed: {0}")]
    Renderer(String),

    #[error("Math renderer closed its output")]
    Closed,

    #[error("Invalid math renderer response: {0}")]
    Protocol(String),

    #[error("Math renderer is not running")]
    Stopped,
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    input: &'a str,
    options: &'a Value,
}

/// A running renderer process
pub struct MathRenderer {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl MathRenderer {
    /// Starts the renderer process
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn math renderer: {}", command))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to open math renderer stdout"))?;

        debug!(command, "Math renderer started");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Renders one expression; blocks until the response line arrives
    pub fn render(&mut self, input: &str, options: &Value) -> Result<String> {
        let stdin = self.stdin.as_mut().ok_or(MathError::Stopped)?;
        let line = serde_json::to_string(&RenderRequest { input, options })
            .context("Failed to serialize math request")?;
        writeln!(stdin, "{}", line).context("Failed to write to math renderer")?;
        stdin.flush().context("Failed to write to math renderer")?;

        let mut response = String::new();
        let read = self
            .stdout
            .read_line(&mut response)
            .context("Failed to read math renderer response")?;
        if read == 0 {
            return Err(MathError::Closed.into());
        }

        let response: Value = serde_json::from_str(&response)
            .map_err(|e| MathError::Protocol(format!("{e}: {}", response.trim_end())))?;

        match response.get("output").and_then(Value::as_str) {
            Some(html) => Ok(html.to_string()),
            None => {
                let message = response
                    .get("error")
                    .map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| response.to_string());
                Err(MathError::Renderer(message).into())
            }
        }
    }

    /// Terminates the process and waits for it
    pub fn shutdown(&mut self) -> Result<()> {
        drop(self.stdin.take());
        // Already exited is fine
        let _ = self.child.kill();
        self.child.wait().context("Failed to wait for math renderer")?;
        Ok(())
    }
}

/// Merges the plugin's options with the display flag
fn render_options(defaults: &Value, display: bool) -> Value {
    let mut options = match defaults {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if display {
        options.insert("displayMode".to_string(), Value::Bool(true));
    }
    Value::Object(options)
}

/// Code object of the `katex` plugin
pub struct KatexCode {
    renderer: Arc<Mutex<Option<MathRenderer>>>,
    options: Value,
}

impl KatexCode {
    /// Starts the renderer configured in the settings
    pub fn start(ctx: &CodeContext<'_>) -> Result<Self> {
        let renderer = MathRenderer::spawn(&ctx.settings.math_command, &ctx.settings.math_args)?;
        Ok(Self::with_renderer(renderer, ctx.manifest.data.clone()))
    }

    pub fn with_renderer(renderer: MathRenderer, options: Value) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(Some(renderer))),
            options,
        }
    }

    fn math_filter(&self) -> FilterEntry {
        let renderer = Arc::clone(&self.renderer);
        let defaults = self.options.clone();

        FilterEntry::new(
            "katex.math",
            0,
            move |_: &mut FilterContext<'_>, kind: &str, content: &Value| {
                if kind != "Math" {
                    return Ok(Action::Keep);
                }

                let display = tree::kind(&content[0]) != Some("InlineMath");
                let source = content[1].as_str().unwrap_or_default();
                let options = render_options(&defaults, display);

                let mut guard = renderer.lock();
                let renderer = guard.as_mut().ok_or(MathError::Stopped)?;
                let html = renderer
                    .render(source, &options)
                    .with_context(|| format!("Failed to render math: {}", source))?;

                Ok(Action::Replace(tree::raw_inline("html", &html)))
            },
        )
    }
}

impl PluginCode for KatexCode {
    fn filters(&self) -> Vec<FilterEntry> {
        vec![self.math_filter()]
    }

    fn finalize(&mut self) -> Result<()> {
        match self.renderer.lock().take() {
            Some(mut renderer) => renderer.shutdown(),
            None => Ok(()),
        }
    }
}
