//! Pandoc as the structural converter

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::Converter;
use crate::storage::PandocConfig;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to run converter '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Runs `pandoc` once per conversion
#[derive(Debug, Clone)]
pub struct PandocConverter {
    command: String,
    bibliography: Option<PathBuf>,
    csl: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

impl PandocConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            bibliography: None,
            csl: None,
            extra_args: Vec::new(),
        }
    }

    /// Builds a converter from the `[pandoc]` section, resolving paths with `resolve`
    pub fn from_config(config: &PandocConfig, resolve: impl Fn(&Path) -> PathBuf) -> Self {
        let mut converter = Self::new(config.command.clone());
        if let Some(bib) = &config.bibliography {
            converter.add_bibliography(resolve(bib));
        }
        if let Some(csl) = &config.csl {
            converter.add_csl(resolve(csl));
        }
        converter.extra_args.extend(config.extra_args.iter().cloned());
        converter
    }

    /// Enables citation processing against a bibliography file
    pub fn add_bibliography(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.bibliography = Some(path.into());
        self
    }

    pub fn add_csl(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.csl = Some(path.into());
        self
    }

    pub fn add_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments for LaTeX → tree
    pub fn tree_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-f", "latex", "-t", "json"]
            .into_iter()
            .map(String::from)
            .collect();

        if let Some(bib) = &self.bibliography {
            args.push("--citeproc".into());
            args.push("--bibliography".into());
            args.push(bib.display().to_string());
        }
        if let Some(csl) = &self.csl {
            args.push("--csl".into());
            args.push(csl.display().to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Arguments for tree → HTML
    pub fn html_args(&self) -> Vec<String> {
        ["-f", "json", "-t", "html"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Feeds `input` to the converter and returns its stdout
    fn run(&self, args: &[String], input: String) -> Result<Vec<u8>> {
        debug!(command = %self.command, ?args, "Running converter");

        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // stdout is drained by wait_with_output while the thread writes
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to open converter stdin"))?;
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .context("Failed to wait for converter")?;

        // Exit status first: a failing converter may close stdin early
        let written = writer
            .join()
            .map_err(|_| anyhow::anyhow!("Converter input thread panicked"))?;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        written.context("Failed to write to converter")?;

        Ok(output.stdout)
    }
}

impl Converter for PandocConverter {
    fn to_tree(&self, latex: &str) -> Result<Value> {
        let stdout = self.run(&self.tree_args(), latex.to_string())?;
        serde_json::from_slice(&stdout).context("Failed to parse converter output")
    }

    fn to_html(&self, doc: &Value) -> Result<String> {
        let input = serde_json::to_string(doc).context("Failed to serialize document")?;
        let stdout = self.run(&self.html_args(), input)?;
        String::from_utf8(stdout).context("Converter produced invalid UTF-8")
    }
}
