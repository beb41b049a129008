//! One-shot conversion

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::app::PipelineArgs;
use super::output::Output;
use crate::pipeline::Pilot;
use crate::storage::Config;

pub fn run(
    output: &Output,
    config: &Config,
    pipeline: &PipelineArgs,
    input: &Path,
    target: Option<&Path>,
) -> Result<()> {
    let mut pilot = pipeline.build(config)?;

    let rendered = pilot.process_file(input);
    // Plugins are finalized even when the document failed
    let stopped = pilot.stop();
    let html = rendered?;
    stopped?;

    match target {
        Some(path) => {
            write_html(path, &html)?;
            report(output, &pilot, input, path, html.len());
        }
        None if output.is_json() => output.data(&serde_json::json!({
            "input": input.display().to_string(),
            "html": html,
        })),
        None => print!("{}", html),
    }

    Ok(())
}

pub(super) fn write_html(path: &Path, html: &str) -> Result<()> {
    fs::write(path, html).with_context(|| format!("Failed to write output: {}", path.display()))
}

pub(super) fn report(output: &Output, pilot: &Pilot, input: &Path, target: &Path, bytes: usize) {
    if output.is_json() {
        output.data(&serde_json::json!({
            "input": input.display().to_string(),
            "output": target.display().to_string(),
            "bytes": bytes,
            "plugins": pilot.manager().loaded(),
        }));
    } else {
        output.success(&format!("Rendered {} to {}", input.display(), target.display()));
    }
}
