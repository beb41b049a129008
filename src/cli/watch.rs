//! Live re-rendering on file changes

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tracing::{debug, info, warn};

use super::app::PipelineArgs;
use super::output::Output;
use super::render::{report, write_html};
use crate::pipeline::Pilot;
use crate::storage::Config;

pub fn run(
    output: &Output,
    config: &Config,
    pipeline: &PipelineArgs,
    input: &Path,
    target: &Path,
    debounce_ms: u64,
) -> Result<()> {
    let mut pilot = pipeline.build(config)?;

    let watched = watch_loop(output, &mut pilot, input, target, debounce_ms);
    let stopped = pilot.stop();
    watched?;
    stopped
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Renders once; failures are reported and the watch goes on
fn render(output: &Output, pilot: &mut Pilot, input: &Path, target: &Path) {
    let result = pilot
        .process_file(input)
        .and_then(|html| write_html(target, &html).map(|()| html.len()));

    match result {
        Ok(bytes) => report(output, pilot, input, target, bytes),
        Err(err) => output.error(&format!("{:#}", err)),
    }
}

fn watch_loop(
    output: &Output,
    pilot: &mut Pilot,
    input: &Path,
    target: &Path,
    debounce_ms: u64,
) -> Result<()> {
    // Configuration errors stop the watch before it begins
    pilot.start()?;
    render(output, pilot, input, target);

    let input = canonical(input);
    let mut files: BTreeSet<PathBuf> = pilot.watched_files().iter().map(|f| canonical(f)).collect();
    files.insert(input.clone());

    // Editors replace files on save, so the parent directories are watched
    let dirs: BTreeSet<PathBuf> = files
        .iter()
        .filter_map(|f| f.parent().map(Path::to_path_buf))
        .collect();

    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), tx)?;
    for dir in &dirs {
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
    }
    info!(files = files.len(), "Watching for changes");
    output.verbose_ctx("watch", &format!("Watching {} file(s)", files.len()));

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let changed: BTreeSet<PathBuf> = events
                    .into_iter()
                    .map(|event| canonical(&event.path))
                    .filter(|path| files.contains(path))
                    .collect();

                if changed.is_empty() {
                    continue;
                }

                let mut rerender = changed.contains(&input);
                for path in changed.iter().filter(|p| **p != input) {
                    match pilot.refresh(path) {
                        Ok(refreshed) => {
                            debug!(path = %path.display(), refreshed, "Macro file changed");
                            rerender |= refreshed;
                        }
                        Err(err) => output.error(&format!("{:#}", err)),
                    }
                }

                if rerender {
                    render(output, pilot, &input, target);
                }
            }
            Ok(Err(error)) => warn!(?error, "Watch error"),
            Err(_) => break,
        }
    }

    Ok(())
}
