//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{plugin_cmd, render, watch};
use crate::pipeline::Pilot;
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "texpilot")]
#[command(author, version, about = "Plugin-driven LaTeX to HTML conversion")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config's, else text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to texpilot.toml, searched upwards)
    #[arg(long, short = 'c', global = true, env = "TEXPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Plugins and macro files on top of the configured ones
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Plugin to load besides the auto-load ones (repeatable)
    #[arg(long = "plugin", short = 'p')]
    pub plugins: Vec<String>,

    /// Macro file applied after the plugins (repeatable)
    #[arg(long = "macros", short = 'm')]
    pub macro_files: Vec<PathBuf>,
}

impl PipelineArgs {
    /// The configured pipeline plus these additions, not started yet
    pub fn build(&self, config: &Config) -> Result<Pilot> {
        let mut pilot = Pilot::from_config(config);
        for name in &self.plugins {
            pilot.require_plugin(name.clone());
        }
        for file in &self.macro_files {
            pilot.add_macro_file(file.clone())?;
        }
        Ok(pilot)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a LaTeX file to HTML
    Render {
        /// LaTeX input file
        input: PathBuf,

        /// Write HTML here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Re-render whenever the input or a loaded macro file changes
    Watch {
        /// LaTeX input file
        input: PathBuf,

        /// HTML output file
        #[arg(long, short)]
        output: PathBuf,

        /// Quiet period before re-rendering, in milliseconds
        #[arg(long, default_value = "300")]
        debounce_ms: u64,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Inspect plugins
    #[command(subcommand)]
    Plugins(plugin_cmd::PluginCommands),
}

/// Installs the tracing subscriber; `--verbose` wins over `RUST_LOG`
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("texpilot=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let format = cli.format.unwrap_or(config.global.default_format);
    let output = Output::new(format, cli.verbose);

    if let Some(root) = &config.project_root {
        output.verbose_ctx("config", &format!("Project root: {}", root.display()));
    }

    match cli.command {
        Commands::Render {
            input,
            output: target,
            pipeline,
        } => render::run(&output, &config, &pipeline, &input, target.as_deref())?,

        Commands::Watch {
            input,
            output: target,
            debounce_ms,
            pipeline,
        } => watch::run(&output, &config, &pipeline, &input, &target, debounce_ms)?,

        Commands::Plugins(cmd) => plugin_cmd::run(cmd, &output, &config)?,
    }

    output.verbose_ctx("texpilot", "Command completed successfully");
    Ok(())
}
