//! Plugin inspection commands

use anyhow::Result;
use clap::Subcommand;

use super::app::PipelineArgs;
use super::output::Output;
use crate::pipeline::plugin_manager;
use crate::plugin::{Plugin, PluginError, PluginManager};
use crate::storage::Config;

#[derive(Subcommand)]
pub enum PluginCommands {
    /// List discovered plugins
    List,

    /// Validate the dependency graph of all discovered plugins
    Check,

    /// Show one plugin's manifest
    Show {
        /// Plugin name
        name: String,

        /// Also load it and report what it contributed
        #[arg(long)]
        load: bool,
    },
}

pub fn run(cmd: PluginCommands, output: &Output, config: &Config) -> Result<()> {
    match cmd {
        PluginCommands::List => list_plugins(output, config),
        PluginCommands::Check => check_plugins(output, config),
        PluginCommands::Show { name, load } => show_plugin(output, config, &name, load),
    }
}

fn discover(config: &Config) -> Result<PluginManager> {
    let mut manager = plugin_manager(config);
    manager.discover()?;
    Ok(manager)
}

fn plugin_json(plugin: &Plugin) -> serde_json::Value {
    let manifest = plugin.manifest();
    serde_json::json!({
        "name": manifest.name,
        "description": manifest.description,
        "source": plugin.source().to_string(),
        "requires": manifest.requires,
        "auto_load": manifest.auto_load,
        "code": manifest.code,
        "macro_files": plugin
            .macro_files()
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>(),
    })
}

fn list_plugins(output: &Output, config: &Config) -> Result<()> {
    let manager = discover(config)?;

    if output.is_json() {
        let items: Vec<_> = manager.list().map(plugin_json).collect();
        output.data(&items);
        return Ok(());
    }

    println!("{:<16} {:<6} {:<20} {}", "NAME", "AUTO", "REQUIRES", "SOURCE");
    println!("{}", "-".repeat(70));
    for plugin in manager.list() {
        let manifest = plugin.manifest();
        println!(
            "{:<16} {:<6} {:<20} {}",
            manifest.name,
            if manifest.auto_load { "yes" } else { "no" },
            manifest.requires.join(","),
            plugin.source()
        );
    }

    Ok(())
}

fn check_plugins(output: &Output, config: &Config) -> Result<()> {
    let manager = discover(config)?;
    let graph = manager.dependency_graph();
    let problems: Vec<String> = graph.problems().iter().map(ToString::to_string).collect();

    let order = if problems.is_empty() {
        graph.topological_order()?
    } else {
        Vec::new()
    };

    if output.is_json() {
        output.data(&serde_json::json!({
            "ok": problems.is_empty(),
            "plugins": graph.len(),
            "problems": problems,
            "load_order": order,
        }));
    } else if problems.is_empty() {
        output.success(&format!("{} plugins, no problems", graph.len()));
        output.row(&["Load order:", &order.join(" -> ")]);
    } else {
        for problem in &problems {
            output.error(problem);
        }
    }

    if !problems.is_empty() {
        anyhow::bail!("{} plugin problem(s) found", problems.len());
    }
    Ok(())
}

fn show_plugin(output: &Output, config: &Config, name: &str, load: bool) -> Result<()> {
    let manager = discover(config)?;
    let plugin = manager
        .get(name)
        .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
    let mut info = plugin_json(plugin);

    if load {
        let mut pilot = PipelineArgs::default().build(config)?;
        let loaded = pilot.load_plugin(name);
        let stopped = pilot.stop();
        loaded?;
        stopped?;

        if let Some(plugin) = pilot.manager().get(name) {
            info["contribution"] = plugin.contribution().keys().cloned().collect();
            info["filters"] = plugin
                .filters()
                .iter()
                .map(|f| serde_json::json!({"name": f.name, "priority": f.priority}))
                .collect();
        }
    }

    if output.is_json() {
        output.data(&info);
        return Ok(());
    }

    let manifest = plugin.manifest();
    println!("Plugin: {}", manifest.name);
    println!("Description: {}", manifest.description);
    println!("Source: {}", plugin.source());
    println!("Requires: {}", manifest.requires.join(", "));
    println!("Auto-load: {}", manifest.auto_load);
    if let Some(code) = &manifest.code {
        println!("Code: {}", code);
    }
    for file in plugin.macro_files() {
        println!("Macro file: {}", file.display());
    }
    if let Some(names) = info["contribution"].as_array() {
        let names: Vec<&str> = names.iter().filter_map(|n| n.as_str()).collect();
        println!("Contributes: {}", names.join(" "));
    }
    if let Some(filters) = info["filters"].as_array() {
        for filter in filters {
            println!(
                "Filter: {} ({})",
                filter["name"].as_str().unwrap_or_default(),
                filter["priority"]
            );
        }
    }

    Ok(())
}
