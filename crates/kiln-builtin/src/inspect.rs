//! `__inspectPlugin`: introspection commands.
//!
//! `plugins` lists every loaded plugin with its lifecycle flags; `config`
//! prints the resolved configuration and path table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tabled::Tabled;

use kiln_core::AppResult;
use kiln_plugin::{Plugin, PluginContext, PluginFactory, PluginSummary, RegisterContext, command_fn};

use crate::methods::{paths, resolved_config};
use crate::output::{self, OutputFormat};

pub const PLUGIN_NAME: &str = "__inspectPlugin";
pub const PLUGINS_COMMAND: &str = "plugins";
pub const CONFIG_COMMAND: &str = "config";

/// Plugin display row
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    /// Load order
    #[tabled(rename = "#")]
    index: usize,
    /// Name
    name: String,
    /// Registered
    registered: String,
    /// Tapped
    tapped: String,
    /// Ignored
    ignored: String,
}

fn mark(flag: bool) -> String {
    if flag { "✓" } else { "✗" }.to_string()
}

fn rows(plugins: &[PluginSummary]) -> Vec<PluginRow> {
    plugins
        .iter()
        .enumerate()
        .map(|(index, p)| PluginRow {
            index,
            name: p.name.clone(),
            registered: mark(p.registered),
            tapped: mark(p.tapped),
            ignored: mark(p.ignored),
        })
        .collect()
}

async fn list_plugins(context: &PluginContext, args: &Value) -> AppResult<Value> {
    let plugins = context.plugins().await;
    match OutputFormat::from_args(args) {
        OutputFormat::Json => output::print_json(&plugins),
        OutputFormat::Table => output::print_list(&rows(&plugins), OutputFormat::Table),
    }
    Ok(serde_json::to_value(plugins)?)
}

async fn show_config(context: &PluginContext, args: &Value) -> AppResult<Value> {
    let config = resolved_config(context.methods()).await?;
    let paths = paths(context.methods()).await?;
    let report = json!({ "config": config, "paths": paths });

    match OutputFormat::from_args(args) {
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Table => {
            println!("Configuration:");
            output::print_kv("port", &config.port.to_string());
            output::print_kv("host", &config.host);
            output::print_kv("public_path", &config.public_path);
            output::print_kv("ssg", &config.ssg.to_string());
            output::print_kv("source_map", &config.source_map.to_string());
            println!();
            println!("Paths:");
            if let Some(table) = report["paths"].as_object() {
                for (key, value) in table {
                    if let Some(path) = value.as_str() {
                        output::print_kv(key, path);
                    }
                }
            }
        }
    }
    Ok(report)
}

/// Factory for the inspect plugin.
pub fn factory() -> PluginFactory {
    Arc::new(|context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(InspectPlugin { context }))
    })
}

struct InspectPlugin {
    context: PluginContext,
}

#[async_trait]
impl Plugin for InspectPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        let context = self.context.clone();
        ctx.add_new_command(
            PLUGINS_COMMAND,
            command_fn(move |args| {
                let context = context.clone();
                async move { list_plugins(&context, &args).await }
            }),
            false,
        )
        .await;

        let context = self.context.clone();
        ctx.add_new_command(
            CONFIG_COMMAND,
            command_fn(move |args| {
                let context = context.clone();
                async move { show_config(&context, &args).await }
            }),
            false,
        )
        .await;
        Ok(())
    }
}
