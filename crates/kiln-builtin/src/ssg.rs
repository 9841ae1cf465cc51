//! `__ssgPlugin`: static-site generation.
//!
//! When `ssg` is on for a production build, adds a server bundle that renders
//! every route to HTML, swaps the client's HTML emitter for an asset
//! manifest, and enables route-splitting in the transpiler.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use kiln_core::AppResult;
use kiln_plugin::{HookTable, Plugin, PluginContext, PluginFactory, handler_fn};

use crate::bundler::{BUNDLER_CONFIG_HOOK, BUNDLER_CONFIGS_HOOK, TRANSPILER_CONFIG_HOOK};
use crate::methods::{CREATE_BUNDLER_CONFIG, PRODUCTION, build_args, paths, resolved_config};

pub const PLUGIN_NAME: &str = "__ssgPlugin";

/// Transpiler plugin that makes split chunks discoverable at render time.
const LOADABLE_TRANSPILER_PLUGIN: &str = "loadable";

fn enabled(ssg: bool, args: &Value) -> bool {
    ssg && args["env"].as_str().unwrap_or(PRODUCTION) == PRODUCTION
}

fn push_plugin(list: &mut Value, plugin: &str) {
    match list.as_array_mut() {
        Some(items) => items.push(json!(plugin)),
        None => *list = json!([plugin]),
    }
}

/// Rewrites a server bundle config into the static-generation build.
fn to_ssg_server(config: &mut Value, ssg_entry: &Value) {
    config["entry"] = json!({ "ssg": ssg_entry });
    config["target"] = json!("node");
    config["output"]["library"] = json!({ "type": "commonjs2" });
    config["output"]["filename"] = json!("[name].js");
    config["output"]["chunk_filename"] = json!("[name].chunk.js");
    config["externals_presets"] = json!({ "node": true });
    config["max_chunks"] = json!(1);
    push_plugin(&mut config["plugins"], "static-site-generation");
}

/// The client build emits a manifest instead of `index.html`.
fn to_ssg_client(config: &mut Value) {
    if let Some(plugins) = config["plugins"].as_array_mut() {
        plugins.retain(|p| *p != "html");
    }
    push_plugin(&mut config["plugins"], "ssg-notify");
    push_plugin(&mut config["plugins"], "loadable-manifest");
}

/// Factory for the ssg plugin.
pub fn factory() -> PluginFactory {
    Arc::new(|context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(SsgPlugin { context }))
    })
}

struct SsgPlugin {
    context: PluginContext,
}

impl Plugin for SsgPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    fn hooks(&self) -> HookTable {
        let transpiler_ctx = self.context.clone();
        let bundler_ctx = self.context.clone();
        let configs_ctx = self.context.clone();

        HookTable::new()
            .tap(
                TRANSPILER_CONFIG_HOOK,
                handler_fn(move |mut options, _| {
                    let context = transpiler_ctx.clone();
                    async move {
                        let config = resolved_config(context.methods()).await?;
                        if config.ssg {
                            push_plugin(&mut options["plugins"], LOADABLE_TRANSPILER_PLUGIN);
                        }
                        Ok(options)
                    }
                }),
            )
            .tap(
                BUNDLER_CONFIG_HOOK,
                handler_fn(move |mut bundle, args| {
                    let context = bundler_ctx.clone();
                    async move {
                        let config = resolved_config(context.methods()).await?;
                        let on = enabled(config.ssg, &args);

                        if on {
                            if args["is_server"].as_bool().unwrap_or(false) {
                                let paths = paths(context.methods()).await?;
                                to_ssg_server(&mut bundle, &json!(paths.app_src_ssg_index));
                            } else {
                                to_ssg_client(&mut bundle);
                            }
                        }
                        bundle["define"]["SSG"] = json!(on);
                        Ok(bundle)
                    }
                }),
            )
            .tap(
                BUNDLER_CONFIGS_HOOK,
                handler_fn(move |_, args| {
                    let context = configs_ctx.clone();
                    async move {
                        let config = resolved_config(context.methods()).await?;
                        if !enabled(config.ssg, &args) || args["is_server"] == json!(true) {
                            return Ok(Value::Null);
                        }

                        debug!("Static-site generation is on, adding server build");
                        context
                            .methods()
                            .call(CREATE_BUNDLER_CONFIG, build_args(PRODUCTION, true))
                            .await
                    }
                }),
            )
    }
}
