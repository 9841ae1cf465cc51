//! Optional `kiln-plugin-auto-start-server`: restarts the rendering server
//! after each development rebuild of the server bundle.
//!
//! Not loaded by default. Enable it with `plugins = ["auto-start-server"]`.

use serde_json::{Value, json};

use kiln_plugin::{PluginBuilder, PluginFactory, PluginModule, factory_fn, handler_fn};

use crate::bundler::BUNDLER_CONFIG_HOOK;
use crate::methods::DEVELOPMENT;

pub const MODULE_NAME: &str = "kiln-plugin-auto-start-server";
const PLUGIN_NAME: &str = "auto-start-server";

/// Adds the restart step to `config` when it is a development server bundle.
pub fn add_restart_step(mut config: Value, args: &Value, delay_ms: u64) -> Value {
    let is_dev_server = args["is_server"].as_bool().unwrap_or(false)
        && args["env"].as_str() == Some(DEVELOPMENT);
    if !is_dev_server {
        return config;
    }

    let step = json!({ "name": PLUGIN_NAME, "delay_ms": delay_ms });
    match config["plugins"].as_array_mut() {
        Some(plugins) => plugins.push(step),
        None => config["plugins"] = json!([step]),
    }
    config
}

fn factory() -> PluginFactory {
    factory_fn(|_, options: Value| {
        let delay_ms = options["delay_ms"].as_u64().unwrap_or(0);
        PluginBuilder::named(PLUGIN_NAME)
            .tap(
                BUNDLER_CONFIG_HOOK,
                handler_fn(move |config, args| async move {
                    Ok(add_restart_step(config, &args, delay_ms))
                }),
            )
            .build()
    })
}

/// The module as published to the plugin catalog.
pub fn module() -> PluginModule {
    PluginModule::with_default(factory())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{PRODUCTION, build_args};

    #[test]
    fn test_only_dev_server_bundles_change() {
        let base = json!({"plugins": ["html"]});

        let client = add_restart_step(base.clone(), &build_args(DEVELOPMENT, false), 0);
        assert_eq!(client, base);
        let prod = add_restart_step(base.clone(), &build_args(PRODUCTION, true), 0);
        assert_eq!(prod, base);

        let server = add_restart_step(base, &build_args(DEVELOPMENT, true), 250);
        assert_eq!(server["plugins"][1], json!({"name": "auto-start-server", "delay_ms": 250}));
    }
}
