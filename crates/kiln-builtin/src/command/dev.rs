//! `__devCommandPlugin`: the `dev` command.
//!
//! Builds the development bundler configurations, lets plugins adjust the
//! dev server through the `devServer` hook, and hands both to `serve`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use kiln_core::{AppError, AppResult, PathTable};
use kiln_plugin::{Plugin, PluginContext, PluginFactory, RegisterContext, TransformHook, command_fn};

use crate::config::BuildConfig;
use crate::methods::{
    CREATE_BUNDLER_CONFIG, DEVELOPMENT, GET_BUNDLER_CONFIGS, SERVE, build_args, paths,
    resolved_config,
};
use crate::output::print_success;

pub const PLUGIN_NAME: &str = "__devCommandPlugin";
pub const DEV_SERVER_HOOK: &str = "devServer";
pub const COMMAND: &str = "dev";

/// Dev server settings before the `devServer` hook runs.
pub fn default_server_config(config: &BuildConfig, paths: &PathTable) -> Value {
    json!({
        "host": config.host,
        "port": config.port,
        "hot": true,
        "compress": true,
        "allowed_hosts": "all",
        "headers": { "Access-Control-Allow-Origin": "*" },
        "static": {
            "directory": paths.app_public,
            "public_path": config.public_path,
            "watch": true,
        },
        "history_api_fallback": {
            "disable_dot_rule": true,
            "index": config.public_path,
        },
        "client": { "overlay": { "errors": true, "warnings": false } },
    })
}

/// `--port` and `--host` win over both the configuration and the hook.
///
/// A present but unusable value is rejected rather than ignored.
fn apply_cli_overrides(server: &mut Value, args: &Value) -> AppResult<()> {
    match args.get("port") {
        None | Some(Value::Null) => {}
        Some(value) => {
            let port = value
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| AppError::validation(format!("invalid port: {value}")))?;
            server["port"] = json!(port);
        }
    }
    match args.get("host") {
        None | Some(Value::Null) => {}
        Some(Value::String(host)) if !host.is_empty() => server["host"] = json!(host),
        Some(value) => return Err(AppError::validation(format!("invalid host: {value}"))),
    }
    Ok(())
}

struct DevState {
    context: PluginContext,
    hook: TransformHook<Value>,
}

impl DevState {
    async fn run(&self, args: Value) -> AppResult<Value> {
        let methods = self.context.methods();
        let config = resolved_config(methods).await?;
        let paths = paths(methods).await?;

        let base = methods
            .call(CREATE_BUNDLER_CONFIG, build_args(DEVELOPMENT, false))
            .await?;
        let configs = methods.call(GET_BUNDLER_CONFIGS, base).await?;

        let mut server = self
            .hook
            .call(
                default_server_config(&config, &paths),
                json!({ "config": config }),
            )
            .await?;
        apply_cli_overrides(&mut server, &args)?;

        let served = methods
            .call(SERVE, json!({ "configs": configs, "server": server }))
            .await?;

        if let Some(url) = served["url"].as_str() {
            info!(url = %url, "Development server ready");
            print_success(&format!("Development server ready at {url}"));
        }
        Ok(served)
    }
}

/// Factory for the dev command plugin.
pub fn factory() -> PluginFactory {
    Arc::new(|context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(DevCommandPlugin {
            state: Arc::new(DevState {
                context,
                hook: TransformHook::new(DEV_SERVER_HOOK),
            }),
        }))
    })
}

struct DevCommandPlugin {
    state: Arc<DevState>,
}

#[async_trait]
impl Plugin for DevCommandPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        ctx.add_new_hook(DEV_SERVER_HOOK, self.state.hook.binder(), false)
            .await;

        let state = self.state.clone();
        ctx.add_new_command(
            COMMAND,
            command_fn(move |args| {
                let state = state.clone();
                async move { state.run(args).await }
            }),
            false,
        )
        .await;
        Ok(())
    }
}
