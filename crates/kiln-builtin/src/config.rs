//! `__configPlugin`: resolves the effective build configuration.
//!
//! The `config` hook is a Transform chain seeded with the input
//! configuration. Its result is written to the resolved record, which every
//! plugin reads through `getResolvedConfig`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use kiln_core::{AppResult, InputConfig};
use kiln_plugin::{
    Plugin, PluginContext, PluginFactory, RecordView, RegisterContext, SharedRecord,
    TransformHook, method_fn,
};

use crate::methods::{GET_INPUT_CONFIG, GET_RESOLVED_CONFIG};

pub const PLUGIN_NAME: &str = "__configPlugin";
pub const CONFIG_HOOK: &str = "config";

/// The resolved configuration shares the input schema; plugins add their
/// own keys through its `extra` map.
pub type BuildConfig = InputConfig;

struct ConfigState {
    hook: TransformHook<BuildConfig>,
    input: SharedRecord<BuildConfig>,
    resolved: SharedRecord<BuildConfig>,
}

/// Entry-point handle for the config stage.
#[derive(Clone)]
pub struct ConfigStage {
    state: Arc<ConfigState>,
}

impl ConfigStage {
    /// Creates the stage. Until [`resolve`](Self::resolve) runs, the
    /// resolved record mirrors the input.
    pub fn new(input: InputConfig) -> Self {
        Self {
            state: Arc::new(ConfigState {
                hook: TransformHook::new(CONFIG_HOOK),
                resolved: SharedRecord::new(input.clone()),
                input: SharedRecord::new(input),
            }),
        }
    }

    /// Runs the `config` chain over the input and stores the result.
    pub async fn resolve(&self) -> AppResult<BuildConfig> {
        let seed = self.state.input.snapshot().await;
        let resolved = self.state.hook.call(seed, Value::Null).await?;
        self.state.resolved.replace(resolved.clone()).await;

        info!(
            contributors = ?self.state.hook.contributors().await,
            "Configuration resolved"
        );
        debug!(config = ?resolved, "Resolved configuration");
        Ok(resolved)
    }

    /// Read-only view of the resolved configuration.
    pub fn resolved(&self) -> RecordView<BuildConfig> {
        self.state.resolved.view()
    }

    /// Read-only view of the input configuration.
    pub fn input(&self) -> RecordView<BuildConfig> {
        self.state.input.view()
    }

    /// Factory of the plugin that publishes this stage's hook and methods.
    pub fn factory(&self) -> PluginFactory {
        let state = self.state.clone();
        Arc::new(move |_: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
            Ok(Arc::new(ConfigPlugin {
                state: state.clone(),
            }))
        })
    }
}

struct ConfigPlugin {
    state: Arc<ConfigState>,
}

#[async_trait]
impl Plugin for ConfigPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        let resolved = self.state.resolved.view();
        ctx.add_new_method(
            GET_RESOLVED_CONFIG,
            method_fn(move |_| {
                let resolved = resolved.clone();
                async move { Ok(serde_json::to_value(resolved.get().await)?) }
            }),
            false,
        )
        .await;

        let input = self.state.input.view();
        ctx.add_new_method(
            GET_INPUT_CONFIG,
            method_fn(move |_| {
                let input = input.clone();
                async move { Ok(serde_json::to_value(input.get().await)?) }
            }),
            false,
        )
        .await;

        ctx.add_new_hook(CONFIG_HOOK, self.state.hook.binder(), false)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use kiln_plugin::{PluginBuilder, PluginManager, factory_fn, handler_fn};

    #[tokio::test]
    async fn test_config_chain_resolves_into_view() {
        let stage = ConfigStage::new(InputConfig::default());
        let manager = PluginManager::default();

        let bump_port = factory_fn(|_, _| {
            PluginBuilder::named("port")
                .tap(
                    CONFIG_HOOK,
                    handler_fn(|mut config, _| async move {
                        config["port"] = json!(4000);
                        config["analytics"] = json!(true);
                        Ok(config)
                    }),
                )
                .build()
        });

        manager.load_plugins([stage.factory(), bump_port]).await.unwrap();

        let before = crate::methods::resolved_config(&manager.methods()).await.unwrap();
        assert_eq!(before.port, 3000);

        let resolved = stage.resolve().await.unwrap();
        assert_eq!(resolved.port, 4000);
        assert_eq!(resolved.extra.get("analytics"), Some(&json!(true)));

        let seen = crate::methods::resolved_config(&manager.methods()).await.unwrap();
        assert_eq!(seen, resolved);

        let input: BuildConfig = manager
            .methods()
            .call_as(GET_INPUT_CONFIG, Value::Null)
            .await
            .unwrap();
        assert_eq!(input.port, 3000);
    }
}
