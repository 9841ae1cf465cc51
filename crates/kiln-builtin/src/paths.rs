//! `__pathsPlugin`: resolves the project path table.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use kiln_core::{AppResult, PathTable};
use kiln_plugin::{
    Plugin, PluginContext, PluginFactory, RecordView, RegisterContext, SharedRecord,
    TransformHook, method_fn,
};

use crate::config::BuildConfig;
use crate::methods::GET_PATHS;

pub const PLUGIN_NAME: &str = "__pathsPlugin";
pub const PATHS_HOOK: &str = "paths";

struct PathsState {
    hook: TransformHook<PathTable>,
    paths: SharedRecord<PathTable>,
}

/// Entry-point handle for the paths stage.
#[derive(Clone)]
pub struct PathsStage {
    state: Arc<PathsState>,
}

impl PathsStage {
    /// Creates the stage seeded with the default table.
    pub fn new(defaults: PathTable) -> Self {
        Self {
            state: Arc::new(PathsState {
                hook: TransformHook::new(PATHS_HOOK),
                paths: SharedRecord::new(defaults),
            }),
        }
    }

    /// Runs the `paths` chain with `{ config }` as args and stores the result.
    pub async fn resolve(&self, config: &BuildConfig) -> AppResult<PathTable> {
        let seed = self.state.paths.snapshot().await;
        let args = json!({ "config": config });
        let resolved = self.state.hook.call(seed, args).await?;
        self.state.paths.replace(resolved.clone()).await;

        info!(root = %resolved.app_root.display(), "Paths resolved");
        Ok(resolved)
    }

    /// Read-only view of the path table.
    pub fn paths(&self) -> RecordView<PathTable> {
        self.state.paths.view()
    }

    /// Factory of the plugin that publishes this stage's hook and method.
    pub fn factory(&self) -> PluginFactory {
        let state = self.state.clone();
        Arc::new(move |_: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
            Ok(Arc::new(PathsPlugin {
                state: state.clone(),
            }))
        })
    }
}

struct PathsPlugin {
    state: Arc<PathsState>,
}

#[async_trait]
impl Plugin for PathsPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        let view = self.state.paths.view();
        ctx.add_new_method(
            GET_PATHS,
            method_fn(move |_| {
                let view = view.clone();
                async move { Ok(serde_json::to_value(view.get().await)?) }
            }),
            false,
        )
        .await;
        ctx.add_new_hook(PATHS_HOOK, self.state.hook.binder(), false)
            .await;
        Ok(())
    }
}
