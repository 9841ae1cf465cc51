//! `__bundlerPlugin`: glue between the build commands and a [`Bundler`].
//!
//! Bundler and transpiler configurations are opaque JSON values. This plugin
//! builds a base configuration from the resolved config and paths, lets
//! other plugins rewrite it through hooks, and hands the result to the
//! bundler backend.
//!
//! | Hook | Kind | Seed | Args |
//! |------|------|------|------|
//! | `transpilerConfig` | Transform | base transpiler config | `{ env, is_server }` |
//! | `bundlerConfig` | Transform | base bundler config | `{ env, is_server }` |
//! | `bundlerConfigs` | Accumulate | `[base]` | `{ env, is_server }` |

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use kiln_core::{AppError, AppResult, PathTable};
use kiln_plugin::{
    AccumulateHook, Plugin, PluginContext, PluginFactory, RegisterContext, TransformHook,
    method_fn,
};

use crate::config::BuildConfig;
use crate::methods::{
    COMPILE, CREATE_BUNDLER_CONFIG, CREATE_TRANSPILER_CONFIG, DEVELOPMENT, GET_BUNDLER_CONFIGS,
    PRODUCTION, SERVE, build_args, paths, resolved_config,
};

pub const PLUGIN_NAME: &str = "__bundlerPlugin";
pub const BUNDLER_CONFIG_HOOK: &str = "bundlerConfig";
pub const BUNDLER_CONFIGS_HOOK: &str = "bundlerConfigs";
pub const TRANSPILER_CONFIG_HOOK: &str = "transpilerConfig";

/// One file written by a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Result of [`Bundler::compile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
    /// Name of the backend that compiled.
    pub bundler: String,
    /// Files written.
    pub files: Vec<EmittedFile>,
}

/// A bundling backend.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Backend name for logs and reports.
    fn name(&self) -> &str;

    /// Compiles every configuration.
    async fn compile(&self, configs: &[Value]) -> AppResult<CompileOutput>;

    /// Prepares a development server for `configs`.
    async fn serve(&self, configs: &[Value], server: &Value) -> AppResult<Value>;
}

/// Reference backend that writes each configuration to its output
/// directory as `<name>.bundle.json`.
#[derive(Debug, Clone, Default)]
pub struct ManifestBundler;

impl ManifestBundler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Bundler for ManifestBundler {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn compile(&self, configs: &[Value]) -> AppResult<CompileOutput> {
        let mut files = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let out_dir = config["output"]["path"].as_str().ok_or_else(|| {
                AppError::validation(format!("bundler config #{index} has no output.path"))
            })?;
            let name = config["name"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("bundle-{index}"));

            tokio::fs::create_dir_all(out_dir).await?;
            let path = PathBuf::from(out_dir).join(format!("{name}.bundle.json"));
            let body = serde_json::to_vec_pretty(config)?;
            tokio::fs::write(&path, &body).await?;

            debug!(bundle = %name, path = %path.display(), "Bundle written");
            files.push(EmittedFile {
                path,
                size: body.len() as u64,
            });
        }

        Ok(CompileOutput {
            bundler: self.name().to_string(),
            files,
        })
    }

    async fn serve(&self, configs: &[Value], server: &Value) -> AppResult<Value> {
        let port = server["port"]
            .as_u64()
            .ok_or_else(|| AppError::validation("dev server config has no port"))?;
        let host = server["host"].as_str().unwrap_or("0.0.0.0");

        info!(host = %host, port, bundles = configs.len(), "Development server configured");
        Ok(json!({
            "bundler": self.name(),
            "url": format!("http://{host}:{port}"),
            "bundles": configs.len(),
            "server": server,
        }))
    }
}

fn env_of(args: &Value) -> &str {
    args["env"].as_str().unwrap_or(PRODUCTION)
}

fn is_server(args: &Value) -> bool {
    args["is_server"].as_bool().unwrap_or(false)
}

/// Transpiler configuration before the `transpilerConfig` hook runs.
pub fn base_transpiler_config(config: &BuildConfig, env: &str, is_server: bool) -> Value {
    json!({
        "presets": ["kiln"],
        "plugins": [],
        "jsx_runtime": if config.jsx_runtime { "automatic" } else { "classic" },
        "fast_refresh": env == DEVELOPMENT && config.fast_refresh && !is_server,
        "target": if is_server { "node" } else { "browsers" },
    })
}

/// Bundler configuration before the `bundlerConfig` hook runs.
pub fn base_bundler_config(
    config: &BuildConfig,
    paths: &PathTable,
    env: &str,
    is_server: bool,
    transpiler: Value,
) -> Value {
    let production = env == PRODUCTION;
    let devtool = match (config.source_map, production) {
        (false, _) => Value::Bool(false),
        (true, true) => json!("source-map"),
        (true, false) => json!("cheap-module-source-map"),
    };
    let filename = if production {
        "static/js/[name].[contenthash:8].js"
    } else {
        "static/js/bundle.js"
    };

    json!({
        "name": if is_server { "server" } else { "client" },
        "mode": env,
        "target": if is_server { "node" } else { "web" },
        "entry": { "main": paths.app_src_index },
        "output": {
            "path": paths.app_output_path,
            "public_path": config.public_path,
            "filename": filename,
        },
        "devtool": devtool,
        "cache": { "dir": paths.app_cache },
        "asset_inline_limit": config.image_inline_size_limit,
        "profile": config.profile,
        "plugins": ["html"],
        "define": {
            "NODE_ENV": env,
            "PUBLIC_URL": config.public_path.trim_end_matches('/'),
        },
        "transpiler": transpiler,
    })
}

struct BundlerState {
    context: PluginContext,
    bundler: Arc<dyn Bundler>,
    bundler_config: TransformHook<Value>,
    bundler_configs: AccumulateHook<Value>,
    transpiler_config: TransformHook<Value>,
}

impl BundlerState {
    async fn create_transpiler_config(&self, args: Value) -> AppResult<Value> {
        let config = resolved_config(self.context.methods()).await?;
        let base = base_transpiler_config(&config, env_of(&args), is_server(&args));
        self.transpiler_config.call(base, args).await
    }

    async fn create_bundler_config(&self, args: Value) -> AppResult<Value> {
        let methods = self.context.methods();
        let config = resolved_config(methods).await?;
        let paths = paths(methods).await?;
        let transpiler = methods
            .call(CREATE_TRANSPILER_CONFIG, args.clone())
            .await?;

        let base = base_bundler_config(
            &config,
            &paths,
            env_of(&args),
            is_server(&args),
            transpiler,
        );
        self.bundler_config.call(base, args).await
    }

    /// `[base, ...extra]`; taps that have nothing to add return `null`.
    async fn bundler_configs(&self, base: Value) -> AppResult<Value> {
        let args = build_args(
            base["mode"].as_str().unwrap_or(PRODUCTION),
            base["target"] == json!("node"),
        );
        let configs = self.bundler_configs.call(vec![base], args).await?;
        let configs: Vec<Value> = configs.into_iter().filter(|c| !c.is_null()).collect();
        Ok(Value::Array(configs))
    }
}

fn configs_arg(value: &Value) -> AppResult<&[Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| AppError::validation("expected a list of bundler configs"))
}

/// Factory for the bundler plugin backed by `bundler`.
pub fn factory(bundler: Arc<dyn Bundler>) -> PluginFactory {
    Arc::new(move |context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(BundlerPlugin {
            state: Arc::new(BundlerState {
                context,
                bundler: bundler.clone(),
                bundler_config: TransformHook::new(BUNDLER_CONFIG_HOOK),
                bundler_configs: AccumulateHook::new(BUNDLER_CONFIGS_HOOK),
                transpiler_config: TransformHook::new(TRANSPILER_CONFIG_HOOK),
            }),
        }))
    })
}

struct BundlerPlugin {
    state: Arc<BundlerState>,
}

#[async_trait]
impl Plugin for BundlerPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        let state = &self.state;
        ctx.add_new_hook(BUNDLER_CONFIG_HOOK, state.bundler_config.binder(), false)
            .await;
        ctx.add_new_hook(BUNDLER_CONFIGS_HOOK, state.bundler_configs.binder(), false)
            .await;
        ctx.add_new_hook(TRANSPILER_CONFIG_HOOK, state.transpiler_config.binder(), false)
            .await;

        let s = state.clone();
        ctx.add_new_method(
            CREATE_TRANSPILER_CONFIG,
            method_fn(move |args| {
                let s = s.clone();
                async move { s.create_transpiler_config(args).await }
            }),
            false,
        )
        .await;

        let s = state.clone();
        ctx.add_new_method(
            CREATE_BUNDLER_CONFIG,
            method_fn(move |args| {
                let s = s.clone();
                async move { s.create_bundler_config(args).await }
            }),
            false,
        )
        .await;

        let s = state.clone();
        ctx.add_new_method(
            GET_BUNDLER_CONFIGS,
            method_fn(move |base| {
                let s = s.clone();
                async move { s.bundler_configs(base).await }
            }),
            false,
        )
        .await;

        let s = state.clone();
        ctx.add_new_method(
            COMPILE,
            method_fn(move |configs| {
                let s = s.clone();
                async move {
                    let output = s.bundler.compile(configs_arg(&configs)?).await?;
                    Ok(serde_json::to_value(output)?)
                }
            }),
            false,
        )
        .await;

        let s = state.clone();
        ctx.add_new_method(
            SERVE,
            method_fn(move |args| {
                let s = s.clone();
                async move {
                    s.bundler
                        .serve(configs_arg(&args["configs"])?, &args["server"])
                        .await
                }
            }),
            false,
        )
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_bundler_config_follows_env() {
        let config = BuildConfig {
            source_map: true,
            public_path: "/app/".into(),
            ..BuildConfig::default()
        };
        let paths = PathTable::resolve_from(std::path::Path::new("/srv/site"));

        let prod = base_bundler_config(&config, &paths, PRODUCTION, false, json!({}));
        assert_eq!(prod["name"], "client");
        assert_eq!(prod["devtool"], "source-map");
        assert_eq!(prod["define"]["PUBLIC_URL"], "/app");
        assert_eq!(prod["asset_inline_limit"], 10000);

        let dev = base_bundler_config(&config, &paths, DEVELOPMENT, true, json!({}));
        assert_eq!(dev["name"], "server");
        assert_eq!(dev["target"], "node");
        assert_eq!(dev["devtool"], "cheap-module-source-map");
    }

    #[test]
    fn test_fast_refresh_only_for_dev_client() {
        let config = BuildConfig::default();
        assert_eq!(base_transpiler_config(&config, DEVELOPMENT, false)["fast_refresh"], true);
        assert_eq!(base_transpiler_config(&config, DEVELOPMENT, true)["fast_refresh"], false);
        assert_eq!(base_transpiler_config(&config, PRODUCTION, false)["fast_refresh"], false);
    }

    #[tokio::test]
    async fn test_manifest_bundler_writes_each_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dist");
        let configs = vec![
            json!({"name": "client", "output": {"path": out}}),
            json!({"output": {"path": out}}),
        ];

        let output = ManifestBundler::new().compile(&configs).await.unwrap();
        assert_eq!(output.bundler, "manifest");
        assert_eq!(output.files.len(), 2);
        assert_eq!(output.files[0].path, out.join("client.bundle.json"));
        assert_eq!(output.files[1].path, out.join("bundle-1.bundle.json"));
        assert!(output.files.iter().all(|f| f.size > 0 && f.path.is_file()));
    }

    #[tokio::test]
    async fn test_manifest_bundler_rejects_config_without_output() {
        let err = ManifestBundler::new()
            .compile(&[json!({"name": "client"})])
            .await
            .unwrap_err();
        assert_eq!(err.kind, kiln_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_serve_requires_port() {
        let bundler = ManifestBundler::new();
        let ok = bundler
            .serve(&[json!({})], &json!({"host": "localhost", "port": 3000}))
            .await
            .unwrap();
        assert_eq!(ok["url"], "http://localhost:3000");

        assert!(bundler.serve(&[], &json!({})).await.is_err());
    }
}
