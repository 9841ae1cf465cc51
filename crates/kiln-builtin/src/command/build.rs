//! `__buildCommandPlugin`: the `build` command.
//!
//! A production build copies the public directory into the output
//! directory, writes `index.html` (unless static generation renders pages
//! itself), compiles every bundler configuration and reports gzip sizes.
//! Listeners on `afterBuild` receive the finished [`BuildReport`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use kiln_core::{AppError, AppResult};
use kiln_plugin::{NotifyHook, Plugin, PluginContext, PluginFactory, RegisterContext, command_fn};

use crate::bundler::CompileOutput;
use crate::methods::{
    COMPILE, CREATE_BUNDLER_CONFIG, GET_BUNDLER_CONFIGS, GET_HTML, PRODUCTION, build_args, paths,
    resolved_config,
};
use crate::output::{format_size, print_success};

pub const PLUGIN_NAME: &str = "__buildCommandPlugin";
pub const AFTER_BUILD_HOOK: &str = "afterBuild";
pub const COMMAND: &str = "build";

const INDEX_HTML: &str = "index.html";

/// File extensions listed in the size report.
const REPORTED_EXTENSIONS: [&str; 4] = ["js", "css", "html", "json"];

/// Size of one emitted asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSize {
    /// Path relative to the output directory, `/`-separated.
    pub name: String,
    pub size: u64,
    pub gzip_size: u64,
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub built_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub bundler: String,
    pub output_path: PathBuf,
    /// Sorted by name.
    pub assets: Vec<AssetSize>,
}

impl BuildReport {
    pub fn total_gzip_size(&self) -> u64 {
        self.assets.iter().map(|a| a.gzip_size).sum()
    }
}

/// Gzipped length of `bytes` at the default compression level.
pub fn gzip_size(bytes: &[u8]) -> AppResult<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len() as u64)
}

/// Recursively copies `from` into `to`, returning the number of files copied.
pub async fn copy_dir(from: &Path, to: &Path) -> AppResult<usize> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    let mut copied = 0;

    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

fn is_reported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| REPORTED_EXTENSIONS.contains(&ext))
}

/// Sizes of every reported asset under `root`.
pub async fn collect_assets(root: &Path) -> AppResult<Vec<AssetSize>> {
    let mut assets = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            if !is_reported(&path) {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            assets.push(AssetSize {
                name,
                size: bytes.len() as u64,
                gzip_size: gzip_size(&bytes)?,
            });
        }
    }

    assets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(assets)
}

/// Report lines: sizes right-padded to a common width, then the asset path
/// prefixed with the output directory name.
pub fn report_lines(report: &BuildReport) -> Vec<String> {
    let dir = report
        .output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sizes: Vec<String> = report
        .assets
        .iter()
        .map(|a| format_size(a.gzip_size))
        .collect();
    let width = sizes.iter().map(String::len).max().unwrap_or(0);

    report
        .assets
        .iter()
        .zip(&sizes)
        .map(|(asset, size)| format!("  {size:<width$}  {dir}/{}", asset.name))
        .collect()
}

fn print_report(report: &BuildReport) {
    println!();
    print_success(&format!(
        "Built in {}ms with {}",
        report.elapsed_ms, report.bundler
    ));
    println!();
    println!("File sizes after gzip:");
    println!();
    for line in report_lines(report) {
        println!("{line}");
    }
    println!();
}

struct BuildState {
    context: PluginContext,
    after_build: NotifyHook<BuildReport>,
}

impl BuildState {
    async fn run(&self, _args: Value) -> AppResult<Value> {
        let started = Instant::now();
        let methods = self.context.methods();
        let config = resolved_config(methods).await?;
        let paths = paths(methods).await?;
        let output = &paths.app_output_path;

        println!("Creating a production build...");

        let base = methods
            .call(CREATE_BUNDLER_CONFIG, build_args(PRODUCTION, false))
            .await?;
        let configs = methods.call(GET_BUNDLER_CONFIGS, base).await?;

        if tokio::fs::try_exists(&paths.app_public).await? {
            let copied = copy_dir(&paths.app_public, output).await?;
            debug!(files = copied, from = %paths.app_public.display(), "Public directory copied");
        }

        if !config.ssg {
            let html = methods.call(GET_HTML, Value::Null).await?;
            let html = html
                .as_str()
                .ok_or_else(|| AppError::plugin("getHtml did not return a string"))?;
            tokio::fs::create_dir_all(output).await?;
            tokio::fs::write(output.join(INDEX_HTML), html).await?;
        }

        let compiled: CompileOutput = serde_json::from_value(methods.call(COMPILE, configs).await?)?;

        let report = BuildReport {
            built_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            bundler: compiled.bundler,
            output_path: output.clone(),
            assets: collect_assets(output).await?,
        };
        print_report(&report);

        info!(
            bundler = %report.bundler,
            assets = report.assets.len(),
            gzip_bytes = report.total_gzip_size(),
            elapsed_ms = report.elapsed_ms,
            "Build finished"
        );

        self.after_build
            .call(&report, json!({ "config": config }))
            .await?;
        Ok(serde_json::to_value(&report)?)
    }
}

/// Factory for the build command plugin.
pub fn factory() -> PluginFactory {
    Arc::new(|context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(BuildCommandPlugin {
            state: Arc::new(BuildState {
                context,
                after_build: NotifyHook::new(AFTER_BUILD_HOOK),
            }),
        }))
    })
}

struct BuildCommandPlugin {
    state: Arc<BuildState>,
}

#[async_trait]
impl Plugin for BuildCommandPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        ctx.add_new_hook(AFTER_BUILD_HOOK, self.state.after_build.binder(), false)
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
