//! The built-in plugins driven end to end through `receive_command`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use kiln_builtin::methods::{CREATE_BUNDLER_CONFIG, DEVELOPMENT, build_args};
use kiln_builtin::{BuildReport, Builtins, ManifestBundler, module_catalog};
use kiln_core::{InputConfig, PathTable};
use kiln_plugin::prelude::*;
use kiln_plugin::{PluginLoader, PluginManager};

struct Project {
    dir: TempDir,
    manager: PluginManager,
}

impl Project {
    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap()
    }
}

/// A project with a `public/` directory, the built-ins and `extra` loaded,
/// and configuration and paths resolved.
async fn project(input: InputConfig, extra: Vec<PluginSpec>) -> Project {
    project_with(PluginManager::default(), input, extra).await
}

async fn project_with(manager: PluginManager, input: InputConfig, extra: Vec<PluginSpec>) -> Project {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("public/img")).unwrap();
    std::fs::write(dir.path().join("public/robots.txt"), "User-agent: *").unwrap();
    std::fs::write(dir.path().join("public/img/logo.svg"), "<svg/>").unwrap();

    let builtins = Builtins::new(
        input,
        PathTable::resolve_from(dir.path()),
        Arc::new(ManifestBundler::new()),
    );
    let mut specs = builtins.specs();
    specs.extend(extra);

    manager.load_plugins(specs).await.unwrap();
    builtins.resolve().await.unwrap();

    Project { dir, manager }
}

#[tokio::test]
async fn test_build_writes_output_directory() {
    let project = project(InputConfig::default(), Vec::new()).await;

    let report: BuildReport = serde_json::from_value(
        project.manager.receive_command("build", json!({})).await.unwrap(),
    )
    .unwrap();

    assert!(project.root().join("dist/robots.txt").is_file());
    assert!(project.root().join("dist/img/logo.svg").is_file());

    let html = project.read("dist/index.html");
    assert!(html.contains(r#"<link rel="icon" href="/favicon.ico" />"#));

    let client: Value = serde_json::from_str(&project.read("dist/client.bundle.json")).unwrap();
    assert_eq!(client["mode"], "production");
    assert_eq!(client["define"]["SSG"], false);

    let names: Vec<_> = report.assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["client.bundle.json", "index.html"]);
    assert_eq!(report.bundler, "manifest");
    assert!(report.assets.iter().all(|a| a.gzip_size > 0));
}

#[tokio::test]
async fn test_after_build_listeners_receive_report() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = factory_fn(move |_, _| {
        let sink = sink.clone();
        PluginBuilder::named("deploy")
            .tap(
                "afterBuild",
                handler_fn(move |report, _| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(report["bundler"].clone());
                        Ok(Value::Null)
                    }
                }),
            )
            .build()
    });

    let project = project(InputConfig::default(), vec![PluginSpec::from(listener)]).await;
    project.manager.receive_command("build", json!({})).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!("manifest")]);
}

#[tokio::test]
async fn test_config_hook_changes_public_path() {
    let static_prefix = factory_fn(|_, _| {
        PluginBuilder::named("static-prefix")
            .tap(
                "config",
                handler_fn(|mut config, _| async move {
                    config["public_path"] = json!("/static/");
                    Ok(config)
                }),
            )
            .build()
    });

    let project = project(InputConfig::default(), vec![PluginSpec::from(static_prefix)]).await;
    project.manager.receive_command("build", json!({})).await.unwrap();

    let html = project.read("dist/index.html");
    assert!(html.contains(r#"href="/static/favicon.ico""#));
}

#[tokio::test]
async fn test_paths_hook_moves_output_directory() {
    let out_dir = factory_fn(|_, _| {
        PluginBuilder::named("out-dir")
            .tap(
                "paths",
                handler_fn(|mut paths, args| async move {
                    assert!(args["config"].is_object());
                    let root = paths["app_root"].as_str().unwrap_or_default().to_string();
                    paths["app_output_path"] = json!(format!("{root}/build"));
                    Ok(paths)
                }),
            )
            .build()
    });

    let project = project(InputConfig::default(), vec![PluginSpec::from(out_dir)]).await;
    project.manager.receive_command("build", json!({})).await.unwrap();

    assert!(project.root().join("build/index.html").is_file());
    assert!(!project.root().join("dist").exists());
}

#[tokio::test]
async fn test_ssg_build_adds_server_bundle() {
    let input = InputConfig {
        ssg: true,
        ..InputConfig::default()
    };
    let project = project(input, Vec::new()).await;
    let report = project.manager.receive_command("build", json!({})).await.unwrap();

    assert!(!project.root().join("dist/index.html").exists());

    let client: Value = serde_json::from_str(&project.read("dist/client.bundle.json")).unwrap();
    assert_eq!(client["define"]["SSG"], true);
    assert!(!client["plugins"].as_array().unwrap().contains(&json!("html")));
    assert_eq!(client["transpiler"]["plugins"], json!(["loadable"]));

    let server: Value = serde_json::from_str(&project.read("dist/server.bundle.json")).unwrap();
    assert_eq!(server["target"], "node");
    assert_eq!(server["output"]["library"]["type"], "commonjs2");
    assert!(server["entry"]["ssg"].as_str().unwrap().ends_with("src/ssg"));

    assert_eq!(report["assets"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dev_serves_with_hooked_server_config() {
    let proxy = factory_fn(|_, _| {
        PluginBuilder::named("proxy")
            .tap(
                "devServer",
                handler_fn(|mut server, args| async move {
                    assert_eq!(args["config"]["port"], 3000);
                    server["proxy"] = json!({"/api": "http://localhost:8080"});
                    Ok(server)
                }),
            )
            .build()
    });

    let project = project(InputConfig::default(), vec![PluginSpec::from(proxy)]).await;
    let served = project
        .manager
        .receive_command("dev", json!({"port": 4500}))
        .await
        .unwrap();

    assert_eq!(served["url"], "http://0.0.0.0:4500");
    assert_eq!(served["bundles"], 1);
    assert_eq!(served["server"]["proxy"]["/api"], "http://localhost:8080");
    assert_eq!(served["server"]["hot"], true);
    // Nothing is written in development.
    assert!(!project.root().join("dist").exists());
}

#[tokio::test]
async fn test_optional_plugin_resolves_by_short_name() {
    let manager = PluginManager::new(PluginLoader::new().with_resolver(Arc::new(module_catalog())));
    let project = project_with(
        manager,
        InputConfig::default(),
        vec![PluginSpec::with_options("auto-start-server", json!({"delay_ms": 100}))],
    )
    .await;

    let server = project
        .manager
        .methods()
        .call(CREATE_BUNDLER_CONFIG, build_args(DEVELOPMENT, true))
        .await
        .unwrap();
    let plugins = server["plugins"].as_array().unwrap();
    assert!(plugins.contains(&json!({"name": "auto-start-server", "delay_ms": 100})));

    let names: Vec<_> = project.manager.plugins().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names.last().map(String::as_str), Some("auto-start-server"));
}

#[tokio::test]
async fn test_plugins_command_lists_builtins_in_load_order() {
    let project = project(InputConfig::default(), Vec::new()).await;
    let listed = project
        .manager
        .receive_command("plugins", json!({"json": true}))
        .await
        .unwrap();

    let names: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "__configPlugin",
            "__pathsPlugin",
            "__htmlPlugin",
            "__bundlerPlugin",
            "__ssgPlugin",
            "__devCommandPlugin",
            "__buildCommandPlugin",
            "__inspectPlugin",
        ]
    );
    assert!(listed
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["registered"] == true && p["tapped"] == true && p["ignored"] == false));
}

#[tokio::test]
async fn test_config_command_reports_config_and_paths() {
    let project = project(InputConfig::default(), Vec::new()).await;
    let shown = project
        .manager
        .receive_command("config", json!({"json": true}))
        .await
        .unwrap();

    assert_eq!(shown["config"]["port"], 3000);
    assert!(shown["paths"]["app_output_path"].as_str().unwrap().ends_with("dist"));
}
