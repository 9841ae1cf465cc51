//! Plugin loader: turns a [`PluginRef`] into a factory.
//!
//! Names are resolved by trying the naming conventions in order (`foo`,
//! `kiln-plugin-foo`, and `@scope/kiln-plugin` for scoped names) against
//! each configured [`ModuleResolver`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use kiln_core::{AppError, AppResult};

use crate::plugin::{PluginFactory, PluginModule, PluginRef};

/// Prefix of conventionally named plugin modules.
pub const PLUGIN_PREFIX: &str = "kiln-plugin-";

/// Module name looked up inside a scope (`@scope/kiln-plugin`).
pub const SCOPED_PLUGIN_MODULE: &str = "kiln-plugin";

/// A module found by a resolver, plus default options it ships with.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// The module's exports.
    pub module: PluginModule,
    /// Defaults that user options are merged over.
    pub defaults: Value,
}

impl ResolvedModule {
    /// A module without default options.
    pub fn new(module: PluginModule) -> Self {
        Self {
            module,
            defaults: Value::Object(Map::new()),
        }
    }
}

/// Looks up plugin modules by name.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Resolves a single candidate name.
    ///
    /// `Ok(None)` means this resolver does not know the name. Errors are
    /// treated by the loader as "not resolvable here".
    async fn resolve(&self, candidate: &str) -> AppResult<Option<ResolvedModule>>;
}

/// In-process registry of compiled-in plugin modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: HashMap<String, PluginModule>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a module under `name`.
    pub fn insert(&mut self, name: impl Into<String>, module: PluginModule) {
        self.modules.insert(name.into(), module);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, module: PluginModule) -> Self {
        self.insert(name, module);
        self
    }

    /// Returns the module registered under `name`.
    pub fn get(&self, name: &str) -> Option<&PluginModule> {
        self.modules.get(name)
    }

    /// Number of catalogued modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[async_trait]
impl ModuleResolver for ModuleCatalog {
    fn describe(&self) -> String {
        format!("catalog({} modules)", self.modules.len())
    }

    async fn resolve(&self, candidate: &str) -> AppResult<Option<ResolvedModule>> {
        Ok(self.get(candidate).cloned().map(ResolvedModule::new))
    }
}

/// On-disk plugin manifest (`<dir>/<candidate>.toml`).
#[derive(Debug, Deserialize)]
struct PluginManifest {
    /// Catalog name of the module implementing the plugin.
    module: String,
    /// Default options.
    #[serde(default)]
    options: toml::Table,
}

/// Resolves names to manifests inside plugin directories.
///
/// A manifest points at a module already present in the catalog and may
/// carry default options.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    dirs: Vec<PathBuf>,
    catalog: Arc<ModuleCatalog>,
}

impl DirectoryResolver {
    /// Creates a resolver over `dirs`, searched in order.
    pub fn new(dirs: Vec<PathBuf>, catalog: Arc<ModuleCatalog>) -> Self {
        Self { dirs, catalog }
    }

    fn manifest_file(candidate: &str) -> String {
        format!("{}.toml", candidate.trim_start_matches('@').replace('/', "__"))
    }
}

#[async_trait]
impl ModuleResolver for DirectoryResolver {
    fn describe(&self) -> String {
        format!("directories({})", self.dirs.len())
    }

    async fn resolve(&self, candidate: &str) -> AppResult<Option<ResolvedModule>> {
        let file_name = Self::manifest_file(candidate);

        for dir in &self.dirs {
            let path = dir.join(&file_name);
            if !tokio::fs::try_exists(&path).await? {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await?;
            let manifest: PluginManifest = toml::from_str(&raw).map_err(|e| {
                AppError::configuration(format!(
                    "invalid plugin manifest {}: {e}",
                    path.display()
                ))
            })?;

            let module = self.catalog.get(&manifest.module).cloned().ok_or_else(|| {
                AppError::plugin_not_found(&manifest.module)
            })?;

            debug!(
                candidate = %candidate,
                manifest = %path.display(),
                module = %manifest.module,
                "Plugin manifest resolved"
            );

            return Ok(Some(ResolvedModule {
                module,
                defaults: serde_json::to_value(manifest.options)?,
            }));
        }

        Ok(None)
    }
}

#[cfg(feature = "dynamic")]
pub mod dynamic {
    //! Shared-library resolver (feature `dynamic`).

    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tracing::info;

    use kiln_core::{AppError, AppResult};

    use super::{ModuleResolver, ResolvedModule};
    use crate::plugin::PluginModule;

    /// Symbol every dynamic plugin library exports.
    pub const ENTRY_SYMBOL: &[u8] = b"kiln_plugin_module";

    /// Signature of [`ENTRY_SYMBOL`]. Returns a boxed module.
    pub type ModuleEntryFn = unsafe extern "C" fn() -> *mut PluginModule;

    /// Loads plugin modules from shared libraries in the given directories.
    ///
    /// Only load trusted libraries: they run arbitrary code in-process.
    pub struct DynamicResolver {
        dirs: Vec<PathBuf>,
        /// Libraries stay loaded for as long as their factories may run.
        libraries: Mutex<Vec<libloading::Library>>,
    }

    impl DynamicResolver {
        /// Creates a resolver over `dirs`.
        pub fn new(dirs: Vec<PathBuf>) -> Self {
            Self {
                dirs,
                libraries: Mutex::new(Vec::new()),
            }
        }

        fn library_file(candidate: &str) -> String {
            let stem: String = candidate
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!(
                "{}{}{}",
                std::env::consts::DLL_PREFIX,
                stem.trim_start_matches('_'),
                std::env::consts::DLL_SUFFIX
            )
        }

        fn load(&self, path: &Path) -> AppResult<PluginModule> {
            // SAFETY: loading a library runs its initialisers; callers opt in
            // by placing it in a configured plugin directory.
            let lib = unsafe { libloading::Library::new(path) }.map_err(|e| {
                AppError::plugin(format!(
                    "failed to load plugin library '{}': {e}",
                    path.display()
                ))
            })?;

            // SAFETY: the symbol type is fixed by the plugin ABI above.
            let module = unsafe {
                let entry: libloading::Symbol<ModuleEntryFn> =
                    lib.get(ENTRY_SYMBOL).map_err(|e| {
                        AppError::malformed_factory(&format!("{} ({e})", path.display()))
                    })?;
                let raw = entry();
                if raw.is_null() {
                    return Err(AppError::malformed_factory(&path.display().to_string()));
                }
                *Box::from_raw(raw)
            };

            info!(path = %path.display(), "Dynamic plugin library loaded");

            self.libraries
                .lock()
                .map_err(|_| AppError::internal("dynamic library list poisoned"))?
                .push(lib);

            Ok(module)
        }
    }

    #[async_trait]
    impl ModuleResolver for DynamicResolver {
        fn describe(&self) -> String {
            format!("dynamic({})", self.dirs.len())
        }

        async fn resolve(&self, candidate: &str) -> AppResult<Option<ResolvedModule>> {
            let file_name = Self::library_file(candidate);
            for dir in &self.dirs {
                let path = dir.join(&file_name);
                if path.is_file() {
                    return self.load(&path).map(|m| Some(ResolvedModule::new(m)));
                }
            }
            Ok(None)
        }
    }

    impl std::fmt::Debug for DynamicResolver {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let loaded = self.libraries.lock().map(|l| l.len()).unwrap_or(0);
            f.debug_struct("DynamicResolver")
                .field("dirs", &self.dirs)
                .field("loaded_count", &loaded)
                .finish()
        }
    }
}

#[cfg(feature = "dynamic")]
pub use dynamic::DynamicResolver;

/// A factory ready to be invoked, with the options to pass it.
#[derive(Clone)]
pub struct LoadedFactory {
    /// The factory.
    pub factory: PluginFactory,
    /// Module defaults merged under the caller's options.
    pub options: Value,
}

/// Resolves plugin references to factories.
#[derive(Clone, Default)]
pub struct PluginLoader {
    resolvers: Vec<Arc<dyn ModuleResolver>>,
}

impl PluginLoader {
    /// A loader with no resolvers; only factories and modules load.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolver. Resolvers are consulted in insertion order.
    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// The names tried for a name reference, in order.
    pub fn candidate_names(name: &str) -> Vec<String> {
        let mut candidates = vec![name.to_string(), format!("{PLUGIN_PREFIX}{name}")];
        if name.starts_with('@') {
            candidates.push(format!("{name}/{SCOPED_PLUGIN_MODULE}"));
        }
        candidates
    }

    /// Resolves `reference` and merges module defaults under `options`.
    pub async fn resolve(&self, reference: &PluginRef, options: Value) -> AppResult<LoadedFactory> {
        match reference {
            PluginRef::Factory(factory) => Ok(LoadedFactory {
                factory: factory.clone(),
                options,
            }),
            PluginRef::Module(module) => Ok(LoadedFactory {
                factory: module.factory(&reference.describe())?,
                options,
            }),
            PluginRef::Name(name) => {
                let resolved = self
                    .resolve_name(name)
                    .await?
                    .ok_or_else(|| AppError::plugin_not_found(name))?;
                let (candidate, found) = resolved;
                Ok(LoadedFactory {
                    factory: found.module.factory(&candidate)?,
                    options: merge_options(found.defaults, options),
                })
            }
        }
    }

    async fn resolve_name(&self, name: &str) -> AppResult<Option<(String, ResolvedModule)>> {
        for candidate in Self::candidate_names(name) {
            for resolver in &self.resolvers {
                match resolver.resolve(&candidate).await {
                    Ok(Some(found)) => {
                        debug!(
                            reference = %name,
                            candidate = %candidate,
                            resolver = %resolver.describe(),
                            "Plugin module resolved"
                        );
                        return Ok(Some((candidate, found)));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(
                            candidate = %candidate,
                            resolver = %resolver.describe(),
                            error = %e,
                            "Candidate not resolvable"
                        );
                    }
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolvers: Vec<String> = self.resolvers.iter().map(|r| r.describe()).collect();
        f.debug_struct("PluginLoader")
            .field("resolvers", &resolvers)
            .finish()
    }
}

/// Shallow merge: keys in `options` win over `defaults`.
fn merge_options(defaults: Value, options: Value) -> Value {
    match (defaults, options) {
        (Value::Object(mut base), Value::Object(overrides)) => {
            base.extend(overrides);
            Value::Object(base)
        }
        (_, options) => options,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::context::PluginContext;
    use crate::plugin::Plugin;
    use kiln_core::ErrorKind;

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> Option<&str> {
            Some(self.0)
        }
    }

    fn factory(name: &'static str) -> PluginFactory {
        Arc::new(move |_: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
            Ok(Arc::new(Named(name)))
        })
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(PluginLoader::candidate_names("foo"), vec!["foo", "kiln-plugin-foo"]);
        assert_eq!(
            PluginLoader::candidate_names("@acme"),
            vec!["@acme", "kiln-plugin-@acme", "@acme/kiln-plugin"]
        );
    }

    #[tokio::test]
    async fn test_name_resolves_through_prefix() {
        let catalog = ModuleCatalog::new().with("kiln-plugin-foo", PluginModule::with_default(factory("foo")));
        let loader = PluginLoader::new().with_resolver(Arc::new(catalog));

        let loaded = loader.resolve(&PluginRef::from("foo"), json!({})).await.unwrap();
        assert_eq!(loaded.options, json!({}));
    }

    #[tokio::test]
    async fn test_scoped_name_resolves() {
        let catalog = ModuleCatalog::new().with("@acme/kiln-plugin", PluginModule::callable(factory("acme")));
        let loader = PluginLoader::new().with_resolver(Arc::new(catalog));
        assert!(loader.resolve(&PluginRef::from("@acme"), json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_name_reports_original_reference() {
        let loader = PluginLoader::new().with_resolver(Arc::new(ModuleCatalog::new()));
        let err = match loader.resolve(&PluginRef::from("ghost"), json!({})).await {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ErrorKind::PluginNotFound);
        assert!(err.message.contains("ghost"));
    }

    #[tokio::test]
    async fn test_module_without_export_is_malformed() {
        let catalog = ModuleCatalog::new().with("kiln-plugin-empty", PluginModule::empty());
        let loader = PluginLoader::new().with_resolver(Arc::new(catalog));
        let err = match loader.resolve(&PluginRef::from("empty"), json!({})).await {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ErrorKind::MalformedFactory);
        assert!(err.message.contains("kiln-plugin-empty"));
    }

    #[tokio::test]
    async fn test_directory_manifest_defaults_merge_under_options() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kiln-plugin-size.toml"),
            "module = \"size-impl\"\n[options]\nlimit = 3\nunit = \"kb\"\n",
        )
        .unwrap();

        let catalog = Arc::new(ModuleCatalog::new().with("size-impl", PluginModule::callable(factory("size"))));
        let resolver = DirectoryResolver::new(vec![dir.path().to_path_buf()], catalog);
        let loader = PluginLoader::new().with_resolver(Arc::new(resolver));

        let loaded = loader.resolve(&PluginRef::from("size"), json!({"limit": 9})).await.unwrap();
        assert_eq!(loaded.options, json!({"limit": 9, "unit": "kb"}));
    }

    #[tokio::test]
    async fn test_directory_manifest_with_unknown_module_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "module = \"nowhere\"\n").unwrap();

        let catalog = Arc::new(ModuleCatalog::new());
        let loader = PluginLoader::new()
            .with_resolver(Arc::new(DirectoryResolver::new(vec![dir.path().to_path_buf()], catalog.clone())));

        let err = match loader.resolve(&PluginRef::from("broken"), json!({})).await {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.kind, ErrorKind::PluginNotFound);
        assert!(err.message.contains("broken"));
    }
}
