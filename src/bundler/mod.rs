//! Core bundler implementation
//!
//! Runs the pre-build steps concurrently (static copy, native module compile,
//! stylesheet entries), traces every entry's module graph, and renders one
//! output file per entry into an [`OutputSnapshot`].

mod chunk;
mod graph;
mod output;
pub mod runtime;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::assets::{self, AssetCopier, CopiedAsset};
use crate::config::Config;
use crate::error::{BuildError, BuildResult};
use crate::native::{NativeModule, NativeModuleBuilder};
use crate::resolver::Resolver;
use crate::styles::{StyleCache, StyleMode};
use crate::transform::{RuleSet, Transformer};
use crate::utils;

pub use chunk::Chunk;
pub use graph::{Module, ModuleGraph, ModuleId, ModuleType};
pub use output::{atomic_write, OutputSnapshot};

/// Result of a build operation
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Every artifact of the build
    pub snapshot: OutputSnapshot,

    /// Generated bundles, one per entry
    pub bundles: Vec<BundleInfo>,

    /// Entry artifact name -> emitted file
    pub manifest: BTreeMap<String, String>,

    /// Number of modules traced
    pub modules: usize,

    /// Source path of every traced module
    pub inputs: Vec<PathBuf>,

    /// Number of files copied from static directories
    pub copied: usize,

    pub duration: Duration,
}

/// Information about a generated bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    /// Entry name
    pub name: String,

    /// Output path relative to the output directory
    pub path: String,

    /// Bundle size in bytes
    pub size: usize,

    /// Extracted stylesheet, when styles are extracted and the entry has any
    pub stylesheet: Option<String>,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Canonical project root; module keys are relative to it
    root: PathBuf,

    rules: RuleSet,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Config) -> BuildResult<Self> {
        let root = fs::canonicalize(&config.root).map_err(|e| BuildError::io(&config.root, e))?;
        let rules = RuleSet::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            root,
            rules,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Build and write the output directory
    ///
    /// Files are written only once the whole build succeeded.
    pub async fn run(&self) -> BuildResult<BuildOutput> {
        let output = self.build().await?;

        info!("Writing bundles...");
        output.snapshot.write_to(&self.config.output_dir())?;

        Ok(output)
    }

    /// Build the project into memory
    pub async fn build(&self) -> BuildResult<BuildOutput> {
        let start = Instant::now();

        // 1. Pre-build steps, joined before tracing
        info!("Running pre-build steps...");
        let (assets, native, style_cache) = tokio::try_join!(
            self.collect_assets(),
            self.build_native(),
            self.compile_style_entries(),
        )?;

        let mut resolver = Resolver::new();
        if let Some(native) = &native {
            native.register(&mut resolver);
        }
        let transformer = Transformer::new(self.rules.clone(), Arc::new(style_cache));

        // 2. Build the module graph from entrypoints
        info!("Building module graph...");
        let mut graph = ModuleGraph::new();
        let mut chunks = Vec::new();

        for (name, sources) in self.config.entry_paths() {
            debug!("Processing entrypoint: {}", name);

            let mut entry_ids = Vec::with_capacity(sources.len());
            for source in &sources {
                entry_ids.push(self.trace(source, &resolver, &transformer, &mut graph)?);
            }

            let module_ids = graph.get_reachable_modules(&entry_ids);
            chunks.push(Chunk::entry(name, entry_ids, module_ids));
        }

        // 3. Emit bundles, stylesheets and static files
        info!("Emitting {} bundle(s)...", chunks.len());
        let mut snapshot = OutputSnapshot::new();
        let mut manifest = BTreeMap::new();
        let bundles = self.emit(&chunks, &graph, &mut snapshot, &mut manifest)?;
        self.emit_style_entries(&transformer, &graph, &mut snapshot, &mut manifest)?;
        let copied = assets::merge(assets, &mut snapshot);

        if self.config.output.manifest {
            let json = serde_json::to_string_pretty(&manifest)
                .map_err(|e| BuildError::config(format!("failed to serialize manifest: {}", e)))?;
            snapshot.insert("manifest.json", json);
        }

        let duration = start.elapsed();
        debug!("Build completed in {:?}", duration);

        Ok(BuildOutput {
            snapshot,
            bundles,
            manifest,
            modules: graph.len(),
            inputs: graph.paths().map(Path::to_path_buf).collect(),
            copied,
            duration,
        })
    }

    async fn collect_assets(&self) -> BuildResult<Vec<CopiedAsset>> {
        let copier = AssetCopier::new(self.config.copy_sources());
        blocking(&self.root, move || copier.collect()).await
    }

    async fn build_native(&self) -> BuildResult<Option<NativeModule>> {
        match NativeModuleBuilder::from_config(&self.config) {
            Some(builder) => builder.build().await.map(Some),
            None => Ok(None),
        }
    }

    /// Transform declared stylesheet entries ahead of graph tracing
    async fn compile_style_entries(&self) -> BuildResult<StyleCache> {
        let entries = self.config.style_entries();
        let rules = self.rules.clone();

        blocking(&self.root, move || {
            let mut cache = StyleCache::new();
            for entry in entries {
                let path = fs::canonicalize(&entry).map_err(|e| BuildError::io(&entry, e))?;
                let chain = rules.style_chain(&path).ok_or_else(|| {
                    BuildError::config(format!(
                        "no style rule matches stylesheet entry {}",
                        entry.display()
                    ))
                })?;
                let module = chain.apply_file(&path)?;
                cache.insert(path, module);
            }
            Ok(cache)
        })
        .await
    }

    /// Add an entry and everything it imports to the graph
    fn trace(
        &self,
        entry: &Path,
        resolver: &Resolver,
        transformer: &Transformer,
        graph: &mut ModuleGraph,
    ) -> BuildResult<ModuleId> {
        let mut queue = VecDeque::new();
        let entry_id = self.load_module(entry, transformer, graph, &mut queue)?;

        while let Some(id) = queue.pop_front() {
            let (path, specifiers) = match graph.get_module(id) {
                Some(module) => (module.path.clone(), module.transformed.dependencies.clone()),
                None => continue,
            };

            for specifier in specifiers {
                let resolved = resolver.resolve(&specifier, &path)?;
                let dep_id = self.load_module(&resolved, transformer, graph, &mut queue)?;
                graph.add_dependency(id, specifier, dep_id);
            }
        }

        Ok(entry_id)
    }

    /// Read and transform a module unless the graph already has it
    fn load_module(
        &self,
        path: &Path,
        transformer: &Transformer,
        graph: &mut ModuleGraph,
        queue: &mut VecDeque<ModuleId>,
    ) -> BuildResult<ModuleId> {
        let canonical_path = fs::canonicalize(path).map_err(|e| BuildError::io(path, e))?;

        if let Some(id) = graph.get_module_id(&canonical_path) {
            return Ok(id);
        }

        let bytes = fs::read(&canonical_path).map_err(|e| BuildError::io(&canonical_path, e))?;
        let module_type = ModuleType::detect(&canonical_path, transformer.rules());
        let transformed = transformer.transform(&bytes, &canonical_path, &module_type)?;
        let key = utils::module_key(&self.root, &canonical_path);

        debug!("Module {} ({:?})", key, module_type);

        let id = graph.add_module(Module {
            key,
            path: canonical_path,
            module_type,
            transformed,
        });
        queue.push_back(id);

        Ok(id)
    }

    /// Render each chunk, plus its extracted stylesheet
    fn emit(
        &self,
        chunks: &[Chunk],
        graph: &ModuleGraph,
        snapshot: &mut OutputSnapshot,
        manifest: &mut BTreeMap<String, String>,
    ) -> BuildResult<Vec<BundleInfo>> {
        let style_mode = self.rules.style_mode()?;
        let mut bundles = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let code = runtime::render(chunk, graph);
            let code = if self.config.minify() {
                runtime::minify(&code)
            } else {
                code
            };

            let path = output_filename(&self.config.output.filename, &chunk.name, code.as_bytes());
            let size = code.len();
            snapshot.insert(&path, code);
            manifest.insert(format!("{}.js", chunk.name), path.clone());

            let stylesheet = match &style_mode {
                StyleMode::Extract { filename } => {
                    let css: Vec<&str> = chunk
                        .module_ids
                        .iter()
                        .filter_map(|id| graph.get_module(*id))
                        .filter_map(|m| m.transformed.extracted_css.as_deref())
                        .collect();

                    if css.is_empty() {
                        None
                    } else {
                        let css = css.join("\n");
                        let css_path = output_filename(filename, &chunk.name, css.as_bytes());
                        snapshot.insert(&css_path, css);
                        manifest.insert(format!("{}.css", chunk.name), css_path.clone());
                        Some(css_path)
                    }
                }
                StyleMode::Inject => None,
            };

            bundles.push(BundleInfo {
                name: chunk.name.clone(),
                path,
                size,
                stylesheet,
            });
        }

        Ok(bundles)
    }

    /// Stylesheet entries no bundle imports still get their own file when extracting
    fn emit_style_entries(
        &self,
        transformer: &Transformer,
        graph: &ModuleGraph,
        snapshot: &mut OutputSnapshot,
        manifest: &mut BTreeMap<String, String>,
    ) -> BuildResult<()> {
        let imported: HashSet<&Path> = graph.paths().collect();

        for entry in self.config.style_entries() {
            let Ok(path) = fs::canonicalize(&entry) else {
                continue;
            };
            if imported.contains(path.as_path()) {
                continue;
            }

            let Some(module) = transformer.cached_style(&path) else {
                continue;
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "styles".to_string());

            match transformer.rules().style_mode() {
                Ok(StyleMode::Extract { filename }) => {
                    let css_path = output_filename(&filename, &name, module.css().as_bytes());
                    if snapshot.contains(&css_path) {
                        return Err(BuildError::config(format!(
                            "stylesheet entry {} would overwrite {}, which a bundle already emits",
                            entry.display(),
                            css_path
                        )));
                    }
                    snapshot.insert(&css_path, module.css());
                    manifest.insert(format!("{}.css", name), css_path);
                }
                _ => warn!(
                    "Stylesheet entry {} is not imported anywhere and styles are injected; it is not emitted",
                    entry.display()
                ),
            }
        }

        Ok(())
    }
}

/// Expand `[name]` and `[contenthash]` in an output filename template
pub fn output_filename(template: &str, name: &str, content: &[u8]) -> String {
    let mut filename = template.replace("[name]", name);
    if filename.contains("[contenthash]") {
        filename = filename.replace("[contenthash]", &utils::content_hash(content));
    }
    filename
}

/// Run blocking work on the blocking pool
async fn blocking<T, F>(root: &Path, work: F) -> BuildResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BuildResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BuildError::io(root, std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("[name].js", "index", b"x"), "index.js");
        assert_eq!(output_filename("js/[name].bundle.js", "admin", b"x"), "js/admin.bundle.js");

        let hashed = output_filename("[name].[contenthash].js", "index", b"console.log(1)");
        assert!(hashed.starts_with("index."));
        assert_eq!(hashed.len(), "index.".len() + 8 + ".js".len());
        assert_eq!(hashed, output_filename("[name].[contenthash].js", "index", b"console.log(1)"));
    }

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::create_dir_all(dir.path().join("styles")).unwrap();
        fs::write(
            dir.path().join("js/index.js"),
            "import { greet } from './greet';\nimport '../styles/main.scss';\nimport data from './data.json';\ngreet(data.name);\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("js/greet.js"),
            "export function greet(name) {\n  console.log('hello ' + name);\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("js/data.json"), "{\"name\": \"world\"}\n").unwrap();
        fs::write(
            dir.path().join("styles/main.scss"),
            "$accent: #018786;\n.banner { color: $accent; }\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_build_traces_graph() {
        let dir = project();
        let config = Config::from_toml("[entry]\nindex = \"./js/index.js\"\n", dir.path()).unwrap();
        let output = Bundler::new(config).unwrap().build().await.unwrap();

        assert_eq!(output.modules, 4);
        assert_eq!(output.bundles.len(), 1);
        assert_eq!(output.bundles[0].path, "index.js");
        assert!(output.bundles[0].stylesheet.is_none());

        let code = String::from_utf8(output.snapshot.get("index.js").unwrap().to_vec()).unwrap();
        assert!(code.contains("\"js/greet.js\": [function(module, exports, require)"));
        assert!(code.contains("{\"./greet\": \"js/greet.js\", \"../styles/main.scss\": \"styles/main.scss\", \"./data.json\": \"js/data.json\"}"));
        assert!(code.contains("color: #018786"));
    }

    #[tokio::test]
    async fn test_production_extracts_css() {
        let dir = project();
        let config = Config::from_toml(
            "mode = \"production\"\n[entry]\nindex = \"./js/index.js\"\n[output]\nmanifest = true\n",
            dir.path(),
        )
        .unwrap();
        let output = Bundler::new(config).unwrap().build().await.unwrap();

        assert_eq!(output.bundles[0].stylesheet.as_deref(), Some("index.css"));
        assert_eq!(output.snapshot.get("index.css"), Some(&b".banner{color:#018786}"[..]));
        assert_eq!(output.manifest.get("index.css").map(String::as_str), Some("index.css"));
        assert!(output.snapshot.contains("manifest.json"));
    }

    #[tokio::test]
    async fn test_unresolved_import_fails() {
        let dir = project();
        fs::write(dir.path().join("js/index.js"), "import './missing.js';\n").unwrap();
        let config = Config::from_toml("[entry]\nindex = \"./js/index.js\"\n", dir.path()).unwrap();

        let err = Bundler::new(config).unwrap().build().await.unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_unimported_style_entry_is_extracted() {
        let dir = project();
        fs::write(dir.path().join("styles/print.css"), "@media print { .banner { display: none; } }\n").unwrap();
        let config = Config::from_toml(
            "mode = \"production\"\n[entry]\nindex = \"./js/index.js\"\n[styles]\nentries = [\"styles/print.css\"]\n",
            dir.path(),
        )
        .unwrap();
        let output = Bundler::new(config).unwrap().build().await.unwrap();

        assert!(output.snapshot.contains("print.css"));
    }

    #[tokio::test]
    async fn test_style_entry_cannot_replace_extracted_bundle_css() {
        let dir = project();
        fs::write(dir.path().join("styles/index.scss"), ".print { display: none; }\n").unwrap();
        let config = Config::from_toml(
            "mode = \"production\"\n[entry]\nindex = \"./js/index.js\"\n[styles]\nentries = [\"styles/index.scss\"]\n",
            dir.path(),
        )
        .unwrap();

        let err = Bundler::new(config).unwrap().build().await.unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert!(err.to_string().contains("index.css"));
    }
}
