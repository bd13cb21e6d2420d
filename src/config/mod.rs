//! Configuration handling for Ferrule
//!
//! Parses and validates ferrule.toml configuration files. Validation runs
//! eagerly so every configuration problem surfaces before any build work.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::native;
use crate::transform::RuleSet;

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Build mode
    #[serde(default)]
    pub mode: Mode,

    /// Named entries, each bundled into one output file
    #[serde(default)]
    pub entry: BTreeMap<String, EntrySources>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Development server settings
    #[serde(default)]
    pub dev: DevConfig,

    /// Static directories copied into the output, in order
    #[serde(default)]
    pub copy: Vec<CopyPattern>,

    /// Native module settings; absent when the project has none
    #[serde(default)]
    pub native: Option<NativeConfig>,

    /// Stylesheet settings
    #[serde(default)]
    pub styles: StylesConfig,

    /// Explicit module rules, replacing the defaults when present
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> BuildResult<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| BuildError::io(path, e))?
                .join(path)
        };

        let content = fs::read_to_string(&canonical_path).map_err(|e| {
            BuildError::config(format!(
                "failed to read config file {}: {}",
                canonical_path.display(),
                e
            ))
        })?;

        // Set root directory to the directory containing the config file
        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml(&content, root)
    }

    /// Parse and validate configuration text rooted at `root`
    pub fn from_toml(content: &str, root: impl Into<PathBuf>) -> BuildResult<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| BuildError::config(format!("failed to parse ferrule.toml: {}", e)))?;
        let root = root.into();
        // Watch events report resolved paths, so the root must be resolved too
        config.root = fs::canonicalize(&root).map_err(|e| BuildError::io(&root, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration mirroring a typical wasm-pack project
    pub fn default_config() -> Self {
        let mut entry = BTreeMap::new();
        entry.insert(
            "index".to_string(),
            EntrySources::One("./js/index.js".to_string()),
        );

        Self {
            mode: Mode::Development,
            entry,
            output: OutputConfig::default(),
            dev: DevConfig::default(),
            copy: vec![CopyPattern::Dir("static".to_string())],
            native: Some(NativeConfig::default()),
            styles: StylesConfig::default(),
            rules: Vec::new(),
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> BuildResult<()> {
        if self.entry.is_empty() {
            return Err(BuildError::config(
                "at least one entry must be specified in ferrule.toml",
            ));
        }

        if self.entry.len() > 1 && !self.output.filename.contains("[name]") {
            return Err(BuildError::config(format!(
                "output filename '{}' must contain [name] when there are several entries",
                self.output.filename
            )));
        }

        for (name, path) in self.entry_paths() {
            for source in path {
                if !source.is_file() {
                    return Err(BuildError::config(format!(
                        "entry '{}' points to non-existent file: {}",
                        name,
                        source.display()
                    )));
                }
            }
        }

        for pattern in &self.copy {
            let from = self.root.join(pattern.from());
            if !from.is_dir() {
                return Err(BuildError::config(format!(
                    "static directory does not exist: {}",
                    from.display()
                )));
            }
        }

        for style in self.style_entries() {
            if !style.is_file() {
                return Err(BuildError::config(format!(
                    "stylesheet entry does not exist: {}",
                    style.display()
                )));
            }
        }

        if let Some(dir) = self.native_dir() {
            native::read_manifest(&dir)?;
        }

        RuleSet::from_config(self)?;

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// All entries with their absolute source paths, sorted by name
    pub fn entry_paths(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.entry
            .iter()
            .map(|(name, sources)| {
                let paths = sources
                    .paths()
                    .into_iter()
                    .map(|p| self.root.join(p))
                    .collect();
                (name.clone(), paths)
            })
            .collect()
    }

    /// Absolute static directories with their output-relative destinations
    pub fn copy_sources(&self) -> Vec<(PathBuf, PathBuf)> {
        self.copy
            .iter()
            .map(|p| (self.root.join(p.from()), PathBuf::from(p.to())))
            .collect()
    }

    /// Absolute native crate directory, if a native module is configured
    pub fn native_dir(&self) -> Option<PathBuf> {
        self.native.as_ref().map(|n| self.root.join(&n.crate_dir))
    }

    /// Absolute stylesheet entries
    pub fn style_entries(&self) -> Vec<PathBuf> {
        self.styles
            .entries
            .iter()
            .map(|p| self.root.join(p))
            .collect()
    }

    /// Absolute directories searched by stylesheet imports, from every rule
    pub fn include_paths(&self) -> Vec<PathBuf> {
        let from_rules = self.rules.iter().flat_map(|rule| {
            rule.loaders.iter().flat_map(|stage| match stage {
                StageConfig::Preprocess { include_paths } => include_paths.as_slice(),
                _ => &[][..],
            })
        });

        let mut paths: Vec<PathBuf> = Vec::new();
        for path in self.styles.include_paths.iter().chain(from_rules) {
            let path = self.root.join(path);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Whether output should be minified
    pub fn minify(&self) -> bool {
        self.output.minify.unwrap_or(self.mode.is_production())
    }

    /// Whether the default style rule extracts CSS to standalone files
    pub fn extract_styles(&self) -> bool {
        self.styles.extract.unwrap_or(self.mode.is_production())
    }

    /// Paths whose changes trigger a rebuild in watch mode
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut push = |p: PathBuf| {
            if !paths.iter().any(|existing| p.starts_with(existing)) {
                paths.retain(|existing| !existing.starts_with(&p));
                paths.push(p);
            }
        };

        for (_, sources) in self.entry_paths() {
            for source in sources {
                if let Some(parent) = source.parent() {
                    push(parent.to_path_buf());
                }
            }
        }
        for (from, _) in self.copy_sources() {
            push(from);
        }
        for style in self.style_entries() {
            if let Some(parent) = style.parent() {
                push(parent.to_path_buf());
            }
        }
        for dir in self.include_paths() {
            push(dir);
        }
        if let Some(dir) = self.native_dir() {
            push(dir.join("src"));
            push(dir.join("Cargo.toml"));
        }

        paths.sort();
        paths
    }

    /// Paths never treated as inputs: the output and the native build directory
    pub fn ignored_paths(&self) -> Vec<PathBuf> {
        let mut ignored = vec![self.output_dir()];
        if let (Some(dir), Some(native)) = (self.native_dir(), self.native.as_ref()) {
            ignored.push(dir.join(&native.out_dir));
            ignored.push(dir.join("target"));
        }
        ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();
        fs::write(dir.path().join("js/index.js"), "console.log('hi');").unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let dir = project();
        let config = Config::from_toml("[entry]\nindex = \"./js/index.js\"\n", dir.path()).unwrap();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.output.dir, "dist");
        assert_eq!(config.output.filename, "[name].js");
        assert_eq!(config.dev.port, 9000);
        assert!(config.dev.compress);
        assert!(config.dev.history_api_fallback);
        assert!(!config.minify());
        assert!(!config.extract_styles());
        assert!(config.native.is_none());
    }

    #[test]
    fn test_production_defaults() {
        let dir = project();
        let config = Config::from_toml(
            "mode = \"production\"\n[entry]\nindex = \"./js/index.js\"\n",
            dir.path(),
        )
        .unwrap();

        assert!(config.minify());
        assert!(config.extract_styles());
    }

    #[test]
    fn test_entry_list_and_copy_patterns() {
        let dir = project();
        fs::write(dir.path().join("js/polyfill.js"), "").unwrap();
        fs::create_dir_all(dir.path().join("fonts")).unwrap();

        let config = Config::from_toml(
            r#"
copy = ["static", { from = "fonts", to = "assets/fonts" }]

[entry]
index = ["./js/polyfill.js", "./js/index.js"]
"#,
            dir.path(),
        )
        .unwrap();

        let entries = config.entry_paths();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.len(), 2);
        assert!(entries[0].1[0].ends_with("js/polyfill.js"));

        let copies = config.copy_sources();
        assert_eq!(copies[0].1, PathBuf::from(""));
        assert_eq!(copies[1].1, PathBuf::from("assets/fonts"));
    }

    #[test]
    fn test_missing_entry_is_configuration_error() {
        let dir = project();
        let err = Config::from_toml("[entry]\nindex = \"./js/nope.js\"\n", dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn test_missing_static_dir_fails_fast() {
        let dir = project();
        let err = Config::from_toml(
            "copy = [\"public\"]\n[entry]\nindex = \"./js/index.js\"\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("static directory does not exist"));
    }

    #[test]
    fn test_missing_native_manifest_fails_fast() {
        let dir = project();
        let err = Config::from_toml(
            "[entry]\nindex = \"./js/index.js\"\n[native]\ncrate_dir = \".\"\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn test_several_entries_need_name_placeholder() {
        let dir = project();
        fs::write(dir.path().join("js/admin.js"), "").unwrap();
        let err = Config::from_toml(
            "[output]\nfilename = \"bundle.js\"\n[entry]\nindex = \"./js/index.js\"\nadmin = \"./js/admin.js\"\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("[name]"));
    }

    #[test]
    fn test_watch_paths_skip_nested_duplicates() {
        let dir = project();
        fs::write(dir.path().join("js/admin.js"), "").unwrap();
        let config = Config::from_toml(
            "copy = [\"static\"]\n[entry]\nindex = \"./js/index.js\"\nadmin = \"./js/admin.js\"\n",
            dir.path(),
        )
        .unwrap();

        let paths = config.watch_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().any(|p| p.ends_with("static")));
    }

    #[test]
    fn test_watch_paths_cover_style_include_paths() {
        let dir = project();
        for sub in ["styles", "vendor/scss", "theme"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let config = Config::from_toml(
            r#"
[entry]
index = "./js/index.js"

[styles]
include_paths = ["vendor/scss"]

[[rules]]
test = "\\.scss$"
use = [
    { loader = "inject" },
    { loader = "preprocess", include_paths = ["theme", "vendor/scss"] },
]
"#,
            dir.path(),
        )
        .unwrap();

        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            config.include_paths(),
            vec![root.join("vendor/scss"), root.join("theme")]
        );

        let paths = config.watch_paths();
        assert!(paths.contains(&root.join("vendor/scss")));
        assert!(paths.contains(&root.join("theme")));
    }

    #[test]
    fn test_load_resolves_root() {
        let dir = project();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(
            dir.path().join("ferrule.toml"),
            "[entry]\nindex = \"./js/index.js\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path().join("sub/../ferrule.toml")).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(config.root, root);
        assert!(config
            .ignored_paths()
            .iter()
            .all(|p| p.starts_with(&root) && !p.to_string_lossy().contains("..")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_is_resolved() {
        let dir = project();
        let links = tempdir().unwrap();
        let link = links.path().join("project");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();

        let config = Config::from_toml("[entry]\nindex = \"./js/index.js\"\n", &link).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(config.root, root);
        assert_eq!(config.ignored_paths(), vec![root.join("dist")]);
    }
}
