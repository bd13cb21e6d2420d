//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Build mode, selects minification and style extraction defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!("unknown mode '{}' (expected development or production)", other)),
        }
    }
}

/// Source module(s) of a named entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrySources {
    One(String),
    Many(Vec<String>),
}

impl EntrySources {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            EntrySources::One(path) => vec![path.as_str()],
            EntrySources::Many(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Filename template; supports `[name]` and `[contenthash]`
    #[serde(default = "default_filename")]
    pub filename: String,

    /// Write a manifest.json mapping entry names to emitted files
    #[serde(default)]
    pub manifest: bool,

    /// Minify emitted JavaScript and CSS (defaults to on in production)
    #[serde(default)]
    pub minify: Option<bool>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            filename: default_filename(),
            manifest: false,
            minify: None,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_filename() -> String {
    "[name].js".to_string()
}

fn default_true() -> bool {
    true
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to run dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Gzip responses
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Serve the entry document for unknown paths
    #[serde(default = "default_true")]
    pub history_api_fallback: bool,

    /// Entry document, relative to the output root
    #[serde(default = "default_index")]
    pub index: String,

    /// Push reload notifications over WebSocket
    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// Quiet period before a burst of changes triggers a rebuild
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Open browser automatically
    #[serde(default)]
    pub open: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            compress: true,
            history_api_fallback: true,
            index: default_index(),
            live_reload: true,
            debounce_ms: default_debounce_ms(),
            open: false,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

/// A static directory copied verbatim into the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyPattern {
    Dir(String),
    Detailed {
        from: String,
        #[serde(default)]
        to: Option<String>,
    },
}

impl CopyPattern {
    pub fn from(&self) -> &str {
        match self {
            CopyPattern::Dir(from) => from,
            CopyPattern::Detailed { from, .. } => from,
        }
    }

    /// Destination relative to the output root (empty for the root itself)
    pub fn to(&self) -> &str {
        match self {
            CopyPattern::Dir(_) => "",
            CopyPattern::Detailed { to, .. } => to.as_deref().unwrap_or(""),
        }
    }
}

/// Native (WebAssembly) module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Directory holding the crate's Cargo.toml
    #[serde(default = "default_crate_dir")]
    pub crate_dir: String,

    /// Intermediate directory for compiled artifacts, relative to the crate
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Base name of the generated loader and binary
    #[serde(default = "default_out_name")]
    pub out_name: String,

    /// Toolchain executable, looked up on PATH unless it is a path
    #[serde(default = "default_toolchain")]
    pub toolchain: String,

    /// Extra arguments appended to the toolchain invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            crate_dir: default_crate_dir(),
            out_dir: default_out_dir(),
            out_name: default_out_name(),
            toolchain: default_toolchain(),
            extra_args: Vec::new(),
        }
    }
}

fn default_crate_dir() -> String {
    ".".to_string()
}

fn default_out_dir() -> String {
    "pkg".to_string()
}

fn default_out_name() -> String {
    "index".to_string()
}

fn default_toolchain() -> String {
    "wasm-pack".to_string()
}

/// Stylesheet options used by the default style rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Extra directories searched by `@use`/`@import`
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Browser targets for vendor prefixing, e.g. `"safari 9"`
    #[serde(default)]
    pub targets: Vec<String>,

    /// Extract CSS to standalone files instead of injecting `<style>` nodes
    /// (defaults to on in production)
    #[serde(default)]
    pub extract: Option<bool>,

    /// Stylesheets compiled ahead of graph tracing
    #[serde(default)]
    pub entries: Vec<String>,
}

/// An explicit module rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression matched against the module path
    pub test: String,

    /// Loader list, applied last to first
    #[serde(default, rename = "use")]
    pub loaders: Vec<StageConfig>,

    /// Non-loader module handling
    #[serde(default, rename = "type")]
    pub module_type: Option<RuleModuleType>,
}

/// Module handling that is not a loader chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleModuleType {
    #[serde(rename = "webassembly/sync")]
    WasmSync,
}

/// A single style loader and its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "loader", rename_all = "kebab-case")]
pub enum StageConfig {
    Preprocess {
        #[serde(default)]
        include_paths: Vec<String>,
    },
    Prefix {
        #[serde(default)]
        targets: Vec<String>,
    },
    Normalize {
        #[serde(default)]
        minify: Option<bool>,
    },
    Extract {
        #[serde(default = "default_css_filename")]
        filename: String,
    },
    Inject,
}

pub fn default_css_filename() -> String {
    "[name].css".to_string()
}
