//! Code transformation
//!
//! Turns every module kind the graph can contain into registry code:
//! JavaScript is lowered from ES module syntax, JSON becomes an exports
//! assignment, stylesheets go through their rule's loader chain and
//! WebAssembly binaries are wrapped for synchronous instantiation.

pub mod esm;
mod rules;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::bundler::ModuleType;
use crate::error::{BuildError, BuildResult, Stage};
use crate::native::wasm;
use crate::styles::{StyleCache, StyleModule};

pub use rules::{RuleAction, RuleSet, TransformRule};

/// Output of transforming one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    /// Registry code for the module body
    pub code: String,

    /// Import specifiers the module requires at runtime
    pub dependencies: Vec<String>,

    /// CSS destined for the entry's extracted stylesheet
    pub extracted_css: Option<String>,

    /// Embedded WebAssembly binary, base64 encoded
    pub wasm_binary: Option<String>,
}

/// Module transformer
pub struct Transformer {
    rules: RuleSet,

    /// Stylesheets already transformed by the pre-build step
    style_cache: Arc<StyleCache>,
}

impl Transformer {
    /// Create a new transformer
    pub fn new(rules: RuleSet, style_cache: Arc<StyleCache>) -> Self {
        Self { rules, style_cache }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// A stylesheet transformed ahead of tracing
    pub fn cached_style(&self, path: &Path) -> Option<&StyleModule> {
        self.style_cache.get(path)
    }

    /// Transform a module's raw bytes based on its type
    pub fn transform(&self, bytes: &[u8], path: &Path, module_type: &ModuleType) -> BuildResult<Transformed> {
        match module_type {
            ModuleType::JavaScript => self.transform_js(bytes, path),
            ModuleType::Json => self.transform_json(bytes, path),
            ModuleType::Style => self.transform_style(bytes, path),
            ModuleType::Wasm => self.transform_wasm(bytes, path),
        }
    }

    fn transform_js(&self, bytes: &[u8], path: &Path) -> BuildResult<Transformed> {
        debug!("Transforming JavaScript: {}", path.display());

        let source = utf8(bytes, path, Stage::Esm)?;
        let lowered = esm::lower(source, path)?;
        let dependencies = crate::resolver::extract_requires(&lowered.code);

        Ok(Transformed {
            code: lowered.code,
            dependencies,
            extracted_css: None,
            wasm_binary: None,
        })
    }

    /// Transform JSON to JS module
    fn transform_json(&self, bytes: &[u8], path: &Path) -> BuildResult<Transformed> {
        debug!("Transforming JSON: {}", path.display());

        let source = utf8(bytes, path, Stage::Json)?;
        serde_json::from_str::<serde_json::Value>(source)
            .map_err(|e| BuildError::transform(Stage::Json, path, e))?;

        Ok(Transformed {
            code: format!("module.exports = {};\n", source.trim()),
            dependencies: Vec::new(),
            extracted_css: None,
            wasm_binary: None,
        })
    }

    fn transform_style(&self, bytes: &[u8], path: &Path) -> BuildResult<Transformed> {
        debug!("Transforming stylesheet: {}", path.display());

        let module = match self.style_cache.get(path) {
            Some(module) => module.clone(),
            None => {
                let chain = self.rules.style_chain(path).ok_or_else(|| {
                    BuildError::transform(Stage::Normalize, path, "no style rule matches this file")
                })?;
                chain.apply(path, utf8(bytes, path, Stage::Preprocess)?)?
            }
        };

        let extracted_css = match &module {
            StyleModule::Extracted { css } => Some(css.clone()),
            StyleModule::Injected { .. } => None,
        };

        Ok(Transformed {
            code: module.to_js(),
            dependencies: Vec::new(),
            extracted_css,
            wasm_binary: None,
        })
    }

    fn transform_wasm(&self, bytes: &[u8], path: &Path) -> BuildResult<Transformed> {
        debug!("Transforming WebAssembly: {}", path.display());

        let dependencies = wasm::import_modules(bytes, path)?;

        Ok(Transformed {
            code: wasm::SYNC_MODULE_JS.to_string(),
            dependencies,
            extracted_css: None,
            wasm_binary: Some(wasm::encode(bytes)),
        })
    }
}

fn utf8<'a>(bytes: &'a [u8], path: &Path, stage: Stage) -> BuildResult<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| BuildError::transform(stage, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::PathBuf;

    fn transformer() -> Transformer {
        let config = Config::default_config();
        Transformer::new(RuleSet::from_config(&config).unwrap(), Arc::new(StyleCache::new()))
    }

    #[test]
    fn test_transform_json() {
        let result = transformer()
            .transform(br#"{"key": "value", "num": 42}"#, Path::new("test.json"), &ModuleType::Json)
            .unwrap();

        assert!(result.code.starts_with("module.exports = "));
        assert!(result.dependencies.is_empty());
    }

    #[test]
    fn test_invalid_json_names_stage() {
        let err = transformer()
            .transform(b"{ nope", Path::new("bad.json"), &ModuleType::Json)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Json));
    }

    #[test]
    fn test_transform_js_collects_dependencies() {
        let result = transformer()
            .transform(
                b"import init from './pkg';\nimport './main.scss';\nconst lazy = () => import('./lazy.js');\n",
                Path::new("js/index.js"),
                &ModuleType::JavaScript,
            )
            .unwrap();

        assert_eq!(result.dependencies, vec!["./pkg", "./main.scss", "./lazy.js"]);
    }

    #[test]
    fn test_transform_css_injects_in_development() {
        let result = transformer()
            .transform(b"body { color: red; }", Path::new("test.css"), &ModuleType::Style)
            .unwrap();

        assert!(result.code.contains("document.createElement('style')"));
        assert!(result.code.contains("color: red"));
        assert!(result.extracted_css.is_none());
    }

    #[test]
    fn test_cached_stylesheet_is_reused() {
        let mut cache = StyleCache::new();
        cache.insert(
            PathBuf::from("styles/main.scss"),
            StyleModule::Extracted {
                css: ".cached{}".to_string(),
            },
        );
        let transformer = Transformer::new(
            RuleSet::from_config(&Config::default_config()).unwrap(),
            Arc::new(cache),
        );

        let result = transformer
            .transform(b"ignored", Path::new("styles/main.scss"), &ModuleType::Style)
            .unwrap();
        assert_eq!(result.extracted_css.as_deref(), Some(".cached{}"));
        assert_eq!(result.code, "module.exports = {};\n");
    }
}
