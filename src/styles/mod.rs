//! Stylesheet transform chain
//!
//! A chain is declared the way loader lists are usually written, terminal stage
//! first:
//!
//! ```text
//! [extract, normalize, prefix, preprocess]
//! ```
//!
//! and applied **last to first**: `preprocess` sees the raw source and each
//! stage's output feeds the stage declared before it. [`LoaderChain::new`]
//! rejects any declaration whose execution order is not
//! preprocess → prefix → normalize → extract|inject.

mod stages;
mod targets;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{default_css_filename, Config, StageConfig};
use crate::error::{BuildError, BuildResult, Stage};

pub use stages::{ExtractOptions, NormalizeOptions, PrefixOptions, PreprocessOptions};
pub use targets::parse_targets;

/// Source dialect of a stylesheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Scss,
    Sass,
    Css,
}

impl Syntax {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("scss") => Syntax::Scss,
            Some("sass") => Syntax::Sass,
            _ => Syntax::Css,
        }
    }
}

/// Value flowing between stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Stylesheet text, not yet turned into a module
    Stylesheet { syntax: Syntax, text: String },
    /// Final result of a terminal stage
    Module(StyleModule),
}

/// What a stylesheet becomes in the module graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleModule {
    /// CSS goes to a standalone file; the graph keeps a placeholder
    Extracted { css: String },
    /// CSS is inserted as a `<style>` node when the module runs
    Injected { css: String },
}

impl StyleModule {
    pub fn css(&self) -> &str {
        match self {
            StyleModule::Extracted { css } | StyleModule::Injected { css } => css,
        }
    }

    /// JavaScript body registered for the stylesheet module
    pub fn to_js(&self) -> String {
        match self {
            StyleModule::Extracted { .. } => "module.exports = {};\n".to_string(),
            StyleModule::Injected { css } => format!(
                r#"(function() {{
  var style = document.createElement('style');
  style.textContent = {};
  document.head.appendChild(style);
}})();
module.exports = {{}};
"#,
                js_string_literal(css)
            ),
        }
    }
}

/// How stylesheets leave the build, global for the whole build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleMode {
    Extract { filename: String },
    Inject,
}

/// One stage of a style chain
#[derive(Debug, Clone)]
pub enum StyleStage {
    Preprocess(PreprocessOptions),
    Prefix(PrefixOptions),
    Normalize(NormalizeOptions),
    Extract(ExtractOptions),
    Inject,
}

impl StyleStage {
    /// Build a stage from its configuration, resolving paths against the root
    pub fn from_config(stage: &StageConfig, config: &Config) -> BuildResult<Self> {
        Ok(match stage {
            StageConfig::Preprocess { include_paths } => {
                StyleStage::Preprocess(PreprocessOptions {
                    include_paths: include_paths.iter().map(|p| config.root.join(p)).collect(),
                })
            }
            StageConfig::Prefix { targets } => StyleStage::Prefix(PrefixOptions {
                browsers: parse_targets(targets)?,
            }),
            StageConfig::Normalize { minify } => StyleStage::Normalize(NormalizeOptions {
                minify: minify.unwrap_or(config.minify()),
            }),
            StageConfig::Extract { filename } => StyleStage::Extract(ExtractOptions {
                filename: filename.clone(),
            }),
            StageConfig::Inject => StyleStage::Inject,
        })
    }

    pub fn stage(&self) -> Stage {
        match self {
            StyleStage::Preprocess(_) => Stage::Preprocess,
            StyleStage::Prefix(_) => Stage::Prefix,
            StyleStage::Normalize(_) => Stage::Normalize,
            StyleStage::Extract(_) => Stage::Extract,
            StyleStage::Inject => Stage::Inject,
        }
    }

    /// Position in execution order
    fn rank(&self) -> u8 {
        match self {
            StyleStage::Preprocess(_) => 0,
            StyleStage::Prefix(_) => 1,
            StyleStage::Normalize(_) => 2,
            StyleStage::Extract(_) | StyleStage::Inject => 3,
        }
    }

    fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    fn apply(&self, path: &Path, payload: Payload) -> BuildResult<Payload> {
        let (syntax, text) = match payload {
            Payload::Stylesheet { syntax, text } => (syntax, text),
            Payload::Module(_) => {
                return Err(BuildError::transform(
                    self.stage(),
                    path,
                    "received a finished module; stages are out of order",
                ))
            }
        };

        debug!("[{}] {}", self.stage(), path.display());

        let css = |text| Payload::Stylesheet {
            syntax: Syntax::Css,
            text,
        };

        match self {
            StyleStage::Preprocess(options) => Ok(css(options.run(path, syntax, &text)?)),
            StyleStage::Prefix(options) => {
                expect_css(self.stage(), path, syntax)?;
                Ok(css(options.run(path, &text)?))
            }
            StyleStage::Normalize(options) => {
                expect_css(self.stage(), path, syntax)?;
                Ok(css(options.run(path, &text)?))
            }
            StyleStage::Extract(_) => {
                expect_css(self.stage(), path, syntax)?;
                Ok(Payload::Module(StyleModule::Extracted { css: text }))
            }
            StyleStage::Inject => {
                expect_css(self.stage(), path, syntax)?;
                Ok(Payload::Module(StyleModule::Injected { css: text }))
            }
        }
    }
}

fn expect_css(stage: Stage, path: &Path, syntax: Syntax) -> BuildResult<()> {
    if syntax == Syntax::Css {
        Ok(())
    } else {
        Err(BuildError::transform(
            stage,
            path,
            format!("expected plain CSS but got {:?} source; add a preprocess stage", syntax),
        ))
    }
}

/// An ordered loader list, declared terminal-first and applied last-to-first
#[derive(Debug, Clone)]
pub struct LoaderChain {
    declared: Vec<StyleStage>,
}

impl LoaderChain {
    /// Create a chain from stages in declaration order
    pub fn new(declared: Vec<StyleStage>) -> BuildResult<Self> {
        let chain = Self { declared };
        chain.validate()?;
        Ok(chain)
    }

    /// The default chain for a configuration
    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let terminal = if config.extract_styles() {
            StageConfig::Extract {
                filename: default_css_filename(),
            }
        } else {
            StageConfig::Inject
        };

        let declared = [
            terminal,
            StageConfig::Normalize { minify: None },
            StageConfig::Prefix {
                targets: config.styles.targets.clone(),
            },
            StageConfig::Preprocess {
                include_paths: config.styles.include_paths.clone(),
            },
        ];

        let stages = declared
            .iter()
            .map(|stage| StyleStage::from_config(stage, config))
            .collect::<BuildResult<Vec<_>>>()?;

        Self::new(stages)
    }

    fn validate(&self) -> BuildResult<()> {
        let order: Vec<&StyleStage> = self.execution_order().collect();

        match order.last() {
            Some(last) if last.is_terminal() => {}
            _ => {
                return Err(BuildError::config(format!(
                    "style chain {} must declare extract or inject first",
                    self.describe()
                )))
            }
        }

        for pair in order.windows(2) {
            if pair[0].rank() >= pair[1].rank() {
                return Err(BuildError::config(format!(
                    "style chain {} runs {} before {}; loaders apply last to first",
                    self.describe(),
                    pair[0].stage(),
                    pair[1].stage()
                )));
            }
        }

        Ok(())
    }

    /// Stages as declared
    pub fn declared(&self) -> &[StyleStage] {
        &self.declared
    }

    /// Stages in the order they run: last declared first
    pub fn execution_order(&self) -> impl Iterator<Item = &StyleStage> {
        self.declared.iter().rev()
    }

    /// The chain's terminal mode
    pub fn mode(&self) -> StyleMode {
        match self.declared.first() {
            Some(StyleStage::Extract(options)) => StyleMode::Extract {
                filename: options.filename.clone(),
            },
            _ => StyleMode::Inject,
        }
    }

    /// Run the chain over a stylesheet source
    pub fn apply(&self, path: &Path, source: &str) -> BuildResult<StyleModule> {
        let mut payload = Payload::Stylesheet {
            syntax: Syntax::from_path(path),
            text: source.to_string(),
        };

        for stage in self.execution_order() {
            payload = stage.apply(path, payload)?;
        }

        match payload {
            Payload::Module(module) => Ok(module),
            Payload::Stylesheet { .. } => Err(BuildError::transform(
                Stage::Extract,
                path,
                "chain ended without extract or inject",
            )),
        }
    }

    /// Read and transform a stylesheet file
    pub fn apply_file(&self, path: &Path) -> BuildResult<StyleModule> {
        let source = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        self.apply(path, &source)
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.declared.iter().map(|s| s.stage().to_string()).collect();
        format!("[{}]", names.join(", "))
    }
}

/// Paths of stylesheets transformed ahead of graph tracing
pub type StyleCache = std::collections::HashMap<PathBuf, StyleModule>;

fn js_string_literal(text: &str) -> String {
    // JSON string syntax is valid JavaScript
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
