//! Module rules: which files go through which handling
//!
//! Rules are tried in declaration order and the first match wins.

use std::path::Path;

use regex::Regex;

use crate::config::{Config, RuleModuleType};
use crate::error::{BuildError, BuildResult};
use crate::styles::{LoaderChain, StyleMode, StyleStage};

/// What a matching rule does with a module
#[derive(Debug, Clone)]
pub enum RuleAction {
    /// Run the stylesheet loader chain
    Style(LoaderChain),
    /// Embed the binary and instantiate it synchronously
    WasmSync,
}

/// A (pattern, action) pair
#[derive(Debug, Clone)]
pub struct TransformRule {
    pub test: Regex,
    pub action: RuleAction,
}

impl TransformRule {
    pub fn matches(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        self.test.is_match(&normalized)
    }
}

/// The ordered rule list of a build
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<TransformRule>,
}

impl RuleSet {
    /// Build rules from configuration, falling back to the default rules
    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let rules = if config.rules.is_empty() {
            Self::default_rules(config)?
        } else {
            config
                .rules
                .iter()
                .map(|rule| {
                    let test = compile(&rule.test)?;
                    let action = match (&rule.module_type, rule.loaders.is_empty()) {
                        (Some(RuleModuleType::WasmSync), true) => RuleAction::WasmSync,
                        (None, false) => {
                            let stages = rule
                                .loaders
                                .iter()
                                .map(|stage| StyleStage::from_config(stage, config))
                                .collect::<BuildResult<Vec<_>>>()?;
                            RuleAction::Style(LoaderChain::new(stages)?)
                        }
                        (Some(_), false) => {
                            return Err(BuildError::config(format!(
                                "rule '{}' sets both a type and loaders",
                                rule.test
                            )))
                        }
                        (None, true) => {
                            return Err(BuildError::config(format!(
                                "rule '{}' needs either a type or loaders",
                                rule.test
                            )))
                        }
                    };
                    Ok(TransformRule { test, action })
                })
                .collect::<BuildResult<Vec<_>>>()?
        };

        let set = Self { rules };
        set.style_mode()?;
        Ok(set)
    }

    fn default_rules(config: &Config) -> BuildResult<Vec<TransformRule>> {
        Ok(vec![
            TransformRule {
                test: compile(r"(?i)\.(s[ac]ss|css)$")?,
                action: RuleAction::Style(LoaderChain::from_config(config)?),
            },
            TransformRule {
                test: compile(r"\.wasm$")?,
                action: RuleAction::WasmSync,
            },
        ])
    }

    /// First rule matching the path
    pub fn find(&self, path: &Path) -> Option<&TransformRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// The single style mode shared by every style rule
    pub fn style_mode(&self) -> BuildResult<StyleMode> {
        let mut modes = self.rules.iter().filter_map(|rule| match &rule.action {
            RuleAction::Style(chain) => Some(chain.mode()),
            RuleAction::WasmSync => None,
        });

        let first = modes.next().unwrap_or(StyleMode::Inject);
        for mode in modes {
            match (&first, &mode) {
                (StyleMode::Extract { filename: a }, StyleMode::Extract { filename: b }) if a != b => {
                    return Err(BuildError::config(format!(
                        "style rules extract to different files ('{}' and '{}'); one filename must apply to the whole build",
                        a, b
                    )));
                }
                (StyleMode::Extract { .. }, StyleMode::Inject) | (StyleMode::Inject, StyleMode::Extract { .. }) => {
                    return Err(BuildError::config(
                        "style rules mix extract and inject; one mode must apply to the whole build",
                    ));
                }
                _ => {}
            }
        }
        Ok(first)
    }

    /// The loader chain for a stylesheet path
    pub fn style_chain(&self, path: &Path) -> Option<&LoaderChain> {
        match self.find(path).map(|rule| &rule.action) {
            Some(RuleAction::Style(chain)) => Some(chain),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile(pattern: &str) -> BuildResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| BuildError::config(format!("invalid rule pattern '{}': {}", pattern, e)))
}
