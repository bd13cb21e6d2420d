//! Stage implementations: grass for preprocessing, lightningcss for the rest

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::Browsers;

use super::targets::to_targets;
use super::Syntax;
use crate::error::{BuildError, BuildResult, Stage};

/// Options for the preprocessing stage
#[derive(Debug, Clone, Default)]
pub struct PreprocessOptions {
    /// Directories searched by `@use` and `@import`, after the file's own directory
    pub include_paths: Vec<PathBuf>,
}

impl PreprocessOptions {
    pub(super) fn run(&self, path: &Path, syntax: Syntax, source: &str) -> BuildResult<String> {
        let input_syntax = match syntax {
            Syntax::Scss => grass::InputSyntax::Scss,
            Syntax::Sass => grass::InputSyntax::Sass,
            Syntax::Css => grass::InputSyntax::Css,
        };

        let mut options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .input_syntax(input_syntax);
        if let Some(dir) = path.parent() {
            options = options.load_path(dir);
        }
        options = options.load_paths(&self.include_paths);

        grass::from_string(source.to_string(), &options)
            .map_err(|e| BuildError::transform(Stage::Preprocess, path, e))
    }
}

/// Options for the vendor-prefixing stage
#[derive(Debug, Clone, Default)]
pub struct PrefixOptions {
    /// Browsers to prefix for; `None` leaves the stylesheet unchanged
    pub browsers: Option<Browsers>,
}

impl PrefixOptions {
    pub(super) fn run(&self, path: &Path, source: &str) -> BuildResult<String> {
        if self.browsers.is_none() {
            return Ok(source.to_string());
        }

        let fail = |e: &dyn std::fmt::Display| BuildError::transform(Stage::Prefix, path, e);

        let mut sheet = StyleSheet::parse(source, parser_options(path)).map_err(|e| fail(&e))?;
        sheet
            .minify(MinifyOptions {
                targets: to_targets(self.browsers),
                ..MinifyOptions::default()
            })
            .map_err(|e| fail(&e))?;

        let printed = sheet
            .to_css(PrinterOptions {
                targets: to_targets(self.browsers),
                ..PrinterOptions::default()
            })
            .map_err(|e| fail(&e))?;

        Ok(printed.code)
    }
}

/// Options for the normalization stage
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub minify: bool,
}

impl NormalizeOptions {
    pub(super) fn run(&self, path: &Path, source: &str) -> BuildResult<String> {
        let fail = |e: &dyn std::fmt::Display| BuildError::transform(Stage::Normalize, path, e);

        let mut sheet = StyleSheet::parse(source, parser_options(path)).map_err(|e| fail(&e))?;
        if self.minify {
            sheet.minify(MinifyOptions::default()).map_err(|e| fail(&e))?;
        }

        let printed = sheet
            .to_css(PrinterOptions {
                minify: self.minify,
                ..PrinterOptions::default()
            })
            .map_err(|e| fail(&e))?;

        Ok(printed.code)
    }
}

/// Options for the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Filename template of the extracted stylesheet
    pub filename: String,
}

fn parser_options<'i>(path: &Path) -> ParserOptions<'i> {
    ParserOptions {
        filename: path.display().to_string(),
        ..ParserOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_preprocess_resolves_imports_from_include_paths() {
        let dir = tempdir().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("_colors.scss"), "$primary: #6200ee;").unwrap();

        let options = PreprocessOptions {
            include_paths: vec![shared],
        };
        let css = options
            .run(
                &dir.path().join("styles/main.scss"),
                Syntax::Scss,
                "@import 'colors';\n.button { color: $primary; }",
            )
            .unwrap();

        assert!(css.contains("color: #6200ee"));
    }

    #[test]
    fn test_prefix_without_targets_is_passthrough() {
        let options = PrefixOptions::default();
        let source = ".a { user-select: none; }";
        assert_eq!(options.run(Path::new("a.css"), source).unwrap(), source);
    }

    #[test]
    fn test_normalize_minifies() {
        let options = NormalizeOptions { minify: true };
        let css = options
            .run(Path::new("a.css"), ".a {\n  color: #ff0000;\n}\n")
            .unwrap();
        assert_eq!(css, ".a{color:red}");
    }

    #[test]
    fn test_normalize_reports_parse_errors() {
        let options = NormalizeOptions { minify: false };
        let err = options.run(Path::new("bad.css"), "..a { color: red; }").unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Normalize));
    }
}
