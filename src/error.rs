//! Error types for Ferrule
//!
//! Every failure a build can produce falls into one of these kinds. One-shot
//! builds abort on any of them; watch-mode rebuilds log them and keep serving.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// A stage of the style or native-module chain, used to tag transform failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Prefix,
    Normalize,
    Extract,
    Inject,
    Wasm,
    Json,
    Esm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preprocess => "preprocess",
            Stage::Prefix => "prefix",
            Stage::Normalize => "normalize",
            Stage::Extract => "extract",
            Stage::Inject => "inject",
            Stage::Wasm => "webassembly/sync",
            Stage::Json => "json",
            Stage::Esm => "esm",
        };
        f.write_str(name)
    }
}

/// Main error type for build and serve operations
#[derive(Error, Debug)]
pub enum BuildError {
    /// Invalid or missing configuration, detected before any build work
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An import could not be matched to a source file or compiled artifact
    #[error("cannot resolve '{specifier}' imported from {importer}")]
    Resolution { specifier: String, importer: PathBuf },

    /// A transform stage failed
    #[error("[{stage}] {}: {message}", path.display())]
    Transform {
        stage: Stage,
        path: PathBuf,
        message: String,
    },

    /// The external native toolchain failed; `output` is its stderr verbatim
    #[error("{command} failed ({status}):\n{output}")]
    Toolchain {
        command: String,
        status: String,
        output: String,
    },

    /// The dev server could not bind or serve
    #[error("server error on {addr}: {message}")]
    Server { addr: String, message: String },

    /// IO error
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub fn config(message: impl Into<String>) -> Self {
        BuildError::Configuration(message.into())
    }

    pub fn transform(stage: Stage, path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        BuildError::Transform {
            stage,
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// The stage this error originated from, for transform failures
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BuildError::Transform { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_names_stage() {
        let err = BuildError::transform(Stage::Preprocess, "styles/main.scss", "expected \";\"");
        assert_eq!(
            err.to_string(),
            "[preprocess] styles/main.scss: expected \";\""
        );
        assert_eq!(err.stage(), Some(Stage::Preprocess));
    }

    #[test]
    fn test_toolchain_error_keeps_output_verbatim() {
        let err = BuildError::Toolchain {
            command: "wasm-pack build".to_string(),
            status: "exit status: 1".to_string(),
            output: "error: no such target `nope`".to_string(),
        };
        assert!(err.to_string().ends_with("error: no such target `nope`"));
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_resolution_error_display() {
        let err = BuildError::Resolution {
            specifier: "./missing".to_string(),
            importer: PathBuf::from("js/index.js"),
        };
        assert_eq!(
            err.to_string(),
            "cannot resolve './missing' imported from js/index.js"
        );
    }
}
