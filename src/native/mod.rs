//! Native module builder
//!
//! Compiles the project's Rust crate to WebAssembly with an external toolchain
//! (`wasm-pack` by default) and makes the generated package importable under
//! the crate's name.

pub mod wasm;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{Config, Mode, NativeConfig};
use crate::error::{BuildError, BuildResult};
use crate::resolver::Resolver;

/// The parts of the native crate's manifest the build cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeManifest {
    pub name: String,
}

/// Read `Cargo.toml` from the native crate directory
pub fn read_manifest(crate_dir: &Path) -> BuildResult<NativeManifest> {
    let manifest_path = crate_dir.join("Cargo.toml");
    let content = fs::read_to_string(&manifest_path).map_err(|e| {
        BuildError::config(format!(
            "native crate manifest {} is unreadable: {}",
            manifest_path.display(),
            e
        ))
    })?;

    let manifest: toml::Value = toml::from_str(&content).map_err(|e| {
        BuildError::config(format!("invalid {}: {}", manifest_path.display(), e))
    })?;

    let name = manifest
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| {
            BuildError::config(format!(
                "{} has no [package] name",
                manifest_path.display()
            ))
        })?;

    Ok(NativeManifest {
        name: name.to_string(),
    })
}

/// A compiled native module ready to be imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeModule {
    pub crate_name: String,

    /// The generated JavaScript glue
    pub entry: PathBuf,
}

impl NativeModule {
    /// Specifiers that import the module: the crate name in both spellings
    pub fn specifiers(&self) -> Vec<String> {
        let mut names = vec![self.crate_name.clone()];
        for variant in [self.crate_name.replace('-', "_"), self.crate_name.replace('_', "-")] {
            if !names.contains(&variant) {
                names.push(variant);
            }
        }
        names
    }

    pub fn register(&self, resolver: &mut Resolver) {
        for specifier in self.specifiers() {
            resolver.register_alias(specifier, self.entry.clone());
        }
    }
}

/// Runs the external toolchain for one native crate
#[derive(Debug, Clone)]
pub struct NativeModuleBuilder {
    crate_dir: PathBuf,
    settings: NativeConfig,
    mode: Mode,
}

impl NativeModuleBuilder {
    /// The builder for a configuration, if it declares a native module
    pub fn from_config(config: &Config) -> Option<Self> {
        let settings = config.native.clone()?;
        Some(Self {
            crate_dir: config.root.join(&settings.crate_dir),
            settings,
            mode: config.mode,
        })
    }

    /// Directory the toolchain writes the package into
    pub fn out_dir(&self) -> PathBuf {
        self.crate_dir.join(&self.settings.out_dir)
    }

    /// Arguments passed to the toolchain
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            self.crate_dir.display().to_string(),
            "--target".to_string(),
            "bundler".to_string(),
            "--out-dir".to_string(),
            self.out_dir().display().to_string(),
            "--out-name".to_string(),
            self.settings.out_name.clone(),
        ];

        args.push(match self.mode {
            Mode::Development => "--dev".to_string(),
            Mode::Production => "--release".to_string(),
        });
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    /// Compile the crate and return the module to alias
    pub async fn build(&self) -> BuildResult<NativeModule> {
        let manifest = read_manifest(&self.crate_dir)?;
        let program = locate_toolchain(&self.settings.toolchain)?;
        let args = self.args();
        let command = format!("{} {}", self.settings.toolchain, args.join(" "));

        info!("Compiling native module '{}'", manifest.name);
        debug!("Running {}", command);

        let output = Command::new(&program)
            .args(&args)
            .current_dir(&self.crate_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Toolchain {
                command: command.clone(),
                status: "not started".to_string(),
                output: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BuildError::Toolchain {
                command,
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let entry = self.out_dir().join(format!("{}.js", self.settings.out_name));
        if !entry.is_file() {
            return Err(BuildError::Toolchain {
                command,
                status: output.status.to_string(),
                output: format!("expected {} was not produced", entry.display()),
            });
        }

        Ok(NativeModule {
            crate_name: manifest.name,
            entry,
        })
    }
}

/// Find the toolchain binary, either as a path or on `PATH`
///
/// Only executable files qualify, so a non-executable file earlier on `PATH`
/// does not shadow a usable toolchain.
fn locate_toolchain(toolchain: &str) -> BuildResult<PathBuf> {
    locate_toolchain_in(toolchain, env::var_os("PATH"))
}

fn locate_toolchain_in(toolchain: &str, paths: Option<OsString>) -> BuildResult<PathBuf> {
    let cwd = env::current_dir().map_err(|e| BuildError::io(Path::new("."), e))?;
    which::which_in(toolchain, paths, cwd).map_err(|e| {
        debug!("Toolchain lookup for '{}' failed: {}", toolchain, e);
        not_found(toolchain)
    })
}

fn not_found(toolchain: &str) -> BuildError {
    BuildError::Toolchain {
        command: toolchain.to_string(),
        status: "not found".to_string(),
        output: format!("'{}' is not installed or not on PATH", toolchain),
    }
}
