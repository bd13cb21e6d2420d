//! Module resolution
//!
//! Handles resolving import specifiers to actual file paths. Lookup order is:
//! registered aliases (the native module), relative and absolute paths, then
//! `node_modules`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{BuildError, BuildResult};

/// `require("...")` calls in lowered code
static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*(?:"([^"]+)"|'([^']+)')\s*\)"#).unwrap()
});

const EXTENSIONS: [&str; 5] = ["js", "mjs", "cjs", "json", "wasm"];

/// Extract the specifiers a lowered module requires, in order of appearance
pub fn extract_requires(code: &str) -> Vec<String> {
    let mut dependencies = Vec::new();

    for cap in REQUIRE_REGEX.captures_iter(code) {
        if let Some(specifier) = cap.get(1).or_else(|| cap.get(2)) {
            let spec = specifier.as_str().to_string();
            if !dependencies.contains(&spec) {
                dependencies.push(spec);
            }
        }
    }

    debug!("Found {} dependencies", dependencies.len());

    dependencies
}

/// Module resolver
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    /// Bare specifiers that resolve to a fixed file
    aliases: HashMap<String, PathBuf>,
}

impl Resolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `specifier` (and `specifier/<subpath>`) resolve into `target`
    pub fn register_alias(&mut self, specifier: impl Into<String>, target: PathBuf) {
        let specifier = specifier.into();
        debug!("Alias '{}' -> {}", specifier, target.display());
        self.aliases.insert(specifier, target);
    }

    /// Resolve an import specifier to an absolute file path
    pub fn resolve(&self, specifier: &str, from: &Path) -> BuildResult<PathBuf> {
        debug!("Resolving '{}' from '{}'", specifier, from.display());

        let resolved = if let Some(aliased) = self.resolve_alias(specifier) {
            Some(aliased)
        } else if specifier.starts_with('.') || specifier.starts_with('/') {
            let base_dir = from.parent().unwrap_or(Path::new("."));
            self.resolve_relative(specifier, base_dir)?
        } else {
            self.resolve_bare(specifier, from)?
        };

        debug!("Resolved to: {:?}", resolved);

        resolved.ok_or_else(|| BuildError::Resolution {
            specifier: specifier.to_string(),
            importer: from.to_path_buf(),
        })
    }

    fn resolve_alias(&self, specifier: &str) -> Option<PathBuf> {
        if let Some(target) = self.aliases.get(specifier) {
            return Some(target.clone());
        }

        let (name, subpath) = specifier.split_once('/')?;
        let target = self.aliases.get(name)?;
        let candidate = target.parent()?.join(subpath);
        candidate.is_file().then_some(candidate)
    }

    /// Resolve a relative import
    fn resolve_relative(&self, specifier: &str, base_dir: &Path) -> BuildResult<Option<PathBuf>> {
        let target = base_dir.join(specifier);

        // Try exact path first
        if target.is_file() {
            return Ok(Some(target));
        }

        // Try adding extensions
        for ext in &EXTENSIONS {
            let with_ext = PathBuf::from(format!("{}.{}", target.display(), ext));
            if with_ext.is_file() {
                return Ok(Some(with_ext));
            }
        }

        // Try as directory with index file
        if target.is_dir() {
            for ext in &EXTENSIONS {
                let index = target.join(format!("index.{}", ext));
                if index.is_file() {
                    return Ok(Some(index));
                }
            }
        }

        Ok(None)
    }

    /// Resolve a bare import (from node_modules)
    fn resolve_bare(&self, specifier: &str, from: &Path) -> BuildResult<Option<PathBuf>> {
        let mut current = from.to_path_buf();

        // Walk up directory tree looking for node_modules
        while current.pop() {
            let node_modules = current.join("node_modules");

            if node_modules.is_dir() {
                if let Some(resolved) = self.resolve_in_node_modules(&node_modules, specifier)? {
                    return Ok(Some(resolved));
                }
            }
        }

        Ok(None)
    }

    /// Resolve a module within a node_modules directory
    fn resolve_in_node_modules(&self, node_modules: &Path, specifier: &str) -> BuildResult<Option<PathBuf>> {
        // Split specifier into package name and subpath
        let (package_name, subpath) = if specifier.starts_with('@') {
            // Scoped package: @scope/name or @scope/name/subpath
            let parts: Vec<&str> = specifier.splitn(3, '/').collect();
            if parts.len() < 2 {
                return Ok(None);
            }
            let name = format!("{}/{}", parts[0], parts[1]);
            let sub = parts.get(2).map(|s| s.to_string());
            (name, sub)
        } else {
            let parts: Vec<&str> = specifier.splitn(2, '/').collect();
            let name = parts[0].to_string();
            let sub = parts.get(1).map(|s| s.to_string());
            (name, sub)
        };

        let package_dir = node_modules.join(&package_name);

        if !package_dir.is_dir() {
            return Ok(None);
        }

        if let Some(sub) = subpath {
            return self.resolve_relative(&format!("./{}", sub), &package_dir);
        }

        // Otherwise, look at package.json for module/main entry
        let package_json = package_dir.join("package.json");

        if package_json.is_file() {
            let content = fs::read_to_string(&package_json)
                .map_err(|e| BuildError::io(&package_json, e))?;
            let pkg: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
                BuildError::config(format!("invalid {}: {}", package_json.display(), e))
            })?;

            // Try module field first (ESM)
            if let Some(module) = pkg.get("module").and_then(|v| v.as_str()) {
                let module_path = package_dir.join(module);
                if module_path.is_file() {
                    return Ok(Some(module_path));
                }
            }

            if let Some(main) = pkg.get("main").and_then(|v| v.as_str()) {
                let main = if main.starts_with('.') {
                    main.to_string()
                } else {
                    format!("./{}", main)
                };
                return self.resolve_relative(&main, &package_dir);
            }
        }

        // Default to index.js
        self.resolve_relative("./index.js", &package_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_requires() {
        let code = r#"
            var foo = require("./foo");
            var bar = require('./bar.js');
            require("./foo");
            Promise.resolve().then(function() { return require('./lazy'); });
            var x = module.require('util');
        "#;

        let deps = extract_requires(code);
        assert_eq!(deps, vec!["./foo", "./bar.js", "./lazy"]);
    }

    #[test]
    fn test_resolve_relative_with_extension_and_index() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js/widgets")).unwrap();
        fs::write(dir.path().join("js/index.js"), "").unwrap();
        fs::write(dir.path().join("js/util.js"), "").unwrap();
        fs::write(dir.path().join("js/widgets/index.js"), "").unwrap();

        let resolver = Resolver::new();
        let from = dir.path().join("js/index.js");

        assert_eq!(resolver.resolve("./util", &from).unwrap(), dir.path().join("js/./util.js"));
        assert!(resolver.resolve("./widgets", &from).unwrap().ends_with("widgets/index.js"));
    }

    #[test]
    fn test_dotted_name_still_tries_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index_bg.js"), "").unwrap();
        let resolver = Resolver::new();

        let resolved = resolver.resolve("./index_bg", &dir.path().join("index.js")).unwrap();
        assert!(resolved.ends_with("index_bg.js"));
    }

    #[test]
    fn test_unresolvable_import_is_error() {
        let dir = tempdir().unwrap();
        let resolver = Resolver::new();
        let err = resolver.resolve("./missing", &dir.path().join("index.js")).unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
    }

    #[test]
    fn test_alias_resolves_native_module() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/index.js"), "").unwrap();
        fs::write(dir.path().join("pkg/index_bg.js"), "").unwrap();

        let mut resolver = Resolver::new();
        resolver.register_alias("race-planner", dir.path().join("pkg/index.js"));

        let from = dir.path().join("js/index.js");
        assert_eq!(resolver.resolve("race-planner", &from).unwrap(), dir.path().join("pkg/index.js"));
        assert_eq!(
            resolver.resolve("race-planner/index_bg.js", &from).unwrap(),
            dir.path().join("pkg/index_bg.js")
        );
    }

    #[test]
    fn test_node_modules_lookup() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/material-components-web");
        fs::create_dir_all(pkg.join("dist")).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "dist/mdc.js"}"#).unwrap();
        fs::write(pkg.join("dist/mdc.js"), "").unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();

        let resolver = Resolver::new();
        let resolved = resolver
            .resolve("material-components-web", &dir.path().join("js/index.js"))
            .unwrap();
        assert!(resolved.ends_with("dist/mdc.js"));
    }
}
