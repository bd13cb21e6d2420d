//! Module graph data structures

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::transform::{RuleAction, RuleSet, Transformed};

/// Unique identifier for a module
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
    Style,
    Wasm,
}

impl ModuleType {
    /// Determine module type from the matching rule, falling back to the extension
    pub fn detect(path: &Path, rules: &RuleSet) -> Self {
        match rules.find(path).map(|rule| &rule.action) {
            Some(RuleAction::Style(_)) => ModuleType::Style,
            Some(RuleAction::WasmSync) => ModuleType::Wasm,
            None => match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("json") => ModuleType::Json,
                _ => ModuleType::JavaScript,
            },
        }
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Registry key: the path relative to the project root, `/`-separated
    pub key: String,

    /// Absolute path to the module
    pub path: PathBuf,

    /// Module type
    pub module_type: ModuleType,

    /// Transformed output
    pub transformed: Transformed,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules, indexed by their ID
    modules: Vec<Module>,

    /// Map from path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Dependency edges in import order: specifier and target
    edges: Vec<Vec<(String, ModuleId)>>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        self.edges.push(Vec::new());

        id
    }

    /// Record that `from` imports `specifier`, resolved to `to`
    pub fn add_dependency(&mut self, from: ModuleId, specifier: impl Into<String>, to: ModuleId) {
        if let Some(deps) = self.edges.get_mut(from) {
            deps.push((specifier.into(), to));
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Resolved imports of a module, in import order
    pub fn get_dependencies(&self, id: ModuleId) -> &[(String, ModuleId)] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All modules reachable from the given roots, depth-first in import order
    pub fn get_reachable_modules(&self, roots: &[ModuleId]) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<ModuleId> = roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            result.push(id);

            for (_, dep) in self.get_dependencies(id).iter().rev() {
                if !visited.contains(dep) {
                    stack.push(*dep);
                }
            }
        }

        result
    }

    /// Every module path in the graph
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.modules.iter().map(|m| m.path.as_path())
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn module(path: &str) -> Module {
        Module {
            key: path.trim_start_matches('/').to_string(),
            path: PathBuf::from(path),
            module_type: ModuleType::JavaScript,
            transformed: Transformed::default(),
        }
    }

    #[test]
    fn test_module_type_detection() {
        let rules = RuleSet::from_config(&Config::default_config()).unwrap();

        assert_eq!(ModuleType::detect(Path::new("js/index.js"), &rules), ModuleType::JavaScript);
        assert_eq!(ModuleType::detect(Path::new("data.JSON"), &rules), ModuleType::Json);
        assert_eq!(ModuleType::detect(Path::new("styles/main.scss"), &rules), ModuleType::Style);
        assert_eq!(ModuleType::detect(Path::new("pkg/index_bg.wasm"), &rules), ModuleType::Wasm);
    }

    #[test]
    fn test_module_graph_basic() {
        let mut graph = ModuleGraph::new();

        let id = graph.add_module(module("/test/main.js"));
        assert_eq!(graph.add_module(module("/test/main.js")), id);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get_module_id(Path::new("/test/main.js")), Some(id));
    }

    #[test]
    fn test_reachable_modules_follow_import_order() {
        let mut graph = ModuleGraph::new();
        let main = graph.add_module(module("/main.js"));
        let b = graph.add_module(module("/b.js"));
        let a = graph.add_module(module("/a.js"));
        let shared = graph.add_module(module("/shared.js"));

        graph.add_dependency(main, "./a.js", a);
        graph.add_dependency(main, "./b.js", b);
        graph.add_dependency(a, "./shared.js", shared);
        graph.add_dependency(b, "./shared.js", shared);
        graph.add_dependency(shared, "./main.js", main);

        assert_eq!(graph.get_reachable_modules(&[main]), vec![main, a, shared, b]);
    }
}
