//! WebAssembly modules in the bundle
//!
//! Binaries are embedded base64-encoded and compiled once at boot. The module
//! body then instantiates synchronously, so importers see the instance exports
//! as soon as `require` returns.

use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use wasmparser::{Parser, Payload};

use crate::error::{BuildError, BuildResult, Stage};

/// Registry body of a wasm module; `module.wasm` is the compiled `WebAssembly.Module`
pub const SYNC_MODULE_JS: &str = r#"var compiled = module.wasm;
var imports = {};
WebAssembly.Module.imports(compiled).forEach(function(imp) {
  var source = require(imp.module);
  var target = imports[imp.module] || (imports[imp.module] = {});
  if (imp.kind === 'function') {
    target[imp.name] = function() { return source[imp.name].apply(this, arguments); };
  } else {
    target[imp.name] = source[imp.name];
  }
});
var instance = new WebAssembly.Instance(compiled, imports);
__ferrule_export_star__(exports, instance.exports);
"#;

/// Module names from the binary's import section, deduplicated in order
pub fn import_modules(bytes: &[u8], path: &Path) -> BuildResult<Vec<String>> {
    let fail = |e: wasmparser::BinaryReaderError| BuildError::transform(Stage::Wasm, path, e);
    let mut modules: Vec<String> = Vec::new();

    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::ImportSection(reader) = payload.map_err(fail)? {
            for import in reader {
                let import = import.map_err(fail)?;
                if !modules.iter().any(|m| m == import.module) {
                    modules.push(import.module.to_string());
                }
            }
        }
    }

    Ok(modules)
}

/// Base64 text embedded in the bundle
pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}
