//! Bundle runtime
//!
//! Each output file is one IIFE holding a module registry. Modules are keyed by
//! their root-relative path and carry a map from the specifiers they import to
//! the keys those specifiers resolved to. WebAssembly binaries are compiled
//! before any entry runs so that their modules can instantiate synchronously.

use super::{Chunk, ModuleGraph};

const PRELUDE: &str = r#"  var cache = {};
  var compiled = {};
  var hasOwn = Object.prototype.hasOwnProperty;

  function __ferrule_default__(m) {
    return m && m.__esModule ? m["default"] : m;
  }

  function __ferrule_export__(exports, getters) {
    Object.keys(getters).forEach(function(name) {
      if (!hasOwn.call(exports, name)) {
        Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
      }
    });
  }

  function __ferrule_export_star__(exports, source) {
    Object.keys(source).forEach(function(name) {
      if (name !== "default" && name !== "__esModule" && !hasOwn.call(exports, name)) {
        Object.defineProperty(exports, name, { enumerable: true, get: function() { return source[name]; } });
      }
    });
    return exports;
  }

  function __ferrule_base64__(text) {
    var raw = atob(text);
    var bytes = new Uint8Array(raw.length);
    for (var i = 0; i < raw.length; i++) {
      bytes[i] = raw.charCodeAt(i);
    }
    return bytes;
  }

  function load(key) {
    if (hasOwn.call(cache, key)) {
      return cache[key].exports;
    }
    var definition = modules[key];
    if (!definition) {
      throw new Error("ferrule: unknown module " + key);
    }
    var module = { id: key, exports: {}, wasm: compiled[key] };
    cache[key] = module;
    definition[0].call(module.exports, module, module.exports, function(specifier) {
      if (!hasOwn.call(definition[1], specifier)) {
        throw new Error("ferrule: cannot find '" + specifier + "' from " + key);
      }
      return load(definition[1][specifier]);
    });
    return module.exports;
  }

  function start() {
    entries.forEach(load);
  }

  var pending = Object.keys(binaries);
  if (pending.length === 0) {
    start();
  } else {
    Promise.all(pending.map(function(key) {
      return WebAssembly.compile(__ferrule_base64__(binaries[key])).then(function(m) {
        compiled[key] = m;
      });
    })).then(start, function(error) {
      console.error("ferrule: failed to compile WebAssembly", error);
    });
  }
"#;

/// Render the output file of one chunk
pub fn render(chunk: &Chunk, graph: &ModuleGraph) -> String {
    let mut out = String::new();
    out.push_str(&format!("// ferrule bundle: {}\n", chunk.name));
    out.push_str("(function() {\n  var modules = {\n");

    for &id in &chunk.module_ids {
        let Some(module) = graph.get_module(id) else {
            continue;
        };

        let deps: Vec<String> = graph
            .get_dependencies(id)
            .iter()
            .filter_map(|(specifier, dep)| {
                graph
                    .get_module(*dep)
                    .map(|target| format!("{}: {}", quote(specifier), quote(&target.key)))
            })
            .collect();

        out.push_str(&format!(
            "    {}: [function(module, exports, require) {{\n{}\n}}, {{{}}}],\n",
            quote(&module.key),
            module.transformed.code.trim_end(),
            deps.join(", ")
        ));
    }
    out.push_str("  };\n");

    out.push_str("  var binaries = {\n");
    for &id in &chunk.module_ids {
        if let Some((module, binary)) = graph
            .get_module(id)
            .and_then(|m| m.transformed.wasm_binary.as_ref().map(|b| (m, b)))
        {
            out.push_str(&format!("    {}: {},\n", quote(&module.key), quote(binary)));
        }
    }
    out.push_str("  };\n");

    let entries: Vec<String> = chunk
        .entry_ids
        .iter()
        .filter_map(|id| graph.get_module(*id))
        .map(|m| quote(&m.key))
        .collect();
    out.push_str(&format!("  var entries = [{}];\n", entries.join(", ")));

    out.push_str(PRELUDE);
    out.push_str("})();\n");
    out
}

/// Strip comments and collapse whitespace, keeping line breaks
pub fn minify(code: &str) -> String {
    let mut result = String::with_capacity(code.len());
    let mut string_char: Option<char> = None;
    let mut escaped = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut prev = '\0';
    let mut pending_space = false;
    let mut pending_newline = false;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                pending_newline = true;
            }
            continue;
        }

        if in_block_comment {
            if prev == '*' && c == '/' {
                in_block_comment = false;
                prev = '\0';
                pending_space = true;
            } else {
                if c == '\n' {
                    pending_newline = true;
                }
                prev = c;
            }
            continue;
        }

        if let Some(quote) = string_char {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote || (c == '\n' && quote != '`') {
                string_char = None;
            }
            prev = c;
            continue;
        }

        if c.is_whitespace() {
            if c == '\n' {
                pending_newline = true;
            } else {
                pending_space = true;
            }
            continue;
        }

        if c == '/' && prev != '\\' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    in_line_comment = true;
                    continue;
                }
                Some('*') => {
                    chars.next();
                    in_block_comment = true;
                    prev = '\0';
                    continue;
                }
                _ => {}
            }
        }

        if pending_newline {
            if !result.is_empty() {
                result.push('\n');
            }
        } else if pending_space && !result.is_empty() && !result.ends_with('\n') {
            result.push(' ');
        }
        pending_newline = false;
        pending_space = false;

        if c == '"' || c == '\'' || c == '`' {
            string_char = Some(c);
        }
        result.push(c);
        prev = c;
    }

    if !result.is_empty() {
        result.push('\n');
    }
    result
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Module, ModuleType};
    use crate::transform::Transformed;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn add(graph: &mut ModuleGraph, key: &str, code: &str, wasm: Option<&str>) -> usize {
        graph.add_module(Module {
            key: key.to_string(),
            path: PathBuf::from("/project").join(key),
            module_type: ModuleType::JavaScript,
            transformed: Transformed {
                code: code.to_string(),
                wasm_binary: wasm.map(str::to_string),
                ..Transformed::default()
            },
        })
    }

    #[test]
    fn test_render_registry() {
        let mut graph = ModuleGraph::new();
        let index = add(&mut graph, "js/index.js", "require(\"./util\");", None);
        let util = add(&mut graph, "js/util.js", "exports.x = 1; // trailing", None);
        graph.add_dependency(index, "./util", util);

        let chunk = Chunk::entry("index".to_string(), vec![index], vec![index, util]);
        let code = render(&chunk, &graph);

        assert!(code.starts_with("// ferrule bundle: index\n(function() {\n"));
        assert!(code.contains(
            "    \"js/index.js\": [function(module, exports, require) {\nrequire(\"./util\");\n}, {\"./util\": \"js/util.js\"}],\n"
        ));
        assert!(code.contains("exports.x = 1; // trailing\n}, {}],"));
        assert!(code.contains("  var binaries = {\n  };\n"));
        assert!(code.contains("  var entries = [\"js/index.js\"];\n"));
        assert!(code.ends_with("})();\n"));
    }

    #[test]
    fn test_render_embeds_wasm() {
        let mut graph = ModuleGraph::new();
        let wasm = add(&mut graph, "pkg/index_bg.wasm", "", Some("AGFzbQEAAAA="));
        let chunk = Chunk::entry("index".to_string(), vec![wasm], vec![wasm]);

        let code = render(&chunk, &graph);
        assert!(code.contains("    \"pkg/index_bg.wasm\": \"AGFzbQEAAAA=\",\n"));
    }

    #[test]
    fn test_minify_strips_comments_keeps_lines() {
        let code = "// header\nvar a = 1;   /* note */ var b = \"// not a comment\";\n\n\n  if (a) {\n    b = 'x';\n  }\n";
        assert_eq!(
            minify(code),
            "var a = 1; var b = \"// not a comment\";\nif (a) {\nb = 'x';\n}\n"
        );
    }

    #[test]
    fn test_minify_keeps_template_literals() {
        let code = "var t = `line one\n   line two`;\n";
        assert_eq!(minify(code), code);
    }

    #[test]
    fn test_minify_keeps_escaped_quotes() {
        let code = "var s = 'it\\'s // fine';\n";
        assert_eq!(minify(code), code);
    }
}
