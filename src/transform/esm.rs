//! ES module lowering
//!
//! Rewrites `import`/`export` statements into calls against the bundle's module
//! registry (`require`, `exports`). Exports are installed as getters at the top
//! of the module so they stay live across circular imports. Named imports are
//! bound once, when the import statement runs.
//!
//! Statements are only recognized at the start of a line, which keeps matches
//! out of strings and comments for the code this bundler sees (hand-written
//! entry modules and wasm-bindgen glue).

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{BuildError, BuildResult, Stage};

static IMPORT_DEFAULT_AND_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([\w$]+)\s*,\s*\{([^}]*)\}\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_DEFAULT_AND_NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([\w$]+)\s*,\s*\*\s*as\s+([\w$]+)\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_NAMESPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*\*\s*as\s+([\w$]+)\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*\{([^}]*)\}\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([\w$]+)\s+from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_STAR_AS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\*\s*as\s+([\w$]+)\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\*\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_NAMED_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\{([^}]*)\}\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*\{([^}]*)\}[ \t]*;?"#).unwrap()
});

static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+(async\s+function\b\s*\*?|function\b\s*\*?|class\b)\s*([\w$]+)"#).unwrap()
});

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+"#).unwrap()
});

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+(async\s+function\s*\*?|function\s*\*?|class|const|let|var)\s*([\w$]+)"#).unwrap()
});

static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*("[^"]+"|'[^']+')\s*\)"#).unwrap()
});

static IMPORT_META_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bimport\.meta\.url\b").unwrap());

static LEFTOVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(import|export)\b[^(.]").unwrap());

/// An export installed as a getter: `exports[name]` reads `expr`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportBinding {
    name: String,
    expr: String,
}

/// Result of lowering a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lowered {
    pub code: String,
    /// Whether the source used ES module syntax
    pub is_esm: bool,
}

/// Lower ES module syntax to the bundle's CommonJS-style registry
pub fn lower(source: &str, path: &Path) -> BuildResult<Lowered> {
    let mut exports: Vec<ExportBinding> = Vec::new();
    let mut temp = 0usize;
    let mut next_temp = || {
        temp += 1;
        format!("__ferrule_m{}__", temp)
    };
    let mut changed = false;

    let mut code = source.to_string();

    code = replace(&IMPORT_DEFAULT_AND_NAMED, &code, &mut changed, |caps| {
        let ns = next_temp();
        let mut out = format!(
            "{}var {} = require({}), {} = __ferrule_default__({})",
            &caps[1],
            ns,
            quote(&caps[4]),
            &caps[2],
            ns
        );
        for (imported, local) in parse_specifiers(&caps[3]) {
            out.push_str(&format!(", {} = {}.{}", local, ns, imported));
        }
        out.push(';');
        out
    });

    code = replace(&IMPORT_DEFAULT_AND_NAMESPACE, &code, &mut changed, |caps| {
        format!(
            "{}var {} = require({}), {} = __ferrule_default__({});",
            &caps[1],
            &caps[3],
            quote(&caps[4]),
            &caps[2],
            &caps[3]
        )
    });

    code = replace(&IMPORT_NAMESPACE, &code, &mut changed, |caps| {
        format!("{}var {} = require({});", &caps[1], &caps[2], quote(&caps[3]))
    });

    code = replace(&IMPORT_NAMED, &code, &mut changed, |caps| {
        let ns = next_temp();
        let mut out = format!("{}var {} = require({})", &caps[1], ns, quote(&caps[3]));
        for (imported, local) in parse_specifiers(&caps[2]) {
            out.push_str(&format!(", {} = {}.{}", local, ns, imported));
        }
        out.push(';');
        out
    });

    code = replace(&IMPORT_DEFAULT, &code, &mut changed, |caps| {
        format!(
            "{}var {} = __ferrule_default__(require({}));",
            &caps[1],
            &caps[2],
            quote(&caps[3])
        )
    });

    code = replace(&IMPORT_BARE, &code, &mut changed, |caps| {
        format!("{}require({});", &caps[1], quote(&caps[2]))
    });

    code = replace(&EXPORT_STAR_AS, &code, &mut changed, |caps| {
        let ns = next_temp();
        exports.push(ExportBinding {
            name: caps[2].to_string(),
            expr: ns.clone(),
        });
        format!("{}var {} = require({});", &caps[1], ns, quote(&caps[3]))
    });

    code = replace(&EXPORT_STAR, &code, &mut changed, |caps| {
        format!(
            "{}__ferrule_export_star__(exports, require({}));",
            &caps[1],
            quote(&caps[2])
        )
    });

    code = replace(&EXPORT_NAMED_FROM, &code, &mut changed, |caps| {
        let ns = next_temp();
        for (local, exported) in parse_specifiers(&caps[2]) {
            exports.push(ExportBinding {
                name: exported,
                expr: format!("{}.{}", ns, local),
            });
        }
        format!("{}var {} = require({});", &caps[1], ns, quote(&caps[3]))
    });

    code = replace(&EXPORT_NAMED, &code, &mut changed, |caps| {
        for (local, exported) in parse_specifiers(&caps[2]) {
            exports.push(ExportBinding {
                name: exported,
                expr: local,
            });
        }
        caps[1].to_string()
    });

    code = replace(&EXPORT_DEFAULT_DECL, &code, &mut changed, |caps| {
        // `class extends Base {}` has no name; leave it to the expression form
        if &caps[3] == "extends" {
            return caps[0].to_string();
        }
        exports.push(ExportBinding {
            name: "default".to_string(),
            expr: caps[3].to_string(),
        });
        format!("{}{} {}", &caps[1], caps[2].trim_end(), &caps[3])
    });

    code = replace(&EXPORT_DEFAULT, &code, &mut changed, |caps| {
        format!("{}exports.default = ", &caps[1])
    });

    code = replace(&EXPORT_DECL, &code, &mut changed, |caps| {
        exports.push(ExportBinding {
            name: caps[3].to_string(),
            expr: caps[3].to_string(),
        });
        format!("{}{} {}", &caps[1], caps[2].trim_end(), &caps[3])
    });

    // Dynamic imports alone do not make a module an ES module
    let mut dynamic = false;
    code = replace(&DYNAMIC_IMPORT, &code, &mut dynamic, |caps| {
        format!(
            "Promise.resolve().then(function() {{ return require({}); }})",
            &caps[1]
        )
    });

    code = IMPORT_META_URL
        .replace_all(&code, "(document.currentScript && document.currentScript.src || location.href)")
        .into_owned();

    if let Some(m) = LEFTOVER.find(&code) {
        let line = code[..m.start()].matches('\n').count() + 1;
        return Err(BuildError::transform(
            Stage::Esm,
            path,
            format!("unsupported module syntax on line {}: {}", line, m.as_str().trim()),
        ));
    }

    if !changed {
        return Ok(Lowered {
            code,
            is_esm: false,
        });
    }

    let mut header = String::from("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    if !exports.is_empty() {
        header.push_str("__ferrule_export__(exports, {\n");
        for binding in &exports {
            header.push_str(&format!(
                "  {}: function() {{ return {}; }},\n",
                quote(&binding.name),
                binding.expr
            ));
        }
        header.push_str("});\n");
    }

    Ok(Lowered {
        code: format!("{}{}", header, code),
        is_esm: true,
    })
}

fn replace(
    regex: &Regex,
    code: &str,
    changed: &mut bool,
    mut f: impl FnMut(&Captures) -> String,
) -> String {
    if !regex.is_match(code) {
        return code.to_string();
    }
    *changed = true;
    regex.replace_all(code, |caps: &Captures| f(caps)).into_owned()
}

/// Parse `a, b as c` into `[(a, a), (b, c)]`
fn parse_specifiers(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|spec| {
            let mut parts = spec.split_whitespace();
            let first = parts.next().unwrap_or_default().to_string();
            match (parts.next(), parts.next()) {
                (Some("as"), Some(second)) => (first, second.to_string()),
                _ => (first.clone(), first),
            }
        })
        .collect()
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}
