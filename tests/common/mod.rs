//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const INDEX_HTML: &str = "<!DOCTYPE html>\n<html><head><link rel=\"stylesheet\" href=\"index.css\"></head><body><script src=\"index.js\"></script></body></html>\n";

/// A project with two entries, a stylesheet and a static directory
pub fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("js")).unwrap();
    fs::create_dir_all(root.join("styles")).unwrap();
    fs::create_dir_all(root.join("static/img")).unwrap();

    fs::write(
        root.join("js/index.js"),
        "import { format } from './format.js';\nimport '../styles/main.scss';\n\nconsole.log(format('index'));\n",
    )
    .unwrap();
    fs::write(
        root.join("js/admin.js"),
        "import { format } from './format.js';\n\nconsole.log(format('admin'));\n",
    )
    .unwrap();
    fs::write(
        root.join("js/format.js"),
        "export function format(page) {\n  return '[' + page + ']';\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("styles/main.scss"),
        "$accent: #018786;\n.banner { color: $accent; }\n",
    )
    .unwrap();

    fs::write(root.join("static/index.html"), INDEX_HTML).unwrap();
    fs::write(root.join("static/img/logo.png"), [0x89u8, b'P', b'N', b'G', 0, 0xff, 0x10]).unwrap();

    dir
}

pub const CONFIG: &str = r#"
copy = ["static"]

[entry]
index = "./js/index.js"
admin = "./js/admin.js"

[dev]
host = "127.0.0.1"
port = 0
debounce_ms = 50
"#;

/// Add a native crate whose toolchain is the given shell script body
#[cfg(unix)]
pub fn with_native(root: &Path, script: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    fs::write(
        root.join("Cargo.toml"),
        "[package]\nname = \"race-planner\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();

    let toolchain = root.join("fake-wasm-pack");
    fs::write(&toolchain, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&toolchain, fs::Permissions::from_mode(0o755)).unwrap();

    format!("[native]\ntoolchain = \"{}\"\n", toolchain.display())
}

/// Toolchain script that writes a small loader into the output directory
pub const GOOD_TOOLCHAIN: &str =
    "mkdir -p \"$6\"\nprintf 'export function plan(km) {\\n  return km * 2;\\n}\\n' > \"$6/$8.js\"";

/// Toolchain script that fails the way a compile error does
pub const FAILING_TOOLCHAIN: &str =
    "echo 'error[E0425]: cannot find value `pace` in this scope' >&2\nexit 101";

pub fn read(path: impl AsRef<Path>) -> Vec<u8> {
    fs::read(path.as_ref()).unwrap()
}

pub fn dist(root: &Path) -> PathBuf {
    root.join("dist")
}

/// A wasm binary whose only content is one function import
pub fn wasm_importing(module: &str, name: &str) -> Vec<u8> {
    let mut entry = vec![0x01, module.len() as u8];
    entry.extend_from_slice(module.as_bytes());
    entry.push(name.len() as u8);
    entry.extend_from_slice(name.as_bytes());
    entry.extend_from_slice(&[0x00, 0x00]);

    let mut bytes = vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];
    bytes.push(0x02);
    bytes.push(entry.len() as u8);
    bytes.extend(entry);
    bytes
}
