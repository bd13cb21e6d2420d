//! Command-line behaviour of the `ferrule` binary

mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

use common::*;

fn ferrule() -> Command {
    let mut cmd = Command::cargo_bin("ferrule").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    ferrule()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn build_writes_the_output_directory() {
    let dir = project();
    fs::write(dir.path().join("ferrule.toml"), CONFIG).unwrap();

    ferrule()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("Built 2 bundle(s)"));

    assert!(dist(dir.path()).join("index.js").is_file());
    assert!(dist(dir.path()).join("admin.js").is_file());
    assert_eq!(read(dist(dir.path()).join("index.html")), INDEX_HTML.as_bytes());
}

#[test]
fn mode_and_outdir_flags_override_the_config() {
    let dir = project();
    let config = dir.path().join("site.toml");
    fs::write(&config, CONFIG).unwrap();

    ferrule()
        .current_dir(dir.path())
        .args(["--config", "site.toml", "build", "--mode", "production", "--outdir", "public"])
        .assert()
        .success();

    let public = dir.path().join("public");
    assert_eq!(
        fs::read_to_string(public.join("index.css")).unwrap(),
        ".banner{color:#018786}"
    );
    assert!(!dist(dir.path()).exists());
}

#[test]
fn missing_entry_is_a_configuration_error() {
    let dir = project();
    fs::remove_file(dir.path().join("js/admin.js")).unwrap();
    fs::write(dir.path().join("ferrule.toml"), CONFIG).unwrap();

    ferrule()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry 'admin' points to non-existent file"));
}

#[test]
fn unresolved_import_fails_without_writing() {
    let dir = project();
    fs::write(dir.path().join("js/index.js"), "import './gone.js';\n").unwrap();
    fs::write(dir.path().join("ferrule.toml"), CONFIG).unwrap();

    ferrule()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("./gone.js"));

    assert!(!dist(dir.path()).exists());
}

#[cfg(unix)]
#[test]
fn toolchain_output_is_shown_on_failure() {
    let dir = project();
    let native = with_native(dir.path(), FAILING_TOOLCHAIN);
    fs::write(dir.path().join("ferrule.toml"), format!("{}\n{}", CONFIG, native)).unwrap();

    ferrule()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot find value `pace` in this scope"));

    assert!(!dist(dir.path()).exists());
}
