//! End-to-end runs of the `irbuilder` binary against a fake toolchain.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// llvm-as copies `x.out.ll` to `x.out.bc`; lli exits with the file's number.
fn fake_toolchain(dir: &Path, version: &str) {
    script(
        dir,
        &format!("llvm-as-{version}"),
        r#"for last; do :; done
cp "$last" "${last%.ll}.bc""#,
    );
    script(dir, &format!("lli-{version}"), r#"exit "$(cat "$1")""#);
}

fn write_case(dir: &Path, stem: &str, reference: &str, regenerated: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(format!("{stem}.bc")), reference).unwrap();
    std::fs::write(dir.join(format!("{stem}.out.ll")), regenerated).unwrap();
}

fn irbuilder(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_irbuilder"))
        .args(args)
        .env_remove("IRBUILDER_CACHE_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("run irbuilder")
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn suites_lists_registry() {
    let output = irbuilder(&["suites", "--generation", "32"]);
    assert!(output.status.success());

    let stdout = text(&output.stdout);
    assert!(stdout.contains("LLVM 3.2 (5 suites)"));
    assert!(stdout.contains("inlineassemblytests"));
    assert!(!stdout.contains("sulongcpp"));
}

#[test]
fn verify_passing_directory() {
    let tools = tempfile::tempdir().unwrap();
    fake_toolchain(tools.path(), "3.8");
    let cache = tempfile::tempdir().unwrap();
    write_case(cache.path(), "a", "0", "0");
    write_case(&cache.path().join("nested"), "b", "42", "42");

    let output = irbuilder(&[
        "verify",
        cache.path().to_str().unwrap(),
        "--tool-dir",
        tools.path().to_str().unwrap(),
    ]);

    let stdout = text(&output.stdout);
    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(stdout.contains("..\n"));
    assert!(stdout.contains("Passed all 2 Tests!"));
}

#[test]
fn failing_suite_exits_non_zero_and_writes_report() {
    let tools = tempfile::tempdir().unwrap();
    fake_toolchain(tools.path(), "3.9");
    let cache = tempfile::tempdir().unwrap();
    write_case(&cache.path().join("llvm"), "foo", "42", "1");
    let report = cache.path().join("reports/run.json");

    let output = irbuilder(&[
        "test38",
        "llvm",
        "--cache-dir",
        cache.path().to_str().unwrap(),
        "--tool-dir",
        tools.path().to_str().unwrap(),
        "--report-json",
        report.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    let stderr = text(&output.stderr);
    assert!(stderr.contains("Failed 1 of 1 Tests!"));
    assert!(stderr.contains(&format!(
        "0) {}",
        cache.path().join("llvm/foo.out.ll").display()
    )));

    let json = std::fs::read_to_string(&report).unwrap();
    assert!(json.contains("\"success\": false"));
    assert!(json.contains("\"generation\": \"3.8\""));
    assert!(json.contains("foo.out.ll"));
}

#[test]
fn empty_suite_fails() {
    let tools = tempfile::tempdir().unwrap();
    fake_toolchain(tools.path(), "3.2");
    let cache = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(cache.path().join("gcc")).unwrap();

    let output = irbuilder(&[
        "test32",
        "gcc",
        "--cache-dir",
        cache.path().to_str().unwrap(),
        "--tool-dir",
        tools.path().to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(text(&output.stderr)
        .contains("There is something odd with the testsuite, 0 Tests executed!"));
}

#[test]
fn unknown_suite_is_rejected() {
    let cache = tempfile::tempdir().unwrap();
    let output = irbuilder(&[
        "test38",
        "assembly",
        "--cache-dir",
        cache.path().to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(text(&output.stderr).contains("assembly"));
}

#[test]
fn missing_toolchain_is_reported() {
    let tools = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_case(&cache.path().join("gcc"), "a", "0", "0");

    let output = irbuilder(&[
        "test38",
        "gcc",
        "--cache-dir",
        cache.path().to_str().unwrap(),
        "--tool-dir",
        tools.path().to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(text(&output.stderr).contains("Cannot find an assembler"));
}
