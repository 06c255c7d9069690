use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn setup_source(root: &Path, version: &str) {
    fs::create_dir_all(root.join("agent/lib64")).unwrap();
    fs::write(root.join("agent/installer.version"), version).unwrap();
    fs::write(root.join("agent/lib64/liboneagent.so"), "agent bits").unwrap();
}

fn bin() -> Command {
    Command::cargo_bin("agent-bootstrap").unwrap()
}

#[test]
fn deploy_copies_the_bundle_and_switches_the_active_link() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let target = temp.path().join("target");
    let work = temp.path().join("work");
    setup_source(&source, "1.2.3");

    bin()
        .arg("deploy")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .arg("--work")
        .arg(&work)
        .assert()
        .success()
        .stdout(predicate::str::contains("Agent deployed to"));

    let link = target.join("oneagent/active");
    assert_eq!(fs::read_link(link).unwrap().to_str().unwrap(), "1.2.3");
    assert_eq!(
        fs::read_to_string(target.join("oneagent/1.2.3/agent/lib64/liboneagent.so")).unwrap(),
        "agent bits"
    );
    assert!(!work.join("deployment.lock").exists());
}

#[test]
fn second_deploy_reports_skipped() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let target = temp.path().join("target");
    let work = temp.path().join("work");
    setup_source(&source, "1.2.3");

    let args = [
        "deploy",
        "--source",
        source.to_str().unwrap(),
        "--target",
        target.to_str().unwrap(),
        "--work",
        work.to_str().unwrap(),
    ];

    bin().args(args).assert().success();
    bin()
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment skipped"));
}

#[test]
fn status_reflects_the_deployment_progress() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let target = temp.path().join("target");
    let work = temp.path().join("work");
    setup_source(&source, "1.2.3");

    bin()
        .arg("status")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("is not deployed"));

    bin()
        .args([
            "deploy",
            "--source",
            source.to_str().unwrap(),
            "--target",
            target.to_str().unwrap(),
            "--work",
            work.to_str().unwrap(),
        ])
        .assert()
        .success();

    bin()
        .arg("status")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("is deployed"));
}

#[test]
fn status_fails_when_the_version_file_is_missing() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    fs::create_dir_all(&source).unwrap();

    bin()
        .arg("status")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(temp.path().join("target"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot determine"));
}

#[test]
fn deploy_failure_is_suppressible() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let target = temp.path().join("target");
    let work = temp.path().join("work");
    fs::create_dir_all(&source).unwrap();

    let args = [
        "deploy",
        "--source",
        source.to_str().unwrap(),
        "--target",
        target.to_str().unwrap(),
        "--work",
        work.to_str().unwrap(),
    ];

    bin().args(args).assert().failure();

    bin()
        .args(args)
        .arg("--suppress-error")
        .assert()
        .success()
        .stdout(predicate::str::contains("errors suppressed"));
}

#[test]
fn switch_active_moves_the_link_between_deployed_versions() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    let work = temp.path().join("work");
    fs::create_dir_all(target.join("oneagent/1.0.0")).unwrap();
    fs::create_dir_all(target.join("oneagent/2.0.0")).unwrap();

    bin()
        .args([
            "switch-active",
            "--target",
            target.to_str().unwrap(),
            "--work",
            work.to_str().unwrap(),
            "--version",
            "2.0.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0.0"));

    let link = target.join("oneagent/active");
    assert_eq!(fs::read_link(link).unwrap().to_str().unwrap(), "2.0.0");
}

#[test]
fn switch_active_refuses_an_undeployed_version() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("target");
    let work = temp.path().join("work");

    bin()
        .args([
            "switch-active",
            "--target",
            target.to_str().unwrap(),
            "--work",
            work.to_str().unwrap(),
            "--version",
            "9.9.9",
        ])
        .assert()
        .failure();
}

#[test]
fn deploy_requires_the_path_flags() {
    bin()
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--source"));
}
