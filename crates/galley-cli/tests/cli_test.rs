use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn galley() -> assert_cmd::Command {
    cargo_bin_cmd!("galley")
}

fn git_init(dir: &std::path::Path) {
    let status = Command::new("git")
        .args(["init", "--quiet"])
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success());
}

// ── Help / Version ──

#[test]
fn shows_help() {
    galley()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Build least-privilege container images",
        ));
}

#[test]
fn shows_version() {
    galley()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("galley"));
}

#[test]
fn help_lists_commands() {
    let assert = galley().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();

    for command in [
        "init", "render", "eject", "audit", "compose", "build", "rebuild", "verify", "up", "test",
        "down", "doctor",
    ] {
        assert!(stdout.contains(command), "missing {command}");
    }
}

// ── Init ──

#[test]
fn init_creates_config_and_compose() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created galley.toml"));

    assert!(tmp.path().join("galley.toml").exists());
    let compose = std::fs::read_to_string(tmp.path().join("docker-compose.yml")).unwrap();
    assert!(compose.contains("recipe-app:latest"));
    let gitignore = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".galley-context/"));
}

#[test]
fn init_twice_keeps_existing_files() {
    let tmp = TempDir::new().unwrap();
    galley().current_dir(tmp.path()).arg("init").assert().success();
    std::fs::write(tmp.path().join("galley.toml"), "[project]\nname = \"mine\"\n").unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));

    let config = std::fs::read_to_string(tmp.path().join("galley.toml")).unwrap();
    assert!(config.contains("mine"));
}

// ── Render / Compose ──

#[test]
fn render_prints_dockerfile() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::contains("FROM python:3.7-alpine"))
        .stdout(predicate::str::contains("apk del .tmp-build-deps"))
        .stdout(predicate::str::contains("USER user"));
}

#[test]
fn render_rejects_unpinned_base() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("galley.toml"),
        "[image]\nbase_image = \"python:latest\"\n",
    )
    .unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("python:latest"));
}

#[test]
fn render_rejects_invalid_config() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("galley.toml"), "[project\n").unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("render")
        .assert()
        .failure();
}

#[test]
fn compose_prints_services() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("compose")
        .assert()
        .success()
        .stdout(predicate::str::contains("services:"))
        .stdout(predicate::str::contains("postgres:10-alpine"));
}

// ── Eject / Audit ──

#[test]
fn eject_writes_dockerfile_once() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .success()
        .stdout(predicate::str::contains(".galley/Dockerfile"));
    assert!(tmp.path().join(".galley/Dockerfile").exists());

    galley()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already ejected"));
}

#[test]
fn audit_passes_generated_dockerfile() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("No findings."));
}

#[test]
fn audit_fails_on_edited_ejected_dockerfile() {
    let tmp = TempDir::new().unwrap();
    galley().current_dir(tmp.path()).arg("eject").assert().success();

    let path = tmp.path().join(".galley/Dockerfile");
    let edited = std::fs::read_to_string(&path)
        .unwrap()
        .replace("USER user\n", "");
    std::fs::write(&path, edited).unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("audit")
        .assert()
        .failure()
        .stdout(predicate::str::contains("error[root-user]"));
}

// ── Build ──

#[test]
fn build_outside_git_fails() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("git"));
}

#[test]
fn build_refuses_dirty_tree() {
    let tmp = TempDir::new().unwrap();
    git_init(tmp.path());
    std::fs::write(tmp.path().join("requirements.txt"), "Django>=2.1\n").unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("uncommitted changes"));
}

#[test]
fn build_without_manifest_fails_before_docker() {
    let tmp = TempDir::new().unwrap();
    git_init(tmp.path());
    std::fs::create_dir(tmp.path().join("app")).unwrap();

    galley()
        .current_dir(tmp.path())
        .args(["build", "--allow-dirty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency manifest not found"));
}

#[test]
fn build_aborts_on_audit_errors() {
    let tmp = TempDir::new().unwrap();
    git_init(tmp.path());
    galley().current_dir(tmp.path()).arg("eject").assert().success();
    let path = tmp.path().join(".galley/Dockerfile");
    let edited = std::fs::read_to_string(&path)
        .unwrap()
        .replace("RUN apk del .tmp-build-deps\n", "");
    std::fs::write(&path, edited).unwrap();

    galley()
        .current_dir(tmp.path())
        .args(["build", "--allow-dirty"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error[build-deps-not-removed]"))
        .stderr(predicate::str::contains("audit failed"));
}

// ── Compose commands ──

#[test]
fn up_without_compose_file_fails() {
    let tmp = TempDir::new().unwrap();

    galley()
        .current_dir(tmp.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("docker-compose.yml not found"));
}
