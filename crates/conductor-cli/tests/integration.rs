#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn conductor(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("conductor").unwrap();
    cmd.current_dir(dir.path()).env("CONDUCTOR_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    conductor(dir).arg("init").assert().success();
}

fn write_plan(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join(".conductor/plan.yaml"), yaml).unwrap();
}

// ---------------------------------------------------------------------------
// conductor init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout() {
    let dir = TempDir::new().unwrap();
    conductor(&dir).arg("init").assert().success();

    assert!(dir.path().join(".conductor").is_dir());
    assert!(dir.path().join(".conductor/config.yaml").exists());
    assert!(dir.path().join(".conductor/plan.yaml").exists());

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".conductor/workspaces/"));
    assert!(gitignore.contains(".conductor/manifest.yaml"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    conductor(&dir).arg("init").assert().success();
    conductor(&dir).arg("init").assert().success();
}

#[test]
fn init_preserves_existing_plan() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_plan(&dir, "version: 1\nunits:\n  - id: custom\n    description: mine\n");
    conductor(&dir).arg("init").assert().success();
    let plan = std::fs::read_to_string(dir.path().join(".conductor/plan.yaml")).unwrap();
    assert!(plan.contains("custom"));
}

// ---------------------------------------------------------------------------
// conductor plan
// ---------------------------------------------------------------------------

#[test]
fn plan_validate_accepts_template() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["plan", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan ok"));
}

#[test]
fn plan_validate_rejects_cycle() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_plan(
        &dir,
        "version: 1\nunits:\n  - id: a\n    description: a\n    dependencies: [b]\n  - id: b\n    description: b\n    dependencies: [a]\n",
    );
    conductor(&dir)
        .args(["plan", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn plan_validate_rejects_unknown_dependency() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_plan(
        &dir,
        "version: 1\nunits:\n  - id: a\n    description: a\n    dependencies: [ghost]\n",
    );
    conductor(&dir)
        .args(["plan", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn plan_levels_shows_topological_order() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_plan(
        &dir,
        "version: 1\nunits:\n  - id: base\n    description: base\n  - id: top\n    description: top\n    dependencies: [base]\n",
    );
    conductor(&dir)
        .args(["plan", "levels"])
        .assert()
        .success()
        .stdout(predicate::str::contains("level 0: base"))
        .stdout(predicate::str::contains("level 1: top"));
}

#[test]
fn plan_show_json_roundtrips() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let output = conductor(&dir)
        .args(["plan", "show", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(v["units"].is_array());
}

#[test]
fn plan_commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .args(["plan", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("conductor init"));
}

// ---------------------------------------------------------------------------
// conductor status / cancel / cap / workspace
// ---------------------------------------------------------------------------

#[test]
fn status_without_run_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no run manifest"));
}

#[test]
fn cancel_writes_flag_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir).arg("cancel").assert().success();
    assert!(dir.path().join(".conductor/cancel").exists());
}

#[test]
fn cancel_before_init_fails() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .arg("cancel")
        .assert()
        .failure()
        .stderr(predicate::str::contains("conductor init"));
}

#[test]
fn cap_queues_override() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir).args(["cap", "2"]).assert().success();
    let content = std::fs::read_to_string(dir.path().join(".conductor/worker-cap")).unwrap();
    assert_eq!(content.trim(), "2");
}

#[test]
fn cap_clamps_zero_to_one() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir).args(["cap", "0"]).assert().success();
    let content = std::fs::read_to_string(dir.path().join(".conductor/worker-cap")).unwrap();
    assert_eq!(content.trim(), "1");
}

#[test]
fn workspace_list_empty() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["workspace", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no workspaces"));
}

#[test]
fn workspace_cleanup_unknown_unit_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["workspace", "cleanup", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

// ---------------------------------------------------------------------------
// conductor run (preconditions only — no agent binary in CI)
// ---------------------------------------------------------------------------

#[test]
fn run_outside_git_repo_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("git repository"));
}
