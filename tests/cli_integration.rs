//! Integration tests for the agent-ledger CLI

use std::path::Path;

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FIXTURE: &str = include_str!("fixtures/docubrain_ledger.md");
const EMBEDDINGS: &str = "Lightweight TF-IDF embeddings";

/// Get a Command for the agent-ledger binary, isolated from user settings
fn ledger(project: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("agent-ledger"));
    cmd.env("XDG_CONFIG_HOME", project.join(".xdg"))
        .env("NO_COLOR", "1")
        .env_remove("AGENT_LEDGER_FILE")
        .env_remove("AGENT_LEDGER_PROJECT")
        .env_remove("RUST_LOG")
        .arg("--project")
        .arg(project);
    cmd
}

fn with_fixture() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("test_result.md"), FIXTURE).unwrap();
    temp
}

fn read_ledger(temp: &TempDir) -> String {
    std::fs::read_to_string(temp.path().join("test_result.md")).unwrap()
}

#[test]
fn test_help() {
    Command::new(cargo::cargo_bin!("agent-ledger"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status ledger shared by"));
}

#[test]
fn test_version() {
    Command::new(cargo::cargo_bin!("agent-ledger"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_init_creates_ledger_once() {
    let temp = TempDir::new().unwrap();

    ledger(temp.path())
        .args(["init", "--problem", "Move DocuBrain to SQLite"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created ledger"));

    let text = read_ledger(&temp);
    assert!(text.starts_with("#===="));
    assert!(text.contains("Move DocuBrain to SQLite"));

    ledger(temp.path())
        .arg("init")
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_without_ledger_fail() {
    let temp = TempDir::new().unwrap();
    ledger(temp.path())
        .arg("status")
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("Ledger not found"));
}

#[test]
fn test_unparseable_ledger_asks_for_inspection() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("test_result.md"), "backend: {not: [a list\n").unwrap();

    ledger(temp.path())
        .arg("status")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse ledger"))
        .stderr(predicate::str::contains("agent-ledger validate"));
}

#[test]
fn test_upsert_then_repeat_is_unchanged() {
    let temp = TempDir::new().unwrap();
    ledger(temp.path()).arg("init").assert().success();

    let upsert = [
        "upsert",
        "backend",
        "Replace MongoDB with SQLite for local storage",
        "--implemented",
        "true",
        "--working",
        "true",
        "--priority",
        "high",
    ];
    ledger(temp.path())
        .args(upsert)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    ledger(temp.path())
        .args(upsert)
        .assert()
        .success()
        .stdout(predicate::str::contains("Unchanged"));

    ledger(temp.path())
        .args([
            "show",
            "Replace MongoDB with SQLite for local storage",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"priority\": \"high\""))
        .stdout(predicate::str::contains("\"status_history\": []"));
}

#[test]
fn test_append_unknown_task() {
    let temp = TempDir::new().unwrap();
    ledger(temp.path()).arg("init").assert().success();

    ledger(temp.path())
        .args(["append", "Ghost", "--agent", "testing", "--working", "false"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unknown task: Ghost"));
}

#[test]
fn test_append_records_entry() {
    let temp = with_fixture();
    ledger(temp.path())
        .args([
            "append",
            "Document upload page",
            "--agent",
            "user",
            "--comment",
            "Looks fine manually",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 in history)"));

    assert!(read_ledger(&temp).contains("Looks fine manually"));
}

#[test]
fn test_stuck_count_cannot_be_lowered_by_upsert() {
    let temp = with_fixture();
    ledger(temp.path())
        .args(["upsert", "backend", EMBEDDINGS, "--stuck-count", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot drop"));
}

#[test]
fn test_fixture_status() {
    let temp = with_fixture();
    ledger(temp.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 4"))
        .stdout(predicate::str::contains("\"failing\": 1"))
        .stdout(predicate::str::contains("\"untested\": 2"));
}

#[test]
fn test_record_failure_increments_stuck_and_keeps_banner() {
    let temp = with_fixture();
    std::fs::create_dir_all(temp.path().join(".agent-ledger")).unwrap();
    std::fs::write(
        temp.path().join(".agent-ledger/settings.json"),
        r#"{"stuckThreshold": 2}"#,
    )
    .unwrap();

    ledger(temp.path())
        .args(["record", EMBEDDINGS, "--working", "false", "-c", "Still raises"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stuck_count 2"))
        .stdout(predicate::str::contains("task is stuck"));

    let text = read_ledger(&temp);
    assert!(text.starts_with("#====="));
    assert!(text.contains("START - Testing Protocol"));
    assert!(text.contains("Still raises"));

    ledger(temp.path())
        .args(["stuck", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(EMBEDDINGS));
}

#[test]
fn test_handoff_and_round() {
    let temp = with_fixture();

    ledger(temp.path())
        .args([
            "handoff",
            "Document upload page",
            "--message",
            "Upload page wired to SQLite backend",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("sequence 3"));

    let outcomes = temp.path().join("outcomes.yaml");
    std::fs::write(
        &outcomes,
        "- task: \"Document upload page\"\n  working: true\n  comment: \"PDF and text upload work\"\n",
    )
    .unwrap();

    ledger(temp.path())
        .args(["round", "--message", "Upload page passes", "--json", "--outcomes"])
        .arg(&outcomes)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"passed\": [\n    \"Document upload page\""));

    let text = read_ledger(&temp);
    assert!(text.contains("Upload page passes"));
    assert!(text.contains("current_focus: []"));
}

#[test]
fn test_incomplete_round_is_rejected() {
    let temp = with_fixture();
    let outcomes = temp.path().join("outcomes.yaml");
    std::fs::write(
        &outcomes,
        format!("- task: \"{EMBEDDINGS}\"\n  working: true\n"),
    )
    .unwrap();
    let before = read_ledger(&temp);

    ledger(temp.path())
        .args(["round", "--message", "partial", "--outcomes"])
        .arg(&outcomes)
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("Gemini API answer generation"));

    assert_eq!(read_ledger(&temp), before);
}

#[test]
fn test_focus_unknown_task_is_flagged() {
    let temp = with_fixture();

    ledger(temp.path())
        .args(["focus", "Task X"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unknown task 'Task X'"));

    ledger(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("current_focus references unknown task 'Task X'"));

    ledger(temp.path())
        .args(["validate", "--strict"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Ledger is invalid"));
}

#[test]
fn test_note_and_show() {
    let temp = with_fixture();

    ledger(temp.path())
        .args(["note", "--agent", "testing", "Backend suite green"])
        .assert()
        .success();

    ledger(temp.path())
        .args(["show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backend suite green"));

    ledger(temp.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend (3)"))
        .stdout(predicate::str::contains("frontend (1)"));
}

#[test]
fn test_custom_ledger_file_from_settings() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".agent-ledger")).unwrap();
    std::fs::write(
        temp.path().join(".agent-ledger/settings.json"),
        r#"{"ledgerFile": "docs/ledger.yaml"}"#,
    )
    .unwrap();

    ledger(temp.path()).arg("init").assert().success();
    assert!(temp.path().join("docs/ledger.yaml").exists());
    assert!(!temp.path().join("test_result.md").exists());
}

#[test]
fn test_ledger_flag_overrides_settings() {
    let temp = TempDir::new().unwrap();
    ledger(temp.path())
        .args(["--ledger", "other.md", "init"])
        .assert()
        .success();
    assert!(temp.path().join("other.md").exists());
}
