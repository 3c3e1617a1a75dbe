mod support;

use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

use support::todo_cmd;

#[test]
fn empty_title_is_blocked() {
    let temp = TempDir::new().unwrap();
    todo_cmd(temp.path())
        .args(["add", "   "])
        .assert()
        .code(3)
        .stderr(contains("title cannot be empty"));
    assert!(!temp.path().join("TodoList.json").exists());
}

#[test]
fn reminder_in_the_past_is_blocked() {
    let temp = TempDir::new().unwrap();
    todo_cmd(temp.path())
        .args(["add", "Dentist", "--remind-at", "2001-02-03 04:05"])
        .assert()
        .code(3)
        .stderr(contains("not in the future"));
}

#[test]
fn malformed_reminder_time_is_a_user_error() {
    let temp = TempDir::new().unwrap();
    todo_cmd(temp.path())
        .args(["add", "Dentist", "--remind-at", "tomorrow"])
        .assert()
        .code(2);
}

#[test]
fn bad_priority_is_a_user_error() {
    let temp = TempDir::new().unwrap();
    todo_cmd(temp.path())
        .args(["add", "Dentist", "-p", "urgent"])
        .assert()
        .code(2)
        .stderr(contains("invalid priority"));
}

#[test]
fn unknown_task_suggests_listing() {
    let temp = TempDir::new().unwrap();
    todo_cmd(temp.path())
        .args(["done", "nope"])
        .assert()
        .code(2)
        .stderr(contains("Task not found: nope"))
        .stderr(contains("hint: todo list"));
}

#[test]
fn json_errors_use_the_envelope() {
    let temp = TempDir::new().unwrap();
    let output = todo_cmd(temp.path())
        .args(["--json", "show", "nope"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["schema_version"], "todo.v1");
    assert_eq!(value["command"], "show");
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["code"], 2);
    assert_eq!(value["error"]["kind"], "user_error");
    assert_eq!(value["next_steps"][0], "todo list");
}

#[test]
fn corrupt_task_list_loads_empty() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("TodoList.json"), "{ definitely not json").unwrap();

    todo_cmd(temp.path())
        .args(["list"])
        .assert()
        .success()
        .stdout(contains("Total: 0"));
}
