use std::path::PathBuf;

use todolist::error::{exit_codes, Error, JsonError};

#[test]
fn exit_codes_map_correctly() {
    let user = Error::InvalidArgument("bad".to_string());
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let ambiguous = Error::AmbiguousTaskId {
        prefix: "ab".to_string(),
        matches: 2,
    };
    assert_eq!(ambiguous.exit_code(), exit_codes::USER_ERROR);

    assert_eq!(Error::EmptyTitle.exit_code(), exit_codes::EDIT_BLOCKED);
    let past = Error::DueDateNotInFuture("2001-01-01 00:00".to_string());
    assert_eq!(past.exit_code(), exit_codes::EDIT_BLOCKED);

    let op = Error::OperationFailed("boom".to_string());
    assert_eq!(op.exit_code(), exit_codes::OPERATION_FAILED);
    let lock = Error::LockFailed(PathBuf::from("TodoList.json.lock"));
    assert_eq!(lock.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn json_error_includes_code_and_details() {
    let err = Error::TaskNotFound("abc".to_string());
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert!(json.error.contains("Task not found"));
    assert!(json.details.is_none());

    let err = Error::AmbiguousTaskId {
        prefix: "ab".to_string(),
        matches: 3,
    };
    let json = JsonError::from(&err);
    let details = json.details.expect("details");
    assert_eq!(details["prefix"], "ab");
    assert_eq!(details["matches"], 3);
}
