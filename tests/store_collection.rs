mod support;

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use todolist::clock::ManualClock;
use todolist::storage::{FileStorage, MemoryStorage, TodoDocument};
use todolist::store::{ChangeKind, LoadSource, TodoStore};
use todolist::task::{compare_for_display, Priority, Task};

use support::{in_hours, now, FailingStorage, Harness, RecordingScheduler};

fn mixed_tasks() -> Vec<Task> {
    vec![
        Task::new("walk dog").with_priority(Priority::Low),
        Task::new("Pay rent").with_priority(Priority::High),
        Task::new("buy milk"),
        Task::new("Archive mail")
            .with_priority(Priority::High)
            .with_completed(true),
        Task::new("Call plumber").with_priority(Priority::High),
        Task::new("Buy bread").with_completed(true),
    ]
}

#[test]
fn all_is_sorted_for_display() {
    let mut harness = Harness::new();
    for task in mixed_tasks() {
        harness.store.upsert(task);
    }

    assert_eq!(
        harness.titles(),
        vec![
            "Call plumber",
            "Pay rent",
            "buy milk",
            "walk dog",
            "Archive mail",
            "Buy bread",
        ]
    );

    let view = harness.store.all("");
    for pair in view.windows(2) {
        assert_ne!(
            compare_for_display(&pair[0], &pair[1]),
            std::cmp::Ordering::Greater
        );
    }
}

#[test]
fn all_filters_case_insensitively() {
    let mut harness = Harness::new();
    for task in mixed_tasks() {
        harness.store.upsert(task);
    }

    let titles: Vec<String> = harness
        .store
        .all("BUY")
        .into_iter()
        .map(|task| task.title)
        .collect();
    assert_eq!(titles, vec!["buy milk", "Buy bread"]);
    assert!(harness.store.all("zebra").is_empty());
    assert_eq!(harness.store.all("  ").len(), 6);
}

#[test]
fn queries_reflect_completion() {
    let mut harness = Harness::new();
    assert!(harness.store.is_empty());
    assert!(harness.store.has_no_completed());

    let task = Task::new("one");
    let id = task.id().to_string();
    harness.store.upsert(task);
    assert!(!harness.store.is_empty());
    assert!(harness.store.has_no_completed());

    harness.store.toggle_completed(&id);
    assert!(!harness.store.has_no_completed());
    assert_eq!(harness.store.len(), 1);
}

#[test]
fn upsert_replaces_by_id() {
    let mut harness = Harness::new();
    let task = Task::new("draft").with_description("first");
    let id = task.id().to_string();
    harness.store.upsert(task.clone());
    harness.store.upsert(task.clone());
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.store.get(&id), Some(&task));

    let mut edited = task.clone();
    edited.title = "final".to_string();
    edited.priority = Priority::High;
    harness.store.upsert(edited.clone());
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.store.get(&id), Some(&edited));
}

#[test]
fn remove_uses_sorted_positions() {
    let mut harness = Harness::new();
    harness
        .store
        .upsert(Task::new("b").with_priority(Priority::High));
    harness
        .store
        .upsert(Task::new("a").with_priority(Priority::Low));
    harness.store.upsert(Task::new("c"));

    // View is b, c, a.
    harness.store.remove([1]);
    assert_eq!(harness.titles(), vec!["b", "a"]);

    harness.store.remove([0, 0, 42]);
    assert_eq!(harness.titles(), vec!["a"]);
}

#[test]
fn remove_visible_uses_filtered_positions() {
    let mut harness = Harness::new();
    harness.store.upsert(Task::new("apple pie"));
    harness.store.upsert(Task::new("banana"));
    harness.store.upsert(Task::new("apple juice"));

    // Filtered view is "apple juice", "apple pie".
    harness.store.remove_visible("APPLE", [1]);
    assert_eq!(harness.titles(), vec!["apple juice", "banana"]);

    harness.store.remove_visible("apple", [5]);
    assert_eq!(harness.store.len(), 2);
}

#[test]
fn find_by_prefix_resolves_unique_ids() {
    let mut harness = Harness::new();
    let task = Task::new("one");
    let id = task.id().to_string();
    harness.store.upsert(task);
    harness.store.upsert(Task::new("two"));

    assert_eq!(harness.store.find_by_prefix(&id).unwrap().title, "one");
    assert_eq!(harness.store.find_by_prefix(&id[..8]).unwrap().title, "one");
    assert!(matches!(
        harness.store.find_by_prefix("not-an-id"),
        Err(todolist::Error::TaskNotFound(_))
    ));
    assert!(matches!(
        harness.store.find_by_prefix(""),
        Err(todolist::Error::InvalidArgument(_))
    ));
}

#[test]
fn every_mutation_persists_and_reloads() {
    let mut harness = Harness::new();
    for task in mixed_tasks() {
        harness.store.upsert(task);
    }
    harness
        .store
        .upsert(Task::new("Dentist").with_reminder(in_hours(3)));
    harness.store.process_scheduler_events();
    assert_eq!(harness.storage.write_count(), 7);

    let reopened = harness.reopen();
    assert_eq!(reopened.all(""), harness.store.all(""));

    harness.store.remove_completed();
    assert_eq!(harness.reopen().len(), 5);
    harness.store.remove_all();
    assert!(harness.reopen().is_empty());
}

#[test]
fn file_storage_survives_a_restart() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("TodoList.json");
    let clock = Arc::new(ManualClock::new(now()));

    let mut first = TodoStore::new(
        Arc::new(FileStorage::new(&path)),
        RecordingScheduler::new(),
        clock.clone(),
    );
    first.load(LoadSource::Persisted);
    assert!(first.is_empty());
    for task in mixed_tasks() {
        first.upsert(task);
    }
    first.upsert(Task::new("Dentist").with_reminder(in_hours(3)));

    let mut second = TodoStore::new(
        Arc::new(FileStorage::new(&path)),
        RecordingScheduler::new(),
        clock,
    );
    second.load(LoadSource::Persisted);
    assert_eq!(second.all(""), first.all(""));

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"todos\""));
    assert!(raw.contains("\"isCompleted\""));
    assert!(raw.contains("\"hasNotification\": true"));
}

#[test]
fn unreadable_snapshots_load_empty() {
    let harness = Harness::with_document(b"{not json");
    assert!(harness.store.is_empty());

    let harness = Harness::with_document(
        br#"{"todos":[{"id":"a","title":"x","priority":7,"notificationId":"n"}]}"#,
    );
    assert!(harness.store.is_empty());
}

#[test]
fn duplicate_ids_keep_the_first_task() {
    let document = br#"{"todos":[
        {"id":"a","title":"first","priority":1,"notificationId":"n1"},
        {"id":"a","title":"second","priority":2,"notificationId":"n2"},
        {"id":"b","title":"other","priority":0,"notificationId":"n3"}
    ]}"#;
    let harness = Harness::with_document(document);
    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.store.get("a").unwrap().title, "first");
}

#[test]
fn shared_notification_ids_stay_with_the_first_task() {
    let document = br#"{"todos":[
        {"id":"x","title":"first","priority":1,"notificationId":"N","hasNotification":true,
         "dueDate":{"year":2030,"month":6,"day":15,"hour":15,"minute":0}},
        {"id":"y","title":"second","priority":1,"notificationId":"N","hasNotification":true,
         "dueDate":{"year":2030,"month":6,"day":15,"hour":16,"minute":0}}
    ]}"#;
    let mut harness = Harness::with_document(document);
    assert!(harness.store.get("x").unwrap().has_notification);
    assert!(!harness.store.get("y").unwrap().has_notification);

    let mut moved = harness.store.get("x").unwrap().clone();
    moved.due_date = Some(in_hours(5));
    harness.store.upsert(moved);

    assert_eq!(harness.scheduler.cancelled_keys(), vec!["N".to_string()]);
    assert!(!harness.store.get("y").unwrap().has_notification);

    harness.scheduler.clear_calls();
    harness.store.remove_all();
    assert_eq!(harness.scheduler.cancelled_keys(), vec!["N".to_string()]);
}

#[test]
fn loading_never_writes() {
    let storage = Arc::new(MemoryStorage::with_document(
        TodoDocument::new(mixed_tasks()).encode().unwrap(),
    ));
    let mut store = TodoStore::new(
        storage.clone(),
        RecordingScheduler::new(),
        Arc::new(ManualClock::new(now())),
    );
    store.load(LoadSource::Persisted);
    assert_eq!(store.len(), 6);
    store.load(LoadSource::Seed);
    assert_eq!(store.len(), 8);
    assert_eq!(storage.write_count(), 0);
}

#[test]
fn failed_writes_keep_the_change() {
    let mut store = TodoStore::new(
        Arc::new(FailingStorage),
        RecordingScheduler::new(),
        Arc::new(ManualClock::new(now())),
    );
    store.load(LoadSource::Persisted);
    store.upsert(Task::new("still here"));

    assert_eq!(store.len(), 1);
    assert!(store.last_persist_error().unwrap().contains("disk full"));
}

#[test]
fn subscribers_see_every_mutation() {
    let mut harness = Harness::new();
    let views: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = views.clone();
    harness
        .store
        .subscribe(move |change| sink.lock().unwrap().push(change.tasks.len()));

    let task = Task::new("one");
    let id = task.id().to_string();
    harness.store.upsert(task);
    harness.store.upsert(Task::new("two"));
    harness.store.set_completed_state(&id, true);
    harness.store.remove([0]);
    harness.store.remove_completed();
    harness.store.remove_all();
    harness.store.load(LoadSource::Seed);

    assert_eq!(
        harness.changes(),
        vec![
            ChangeKind::Upserted,
            ChangeKind::Upserted,
            ChangeKind::CompletionChanged,
            ChangeKind::Removed,
            ChangeKind::RemovedCompleted,
            ChangeKind::RemovedAll,
            ChangeKind::Loaded,
        ]
    );
    assert_eq!(*views.lock().unwrap(), vec![1, 2, 2, 1, 0, 0, 8]);
}
