#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use todolist::clock::ManualClock;
use todolist::reminder::{
    AuthorizationReply, AuthorizationStatus, ReminderRequest, ReminderScheduler, ScheduleReply,
};
use todolist::storage::{MemoryStorage, Persistence};
use todolist::store::{ChangeKind, LoadSource, TodoStore};
use todolist::task::DueDate;

/// Fixed "now" for store tests.
pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 6, 15)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid fixture time")
}

/// A due date `hours` after [`now`].
pub fn in_hours(hours: i64) -> DueDate {
    DueDate::from_naive(now() + Duration::hours(hours))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Schedule(ReminderRequest),
    Cancel(String),
    RequestAuthorization,
}

/// How `schedule` answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMode {
    Succeed,
    Fail(String),
    /// Hold the reply until the test resolves it.
    Defer,
}

struct RecorderState {
    calls: Vec<SchedulerCall>,
    status: AuthorizationStatus,
    mode: ReplyMode,
    deferred: Vec<ScheduleReply>,
    authorization: Vec<AuthorizationReply>,
}

/// Scheduler double that records every call in order.
pub struct RecordingScheduler {
    state: Mutex<RecorderState>,
}

impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Self::with_status(AuthorizationStatus::Authorized)
    }

    pub fn with_status(status: AuthorizationStatus) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RecorderState {
                calls: Vec::new(),
                status,
                mode: ReplyMode::Succeed,
                deferred: Vec::new(),
                authorization: Vec::new(),
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap()
    }

    pub fn set_mode(&self, mode: ReplyMode) {
        self.state().mode = mode;
    }

    pub fn set_status(&self, status: AuthorizationStatus) {
        self.state().status = status;
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn scheduled_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SchedulerCall::Schedule(request) => Some(request.key),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SchedulerCall::Cancel(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn take_deferred(&self) -> Vec<ScheduleReply> {
        std::mem::take(&mut self.state().deferred)
    }

    /// Answer every outstanding authorization prompt. Returns how many
    /// prompts were answered.
    pub fn answer_authorization(&self, granted: bool) -> usize {
        let replies = {
            let mut state = self.state();
            state.status = if granted {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
            std::mem::take(&mut state.authorization)
        };
        let answered = replies.len();
        for reply in replies {
            reply.resolve(granted);
        }
        answered
    }
}

impl ReminderScheduler for RecordingScheduler {
    fn schedule(&self, request: ReminderRequest, reply: ScheduleReply) {
        let mode = {
            let mut state = self.state();
            state.calls.push(SchedulerCall::Schedule(request));
            state.mode.clone()
        };
        match mode {
            ReplyMode::Succeed => reply.succeeded(),
            ReplyMode::Fail(reason) => reply.failed(reason),
            ReplyMode::Defer => self.state().deferred.push(reply),
        }
    }

    fn cancel(&self, key: &str) {
        self.state().calls.push(SchedulerCall::Cancel(key.to_string()));
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state().status
    }

    fn request_authorization(&self, reply: AuthorizationReply) {
        let mut state = self.state();
        state.calls.push(SchedulerCall::RequestAuthorization);
        state.authorization.push(reply);
    }
}

/// A store wired to in-memory doubles.
pub struct Harness {
    pub store: TodoStore,
    pub storage: Arc<MemoryStorage>,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
    pub changes: Arc<Mutex<Vec<ChangeKind>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryStorage::new()), RecordingScheduler::new())
    }

    pub fn with_scheduler(scheduler: Arc<RecordingScheduler>) -> Self {
        Self::build(Arc::new(MemoryStorage::new()), scheduler)
    }

    pub fn with_document(document: &[u8]) -> Self {
        Self::build(
            Arc::new(MemoryStorage::with_document(document.to_vec())),
            RecordingScheduler::new(),
        )
    }

    fn build(storage: Arc<MemoryStorage>, scheduler: Arc<RecordingScheduler>) -> Self {
        let clock = Arc::new(ManualClock::new(now()));
        let mut store = TodoStore::new(storage.clone(), scheduler.clone(), clock.clone());
        store.load(LoadSource::Persisted);

        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        store.subscribe(move |change| sink.lock().unwrap().push(change.kind));

        Self {
            store,
            storage,
            scheduler,
            clock,
            changes,
        }
    }

    /// A second store reading what this one persisted.
    pub fn reopen(&self) -> TodoStore {
        let mut store = TodoStore::new(
            self.storage.clone(),
            RecordingScheduler::new(),
            self.clock.clone(),
        );
        store.load(LoadSource::Persisted);
        store
    }

    pub fn changes(&self) -> Vec<ChangeKind> {
        self.changes.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.store
            .all("")
            .into_iter()
            .map(|task| task.title)
            .collect()
    }
}

/// Persistence double whose writes always fail.
#[derive(Default)]
pub struct FailingStorage;

impl Persistence for FailingStorage {
    fn read(&self) -> todolist::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write(&self, _document: &[u8]) -> todolist::Result<()> {
        Err(todolist::Error::OperationFailed("disk full".to_string()))
    }
}

/// The `todo` binary pointed at `dir`, isolated from the caller's env.
pub fn todo_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("todo").expect("todo binary");
    cmd.env_remove("TODO_DIR")
        .env_remove("RUST_LOG")
        .arg("--dir")
        .arg(dir);
    cmd
}
