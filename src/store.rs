//! The todo store: sole owner of the task collection.
//!
//! Every mutation runs on `&mut self`, writes the whole collection through
//! the [`Persistence`] adapter, keeps the [`ReminderScheduler`] in step, and
//! then tells subscribers about the new view. Scheduler replies are queued
//! on a channel and only touch the collection when the owner drains them
//! with [`TodoStore::process_scheduler_events`] or
//! [`TodoStore::next_scheduler_event`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::ReminderConfig;
use crate::error::{Error, Result};
use crate::reminder::{
    AuthorizationReply, AuthorizationStatus, ReminderRequest, ReminderScheduler, ScheduleReply,
    SchedulerEvent,
};
use crate::storage::{encode_tasks, Persistence, TodoDocument};
use crate::task::{seed_tasks, sort_tasks, Task};

const DEFAULT_REMINDER_TITLE: &str = "Reminder";

/// Where [`TodoStore::load`] takes its initial collection from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The persistence adapter's last snapshot.
    Persisted,
    /// Fixed demo data; nothing is read.
    Seed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Loaded,
    Upserted,
    Removed,
    RemovedCompleted,
    RemovedAll,
    CompletionChanged,
    ReminderReset,
    AuthorizationDenied,
}

/// Published after every mutation with the new unfiltered view.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub kind: ChangeKind,
    pub tasks: Vec<Task>,
}

pub type ChangeCallback = Box<dyn FnMut(&StoreChange) + Send>;

#[derive(Debug, Clone)]
struct OutstandingRequest {
    ticket: u64,
    task_id: String,
}

#[derive(Debug, Clone)]
struct AwaitingAuthorization {
    task_id: String,
    request: ReminderRequest,
}

pub struct TodoStore {
    tasks: Vec<Task>,
    persistence: Arc<dyn Persistence>,
    scheduler: Arc<dyn ReminderScheduler>,
    clock: Arc<dyn Clock>,
    reminder_title: String,
    subscribers: Vec<ChangeCallback>,
    events_tx: UnboundedSender<SchedulerEvent>,
    events_rx: UnboundedReceiver<SchedulerEvent>,
    next_ticket: u64,
    outstanding: HashMap<String, OutstandingRequest>,
    awaiting_authorization: Vec<AwaitingAuthorization>,
    authorization_requested: bool,
    reminders_denied: bool,
    last_persist_error: Option<String>,
}

impl TodoStore {
    /// An empty store wired to its collaborators. Call [`TodoStore::load`]
    /// to fill it.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        scheduler: Arc<dyn ReminderScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            tasks: Vec::new(),
            persistence,
            scheduler,
            clock,
            reminder_title: DEFAULT_REMINDER_TITLE.to_string(),
            subscribers: Vec::new(),
            events_tx,
            events_rx,
            next_ticket: 0,
            outstanding: HashMap::new(),
            awaiting_authorization: Vec::new(),
            authorization_requested: false,
            reminders_denied: false,
            last_persist_error: None,
        }
    }

    /// Take the reminder title from configuration.
    pub fn with_reminder_config(self, config: &ReminderConfig) -> Self {
        self.with_reminder_title(config.title.clone())
    }

    /// Title text used for every reminder request.
    pub fn with_reminder_title(mut self, title: impl Into<String>) -> Self {
        self.reminder_title = title.into();
        self
    }

    /// Register a callback run synchronously after each mutation.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&StoreChange) + Send + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    /// Replace the collection from `source`.
    ///
    /// A missing or unreadable snapshot yields an empty list.
    pub fn load(&mut self, source: LoadSource) {
        let tasks = match source {
            LoadSource::Seed => seed_tasks(),
            LoadSource::Persisted => self.read_persisted(),
        };
        self.tasks = dedupe_by_id(tasks);
        release_shared_notification_ids(&mut self.tasks);
        info!("loaded {} tasks from {source:?}", self.tasks.len());
        self.notify(ChangeKind::Loaded);
    }

    fn read_persisted(&self) -> Vec<Task> {
        match self.persistence.read() {
            Ok(Some(raw)) => match TodoDocument::decode(&raw) {
                Ok(document) => document.todos,
                Err(err) => {
                    warn!("task list is unreadable, starting empty: {err}");
                    Vec::new()
                }
            },
            Ok(None) => {
                debug!("no saved task list, starting empty");
                Vec::new()
            }
            Err(err) => {
                warn!("cannot read task list, starting empty: {err}");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Tasks whose title contains `filter` (case-insensitive), in display
    /// order. Recomputed on every call.
    pub fn all(&self, filter: &str) -> Vec<Task> {
        let mut visible: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.matches_filter(filter))
            .cloned()
            .collect();
        sort_tasks(&mut visible);
        visible
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn has_no_completed(&self) -> bool {
        !self.tasks.iter().any(|task| task.is_completed)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id() == id)
    }

    /// Look a task up by a unique id prefix.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&Task> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::InvalidArgument("task id cannot be empty".to_string()));
        }
        if let Some(task) = self.get(prefix) {
            return Ok(task);
        }

        let mut matches = self
            .tasks
            .iter()
            .filter(|task| task.id().starts_with(prefix));
        match (matches.next(), matches.count()) {
            (Some(task), 0) => Ok(task),
            (Some(_), rest) => Err(Error::AmbiguousTaskId {
                prefix: prefix.to_string(),
                matches: rest + 1,
            }),
            (None, _) => Err(Error::TaskNotFound(prefix.to_string())),
        }
    }

    /// True once the scheduler refused permission; front ends show a prompt.
    pub fn reminders_denied(&self) -> bool {
        self.reminders_denied
    }

    /// Error from the most recent failed write, cleared by the next success.
    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    /// Whether any scheduler reply is still expected.
    pub fn has_pending_scheduler_replies(&self) -> bool {
        !self.outstanding.is_empty() || self.authorization_requested
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert `edited`, or replace the stored task with the same id.
    pub fn upsert(&mut self, mut edited: Task) {
        let now = self.clock.now();

        if edited.wants_reminder(now) && self.notification_id_taken(&edited) {
            warn!(
                "notification id {} already in use, assigning a new one to {}",
                edited.notification_id(),
                edited.id()
            );
            edited.regenerate_notification_id();
        }

        match self.position_of(edited.id()) {
            Some(index) => {
                let stored = self.tasks[index].clone();
                let mut stored_active = stored.has_active_reminder(now);
                if stored_active
                    && (!edited.wants_reminder(now)
                        || edited.due_date != stored.due_date
                        || edited.notification_id() != stored.notification_id())
                {
                    self.cancel_reminder(&stored);
                    stored_active = false;
                }
                if edited.wants_reminder(now) && !self.schedule_reminder(&edited) {
                    edited.has_notification = false;
                    if stored_active {
                        self.cancel_reminder(&stored);
                    }
                }
                debug!("updated task {}", edited.id());
                self.tasks[index] = edited;
            }
            None => {
                if edited.wants_reminder(now) && !self.schedule_reminder(&edited) {
                    edited.has_notification = false;
                }
                debug!("added task {}", edited.id());
                self.tasks.push(edited);
            }
        }

        self.persist();
        self.notify(ChangeKind::Upserted);
    }

    /// Remove tasks by their positions in the unfiltered display order.
    pub fn remove<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = usize>,
    {
        self.remove_visible("", positions);
    }

    /// Remove tasks by their positions in the view for `filter`.
    ///
    /// Positions outside the view are ignored.
    pub fn remove_visible<I>(&mut self, filter: &str, positions: I)
    where
        I: IntoIterator<Item = usize>,
    {
        sort_tasks(&mut self.tasks);

        let visible: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.matches_filter(filter))
            .collect();
        let selected: Vec<Task> = positions
            .into_iter()
            .collect::<HashSet<usize>>()
            .into_iter()
            .filter_map(|position| visible.get(position).map(|task| (*task).clone()))
            .collect();

        let now = self.clock.now();
        for task in &selected {
            if task.has_active_reminder(now) {
                self.cancel_reminder(task);
            }
        }

        let ids: HashSet<&str> = selected.iter().map(|task| task.id()).collect();
        self.tasks.retain(|task| !ids.contains(task.id()));
        debug!("removed {} tasks", selected.len());

        self.persist();
        self.notify(ChangeKind::Removed);
    }

    pub fn remove_completed(&mut self) {
        let now = self.clock.now();
        let reminding: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.is_completed && task.has_active_reminder(now))
            .cloned()
            .collect();
        for task in &reminding {
            self.cancel_reminder(task);
        }

        let before = self.tasks.len();
        self.tasks.retain(|task| !task.is_completed);
        debug!("removed {} completed tasks", before - self.tasks.len());

        self.persist();
        self.notify(ChangeKind::RemovedCompleted);
    }

    pub fn remove_all(&mut self) {
        let now = self.clock.now();
        let reminding: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.has_active_reminder(now))
            .cloned()
            .collect();
        for task in &reminding {
            self.cancel_reminder(task);
        }

        self.tasks.clear();
        self.awaiting_authorization.clear();
        debug!("removed all tasks");

        self.persist();
        self.notify(ChangeKind::RemovedAll);
    }

    /// Set the completion flag. Completing a task cancels its reminder.
    /// Unknown ids are ignored.
    pub fn set_completed_state(&mut self, id: &str, is_completed: bool) {
        let Some(index) = self.position_of(id) else {
            debug!("set_completed_state: task {id} no longer exists");
            return;
        };

        self.tasks[index].is_completed = is_completed;
        let now = self.clock.now();
        if is_completed && self.tasks[index].has_active_reminder(now) {
            let task = self.tasks[index].clone();
            self.cancel_reminder(&task);
        }

        self.persist();
        self.notify(ChangeKind::CompletionChanged);
    }

    /// Flip the completion flag of a task. Unknown ids are ignored.
    pub fn toggle_completed(&mut self, id: &str) {
        if let Some(current) = self.get(id).map(|task| task.is_completed) {
            self.set_completed_state(id, !current);
        }
    }

    // =========================================================================
    // Scheduler replies
    // =========================================================================

    /// Apply every scheduler reply that has already arrived. Never blocks.
    pub fn process_scheduler_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_scheduler_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next scheduler reply and apply it.
    ///
    /// Waits indefinitely when no reply is pending; check
    /// [`TodoStore::has_pending_scheduler_replies`] first.
    pub async fn next_scheduler_event(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply_scheduler_event(event);
        }
    }

    fn apply_scheduler_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Scheduled {
                key,
                ticket,
                outcome,
            } => self.apply_schedule_outcome(&key, ticket, outcome),
            SchedulerEvent::Authorization { granted } => self.apply_authorization(granted),
        }
    }

    fn apply_schedule_outcome(
        &mut self,
        key: &str,
        ticket: u64,
        outcome: std::result::Result<(), String>,
    ) {
        let task_id = match self.outstanding.get(key) {
            Some(entry) if entry.ticket == ticket => entry.task_id.clone(),
            _ => {
                debug!("ignoring stale scheduler reply for {key} (ticket {ticket})");
                return;
            }
        };
        self.outstanding.remove(key);

        let reason = match outcome {
            Ok(()) => {
                debug!("reminder {key} scheduled");
                return;
            }
            Err(reason) => reason,
        };

        warn!("reminder {key} for task {task_id} failed: {reason}");
        let reset = match self
            .tasks
            .iter_mut()
            .find(|task| task.id() == task_id && task.notification_id() == key)
        {
            Some(task) if task.has_notification => {
                task.has_notification = false;
                true
            }
            _ => false,
        };

        if reset {
            self.persist();
            self.notify(ChangeKind::ReminderReset);
        }
    }

    fn apply_authorization(&mut self, granted: bool) {
        self.authorization_requested = false;
        let waiting = std::mem::take(&mut self.awaiting_authorization);
        let now = self.clock.now();

        if granted {
            info!("reminders authorized, submitting {} queued", waiting.len());
            self.reminders_denied = false;
            for pending in waiting {
                let still_current = self
                    .get(&pending.task_id)
                    .map(|task| {
                        task.notification_id() == pending.request.key
                            && task.wants_reminder(now)
                            && task.due_date == Some(pending.request.fire_at)
                    })
                    .unwrap_or(false);
                if still_current {
                    self.submit(&pending.task_id, pending.request);
                }
            }
            return;
        }

        warn!("reminders denied, dropping {} queued", waiting.len());
        self.reminders_denied = true;
        let mut reset = false;
        for pending in &waiting {
            if let Some(task) = self.tasks.iter_mut().find(|task| {
                task.id() == pending.task_id && task.notification_id() == pending.request.key
            }) {
                if task.has_notification {
                    task.has_notification = false;
                    reset = true;
                }
            }
        }
        if reset {
            self.persist();
        }
        self.notify(ChangeKind::AuthorizationDenied);
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn position_of(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id() == id)
    }

    fn notification_id_taken(&self, candidate: &Task) -> bool {
        self.tasks.iter().any(|task| {
            task.id() != candidate.id()
                && task.has_notification
                && task.notification_id() == candidate.notification_id()
        })
    }

    /// Cancel the pending reminder of `task` and clear the flag on the
    /// stored copy, if it is still present.
    fn cancel_reminder(&mut self, task: &Task) {
        let key = task.notification_id();
        self.scheduler.cancel(key);
        self.outstanding.remove(key);
        self.awaiting_authorization
            .retain(|pending| pending.request.key != key);

        if let Some(stored) = self.tasks.iter_mut().find(|stored| stored.id() == task.id()) {
            stored.has_notification = false;
        }
        debug!("cancelled reminder {key} for task {}", task.id());
    }

    /// Hand a reminder for `task` to the scheduler. Returns `false` when
    /// reminders are denied and the task must drop its flag.
    fn schedule_reminder(&mut self, task: &Task) -> bool {
        let Some(fire_at) = task.due_date else {
            return false;
        };
        let request = ReminderRequest {
            key: task.notification_id().to_string(),
            title: self.reminder_title.clone(),
            body: task.title.clone(),
            fire_at,
            repeats: false,
        };

        match self.scheduler.authorization_status() {
            AuthorizationStatus::Authorized => {
                self.submit(task.id(), request);
                true
            }
            AuthorizationStatus::NotDetermined => {
                self.awaiting_authorization
                    .retain(|pending| pending.request.key != request.key);
                self.awaiting_authorization.push(AwaitingAuthorization {
                    task_id: task.id().to_string(),
                    request,
                });
                if !self.authorization_requested {
                    self.authorization_requested = true;
                    debug!("asking for reminder authorization");
                    self.scheduler
                        .request_authorization(AuthorizationReply::new(self.events_tx.clone()));
                }
                true
            }
            AuthorizationStatus::Denied => {
                warn!("reminders are denied, not scheduling {}", task.id());
                self.reminders_denied = true;
                false
            }
        }
    }

    fn submit(&mut self, task_id: &str, request: ReminderRequest) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let key = request.key.clone();
        self.outstanding.insert(
            key.clone(),
            OutstandingRequest {
                ticket,
                task_id: task_id.to_string(),
            },
        );
        debug!("scheduling reminder {key} (ticket {ticket}) at {}", request.fire_at);
        self.scheduler.schedule(
            request,
            ScheduleReply::new(key, ticket, self.events_tx.clone()),
        );
    }

    fn persist(&mut self) {
        let result = encode_tasks(&self.tasks).and_then(|bytes| self.persistence.write(&bytes));
        match result {
            Ok(()) => self.last_persist_error = None,
            Err(err) => {
                error!("cannot save task list: {err}");
                self.last_persist_error = Some(err.to_string());
            }
        }
    }

    fn notify(&mut self, kind: ChangeKind) {
        if self.subscribers.is_empty() {
            return;
        }
        let change = StoreChange {
            kind,
            tasks: self.all(""),
        };
        for subscriber in &mut self.subscribers {
            subscriber(&change);
        }
    }
}

/// Keep the first task for every id.
fn dedupe_by_id(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let before = tasks.len();
    let unique: Vec<Task> = tasks
        .into_iter()
        .filter(|task| seen.insert(task.id().to_string()))
        .collect();
    if unique.len() != before {
        warn!("dropped {} tasks with duplicate ids", before - unique.len());
    }
    unique
}

/// Only the first flagged task keeps a notification id; later claimants
/// lose their flag so a cancel for one task never hits another's reminder.
fn release_shared_notification_ids(tasks: &mut [Task]) {
    let mut claimed = HashSet::new();
    let mut released = 0;
    for task in tasks.iter_mut().filter(|task| task.has_notification) {
        if !claimed.insert(task.notification_id().to_string()) {
            task.has_notification = false;
            released += 1;
        }
    }
    if released > 0 {
        warn!("cleared the reminder flag on {released} tasks sharing a notification id");
    }
}
