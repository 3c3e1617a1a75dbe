//! todo command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::cli::GlobalOptions;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EventDestination;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::reminder::{JournalScheduler, ReminderRequest};
use crate::storage::{default_data_dir, resolve_data_dir, FileStorage, MemoryStorage, Persistence};
use crate::store::{LoadSource, TodoStore};
use crate::task::{validate_for_save, DueDate, Priority, Task};

pub struct ListOptions {
    pub filter: String,
    pub seed: bool,
}

pub struct AddOptions {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub remind_at: Option<String>,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub remind_at: Option<String>,
    pub no_remind: bool,
}

pub struct RmOptions {
    pub positions: Vec<usize>,
    pub filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionChange {
    Complete,
    Reopen,
    Toggle,
}

/// Everything a command needs: the loaded store and its surroundings.
struct TodoContext {
    store: TodoStore,
    config: Config,
    clock: Arc<dyn Clock>,
    journal: Arc<JournalScheduler>,
    data_dir: PathBuf,
    events_to_stdout: bool,
}

impl TodoContext {
    fn open(global: &GlobalOptions, source: LoadSource) -> Result<Self> {
        let base_dir = match global.dir.as_deref() {
            Some(dir) => dir.to_path_buf(),
            None => default_data_dir()?,
        };
        let config = Config::load_from_dir(&base_dir);
        let data_dir = resolve_data_dir(global.dir.as_deref(), config.storage.data_dir.as_deref())?;

        let persistence: Arc<dyn Persistence> = match source {
            LoadSource::Persisted => Arc::new(FileStorage::new(config.tasks_path(&data_dir))),
            LoadSource::Seed => Arc::new(MemoryStorage::new()),
        };
        let journal = Arc::new(JournalScheduler::new(
            config.journal_path(&data_dir),
            config.reminders.enabled,
        ));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut store = TodoStore::new(persistence, journal.clone(), clock.clone())
            .with_reminder_config(&config.reminders);
        store.load(source);

        let destination = EventDestination::parse(global.events.as_deref());
        let events_to_stdout = matches!(destination, Some(EventDestination::Stdout));
        if let Some(destination) = destination {
            let mut sink = destination.open()?;
            store.subscribe(move |change| sink.emit_change(change));
        }

        tracing::debug!("opened task list in {}", data_dir.display());
        Ok(Self {
            store,
            config,
            clock,
            journal,
            data_dir,
            events_to_stdout,
        })
    }

    fn output(&self, global: &GlobalOptions) -> OutputOptions {
        OutputOptions {
            json: global.json && !self.events_to_stdout,
            quiet: global.quiet || self.events_to_stdout,
        }
    }

    /// Apply scheduler replies that arrived during the last mutation.
    fn settle(&mut self) {
        let applied = self.store.process_scheduler_events();
        if applied > 0 {
            tracing::debug!("applied {applied} scheduler replies");
        }
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(err) = self.store.last_persist_error() {
            warnings.push(format!("task list was not saved: {err}"));
        }
        if self.store.reminders_denied() {
            warnings.push(
                "reminders are disabled; set `enabled = true` under [reminders] in todo.toml"
                    .to_string(),
            );
        }
        warnings
    }

    fn format_due(&self, due: &DueDate) -> String {
        due.format(&self.config.display.date_format)
    }

    fn push_warnings(&self, human: &mut HumanOutput) -> Vec<String> {
        let warnings = self.warnings();
        for warning in &warnings {
            human.push_warning(warning.clone());
        }
        warnings
    }
}

// =============================================================================
// Output shapes
// =============================================================================

#[derive(Serialize)]
struct ListedTask<'a> {
    position: usize,
    #[serde(flatten)]
    task: &'a Task,
}

#[derive(Serialize)]
struct TaskListOutput<'a> {
    total: usize,
    filter: &'a str,
    tasks: Vec<ListedTask<'a>>,
}

#[derive(Serialize)]
struct TaskOutput<'a> {
    task: &'a Task,
    reminder_active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct RemovedOutput {
    removed: usize,
    remaining: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ignored_positions: Vec<usize>,
}

#[derive(Serialize)]
struct RemindersOutput<'a> {
    journal: String,
    pending: &'a [ReminderRequest],
}

fn task_line(ctx: &TodoContext, position: usize, task: &Task) -> String {
    let mark = if task.is_completed { "x" } else { " " };
    let mut line = format!(
        "{position} [{mark}] {} ({})",
        task.title,
        task.priority.as_str()
    );
    if let Some(due) = task.due_date.as_ref() {
        line.push_str(&format!(" due {}", ctx.format_due(due)));
    }
    if task.has_active_reminder(ctx.clock.now()) {
        line.push_str(" [reminder]");
    }
    let short_id: String = task.id().chars().take(8).collect();
    line.push_str(&format!(" {short_id}"));
    line
}

fn task_summary(ctx: &TodoContext, human: &mut HumanOutput, task: &Task) {
    human.push_summary("ID", task.id());
    human.push_summary("Title", task.title.clone());
    if !task.description.is_empty() {
        human.push_summary("Description", task.description.clone());
    }
    human.push_summary("Priority", task.priority.title());
    human.push_summary("Completed", if task.is_completed { "yes" } else { "no" });
    if let Some(due) = task.due_date.as_ref() {
        human.push_summary("Due", ctx.format_due(due));
    }
    let reminder = if task.has_active_reminder(ctx.clock.now()) {
        "scheduled"
    } else {
        "off"
    };
    human.push_summary("Reminder", reminder);
}

fn parse_priority(raw: Option<&str>) -> Result<Option<Priority>> {
    raw.map(str::parse::<Priority>).transpose()
}

// =============================================================================
// Commands
// =============================================================================

pub fn run_list(global: &GlobalOptions, options: ListOptions) -> Result<()> {
    let source = if options.seed {
        LoadSource::Seed
    } else {
        LoadSource::Persisted
    };
    let ctx = TodoContext::open(global, source)?;
    let tasks = ctx.store.all(&options.filter);

    let output = TaskListOutput {
        total: tasks.len(),
        filter: &options.filter,
        tasks: tasks
            .iter()
            .enumerate()
            .map(|(position, task)| ListedTask { position, task })
            .collect(),
    };

    let mut human = HumanOutput::new(if options.seed { "Demo tasks" } else { "Tasks" });
    human.push_summary("Total", tasks.len().to_string());
    if !options.filter.trim().is_empty() {
        human.push_summary("Filter", options.filter.clone());
    }
    for (position, task) in tasks.iter().enumerate() {
        human.push_detail(task_line(&ctx, position, task));
    }
    ctx.push_warnings(&mut human);
    if ctx.store.is_empty() {
        human.push_next_step("todo add \"<title>\"");
    } else if !ctx.store.has_no_completed() {
        human.push_next_step("todo clear-completed");
    }

    emit_success(ctx.output(global), "list", &output, Some(&human))
}

pub fn run_add(global: &GlobalOptions, options: AddOptions) -> Result<()> {
    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;

    let mut task = Task::new(options.title.trim());
    if let Some(description) = options.description {
        task = task.with_description(description);
    }
    if let Some(priority) = parse_priority(options.priority.as_deref())? {
        task = task.with_priority(priority);
    }
    if let Some(raw) = options.remind_at.as_deref() {
        task = task.with_reminder(DueDate::parse(raw)?);
    }
    validate_for_save(&task, ctx.clock.now())?;

    let wanted_reminder = task.has_notification;
    let id = task.id().to_string();
    ctx.store.upsert(task);
    ctx.settle();

    let stored = ctx.store.get(&id).cloned().ok_or_else(|| {
        Error::OperationFailed(format!("task {id} disappeared after saving"))
    })?;

    let mut human = HumanOutput::new("Task added");
    task_summary(&ctx, &mut human, &stored);
    let mut warnings = ctx.push_warnings(&mut human);
    if wanted_reminder && !stored.has_notification && !ctx.store.reminders_denied() {
        let warning = "reminder could not be scheduled".to_string();
        human.push_warning(warning.clone());
        warnings.push(warning);
    }

    let output = TaskOutput {
        reminder_active: stored.has_active_reminder(ctx.clock.now()),
        task: &stored,
        warnings,
    };
    emit_success(ctx.output(global), "add", &output, Some(&human))
}

pub fn run_edit(global: &GlobalOptions, options: EditOptions) -> Result<()> {
    if options.title.is_none()
        && options.description.is_none()
        && options.priority.is_none()
        && options.remind_at.is_none()
        && !options.no_remind
    {
        return Err(Error::InvalidArgument(
            "edit requires --title, --description, --priority, --remind-at or --no-remind"
                .to_string(),
        ));
    }

    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let mut edited = ctx.store.find_by_prefix(&options.id)?.clone();
    let now = ctx.clock.now();

    if let Some(title) = options.title.as_deref() {
        edited.title = title.trim().to_string();
    }
    if let Some(description) = options.description {
        edited.description = description;
    }
    if let Some(priority) = parse_priority(options.priority.as_deref())? {
        edited.priority = priority;
    }
    if options.no_remind {
        edited.has_notification = false;
    }
    match options.remind_at.as_deref() {
        Some(raw) => {
            edited.due_date = Some(DueDate::parse(raw)?);
            edited.has_notification = true;
        }
        // A reminder that already fired does not block other edits.
        None if edited.has_notification && !edited.due_date_is_valid(now) => {
            edited.has_notification = false;
        }
        None => {}
    }
    validate_for_save(&edited, now)?;

    let id = edited.id().to_string();
    ctx.store.upsert(edited);
    ctx.settle();

    let stored = ctx.store.get(&id).cloned().ok_or_else(|| {
        Error::OperationFailed(format!("task {id} disappeared after saving"))
    })?;

    let mut human = HumanOutput::new("Task updated");
    task_summary(&ctx, &mut human, &stored);
    let warnings = ctx.push_warnings(&mut human);

    let output = TaskOutput {
        reminder_active: stored.has_active_reminder(ctx.clock.now()),
        task: &stored,
        warnings,
    };
    emit_success(ctx.output(global), "edit", &output, Some(&human))
}

pub fn run_show(global: &GlobalOptions, id: &str) -> Result<()> {
    let ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let task = ctx.store.find_by_prefix(id)?;

    let mut human = HumanOutput::new(task.title.clone());
    task_summary(&ctx, &mut human, task);

    let output = TaskOutput {
        task,
        reminder_active: task.has_active_reminder(ctx.clock.now()),
        warnings: Vec::new(),
    };
    emit_success(ctx.output(global), "show", &output, Some(&human))
}

pub fn run_set_completed(global: &GlobalOptions, id: &str, change: CompletionChange) -> Result<()> {
    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let id = ctx.store.find_by_prefix(id)?.id().to_string();

    match change {
        CompletionChange::Complete => ctx.store.set_completed_state(&id, true),
        CompletionChange::Reopen => ctx.store.set_completed_state(&id, false),
        CompletionChange::Toggle => ctx.store.toggle_completed(&id),
    }
    ctx.settle();

    let stored = ctx.store.get(&id).cloned().ok_or_else(|| Error::TaskNotFound(id.clone()))?;
    let header = if stored.is_completed {
        "Task completed"
    } else {
        "Task reopened"
    };
    let mut human = HumanOutput::new(header);
    task_summary(&ctx, &mut human, &stored);
    let warnings = ctx.push_warnings(&mut human);

    let command = match change {
        CompletionChange::Complete => "done",
        CompletionChange::Reopen => "undone",
        CompletionChange::Toggle => "toggle",
    };
    let output = TaskOutput {
        reminder_active: stored.has_active_reminder(ctx.clock.now()),
        task: &stored,
        warnings,
    };
    emit_success(ctx.output(global), command, &output, Some(&human))
}

pub fn run_rm(global: &GlobalOptions, options: RmOptions) -> Result<()> {
    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let visible = ctx.store.all(&options.filter).len();
    let mut ignored_positions: Vec<usize> = options
        .positions
        .iter()
        .copied()
        .filter(|position| *position >= visible)
        .collect();
    ignored_positions.sort_unstable();
    ignored_positions.dedup();

    let before = ctx.store.len();
    ctx.store
        .remove_visible(&options.filter, options.positions.iter().copied());
    ctx.settle();
    let removed = before - ctx.store.len();

    let mut human = HumanOutput::new("Tasks removed");
    human.push_summary("Removed", removed.to_string());
    human.push_summary("Remaining", ctx.store.len().to_string());
    for position in &ignored_positions {
        human.push_warning(format!("no task at position {position}"));
    }
    ctx.push_warnings(&mut human);

    let output = RemovedOutput {
        removed,
        remaining: ctx.store.len(),
        ignored_positions,
    };
    emit_success(ctx.output(global), "rm", &output, Some(&human))
}

pub fn run_clear_completed(global: &GlobalOptions) -> Result<()> {
    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let before = ctx.store.len();
    ctx.store.remove_completed();
    ctx.settle();
    let removed = before - ctx.store.len();

    let mut human = HumanOutput::new("Completed tasks removed");
    human.push_summary("Removed", removed.to_string());
    human.push_summary("Remaining", ctx.store.len().to_string());
    ctx.push_warnings(&mut human);

    let output = RemovedOutput {
        removed,
        remaining: ctx.store.len(),
        ignored_positions: Vec::new(),
    };
    emit_success(ctx.output(global), "clear-completed", &output, Some(&human))
}

pub fn run_clear(global: &GlobalOptions) -> Result<()> {
    let mut ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let removed = ctx.store.len();
    ctx.store.remove_all();
    ctx.settle();

    let mut human = HumanOutput::new("All tasks removed");
    human.push_summary("Removed", removed.to_string());
    ctx.push_warnings(&mut human);

    let output = RemovedOutput {
        removed,
        remaining: ctx.store.len(),
        ignored_positions: Vec::new(),
    };
    emit_success(ctx.output(global), "clear", &output, Some(&human))
}

pub fn run_reminders(global: &GlobalOptions) -> Result<()> {
    let ctx = TodoContext::open(global, LoadSource::Persisted)?;
    let pending = ctx.journal.pending()?;

    let mut human = HumanOutput::new("Pending reminders");
    human.push_summary("Total", pending.len().to_string());
    human.push_summary("Journal", ctx.journal.path().display().to_string());
    for request in &pending {
        human.push_detail(format!(
            "{} {}: {}",
            ctx.format_due(&request.fire_at),
            request.title,
            request.body
        ));
    }
    if !ctx.config.reminders.enabled {
        human.push_warning("reminders are disabled in todo.toml");
    }

    let output = RemindersOutput {
        journal: ctx.journal.path().display().to_string(),
        pending: &pending,
    };
    tracing::debug!(
        "listed {} reminders from {}",
        pending.len(),
        ctx.data_dir.display()
    );
    emit_success(ctx.output(global), "reminders", &output, Some(&human))
}
