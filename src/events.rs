//! Store change events for external integrations.
//!
//! Events are emitted as JSON lines to stdout or a configured file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::{ChangeKind, StoreChange};
use crate::task::Task;

pub const EVENT_SCHEMA_VERSION: &str = "todo.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Loaded,
    TaskUpserted,
    TasksRemoved,
    CompletedRemoved,
    AllRemoved,
    CompletionChanged,
    ReminderReset,
    RemindersDenied,
}

impl From<ChangeKind> for EventKind {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Loaded => EventKind::Loaded,
            ChangeKind::Upserted => EventKind::TaskUpserted,
            ChangeKind::Removed => EventKind::TasksRemoved,
            ChangeKind::RemovedCompleted => EventKind::CompletedRemoved,
            ChangeKind::RemovedAll => EventKind::AllRemoved,
            ChangeKind::CompletionChanged => EventKind::CompletionChanged,
            ChangeKind::ReminderReset => EventKind::ReminderReset,
            ChangeKind::AuthorizationDenied => EventKind::RemindersDenied,
        }
    }
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ChangePayload<'a> {
    count: usize,
    completed: usize,
    tasks: &'a [Task],
}

impl Event {
    pub fn new(event: EventKind) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Event describing a store change, carrying the new sorted view.
    pub fn from_change(change: &StoreChange) -> Result<Self> {
        Event::new(change.kind.into()).with_data(ChangePayload {
            count: change.tasks.len(),
            completed: change.tasks.iter().filter(|task| task.is_completed).count(),
            tasks: &change.tasks,
        })
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }

    /// Emit a store change, logging instead of failing.
    pub fn emit_change(&mut self, change: &StoreChange) {
        let result = Event::from_change(change).and_then(|event| self.emit(&event));
        if let Err(err) = result {
            tracing::warn!("cannot emit {:?} event: {err}", change.kind);
        }
    }
}
