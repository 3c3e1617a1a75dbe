//! Reminder scheduling contract and the file-backed journal scheduler.
//!
//! Schedulers answer asynchronously. Every submission carries a reply
//! handle that may be resolved from any thread; resolutions travel over a
//! channel back to the store, which applies them on its own timeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Result;
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::DueDate;

/// Whether the user allows reminders to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

/// A one-shot reminder keyed by a task's notification id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub key: String,
    pub title: String,
    pub body: String,
    pub fire_at: DueDate,
    #[serde(default)]
    pub repeats: bool,
}

/// Completion reported by a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Scheduled {
        key: String,
        ticket: u64,
        outcome: std::result::Result<(), String>,
    },
    Authorization {
        granted: bool,
    },
}

/// Handle for reporting the outcome of one `schedule` call.
#[derive(Debug)]
pub struct ScheduleReply {
    key: String,
    ticket: u64,
    tx: UnboundedSender<SchedulerEvent>,
}

impl ScheduleReply {
    pub(crate) fn new(key: String, ticket: u64, tx: UnboundedSender<SchedulerEvent>) -> Self {
        Self { key, ticket, tx }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn succeeded(self) {
        self.send(Ok(()));
    }

    pub fn failed(self, reason: impl Into<String>) {
        self.send(Err(reason.into()));
    }

    fn send(self, outcome: std::result::Result<(), String>) {
        // The store may already be gone; nothing left to update then.
        let _ = self.tx.send(SchedulerEvent::Scheduled {
            key: self.key,
            ticket: self.ticket,
            outcome,
        });
    }
}

/// Handle for reporting the answer to an authorization prompt.
#[derive(Debug)]
pub struct AuthorizationReply {
    tx: UnboundedSender<SchedulerEvent>,
}

impl AuthorizationReply {
    pub(crate) fn new(tx: UnboundedSender<SchedulerEvent>) -> Self {
        Self { tx }
    }

    pub fn resolve(self, granted: bool) {
        let _ = self.tx.send(SchedulerEvent::Authorization { granted });
    }
}

/// Delivery side of reminders. Implementations must not block on delivery.
pub trait ReminderScheduler: Send + Sync {
    /// Submit a request; replacing any pending one with the same key.
    fn schedule(&self, request: ReminderRequest, reply: ScheduleReply);

    /// Drop the pending request for `key`, if there is one.
    fn cancel(&self, key: &str);

    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for permission; the answer arrives through `reply`.
    fn request_authorization(&self, reply: AuthorizationReply);
}

/// Pending requests as stored in the journal file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJournal {
    #[serde(default)]
    pub pending: BTreeMap<String, ReminderRequest>,
}

impl ReminderJournal {
    fn decode(raw: Option<Vec<u8>>) -> Result<Self> {
        match raw {
            Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
            _ => Ok(Self::default()),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Scheduler that records pending reminders in a JSON journal for an
/// external delivery agent.
#[derive(Debug, Clone)]
pub struct JournalScheduler {
    path: PathBuf,
    enabled: bool,
    lock_timeout_ms: u64,
}

impl JournalScheduler {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pending requests, soonest first.
    pub fn pending(&self) -> Result<Vec<ReminderRequest>> {
        let raw = lock::read_locked(&self.path, self.lock_timeout_ms)?;
        let journal = ReminderJournal::decode(raw)?;
        let mut pending: Vec<ReminderRequest> = journal.pending.into_values().collect();
        pending.sort_by(|left, right| {
            left.fire_at
                .cmp(&right.fire_at)
                .then_with(|| left.key.cmp(&right.key))
        });
        Ok(pending)
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ReminderJournal),
    {
        lock::update_locked(&self.path, self.lock_timeout_ms, |raw| {
            let mut journal = ReminderJournal::decode(raw)?;
            mutate(&mut journal);
            journal.encode()
        })
    }
}

impl ReminderScheduler for JournalScheduler {
    fn schedule(&self, request: ReminderRequest, reply: ScheduleReply) {
        let key = request.key.clone();
        match self.update(|journal| {
            journal.pending.insert(request.key.clone(), request);
        }) {
            Ok(()) => {
                tracing::debug!("journaled reminder {key}");
                reply.succeeded();
            }
            Err(err) => {
                tracing::warn!("cannot journal reminder {key}: {err}");
                reply.failed(err.to_string());
            }
        }
    }

    fn cancel(&self, key: &str) {
        if let Err(err) = self.update(|journal| {
            journal.pending.remove(key);
        }) {
            tracing::warn!("cannot cancel reminder {key}: {err}");
        }
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        if self.enabled {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        }
    }

    fn request_authorization(&self, reply: AuthorizationReply) {
        reply.resolve(self.enabled);
    }
}
