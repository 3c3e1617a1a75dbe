//! todolist - personal todo list state management
//!
//! The core is [`store::TodoStore`], the single owner of the task
//! collection. It keeps the persisted snapshot and the pending reminders in
//! step with every mutation, and publishes the sorted view to subscribers.
//!
//! # Module Organization
//!
//! - `task`: the task entity, ordering, filtering and reminder predicates
//! - `store`: the todo store and its change notifications
//! - `storage`: the persistence adapter and its file and memory backends
//! - `reminder`: the reminder scheduler contract and the journal scheduler
//! - `clock`: injectable wall-clock
//! - `lock`: file locking and atomic writes
//! - `config`: configuration loading from `todo.toml`
//! - `events`: JSONL change events for integrations
//! - `output`: human and JSON output for the CLI
//! - `cli`: command-line interface using clap
//! - `error`: error types and result aliases

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod output;
pub mod reminder;
pub mod storage;
pub mod store;
pub mod task;

pub use error::{Error, Result};
pub use store::{ChangeKind, LoadSource, StoreChange, TodoStore};
pub use task::{DueDate, Priority, Task};
