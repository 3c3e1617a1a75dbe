//! Persistence of the task list
//!
//! The whole collection is one JSON document:
//!
//! ```text
//! <data dir>/                   # platform data dir, `--dir`, or TODO_DIR
//!   todo.toml                   # optional configuration
//!   TodoList.json               # {"todos": [...]}
//!   TodoList.json.lock          # writer lock
//!   reminders.json              # pending reminder journal
//! ```
//!
//! Field names are the stable camelCase names the document has always
//! used, so older files keep loading.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::Task;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "TODO_DIR";

/// Reads and writes the serialized task collection
pub trait Persistence: Send + Sync {
    /// The last written document, or `None` if nothing was ever written.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored document.
    fn write(&self, document: &[u8]) -> Result<()>;
}

/// On-disk shape of the task list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDocument {
    #[serde(default)]
    pub todos: Vec<Task>,
}

impl TodoDocument {
    pub fn new(todos: Vec<Task>) -> Self {
        Self { todos }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_tasks(&self.todos)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    todos: &'a [Task],
}

/// Serialize a collection without taking ownership of it.
pub fn encode_tasks(todos: &[Task]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&DocumentRef { todos })?)
}

/// Resolve the data directory: explicit path, then config, then the
/// platform data directory.
pub fn resolve_data_dir(explicit: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }
    default_data_dir()
}

/// Platform data directory for the application
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("org", "todolist", "todolist")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            Error::OperationFailed(format!(
                "cannot determine a data directory; set {DATA_DIR_ENV} or pass --dir"
            ))
        })
}

/// Task list stored as a JSON file, written atomically under a lock
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    lock_timeout_ms: u64,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStorage {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        lock::read_locked(&self.path, self.lock_timeout_ms)
    }

    fn write(&self, document: &[u8]) -> Result<()> {
        lock::write_atomic_locked(&self.path, document, self.lock_timeout_ms)?;
        tracing::debug!(
            "wrote {} bytes to {}",
            document.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Task list kept in memory; used for demo data and tests
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: Mutex<Option<Vec<u8>>>,
    writes: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing document.
    pub fn with_document(document: Vec<u8>) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            writes: Mutex::new(0),
        }
    }

    /// Current document, if any was stored.
    pub fn document(&self) -> Option<Vec<u8>> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        *self
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Persistence for MemoryStorage {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.document())
    }

    fn write(&self, document: &[u8]) -> Result<()> {
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(document.to_vec());
        *self
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
