//! Persisted status of a managed database.
//!
//! The status collection holds JSON documents keyed by `_id`. The `COMMIT`
//! document holds the last successfully applied commit; history documents
//! record each initialize and migrate run. Where the collection lives is up to
//! the [`StatusBackend`]: normally the managed database itself, reached
//! through its console.

mod console;
mod local;

pub use console::ConsoleBackend;
pub use local::SledBackend;

use crate::console::Console;
use crate::definition::NO_COMMIT;
use crate::error::MongrateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Name of the status collection.
pub const STATUS_COLLECTION: &str = "mongrate.status";

/// Reserved `_id` of the commit record.
pub const COMMIT_ID: &str = "COMMIT";

const HISTORY_PREFIX: &str = "history:";

/// The `COMMIT` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(rename = "_id")]
    pub id: String,
    /// Last applied commit, or `"0"`.
    pub value: String,
    /// Last update (microseconds since epoch).
    pub updated_at: u64,
}

/// An audit document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "_id")]
    pub id: String,
    /// When the entry was written (microseconds since epoch).
    pub ts: u64,
    /// What happened, e.g. `initialize` or `migrate`.
    pub event: String,
    /// Free-form detail.
    #[serde(default)]
    pub detail: Value,
}

impl HistoryEntry {
    fn new(event: &str, detail: Value) -> Self {
        let ts = current_timestamp();
        Self {
            id: format!("{}{:020}", HISTORY_PREFIX, ts),
            ts,
            event: event.to_string(),
            detail,
        }
    }
}

/// What the status action reports.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSnapshot {
    /// No status collection or no `COMMIT` record.
    NotManaged,
    /// Initialized database.
    Managed {
        /// Recorded commit.
        commit: String,
        /// Every history document, oldest first.
        history: Vec<HistoryEntry>,
    },
}

impl StatusSnapshot {
    pub fn is_managed(&self) -> bool {
        matches!(self, StatusSnapshot::Managed { .. })
    }
}

/// Document storage behind a [`StatusStore`].
///
/// Every document carries a string `_id`. Checking for documents never
/// creates the collection.
pub trait StatusBackend {
    /// Where the collection lives, for display.
    fn location(&self) -> String;

    /// True if the collection exists.
    fn exists(&self) -> Result<bool, MongrateError>;

    /// The document with the given `_id`.
    fn find(&self, id: &str) -> Result<Option<Value>, MongrateError>;

    /// Every document, ordered by `_id`.
    fn find_all(&self) -> Result<Vec<Value>, MongrateError>;

    /// Drop the collection and recreate it holding exactly `documents`.
    fn reset(&self, documents: &[Value]) -> Result<(), MongrateError>;

    /// Insert or replace `documents` by `_id`.
    fn upsert(&self, documents: &[Value]) -> Result<(), MongrateError>;
}

/// `_id` of a status document.
pub(crate) fn document_id(document: &Value) -> Result<&str, MongrateError> {
    document
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| MongrateError::MalformedStatus("document without a string _id".to_string()))
}

/// Status collection of one database.
pub struct StatusStore {
    backend: Box<dyn StatusBackend>,
}

impl StatusStore {
    pub fn new(backend: impl StatusBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// The status collection of the database `database`, through its console.
    pub fn console(console: Console, database: impl Into<String>) -> Self {
        Self::new(ConsoleBackend::new(console, database))
    }

    /// A status collection kept in a local sled database.
    pub fn local(path: impl AsRef<std::path::Path>) -> Result<Self, MongrateError> {
        Ok(Self::new(SledBackend::open(path)?))
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// True iff the status collection exists and holds the `COMMIT` record.
    pub fn is_managed(&self) -> Result<bool, MongrateError> {
        Ok(self.commit_record()?.is_some())
    }

    /// The recorded commit.
    pub fn current_commit(&self) -> Result<String, MongrateError> {
        self.commit_record()?
            .map(|record| record.value)
            .ok_or(MongrateError::NotManaged)
    }

    /// Reset the status collection and record the `"0"` commit.
    pub fn initialize(&self, force: bool) -> Result<(), MongrateError> {
        if let Some(existing) = self.commit_record()? {
            if !force {
                return Err(MongrateError::AlreadyManaged {
                    commit: existing.value,
                });
            }
            tracing::warn!(commit = %existing.value, "forcing re-initialization of status collection");
        }

        let record = CommitRecord {
            id: COMMIT_ID.to_string(),
            value: NO_COMMIT.to_string(),
            updated_at: current_timestamp(),
        };
        let entry = HistoryEntry::new("initialize", serde_json::json!({ "force": force }));
        self.backend
            .reset(&[serde_json::to_value(&record)?, serde_json::to_value(&entry)?])?;

        tracing::info!(location = %self.backend.location(), "status collection initialized");
        Ok(())
    }

    /// Upsert the `COMMIT` record and append a history entry in one write.
    pub fn record_commit(&self, commit: &str, detail: Value) -> Result<(), MongrateError> {
        if !self.is_managed()? {
            return Err(MongrateError::NotManaged);
        }

        let record = CommitRecord {
            id: COMMIT_ID.to_string(),
            value: commit.to_string(),
            updated_at: current_timestamp(),
        };
        let entry = HistoryEntry::new("migrate", detail);
        self.backend
            .upsert(&[serde_json::to_value(&record)?, serde_json::to_value(&entry)?])?;

        tracing::info!(commit, "recorded commit");
        Ok(())
    }

    /// Snapshot for the status action. Never fails on an unmanaged store.
    pub fn snapshot(&self) -> Result<StatusSnapshot, MongrateError> {
        let Some(record) = self.commit_record()? else {
            return Ok(StatusSnapshot::NotManaged);
        };

        let mut history = Vec::new();
        for document in self.backend.find_all()? {
            if !document_id(&document)?.starts_with(HISTORY_PREFIX) {
                continue;
            }
            history.push(serde_json::from_value(document)?);
        }

        Ok(StatusSnapshot::Managed {
            commit: record.value,
            history,
        })
    }

    fn commit_record(&self) -> Result<Option<CommitRecord>, MongrateError> {
        if !self.backend.exists()? {
            return Ok(None);
        }
        match self.backend.find(COMMIT_ID)? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }
}
