//! sled-backed status collection for local use and tests.

use super::{document_id, StatusBackend, STATUS_COLLECTION};
use crate::error::MongrateError;
use serde_json::Value;

/// Status documents kept in a sled tree named after the collection.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open the sled database at a path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, MongrateError> {
        Ok(Self::new(sled::open(path)?))
    }

    /// Wrap an already opened database.
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    fn batch(documents: &[Value]) -> Result<sled::Batch, MongrateError> {
        let mut batch = sled::Batch::default();
        for document in documents {
            batch.insert(document_id(document)?.as_bytes(), serde_json::to_vec(document)?);
        }
        Ok(batch)
    }

    fn write(&self, documents: &[Value]) -> Result<(), MongrateError> {
        let tree = self.db.open_tree(STATUS_COLLECTION)?;
        tree.apply_batch(Self::batch(documents)?)?;
        tree.flush()?;
        Ok(())
    }
}

impl StatusBackend for SledBackend {
    fn location(&self) -> String {
        format!("sled ({})", STATUS_COLLECTION)
    }

    // open_tree creates missing trees, so existence is checked by name.
    fn exists(&self) -> Result<bool, MongrateError> {
        Ok(self
            .db
            .tree_names()
            .iter()
            .any(|name| &name[..] == STATUS_COLLECTION.as_bytes()))
    }

    fn find(&self, id: &str) -> Result<Option<Value>, MongrateError> {
        if !self.exists()? {
            return Ok(None);
        }
        let tree = self.db.open_tree(STATUS_COLLECTION)?;
        match tree.get(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> Result<Vec<Value>, MongrateError> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let tree = self.db.open_tree(STATUS_COLLECTION)?;
        let mut documents = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            documents.push(serde_json::from_slice(&value)?);
        }
        Ok(documents)
    }

    fn reset(&self, documents: &[Value]) -> Result<(), MongrateError> {
        // Validate before dropping anything.
        let batch = Self::batch(documents)?;
        self.db.drop_tree(STATUS_COLLECTION)?;
        let tree = self.db.open_tree(STATUS_COLLECTION)?;
        tree.apply_batch(batch)?;
        tree.flush()?;
        Ok(())
    }

    fn upsert(&self, documents: &[Value]) -> Result<(), MongrateError> {
        self.write(documents)
    }
}
