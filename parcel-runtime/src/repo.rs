//! Entity repository seam and per-event write transactions.
//!
//! The backing store is an external collaborator: a keyed get/put
//! surface whose rows are schema-agnostic JSON values, applied one
//! atomic batch per event. Handlers never touch the repository
//! directly; they stage typed rows in an [`EventTxn`] and the whole
//! batch commits together or not at all, which is what makes
//! reprocessing idempotent.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::entities::EntityKind;
use crate::error::IndexerError;

/// One staged or stored row.
pub type Row = serde_json::Value;

/// A full set of writes from one event.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub rows: BTreeMap<(EntityKind, String), Row>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Idempotent keyed store. `load` and `apply` must be safe to call
/// repeatedly with identical arguments with no observable difference.
pub trait EntityRepository: Send + Sync {
    fn load(&self, kind: EntityKind, id: &str) -> Option<Row>;

    /// Apply every row of the batch, atomically.
    fn apply(&mut self, batch: WriteBatch) -> Result<(), IndexerError>;

    fn count(&self, kind: EntityKind) -> usize;
}

/// In-memory repository used by the replay runner and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: BTreeMap<(EntityKind, String), Row>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read, mostly for assertions.
    pub fn get<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> Option<T> {
        self.rows
            .get(&(kind, id.to_string()))
            .and_then(|row| serde_json::from_value(row.clone()).ok())
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<String> {
        self.rows
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl EntityRepository for MemoryRepository {
    fn load(&self, kind: EntityKind, id: &str) -> Option<Row> {
        self.rows.get(&(kind, id.to_string())).cloned()
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), IndexerError> {
        for (key, row) in batch.rows {
            self.rows.insert(key, row);
        }
        Ok(())
    }

    fn count(&self, kind: EntityKind) -> usize {
        self.rows.keys().filter(|(k, _)| *k == kind).count()
    }
}

/// Staged writes for one event, reading through to the repository.
///
/// Dropping the transaction without [`EventTxn::into_batch`] discards
/// every staged write. This is the event-abort path.
pub struct EventTxn<'r> {
    repo: &'r dyn EntityRepository,
    staged: BTreeMap<(EntityKind, String), Row>,
}

impl<'r> EventTxn<'r> {
    pub fn new(repo: &'r dyn EntityRepository) -> Self {
        Self {
            repo,
            staged: BTreeMap::new(),
        }
    }

    /// Load a row, preferring writes staged earlier in this event.
    /// Absence is not an error; it triggers creation at the caller.
    pub fn get<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<T>, IndexerError> {
        let row = self
            .staged
            .get(&(kind, id.to_string()))
            .cloned()
            .or_else(|| self.repo.load(kind, id));
        match row {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(
        &mut self,
        kind: EntityKind,
        id: &str,
        row: &T,
    ) -> Result<(), IndexerError> {
        self.staged
            .insert((kind, id.to_string()), serde_json::to_value(row)?);
        Ok(())
    }

    pub fn into_batch(self) -> WriteBatch {
        WriteBatch { rows: self.staged }
    }
}
