//! Row storage used by [`FlexRecord`](crate::FlexRecord).
//!
//! The real persistence layer is an external collaborator; `MemoryTable`
//! keeps string-typed rows in memory so records can be saved and reloaded.

use crate::core::{FlexError, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Column name to raw stored value.
pub type Row = BTreeMap<String, Option<String>>;

pub trait RecordStore: Send + Sync {
    fn table_name(&self) -> &str;

    /// Inserts a row and returns its id.
    fn insert(&self, row: Row) -> Result<u64>;

    /// Overwrites the given columns of an existing row; other columns are kept.
    fn update(&self, id: u64, row: Row) -> Result<()>;

    fn fetch(&self, id: u64) -> Result<Row>;
}

#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    rows: RwLock<BTreeMap<u64, Row>>,
    next_id: AtomicU64,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.rows.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn not_found(&self, id: u64) -> FlexError {
        FlexError::RecordNotFound {
            table: self.name.clone(),
            id,
        }
    }
}

impl RecordStore for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn insert(&self, row: Row) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rows.write()?.insert(id, row);
        Ok(id)
    }

    fn update(&self, id: u64, row: Row) -> Result<()> {
        let mut rows = self.rows.write()?;
        let existing = rows.get_mut(&id).ok_or_else(|| self.not_found(id))?;
        existing.extend(row);
        Ok(())
    }

    fn fetch(&self, id: u64) -> Result<Row> {
        self.rows
            .read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }
}
