//! Persistent storage for content and progress records using redb.
//!
//! # Table design
//!
//! One table per record type, keyed by the record's `u64` id with a
//! JSON-encoded value. A `sequences` table holds the last id handed out per
//! record type, so ids are never reused even after a row is deleted.
//!
//! Every public operation in this crate runs inside a single write
//! transaction. A cascade (draft creation for a whole project, completion
//! propagation from step to lesson to project) either commits as a whole or
//! not at all; dropping a `WriteTx` without `commit` aborts it.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::content::{Lesson, Project, Step};
use crate::error::{db_err, IgniteError, Result};
use crate::paths;
use crate::progress::{LessonState, ProjectState, StepState};
use crate::types::Id;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

pub type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Key: record type name. Value: last allocated id.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// A row stored in its own redb table.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: RecordTable;
    const NAME: &'static str;

    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);

    /// Error returned when a lookup by id finds nothing.
    fn missing(id: Id) -> IgniteError;
}

// ---------------------------------------------------------------------------
// Table access helpers
// ---------------------------------------------------------------------------

fn read_one<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>, id: Id) -> Result<Option<R>> {
    let guard = table.get(id).map_err(db_err)?;
    match guard {
        Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
        None => Ok(None),
    }
}

fn read_all<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> Result<Vec<R>> {
    let mut result = Vec::new();
    for entry in table.iter().map_err(db_err)? {
        let (_, v) = entry.map_err(db_err)?;
        result.push(serde_json::from_slice(v.value())?);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read access shared by read-only and read-write transactions.
pub trait Reader {
    fn get<R: Record>(&self, id: Id) -> Result<Option<R>>;

    /// All rows of a table in id order.
    fn scan<R: Record>(&self) -> Result<Vec<R>>;

    fn fetch<R: Record>(&self, id: Id) -> Result<R> {
        self.get(id)?.ok_or_else(|| R::missing(id))
    }

    fn filter<R: Record>(&self, pred: impl Fn(&R) -> bool) -> Result<Vec<R>> {
        Ok(self.scan::<R>()?.into_iter().filter(|r| pred(r)).collect())
    }
}

pub struct ReadTx {
    txn: ReadTransaction,
}

impl Reader for ReadTx {
    fn get<R: Record>(&self, id: Id) -> Result<Option<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        read_one(&table, id)
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        read_all(&table)
    }
}

pub struct WriteTx {
    txn: WriteTransaction,
}

impl Reader for WriteTx {
    fn get<R: Record>(&self, id: Id) -> Result<Option<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        read_one(&table, id)
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        read_all(&table)
    }
}

impl WriteTx {
    /// Allocate an id for `record`, store it and return the id.
    pub fn insert<R: Record>(&self, record: &mut R) -> Result<Id> {
        let id = self.next_id(R::NAME)?;
        record.set_id(id);
        self.put(record)?;
        Ok(id)
    }

    /// Store `record` under its current id, replacing any previous value.
    pub fn put<R: Record>(&self, record: &R) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let mut table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        table
            .insert(record.id(), value.as_slice())
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete the row with `id`. Returns whether a row was removed.
    pub fn remove<R: Record>(&self, id: Id) -> Result<bool> {
        let mut table = self.txn.open_table(R::TABLE).map_err(db_err)?;
        let removed = table.remove(id).map_err(db_err)?.is_some();
        Ok(removed)
    }

    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(db_err)
    }

    fn next_id(&self, name: &str) -> Result<Id> {
        let mut table = self.txn.open_table(SEQUENCES).map_err(db_err)?;
        let current = table.get(name).map_err(db_err)?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(name, next).map_err(db_err)?;
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// ContentDb
// ---------------------------------------------------------------------------

/// Persistent store for projects, lessons, steps and progress states.
pub struct ContentDb {
    db: Database,
}

impl ContentDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates every record table up front so read transactions never hit a
    /// missing table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(SEQUENCES).map_err(db_err)?;
        wt.open_table(Project::TABLE).map_err(db_err)?;
        wt.open_table(Lesson::TABLE).map_err(db_err)?;
        wt.open_table(Step::TABLE).map_err(db_err)?;
        wt.open_table(ProjectState::TABLE).map_err(db_err)?;
        wt.open_table(LessonState::TABLE).map_err(db_err)?;
        wt.open_table(StepState::TABLE).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        tracing::debug!(path = %path.display(), "content db opened");
        Ok(Self { db })
    }

    /// Open the database of the project rooted at `root`.
    pub fn open_root(root: &Path) -> Result<Self> {
        Self::open(&paths::db_path(root))
    }

    pub fn read(&self) -> Result<ReadTx> {
        let txn = self.db.begin_read().map_err(db_err)?;
        Ok(ReadTx { txn })
    }

    pub fn write(&self) -> Result<WriteTx> {
        let txn = self.db.begin_write().map_err(db_err)?;
        Ok(WriteTx { txn })
    }

    /// Run `f` in a read transaction.
    pub fn view<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T>) -> Result<T> {
        let tx = self.read()?;
        f(&tx)
    }

    /// Run `f` in a write transaction and commit it if `f` succeeds.
    pub fn update<T>(&self, f: impl FnOnce(&WriteTx) -> Result<T>) -> Result<T> {
        let tx = self.write()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
