//! # redb-backed Record Store
//!
//! A disk-backed store for every record of the information system, using
//! the redb embedded database:
//! - ACID transactions (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! ## Layout
//!
//! Each record type owns one table `u64 -> postcard bytes`. Ids come from a
//! per-table sequence kept in `METADATA`. Attendance additionally keeps a
//! unique key index `(enrollment, day, session) -> attendance id`.
//!
//! ## Transactions
//!
//! Writes go through [`Store::write`]: the closure receives a [`WriteTx`],
//! the transaction commits when the closure returns `Ok` and is aborted
//! otherwise. Because redb allows one writer at a time, a uniqueness check
//! followed by an insert inside the same closure cannot race.

mod tables;

pub use tables::Record;

use crate::types::{Attendance, AttendanceSession, EnrollmentId};
use crate::SisError;
use chrono::{Datelike, NaiveDate};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use std::path::Path;

/// Table for id sequences: record name -> last allocated id
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Unique attendance key: (enrollment, days from CE, session) -> attendance id
const ATTENDANCE_KEYS: TableDefinition<(u64, i32, u8), u64> =
    TableDefinition::new("attendance_keys");

pub(crate) fn io_err(e: impl std::fmt::Display) -> SisError {
    SisError::IoError(e.to_string())
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, SisError> {
    postcard::from_bytes(bytes).map_err(|e| SisError::SerializationError(e.to_string()))
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>, SisError> {
    postcard::to_allocvec(record).map_err(|e| SisError::SerializationError(e.to_string()))
}

fn session_code(session: AttendanceSession) -> u8 {
    match session {
        AttendanceSession::Morning => 0,
        AttendanceSession::Evening => 1,
    }
}

fn attendance_key(
    enrollment: EnrollmentId,
    date: NaiveDate,
    session: AttendanceSession,
) -> (u64, i32, u8) {
    (enrollment.0, date.num_days_from_ce(), session_code(session))
}

// =============================================================================
// STORE
// =============================================================================

/// The record database.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SisError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Create every table up front so read transactions never miss one
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            tables::create_all(&write_txn)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            let _ = write_txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Begin a read-only snapshot.
    pub fn read(&self) -> Result<ReadTx, SisError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        Ok(ReadTx { txn })
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts and discards every change when
    /// it returns `Err`.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&WriteTx) -> Result<T, SisError>,
    ) -> Result<T, SisError> {
        let tx = WriteTx {
            txn: self.db.begin_write().map_err(io_err)?,
        };
        match f(&tx) {
            Ok(value) => {
                tx.txn.commit().map_err(io_err)?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.txn.abort();
                Err(e)
            }
        }
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, SisError> {
        self.db.compact().map_err(io_err)
    }
}

// =============================================================================
// READING
// =============================================================================

/// Read access shared by read snapshots and write transactions.
pub trait Reader {
    /// Load a record by id.
    fn get<R: Record>(&self, id: R::Id) -> Result<Option<R>, SisError>;

    /// Load every record of a type, in id order.
    fn all<R: Record>(&self) -> Result<Vec<R>, SisError>;

    /// Number of records of a type.
    fn count<R: Record>(&self) -> Result<u64, SisError>;

    /// Attendance marks of one enrollment, oldest first.
    fn attendance_of(&self, enrollment: EnrollmentId) -> Result<Vec<Attendance>, SisError>;

    /// The mark for one enrollment, date and session, if taken.
    fn attendance_at(
        &self,
        enrollment: EnrollmentId,
        date: NaiveDate,
        session: AttendanceSession,
    ) -> Result<Option<Attendance>, SisError>;

    /// Load a record by id, failing with `NotFound` when absent.
    fn fetch<R: Record>(&self, id: R::Id) -> Result<R, SisError> {
        self.get::<R>(id)?.ok_or(SisError::NotFound(R::NAME))
    }

    /// Every record matching `pred`, in id order.
    fn filter<R: Record>(&self, pred: impl Fn(&R) -> bool) -> Result<Vec<R>, SisError> {
        Ok(self.all::<R>()?.into_iter().filter(|r| pred(r)).collect())
    }

    /// First record matching `pred`, in id order.
    fn find<R: Record>(&self, pred: impl Fn(&R) -> bool) -> Result<Option<R>, SisError> {
        Ok(self.all::<R>()?.into_iter().find(|r| pred(r)))
    }
}

fn load<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<R>, SisError> {
    match table.get(id).map_err(io_err)? {
        Some(guard) => decode(guard.value()).map(Some),
        None => Ok(None),
    }
}

fn load_all<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> Result<Vec<R>, SisError> {
    let mut records = Vec::new();
    for entry in table.iter().map_err(io_err)? {
        let (_, value) = entry.map_err(io_err)?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

fn keyed_ids(
    keys: &impl ReadableTable<(u64, i32, u8), u64>,
    enrollment: EnrollmentId,
) -> Result<Vec<u64>, SisError> {
    let mut ids = Vec::new();
    let range = keys
        .range((enrollment.0, i32::MIN, 0u8)..=(enrollment.0, i32::MAX, u8::MAX))
        .map_err(io_err)?;
    for entry in range {
        let (_, id) = entry.map_err(io_err)?;
        ids.push(id.value());
    }
    Ok(ids)
}

macro_rules! impl_reader {
    ($tx:ty) => {
        impl Reader for $tx {
            fn get<R: Record>(&self, id: R::Id) -> Result<Option<R>, SisError> {
                let table = self.txn.open_table(R::TABLE).map_err(io_err)?;
                load(&table, id.into())
            }

            fn all<R: Record>(&self) -> Result<Vec<R>, SisError> {
                let table = self.txn.open_table(R::TABLE).map_err(io_err)?;
                load_all(&table)
            }

            fn count<R: Record>(&self) -> Result<u64, SisError> {
                let table = self.txn.open_table(R::TABLE).map_err(io_err)?;
                table.len().map_err(io_err)
            }

            fn attendance_of(
                &self,
                enrollment: EnrollmentId,
            ) -> Result<Vec<Attendance>, SisError> {
                let ids = {
                    let keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
                    keyed_ids(&keys, enrollment)?
                };
                let table = self.txn.open_table(Attendance::TABLE).map_err(io_err)?;
                let mut marks = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(mark) = load(&table, id)? {
                        marks.push(mark);
                    }
                }
                Ok(marks)
            }

            fn attendance_at(
                &self,
                enrollment: EnrollmentId,
                date: NaiveDate,
                session: AttendanceSession,
            ) -> Result<Option<Attendance>, SisError> {
                let id = {
                    let keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
                    let found = keys
                        .get(attendance_key(enrollment, date, session))
                        .map_err(io_err)?
                        .map(|v| v.value());
                    found
                };
                match id {
                    Some(id) => {
                        let table = self.txn.open_table(Attendance::TABLE).map_err(io_err)?;
                        load(&table, id)
                    }
                    None => Ok(None),
                }
            }
        }
    };
}

/// A consistent read-only snapshot.
pub struct ReadTx {
    txn: ReadTransaction,
}

impl_reader!(ReadTx);

#[cfg(test)]
impl ReadTx {
    /// Entries in the attendance key index.
    pub(crate) fn attendance_key_count(&self) -> Result<u64, SisError> {
        let keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
        keys.len().map_err(io_err)
    }
}

// =============================================================================
// WRITING
// =============================================================================

/// An open write transaction. Obtain one through [`Store::write`].
pub struct WriteTx {
    txn: WriteTransaction,
}

impl_reader!(WriteTx);

impl WriteTx {
    /// Allocate an id, assign it, and store the record.
    pub fn insert<R: Record>(&self, mut record: R) -> Result<R, SisError> {
        let id = self.next_id(R::NAME)?;
        record.set_id(R::Id::from(id));
        self.put(&record)?;
        Ok(record)
    }

    /// Store a record under its current id, replacing any previous version.
    pub fn put<R: Record>(&self, record: &R) -> Result<(), SisError> {
        let bytes = encode(record)?;
        let key: u64 = record.id().into();
        let mut table = self.txn.open_table(R::TABLE).map_err(io_err)?;
        table.insert(key, bytes.as_slice()).map_err(io_err)?;
        Ok(())
    }

    /// Delete a record. Returns whether it existed.
    pub fn remove<R: Record>(&self, id: R::Id) -> Result<bool, SisError> {
        let key: u64 = id.into();
        let mut table = self.txn.open_table(R::TABLE).map_err(io_err)?;
        let existed = table.remove(key).map_err(io_err)?.is_some();
        Ok(existed)
    }

    /// Insert or update an attendance mark, keeping the key index in step.
    ///
    /// A mark with id 0 that collides with an existing key takes over that
    /// key's id, so `(enrollment, date, session)` stays unique.
    pub fn save_attendance(&self, mut mark: Attendance) -> Result<Attendance, SisError> {
        let key = attendance_key(mark.enrollment_id, mark.date, mark.session);
        let existing = {
            let keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
            let found = keys.get(key).map_err(io_err)?.map(|v| v.value());
            found
        };

        match existing {
            Some(id) => mark.id = id.into(),
            None => {
                mark.id = self.next_id(Attendance::NAME)?.into();
            }
        }

        self.put(&mark)?;
        let mut keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
        keys.insert(key, mark.id.0).map_err(io_err)?;
        Ok(mark)
    }

    /// Delete an attendance mark and its key.
    pub fn remove_attendance(&self, mark: &Attendance) -> Result<(), SisError> {
        self.remove::<Attendance>(mark.id)?;
        let mut keys = self.txn.open_table(ATTENDANCE_KEYS).map_err(io_err)?;
        keys.remove(attendance_key(mark.enrollment_id, mark.date, mark.session))
            .map_err(io_err)?;
        Ok(())
    }

    fn next_id(&self, sequence: &str) -> Result<u64, SisError> {
        let mut meta = self.txn.open_table(METADATA).map_err(io_err)?;
        let last = meta.get(sequence).map_err(io_err)?.map(|v| v.value()).unwrap_or(0);
        let next = last.saturating_add(1);
        meta.insert(sequence, next).map_err(io_err)?;
        Ok(next)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttendanceStatus, Department, DepartmentId};
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("sis.redb")).expect("open store")
    }

    fn department(name: &str) -> Department {
        Department {
            id: DepartmentId::default(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);

        let (a, b) = store
            .write(|tx| Ok((tx.insert(department("Science"))?, tx.insert(department("Arts"))?)))
            .expect("insert");
        assert_eq!(a.id, DepartmentId(1));
        assert_eq!(b.id, DepartmentId(2));

        let read = store.read().expect("read");
        assert_eq!(read.count::<Department>().expect("count"), 2);
        assert_eq!(read.fetch::<Department>(b.id).expect("fetch").name, "Arts");
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);

        let result: Result<(), SisError> = store.write(|tx| {
            tx.insert(department("Science"))?;
            Err(SisError::NotFound("Course"))
        });
        assert!(result.is_err());

        let read = store.read().expect("read");
        assert_eq!(read.count::<Department>().expect("count"), 0);
    }

    #[test]
    fn test_fetch_missing_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let read = store.read().expect("read");
        let err = read.fetch::<Department>(DepartmentId(9)).expect_err("missing");
        assert!(matches!(err, SisError::NotFound("Department")));
    }

    #[test]
    fn test_attendance_key_is_unique() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).expect("date");
        let mark = |status| Attendance {
            id: Default::default(),
            enrollment_id: EnrollmentId(3),
            date,
            session: AttendanceSession::Morning,
            status,
            description: String::new(),
        };

        let (first, second) = store
            .write(|tx| {
                let first = tx.save_attendance(mark(AttendanceStatus::Present))?;
                let second = tx.save_attendance(mark(AttendanceStatus::Absent))?;
                Ok((first, second))
            })
            .expect("save");
        assert_eq!(first.id, second.id);

        let read = store.read().expect("read");
        let marks = read.attendance_of(EnrollmentId(3)).expect("marks");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].status, AttendanceStatus::Absent);
        assert!(read.attendance_of(EnrollmentId(4)).expect("marks").is_empty());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().expect("tempdir");
        {
            let store = open_store(&dir);
            store
                .write(|tx| tx.insert(department("Science")).map(|_| ()))
                .expect("insert");
        }
        let store = open_store(&dir);
        let read = store.read().expect("read");
        let all = read.all::<Department>().expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Science");
    }
}
