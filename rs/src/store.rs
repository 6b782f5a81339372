//! Core Store implementation over SQLite

use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::filter::{Filter, FilterOp};
use crate::record::{IndexValue, Record};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    version     INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    body        TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE TABLE IF NOT EXISTS record_index (
    collection  TEXT NOT NULL,
    field       TEXT NOT NULL,
    value       TEXT NOT NULL,
    id          TEXT NOT NULL,
    PRIMARY KEY (collection, field, value, id)
);
CREATE INDEX IF NOT EXISTS idx_record_index_lookup
    ON record_index (collection, field, value);
";

/// SQLite-backed record store with secondary index and CAS updates
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a store at the given database path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Store::open: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    /// In-memory store, mainly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    /// Insert a new record. Fails with `Duplicate` if the id is taken.
    /// Returns the record with its version set to 1.
    pub fn create<T: Record + Serialize>(&mut self, mut record: T) -> Result<T, StoreError> {
        debug!(
            collection = T::collection_name(),
            id = record.id(),
            "Store::create: called"
        );
        record.set_version(1);
        let body = serde_json::to_string(&record)?;
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO records (collection, id, version, updated_at, body)
             VALUES (?1, ?2, 1, ?3, ?4)",
            params![T::collection_name(), record.id(), record.updated_at(), body],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate {
                collection: T::collection_name().to_string(),
                id: record.id().to_string(),
            });
        }
        write_index(&tx, T::collection_name(), record.id(), &record.indexed_fields())?;
        tx.commit()?;
        Ok(record)
    }

    /// Fetch a record by id
    pub fn get<T: Record + DeserializeOwned>(&self, id: &str) -> Result<T, StoreError> {
        debug!(collection = T::collection_name(), id, "Store::get: called");
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
                params![T::collection_name(), id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(StoreError::NotFound {
                collection: T::collection_name().to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Compare-and-swap update. The record's current `version` is the
    /// precondition; on success the returned record carries `version + 1`.
    /// Fails with `VersionConflict` if another writer got there first.
    pub fn update<T: Record + Serialize>(&mut self, mut record: T) -> Result<T, StoreError> {
        let expected = record.version();
        debug!(
            collection = T::collection_name(),
            id = record.id(),
            expected,
            "Store::update: called"
        );
        record.set_version(expected + 1);
        let body = serde_json::to_string(&record)?;
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE records SET version = ?1, updated_at = ?2, body = ?3
             WHERE collection = ?4 AND id = ?5 AND version = ?6",
            params![
                (expected + 1) as i64,
                record.updated_at(),
                body,
                T::collection_name(),
                record.id(),
                expected as i64
            ],
        )?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT version FROM records WHERE collection = ?1 AND id = ?2",
                    params![T::collection_name(), record.id()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => StoreError::VersionConflict {
                    collection: T::collection_name().to_string(),
                    id: record.id().to_string(),
                    expected,
                },
                None => StoreError::NotFound {
                    collection: T::collection_name().to_string(),
                    id: record.id().to_string(),
                },
            });
        }
        write_index(&tx, T::collection_name(), record.id(), &record.indexed_fields())?;
        tx.commit()?;
        Ok(record)
    }

    /// List records matching all filters (AND), ordered by update time.
    /// An empty filter slice lists the whole collection.
    pub fn list<T: Record + DeserializeOwned>(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        debug!(
            collection = T::collection_name(),
            filter_count = filters.len(),
            "Store::list: called"
        );
        let mut sql = String::from("SELECT body FROM records WHERE collection = ?1");
        let mut args: Vec<String> = vec![T::collection_name().to_string()];
        if !filters.is_empty() {
            sql.push_str(" AND id IN (");
            for (i, filter) in filters.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" INTERSECT ");
                }
                let FilterOp::Eq = filter.op;
                sql.push_str(&format!(
                    "SELECT id FROM record_index WHERE collection = ?1 AND field = ?{} AND value = ?{}",
                    args.len() + 1,
                    args.len() + 2
                ));
                args.push(filter.field.clone());
                args.push(filter.value.to_string());
            }
            sql.push(')');
        }
        sql.push_str(" ORDER BY updated_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for body in rows {
            records.push(serde_json::from_str(&body?)?);
        }
        Ok(records)
    }

    /// Remove a record and its index rows
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<(), StoreError> {
        debug!(collection = T::collection_name(), id, "Store::delete: called");
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![T::collection_name(), id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound {
                collection: T::collection_name().to_string(),
                id: id.to_string(),
            });
        }
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![T::collection_name(), id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Replace the index rows for a record inside an open transaction
fn write_index(
    tx: &Transaction<'_>,
    collection: &str,
    id: &str,
    fields: &[(String, IndexValue)],
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO record_index (collection, field, value, id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (field, value) in fields {
        stmt.execute(params![collection, field, value.to_string(), id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::now_ms;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Booking {
        id: String,
        version: u64,
        updated_at: i64,
        room: String,
        people: Vec<String>,
    }

    impl Booking {
        fn new(id: &str, room: &str, people: &[&str]) -> Self {
            Booking {
                id: id.to_string(),
                version: 0,
                updated_at: now_ms(),
                room: room.to_string(),
                people: people.iter().map(|p| p.to_string()).collect(),
            }
        }
    }

    impl Record for Booking {
        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn set_version(&mut self, version: u64) {
            self.version = version;
        }

        fn updated_at(&self) -> i64 {
            self.updated_at
        }

        fn collection_name() -> &'static str {
            "bookings"
        }

        fn indexed_fields(&self) -> Vec<(String, IndexValue)> {
            let mut fields = vec![("room".to_string(), IndexValue::String(self.room.clone()))];
            for person in &self.people {
                fields.push(("person".to_string(), IndexValue::String(person.clone())));
            }
            fields
        }
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.db")).expect("open store");
        (dir, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, mut store) = temp_store();
        let created = store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        assert_eq!(created.version, 1);

        let fetched: Booking = store.get("b1").expect("get");
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (_dir, mut store) = temp_store();
        store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        let err = store.create(Booking::new("b1", "r2", &["bob"])).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.get::<Booking>("nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_update_bumps_version() {
        let (_dir, mut store) = temp_store();
        let mut booking = store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        booking.room = "r9".to_string();
        let updated = store.update(booking).expect("update");
        assert_eq!(updated.version, 2);

        let fetched: Booking = store.get("b1").expect("get");
        assert_eq!(fetched.room, "r9");
        assert_eq!(fetched.version, 2);
    }

    #[test]
    fn test_update_stale_version_conflicts() {
        let (_dir, mut store) = temp_store();
        let booking = store.create(Booking::new("b1", "r1", &["ana"])).expect("create");

        let mut first = booking.clone();
        first.room = "r2".to_string();
        store.update(first).expect("first writer wins");

        let mut second = booking;
        second.room = "r3".to_string();
        let err = store.update(second).unwrap_err();
        assert!(err.is_version_conflict());

        // loser's write left no trace
        let fetched: Booking = store.get("b1").expect("get");
        assert_eq!(fetched.room, "r2");
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let (_dir, mut store) = temp_store();
        let err = store.update(Booking::new("ghost", "r1", &["ana"])).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_list_all_and_filtered() {
        let (_dir, mut store) = temp_store();
        store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        store.create(Booking::new("b2", "r1", &["bob"])).expect("create");
        store.create(Booking::new("b3", "r2", &["ana"])).expect("create");

        let all: Vec<Booking> = store.list(&[]).expect("list all");
        assert_eq!(all.len(), 3);

        let in_r1: Vec<Booking> = store
            .list(&[Filter::eq("room", IndexValue::String("r1".to_string()))])
            .expect("list r1");
        assert_eq!(in_r1.len(), 2);

        // AND of two filters
        let ana_in_r1: Vec<Booking> = store
            .list(&[
                Filter::eq("room", IndexValue::String("r1".to_string())),
                Filter::eq("person", IndexValue::String("ana".to_string())),
            ])
            .expect("list intersect");
        assert_eq!(ana_in_r1.len(), 1);
        assert_eq!(ana_in_r1[0].id, "b1");
    }

    #[test]
    fn test_multi_valued_index_matches_each_value() {
        let (_dir, mut store) = temp_store();
        store
            .create(Booking::new("b1", "r1", &["ana", "bob"]))
            .expect("create");

        for person in ["ana", "bob"] {
            let found: Vec<Booking> = store
                .list(&[Filter::eq("person", IndexValue::String(person.to_string()))])
                .expect("list person");
            assert_eq!(found.len(), 1, "person {person} should match");
        }
    }

    #[test]
    fn test_update_reindexes() {
        let (_dir, mut store) = temp_store();
        let mut booking = store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        booking.room = "r2".to_string();
        store.update(booking).expect("update");

        let in_r1: Vec<Booking> = store
            .list(&[Filter::eq("room", IndexValue::String("r1".to_string()))])
            .expect("list r1");
        assert!(in_r1.is_empty(), "old index value should be gone");

        let in_r2: Vec<Booking> = store
            .list(&[Filter::eq("room", IndexValue::String("r2".to_string()))])
            .expect("list r2");
        assert_eq!(in_r2.len(), 1);
    }

    #[test]
    fn test_delete_removes_record_and_index() {
        let (_dir, mut store) = temp_store();
        store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        store.delete::<Booking>("b1").expect("delete");

        assert!(matches!(
            store.get::<Booking>("b1").unwrap_err(),
            StoreError::NotFound { .. }
        ));
        let in_r1: Vec<Booking> = store
            .list(&[Filter::eq("room", IndexValue::String("r1".to_string()))])
            .expect("list r1");
        assert!(in_r1.is_empty());

        let err = store.delete::<Booking>("b1").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("test.db");
        {
            let mut store = Store::open(&db).expect("open");
            store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        }
        let store = Store::open(&db).expect("reopen");
        let fetched: Booking = store.get("b1").expect("get after reopen");
        assert_eq!(fetched.room, "r1");
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = Store::open_in_memory().expect("open in memory");
        store.create(Booking::new("b1", "r1", &["ana"])).expect("create");
        let fetched: Booking = store.get("b1").expect("get");
        assert_eq!(fetched.id, "b1");
    }
}
