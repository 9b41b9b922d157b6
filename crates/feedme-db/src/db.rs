//! Table store and query execution.

use crate::types::render;
use crate::{DbError, Filter, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A named table: rows in insertion order plus unique column constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Table {
    #[serde(default)]
    unique: Vec<String>,
    #[serde(default)]
    rows: Vec<Row>,
}

impl Table {
    /// Reject `row` if its id or a unique column collides with another row.
    fn check_unique(&self, name: &str, row: &Row, skip: Option<usize>) -> Result<(), DbError> {
        let columns = std::iter::once("id").chain(self.unique.iter().map(String::as_str));
        for column in columns {
            let value = match row.get(column) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            let clash = self
                .rows
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && other.get(column) == Some(value));
            if clash {
                return Err(DbError::UniqueViolation {
                    table: name.to_string(),
                    column: column.to_string(),
                    value: render(value),
                });
            }
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.id() == id)
    }
}

struct Inner {
    tables: RwLock<BTreeMap<String, Table>>,
    offline: AtomicBool,
}

/// Shared handle to the table store.
///
/// Cloning is cheap; all clones see the same tables. Every mutating call
/// holds the write lock for its whole read-check-write cycle, so
/// [`Db::update_one`] is an atomic conditional update.
#[derive(Clone)]
pub struct Db {
    inner: Arc<Inner>,
}

impl Db {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::from_tables(BTreeMap::new())
    }

    fn from_tables(tables: BTreeMap<String, Table>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(tables),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Load a store from a JSON snapshot, or start empty if the file is missing.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "no snapshot, starting empty");
            return Ok(Self::new());
        }
        let bytes = tokio::fs::read(path).await?;
        let tables: BTreeMap<String, Table> = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), tables = tables.len(), "snapshot loaded");
        Ok(Self::from_tables(tables))
    }

    /// Write all tables to a JSON snapshot.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), DbError> {
        let path = path.as_ref();
        let bytes = {
            let tables = self.inner.tables.read().await;
            serde_json::to_vec_pretty(&*tables)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Simulate losing the connection to the backend.
    ///
    /// While offline every call fails with [`DbError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), DbError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable);
        }
        Ok(())
    }

    /// Create a table if needed and register unique columns on it.
    pub async fn define_table(&self, table: &str, unique: &[&str]) -> Result<(), DbError> {
        self.ensure_online()?;
        let mut tables = self.inner.tables.write().await;
        let entry = tables.entry(table.to_string()).or_default();
        for column in unique {
            if !entry.unique.iter().any(|c| c == column) {
                entry.unique.push(column.to_string());
            }
        }
        Ok(())
    }

    /// Insert a record. Fails on a duplicate id or unique column value.
    pub async fn insert<T: Serialize>(&self, table: &str, record: &T) -> Result<(), DbError> {
        self.ensure_online()?;
        let row = Row::from_record(table, record)?;
        let mut tables = self.inner.tables.write().await;
        let entry = tables.entry(table.to_string()).or_default();
        entry.check_unique(table, &row, None)?;
        entry.rows.push(row);
        Ok(())
    }

    /// Fetch a record by id.
    pub async fn get<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>, DbError> {
        self.ensure_online()?;
        let tables = self.inner.tables.read().await;
        let row = tables
            .get(table)
            .and_then(|t| t.position(id).map(|i| &t.rows[i]));
        row.map(Row::deserialize).transpose()
    }

    /// Fetch all records matching a filter, in insertion order.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<Vec<T>, DbError> {
        self.ensure_online()?;
        let tables = self.inner.tables.read().await;
        match tables.get(table) {
            Some(t) => t
                .rows
                .iter()
                .filter(|r| filter.matches(r))
                .map(Row::deserialize)
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch the first record matching a filter.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<Option<T>, DbError> {
        self.ensure_online()?;
        let tables = self.inner.tables.read().await;
        let row = tables
            .get(table)
            .and_then(|t| t.rows.iter().find(|r| filter.matches(r)));
        row.map(Row::deserialize).transpose()
    }

    /// Count records matching a filter.
    pub async fn count(&self, table: &str, filter: &Filter) -> Result<usize, DbError> {
        self.ensure_online()?;
        let tables = self.inner.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| t.rows.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0))
    }

    /// Read, modify and write one record under the table lock.
    ///
    /// `f` may reject the change by returning an error, in which case
    /// nothing is written. Returns the record as stored.
    pub async fn update_one<T, E, F>(&self, table: &str, id: &str, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<DbError>,
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        self.ensure_online()?;
        let mut tables = self.inner.tables.write().await;
        let not_found = || DbError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        };
        let entry = tables.get_mut(table).ok_or_else(not_found)?;
        let index = entry.position(id).ok_or_else(not_found)?;

        let mut record: T = entry.rows[index].deserialize()?;
        f(&mut record)?;

        let row = Row::from_record(table, &record)?;
        entry.check_unique(table, &row, Some(index))?;
        entry.rows[index] = row;
        Ok(record)
    }

    /// Delete a record by id. Returns whether a row was removed.
    pub async fn delete(&self, table: &str, id: &str) -> Result<bool, DbError> {
        self.ensure_online()?;
        let mut tables = self.inner.tables.write().await;
        let Some(entry) = tables.get_mut(table) else {
            return Ok(false);
        };
        match entry.position(id) {
            Some(i) => {
                entry.rows.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every record matching a filter. Returns the number removed.
    pub async fn delete_where(&self, table: &str, filter: &Filter) -> Result<usize, DbError> {
        self.ensure_online()?;
        let mut tables = self.inner.tables.write().await;
        let Some(entry) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = entry.rows.len();
        entry.rows.retain(|r| !filter.matches(r));
        Ok(before - entry.rows.len())
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Slot {
        id: String,
        code: String,
        available: i64,
    }

    fn slot(id: &str, code: &str, available: i64) -> Slot {
        Slot {
            id: id.to_string(),
            code: code.to_string(),
            available,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Db::new();
        db.insert("slots", &slot("a", "A", 3)).await.unwrap();

        let found: Option<Slot> = db.get("slots", "a").await.unwrap();
        assert_eq!(found, Some(slot("a", "A", 3)));

        let missing: Option<Slot> = db.get("slots", "zz").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unique_violation() {
        let db = Db::new();
        db.define_table("slots", &["code"]).await.unwrap();
        db.insert("slots", &slot("a", "A", 1)).await.unwrap();

        let err = db.insert("slots", &slot("b", "A", 1)).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(err.code(), Some("23505"));

        let err = db.insert("slots", &slot("a", "B", 1)).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_one_rejects_without_writing() {
        let db = Db::new();
        db.insert("slots", &slot("a", "A", 1)).await.unwrap();

        let result: Result<Slot, DbError> = db
            .update_one("slots", "a", |s: &mut Slot| {
                s.available -= 5;
                if s.available < 0 {
                    return Err(DbError::Unavailable);
                }
                Ok(())
            })
            .await;
        assert!(result.is_err());

        let stored: Slot = db.get("slots", "a").await.unwrap().unwrap();
        assert_eq!(stored.available, 1);
    }

    #[tokio::test]
    async fn test_update_one_missing_row() {
        let db = Db::new();
        let result: Result<Slot, DbError> = db.update_one("slots", "nope", |_| Ok(())).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_select_and_delete_where() {
        let db = Db::new();
        db.insert("slots", &slot("a", "A", 0)).await.unwrap();
        db.insert("slots", &slot("b", "B", 2)).await.unwrap();
        db.insert("slots", &slot("c", "C", 0)).await.unwrap();

        let empty: Vec<Slot> = db
            .select("slots", &Filter::all().eq("available", 0))
            .await
            .unwrap();
        assert_eq!(empty.len(), 2);
        assert_eq!(empty[0].id, "a");

        let removed = db
            .delete_where("slots", &Filter::all().eq("available", 0))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(db.count("slots", &Filter::all()).await.unwrap(), 1);
        assert!(db.delete("slots", "b").await.unwrap());
        assert!(!db.delete("slots", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let db = Db::new();
        db.set_offline(true);
        let result: Result<Option<Slot>, DbError> = db.get("slots", "a").await;
        assert!(matches!(result, Err(DbError::Unavailable)));

        db.set_offline(false);
        let result: Option<Slot> = db.get("slots", "a").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_constraints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");

        let db = Db::new();
        db.define_table("slots", &["code"]).await.unwrap();
        db.insert("slots", &slot("a", "A", 4)).await.unwrap();
        db.save(&path).await.unwrap();

        let restored = Db::load(&path).await.unwrap();
        let found: Slot = restored.get("slots", "a").await.unwrap().unwrap();
        assert_eq!(found.available, 4);
        assert!(restored.insert("slots", &slot("b", "A", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_conditional_decrements_never_go_negative() {
        let db = Db::new();
        db.insert("slots", &slot("a", "A", 5)).await.unwrap();

        let attempts = (0..20).map(|_| {
            let db = db.clone();
            tokio::spawn(async move {
                db.update_one("slots", "a", |s: &mut Slot| {
                    if s.available < 1 {
                        return Err(DbError::Unavailable);
                    }
                    s.available -= 1;
                    Ok(())
                })
                .await
                .is_ok()
            })
        });
        let results = futures::future::join_all(attempts).await;
        let succeeded = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(succeeded, 5);
        let stored: Slot = db.get("slots", "a").await.unwrap().unwrap();
        assert_eq!(stored.available, 0);
    }
}
