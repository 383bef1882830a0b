use crate::config::StubConfig;
use crate::StubError;
use axterdb_core::{Row, RowValues, TableSchema};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What a key is allowed to do
#[derive(Debug, Clone, Default)]
pub struct KeyRecord {
    pub name: String,
    pub admin: bool,
    pub databases: Vec<String>,
}

struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
}

impl Table {
    fn check_columns(&self, row: &Row) -> Result<(), StubError> {
        match row.iter().find(|(column, _)| self.schema.get(column).is_none()) {
            Some((column, _)) => Err(StubError::UnknownColumn(column.to_string())),
            None => Ok(()),
        }
    }

    fn values(&self, row: &Row) -> RowValues {
        self.schema
            .columns()
            .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Filters are equality conditions; a missing value compares as null
fn row_matches(row: &Row, filters: &Row) -> bool {
    filters
        .iter()
        .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
}

#[derive(Default)]
struct Registry {
    keys: HashMap<String, KeyRecord>,
    databases: HashMap<String, BTreeMap<String, Table>>,
}

impl Registry {
    fn tables(&mut self, db: &str) -> &mut BTreeMap<String, Table> {
        self.databases.entry(db.to_string()).or_default()
    }

    fn table(&mut self, db: &str, table: &str) -> Result<&mut Table, StubError> {
        self.tables(db)
            .get_mut(table)
            .ok_or_else(|| StubError::TableNotFound(table.to_string()))
    }
}

/// In-memory state of the stub instance.
///
/// Also counts every request it serves and can be told to answer a path with
/// a fixed status, so tests can observe and steer the client.
#[derive(Default)]
pub struct StubState {
    registry: Mutex<Registry>,
    forced: Mutex<HashMap<String, u16>>,
    requests: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StubConfig) -> Self {
        let state = Self::new();
        for seed in &config.keys {
            state.add_key(
                &seed.key,
                KeyRecord {
                    name: seed.name.clone(),
                    admin: seed.admin,
                    databases: seed.databases.clone(),
                },
            );
        }
        state
    }

    /// Builder-style key registration
    pub fn with_key(self, key: impl Into<String>, record: KeyRecord) -> Self {
        self.add_key(&key.into(), record);
        self
    }

    pub fn add_key(&self, key: &str, record: KeyRecord) {
        lock(&self.registry).keys.insert(key.to_string(), record);
    }

    /// Answer every request for `path` with `status` until cleared
    pub fn force_status(&self, path: &str, status: u16) {
        lock(&self.forced).insert(path.to_string(), status);
    }

    pub fn clear_forced(&self) {
        lock(&self.forced).clear();
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Count a request and report the status forced for its path, if any
    pub fn record_request(&self, path: &str) -> Option<u16> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        lock(&self.forced).get(path).copied()
    }

    pub fn identify(&self, key: &str) -> Result<KeyRecord, StubError> {
        lock(&self.registry)
            .keys
            .get(key)
            .cloned()
            .ok_or(StubError::Unauthorized)
    }

    pub fn authorize(&self, key: &str, db: &str) -> Result<KeyRecord, StubError> {
        let record = self.identify(key)?;
        if record.databases.iter().any(|name| name == db) {
            Ok(record)
        } else {
            Err(StubError::Unauthorized)
        }
    }

    pub fn authorize_admin(&self, key: &str) -> Result<KeyRecord, StubError> {
        let record = self.identify(key)?;
        if record.admin {
            Ok(record)
        } else {
            Err(StubError::Unauthorized)
        }
    }

    pub fn create_table(&self, db: &str, table: &str, schema: TableSchema) -> Result<(), StubError> {
        let mut registry = lock(&self.registry);
        let tables = registry.tables(db);
        if tables.contains_key(table) {
            return Err(StubError::TableExists(table.to_string()));
        }
        tables.insert(
            table.to_string(),
            Table {
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn insert(&self, db: &str, table: &str, row: Row) -> Result<(), StubError> {
        let mut registry = lock(&self.registry);
        let table = registry.table(db, table)?;
        table.check_columns(&row)?;

        for (column, value) in row.iter() {
            let admitted = table
                .schema
                .get(column)
                .is_some_and(|column_type| column_type.admits(value));
            if !admitted {
                return Err(StubError::TypeMismatch {
                    column: column.to_string(),
                    value: value.clone(),
                });
            }
        }

        table.rows.push(row);
        Ok(())
    }

    pub fn select(
        &self,
        db: &str,
        table: &str,
        filters: &Row,
        amount: Option<usize>,
    ) -> Result<Vec<RowValues>, StubError> {
        let mut registry = lock(&self.registry);
        let table = registry.table(db, table)?;
        table.check_columns(filters)?;

        Ok(table
            .rows
            .iter()
            .filter(|row| row_matches(row, filters))
            .take(amount.unwrap_or(usize::MAX))
            .map(|row| table.values(row))
            .collect())
    }

    /// Remove matching rows, returning how many were removed
    pub fn delete(&self, db: &str, table: &str, filters: &Row) -> Result<usize, StubError> {
        let mut registry = lock(&self.registry);
        let table = registry.table(db, table)?;
        table.check_columns(filters)?;

        let before = table.rows.len();
        table.rows.retain(|row| !row_matches(row, filters));
        Ok(before - table.rows.len())
    }

    pub fn delete_table(&self, db: &str, table: &str) -> Result<(), StubError> {
        lock(&self.registry)
            .tables(db)
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StubError::TableNotFound(table.to_string()))
    }

    pub fn list_tables(&self, db: &str) -> Vec<String> {
        lock(&self.registry).tables(db).keys().cloned().collect()
    }

    pub fn table_exists(&self, db: &str, table: &str) -> bool {
        lock(&self.registry).tables(db).contains_key(table)
    }

    /// Generate a key for a new user with the creator's databases
    pub fn create_key(&self, creator: &KeyRecord, name: &str, admin: bool) -> String {
        let key = uuid::Uuid::new_v4().simple().to_string();
        self.add_key(
            &key,
            KeyRecord {
                name: name.to_string(),
                admin,
                databases: creator.databases.clone(),
            },
        );
        key
    }

    pub fn delete_key(&self, key: &str) -> Result<(), StubError> {
        lock(&self.registry)
            .keys
            .remove(key)
            .map(|_| ())
            .ok_or(StubError::UnknownKey)
    }
}
