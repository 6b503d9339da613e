use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use super::{CityStore, StoreError, StoreResult};
use crate::model::{CityId, CityRecord, WeatherSnapshot};

const SELECT_COLUMNS: &str = "SELECT id, name, icon, temperature, weather FROM cities";

/// SQLite-backed city store.
///
/// One connection guarded by a mutex, so every operation is serialized.
/// `name` carries a UNIQUE constraint as a second guard on top of the
/// store's own checks.
pub struct SqliteCityStore {
    conn: Mutex<Connection>,
}

impl SqliteCityStore {
    /// Open or create the database, creating parent directories as needed.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cities database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        // AUTOINCREMENT keeps deleted ids from being handed out again.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                icon TEXT,
                temperature REAL,
                weather TEXT
            );",
        )
        .context("Failed to initialize cities schema")?;
        Ok(())
    }

    fn row_to_city(row: &rusqlite::Row) -> rusqlite::Result<CityRecord> {
        Ok(CityRecord {
            id: CityId(row.get(0)?),
            name: row.get(1)?,
            icon_code: row.get(2)?,
            temperature: row.get(3)?,
            condition: row.get(4)?,
        })
    }

    fn select_by_id(conn: &Connection, id: CityId) -> StoreResult<CityRecord> {
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id.0], Self::row_to_city)
            .optional()
            .map_err(storage)?
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))
    }
}

fn storage(err: rusqlite::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn write_error(err: rusqlite::Error, name: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::DuplicateName(name.to_string())
    } else {
        storage(err)
    }
}

impl CityStore for SqliteCityStore {
    fn insert(&self, name: &str) -> StoreResult<CityRecord> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO cities (name) VALUES (?1)", params![name])
            .map_err(|e| write_error(e, name))?;

        Ok(CityRecord::new(CityId(conn.last_insert_rowid()), name))
    }

    fn get_by_name(&self, name: &str) -> StoreResult<CityRecord> {
        let conn = self.conn.lock();
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE name = ?1"), params![name], Self::row_to_city)
            .optional()
            .map_err(storage)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn get_by_id(&self, id: CityId) -> StoreResult<CityRecord> {
        let conn = self.conn.lock();
        Self::select_by_id(&conn, id)
    }

    fn get_all(&self) -> StoreResult<Vec<CityRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id")).map_err(storage)?;

        let rows = stmt.query_map([], Self::row_to_city).map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn update(&self, record: &CityRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE cities SET name = ?1, icon = ?2, temperature = ?3, weather = ?4 WHERE id = ?5",
                params![
                    record.name,
                    record.icon_code,
                    record.temperature,
                    record.condition,
                    record.id.0
                ],
            )
            .map_err(|e| write_error(e, &record.name))?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("id {}", record.id)));
        }
        Ok(())
    }

    fn delete(&self, id: CityId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed =
            conn.execute("DELETE FROM cities WHERE id = ?1", params![id.0]).map_err(storage)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("id {id}")));
        }
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0)).map_err(storage)?;
        Ok(count as usize)
    }

    fn apply_snapshot(&self, id: CityId, snapshot: &WeatherSnapshot) -> StoreResult<CityRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage)?;

        let changed = tx
            .execute(
                "UPDATE cities SET icon = ?1, temperature = ?2, weather = ?3 WHERE id = ?4",
                params![snapshot.icon_code, snapshot.temperature, snapshot.condition, id.0],
            )
            .map_err(storage)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("id {id}")));
        }

        let record = Self::select_by_id(&tx, id)?;
        tx.commit().map_err(storage)?;
        Ok(record)
    }
}
