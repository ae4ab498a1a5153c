// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! SQLite store implementation.
//!
//! Thread-safe via an internal mutex (a SQLite `Connection` is not `Sync`).
//! Writes happen synchronously on the engine thread during learn-in
//! handling, which is rare enough not to matter.

use crate::{SCHEMA_MIN_VERSION, SCHEMA_VERSION};
use anyhow::{bail, Context, Result};
use evdc::device::{DeviceRecord, DeviceStore, StoreError};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// The SQLite-backed [`DeviceStore`].
pub struct SqliteDeviceStore {
    conn: Mutex<Connection>,
}

impl SqliteDeviceStore {
    /// Open (or create) the database at `path` and migrate it forward.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("cannot open device database at {}", path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("cannot create in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        let version = schema_version(&conn)?;
        match version {
            None => {
                tracing::info!("creating device database schema v{}", SCHEMA_VERSION);
                conn.execute_batch(
                    "CREATE TABLE globs (schemaVersion INTEGER);
                     CREATE TABLE knownDevices (
                         enoceanAddress INTEGER,
                         subdevice INTEGER,
                         eeProfile INTEGER,
                         eeManufacturer INTEGER,
                         PRIMARY KEY (enoceanAddress, subdevice)
                     );",
                )?;
                conn.execute("INSERT INTO globs (schemaVersion) VALUES (?1)", [SCHEMA_VERSION])?;
            }
            Some(version) if version < SCHEMA_MIN_VERSION => {
                bail!("device database schema v{} is too old to migrate", version);
            }
            Some(mut version) => {
                while version < SCHEMA_VERSION {
                    version = migrate_step(&conn, version)?;
                    conn.execute("UPDATE globs SET schemaVersion = ?1", [version])?;
                    tracing::info!("migrated device database to schema v{}", version);
                }
            }
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // a poisoned lock means another thread died mid-statement; the
        // connection itself stays usable
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn schema_version(conn: &Connection) -> Result<Option<i64>> {
    let globs_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='globs')",
        [],
        |row| row.get(0),
    )?;
    if !globs_exists {
        return Ok(None);
    }
    let version = conn
        .query_row("SELECT schemaVersion FROM globs", [], |row| row.get(0))
        .context("globs table has no schemaVersion row")?;
    Ok(Some(version))
}

/// One forward migration step; returns the version reached.
fn migrate_step(conn: &Connection, from: i64) -> Result<i64> {
    match from {
        1 => {
            // v1 -> v2: profile and manufacturer columns added
            conn.execute_batch(
                "ALTER TABLE knownDevices ADD eeProfile INTEGER;
                 ALTER TABLE knownDevices ADD eeManufacturer INTEGER;",
            )?;
            Ok(2)
        }
        2 => {
            // v2 -> v3: channel column added (obsolete but SQLite cannot
            // drop columns; harmless to keep on old databases)
            conn.execute_batch("ALTER TABLE knownDevices ADD channel INTEGER;")?;
            Ok(3)
        }
        3 => {
            // v3 -> v4: subdevice column replaces channel
            conn.execute_batch("ALTER TABLE knownDevices ADD subdevice INTEGER;")?;
            Ok(4)
        }
        other => bail!("no migration path from schema v{}", other),
    }
}

fn store_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::new(e.to_string())
}

impl DeviceStore for SqliteDeviceStore {
    fn load_all(&self) -> std::result::Result<Vec<DeviceRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT enoceanAddress, subdevice, eeProfile, eeManufacturer FROM knownDevices",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DeviceRecord {
                    address: row.get::<_, i64>(0)? as u32,
                    subdevice: row.get::<_, i64>(1)? as u8,
                    profile: row.get::<_, i64>(2)? as u32,
                    manufacturer: row.get::<_, i64>(3)? as u16,
                })
            })
            .map_err(store_err)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(store_err)?);
        }
        tracing::debug!("loaded {} device records", records.len());
        Ok(records)
    }

    fn save(&self, record: &DeviceRecord) -> std::result::Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO knownDevices
                 (enoceanAddress, subdevice, eeProfile, eeManufacturer)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    i64::from(record.address),
                    i64::from(record.subdevice),
                    i64::from(record.profile),
                    i64::from(record.manufacturer),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn remove(&self, address: u32, subdevice: u8) -> std::result::Result<(), StoreError> {
        self.lock()
            .execute(
                "DELETE FROM knownDevices WHERE enoceanAddress = ?1 AND subdevice = ?2",
                params![i64::from(address), i64::from(subdevice)],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn remove_address(&self, address: u32) -> std::result::Result<(), StoreError> {
        self.lock()
            .execute(
                "DELETE FROM knownDevices WHERE enoceanAddress = ?1",
                params![i64::from(address)],
            )
            .map_err(store_err)?;
        Ok(())
    }
}
