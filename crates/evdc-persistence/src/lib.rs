// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! SQLite-backed learned-device store.
//!
//! Implements [`evdc::device::DeviceStore`] over one small database:
//!
//! ```sql
//! CREATE TABLE globs (
//!     schemaVersion INTEGER
//! );
//! CREATE TABLE knownDevices (
//!     enoceanAddress INTEGER,
//!     subdevice INTEGER,
//!     eeProfile INTEGER,
//!     eeManufacturer INTEGER,
//!     PRIMARY KEY (enoceanAddress, subdevice)
//! );
//! ```
//!
//! Databases from older deployments migrate forward on open; anything
//! older than [`SCHEMA_MIN_VERSION`] is rejected.

mod sqlite;

pub use sqlite::SqliteDeviceStore;

/// Current schema version written into `globs`.
pub const SCHEMA_VERSION: i64 = 4;

/// Minimally supported version; anything older cannot be migrated.
pub const SCHEMA_MIN_VERSION: i64 = 1;
