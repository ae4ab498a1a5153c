// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Persistence seam.
//!
//! The core never talks to a database itself; it reads the learned set once
//! at startup and writes one record per learn-in / learn-out through this
//! trait. `evdc-persistence` provides the SQLite implementation;
//! [`MemoryStore`] backs tests and ephemeral runs.

use crate::eep::Manufacturer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// One row of the learned-device table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: u32,
    pub subdevice: u8,
    /// Packed profile word including the variant byte.
    pub profile: u32,
    pub manufacturer: Manufacturer,
}

/// Persistence failure, opaque to the core.
#[derive(Debug)]
pub struct StoreError(pub String);

impl StoreError {
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Key/value-with-schema persistence collaborator.
pub trait DeviceStore: Send {
    /// All learned devices, in any order.
    fn load_all(&self) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Insert or replace one record.
    fn save(&self, record: &DeviceRecord) -> Result<(), StoreError>;

    /// Remove one (address, subdevice) record; absent records are fine.
    fn remove(&self, address: u32, subdevice: u8) -> Result<(), StoreError>;

    /// Remove every record of one physical address.
    fn remove_address(&self, address: u32) -> Result<(), StoreError>;
}

/// In-memory store for tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(u32, u8), DeviceRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .map_err(|e| StoreError::new(e.to_string()))?
            .values()
            .copied()
            .collect())
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::new(e.to_string()))?
            .insert((record.address, record.subdevice), *record);
        Ok(())
    }

    fn remove(&self, address: u32, subdevice: u8) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::new(e.to_string()))?
            .remove(&(address, subdevice));
        Ok(())
    }

    fn remove_address(&self, address: u32) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::new(e.to_string()))?
            .retain(|(a, _), _| *a != address);
        Ok(())
    }
}
