// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Descriptor-driven sensor codec.
//!
//! Most 4BS profiles decompose into independent bit-fields, each feeding one
//! sensor or binary input. A [`SensorDescriptor`] names such a field: which
//! profile and subdevice it belongs to, where the bits live, how to scale
//! them and which behaviour receives the result. The static table in
//! [`super::table`] is scanned linearly; rows are grouped by
//! (variant, func, type, subdevice) so one telegram can fill several
//! channels at once.
//!
//! Bit positions use the EnOcean DB numbering: `DB(3,7)` is bit 7 of the
//! first user data byte on the wire, `DB(0,0)` is bit 0 of the last.

use crate::behaviour::{
    BinaryInputBehaviour, BinaryInputType, DsGroup, SensorBehaviour, SensorType, UsageHint,
};
use std::time::Instant;

/// Bit index in DB numbering: `db(1, 7)` = bit 7 of DB1.
#[must_use]
pub const fn db(byte: u8, bit: u8) -> u8 {
    byte * 8 + bit
}

/// Which behaviour a descriptor row feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BehaviourKind {
    Sensor(SensorType),
    Input(BinaryInputType),
}

/// How the raw bit-field is turned into a behaviour update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extractor {
    /// Linear scale from the extracted integer.
    StdSensor,
    /// Bitwise-invert the extracted integer in its field width first
    /// (EEP convention for most temperature scales).
    InvSensor,
    /// Single bit to binary input; `min`/`max` encode the polarity.
    StdInput,
    /// Dual-range illumination (A5-06-01/02): a select bit picks the
    /// fine-range byte (used as-is) or the coarse-range byte (doubled).
    Illumination,
    /// Power/energy meter (A5-12-01): 24-bit magnitude, divisor bits and a
    /// kind bit that must match the behaviour's sensor type.
    PowerMeter,
    /// Non-linear fan speed scale (A5-10-01..09).
    FanSpeed,
}

/// One immutable row of the sensor table.
#[derive(Clone, Copy, Debug)]
pub struct SensorDescriptor {
    pub variant: u8,
    pub func: u8,
    pub eep_type: u8,
    pub subdevice: u8,
    pub primary_group: DsGroup,
    pub channel_group: DsGroup,
    pub kind: BehaviourKind,
    pub usage: UsageHint,
    pub min: f64,
    pub max: f64,
    pub ms_bit: u8,
    pub ls_bit: u8,
    /// Normal update interval in seconds.
    pub update_interval_s: u32,
    /// Maximum interval between reports before the sensor counts as absent.
    pub alive_sign_interval_s: u32,
    pub extractor: Extractor,
    pub label: &'static str,
    pub unit: &'static str,
}

impl SensorDescriptor {
    /// Field width in bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        u32::from(self.ms_bit - self.ls_bit) + 1
    }

    /// Physical units per LSB.
    #[must_use]
    pub fn resolution(&self) -> f64 {
        (self.max - self.min) / ((1u64 << self.bits()) - 1) as f64
    }
}

/// Extract bits `ms_bit..=ls_bit` (DB numbering, MSB first on the wire)
/// from a user data slice. Fields outside the data yield 0.
#[must_use]
pub fn extract_bits(ms_bit: u8, ls_bit: u8, data: &[u8]) -> u64 {
    let size = data.len();
    let Some(ms_byte) = size.checked_sub(1 + usize::from(ms_bit >> 3)) else {
        return 0;
    };
    let Some(ls_byte) = size.checked_sub(1 + usize::from(ls_bit >> 3)) else {
        return 0;
    };
    if ms_byte > ls_byte {
        return 0;
    }
    let mut value = u64::from(data[ms_byte]) & ((1u64 << (u32::from(ms_bit & 7) + 1)) - 1);
    for &byte in &data[ms_byte + 1..=ls_byte] {
        value = (value << 8) | u64::from(byte);
    }
    value >> (ls_bit & 7)
}

/// The mutable side of a descriptor row: the behaviour it feeds.
pub enum BehaviourSlot {
    Sensor(SensorBehaviour),
    Input(BinaryInputBehaviour),
}

/// Build the behaviour a descriptor row describes.
#[must_use]
pub fn make_slot(descriptor: &SensorDescriptor, link: crate::behaviour::UpstreamLink) -> BehaviourSlot {
    use std::time::Duration;
    match descriptor.kind {
        BehaviourKind::Sensor(sensor_type) => BehaviourSlot::Sensor(SensorBehaviour::new(
            sensor_type,
            descriptor.usage,
            descriptor.channel_group,
            descriptor.min,
            descriptor.max,
            descriptor.resolution(),
            Duration::from_secs(u64::from(descriptor.update_interval_s)),
            Duration::from_secs(u64::from(descriptor.alive_sign_interval_s)),
            link,
        )),
        BehaviourKind::Input(input_type) => BehaviourSlot::Input(BinaryInputBehaviour::new(
            input_type,
            descriptor.usage,
            descriptor.channel_group,
            link,
        )),
    }
}

/// Run a descriptor's extractor over one telegram's user data.
pub fn apply_extractor(
    descriptor: &SensorDescriptor,
    slot: &mut BehaviourSlot,
    data: &[u8],
    now: Instant,
) {
    match (descriptor.extractor, slot) {
        (Extractor::StdSensor, BehaviourSlot::Sensor(sensor)) => {
            sensor.update_engineering_value(extract_bits(descriptor.ms_bit, descriptor.ls_bit, data), now);
        }
        (Extractor::InvSensor, BehaviourSlot::Sensor(sensor)) => {
            let raw = extract_bits(descriptor.ms_bit, descriptor.ls_bit, data);
            let mask = (1u64 << descriptor.bits()) - 1;
            sensor.update_engineering_value(raw ^ mask, now);
        }
        (Extractor::StdInput, BehaviourSlot::Input(input)) => {
            let Some(byte) = data.len().checked_sub(1 + usize::from(descriptor.ls_bit >> 3))
            else {
                return;
            };
            let bit = (data[byte] >> (descriptor.ls_bit & 7)) & 0x01;
            // min/max encode the reported polarity
            let state = if bit != 0 {
                descriptor.max != 0.0
            } else {
                descriptor.min != 0.0
            };
            input.update_state(state, now);
        }
        (Extractor::Illumination, BehaviourSlot::Sensor(sensor)) => {
            if data.len() < 4 {
                return;
            }
            // DB0.0 selects the range: set = fine-range byte as-is,
            // cleared = coarse-range byte doubled into the 9-bit scale
            let value = if data[3] & 0x01 != 0 {
                u64::from(data[2])
            } else {
                u64::from(data[1]) << 1
            };
            sensor.update_engineering_value(value, now);
        }
        (Extractor::PowerMeter, BehaviourSlot::Sensor(sensor)) => {
            if data.len() < 4 {
                return;
            }
            let raw = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
            let divisor = match data[3] & 0x03 {
                1 => 10.0,
                2 => 100.0,
                3 => 1000.0,
                _ => 1.0,
            };
            // DB0.2 picks the reported quantity; only the matching sibling
            // behaviour publishes
            let is_power = data[3] & 0x04 != 0;
            let matches = matches!(
                (is_power, sensor.sensor_type),
                (true, SensorType::Power) | (false, SensorType::Energy)
            );
            if matches {
                sensor.update_value(f64::from(raw) / divisor, now);
            }
        }
        (Extractor::FanSpeed, BehaviourSlot::Sensor(sensor)) => {
            let raw = extract_bits(descriptor.ms_bit, descriptor.ls_bit, data);
            // 255..210 auto, 209..190 off, 189..165 stage 1,
            // 164..145 stage 2, 144..0 full speed
            let speed = if raw >= 210 {
                -1.0
            } else if raw >= 190 {
                0.0
            } else if raw >= 165 {
                1.0 / 3.0
            } else if raw >= 145 {
                2.0 / 3.0
            } else {
                1.0
            };
            sensor.update_value(speed, now);
        }
        _ => {
            log::debug!(
                "[handlers] descriptor '{}' paired with wrong behaviour kind",
                descriptor.label
            );
        }
    }
}

// label/unit texts shared by the table rows
pub const TEMP_TEXT: &str = "Temperature";
pub const TEMP_SETPOINT_TEXT: &str = "Temperature Set Point";
pub const TEMP_UNIT: &str = "°C";
pub const HUM_TEXT: &str = "Humidity";
pub const HUM_UNIT: &str = "%";
pub const ILLUM_TEXT: &str = "Illumination";
pub const ILLUM_UNIT: &str = "lx";
pub const OCCUP_TEXT: &str = "Occupancy";
pub const MOTION_TEXT: &str = "Motion";
pub const UNITY_UNIT: &str = "units";
pub const BINARY_UNIT: &str = "";
pub const SETPOINT_TEXT: &str = "Set Point";
pub const FAN_SPEED_TEXT: &str = "Fan Speed";
pub const DAY_NIGHT_TEXT: &str = "Day/Night";
pub const CONTACT_TEXT: &str = "Contact";
