// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Static 4BS sensor table.
//!
//! One row per channel; rows sharing (variant, func, type, subdevice) form
//! one logical device. The table is only ever scanned linearly.

use super::descriptor::*;
use crate::behaviour::{BinaryInputType, DsGroup, SensorType, UsageHint};

const fn sensor_row(
    variant: u8,
    func: u8,
    eep_type: u8,
    channel_group: DsGroup,
    sensor_type: SensorType,
    usage: UsageHint,
    min: f64,
    max: f64,
    ms_bit: u8,
    ls_bit: u8,
    extractor: Extractor,
    label: &'static str,
    unit: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        variant,
        func,
        eep_type,
        subdevice: 0,
        primary_group: DsGroup::BlueHeating,
        channel_group,
        kind: BehaviourKind::Sensor(sensor_type),
        usage,
        min,
        max,
        ms_bit,
        ls_bit,
        update_interval_s: 100,
        alive_sign_interval_s: 40 * 60,
        extractor,
        label,
        unit,
    }
}

const fn input_row(
    variant: u8,
    func: u8,
    eep_type: u8,
    channel_group: DsGroup,
    input_type: BinaryInputType,
    usage: UsageHint,
    min: f64,
    max: f64,
    bit: u8,
    label: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        variant,
        func,
        eep_type,
        subdevice: 0,
        primary_group: DsGroup::BlueHeating,
        channel_group,
        kind: BehaviourKind::Input(input_type),
        usage,
        min,
        max,
        ms_bit: bit,
        ls_bit: bit,
        update_interval_s: 100,
        alive_sign_interval_s: 40 * 60,
        extractor: Extractor::StdInput,
        label,
        unit: BINARY_UNIT,
    }
}

/// Shorthand for the ubiquitous inverted 8-bit temperature in DB1.
const fn temp_row(eep_type: u8, usage: UsageHint, min: f64, max: f64) -> SensorDescriptor {
    sensor_row(
        0,
        0x02,
        eep_type,
        DsGroup::BlueHeating,
        SensorType::Temperature,
        usage,
        min,
        max,
        db(1, 7),
        db(1, 0),
        Extractor::InvSensor,
        TEMP_TEXT,
        TEMP_UNIT,
    )
}

/// Room-panel temperature (0..40 degrees, inverted, DB1).
const fn panel_temp(eep_type: u8) -> SensorDescriptor {
    sensor_row(
        0,
        0x10,
        eep_type,
        DsGroup::BlueHeating,
        SensorType::Temperature,
        UsageHint::Room,
        0.0,
        40.0,
        db(1, 7),
        db(1, 0),
        Extractor::InvSensor,
        TEMP_TEXT,
        TEMP_UNIT,
    )
}

/// Room-panel normalised set point (DB2).
const fn panel_setpoint(eep_type: u8) -> SensorDescriptor {
    sensor_row(
        0,
        0x10,
        eep_type,
        DsGroup::BlueHeating,
        SensorType::SetPoint,
        UsageHint::User,
        0.0,
        1.0,
        db(2, 7),
        db(2, 0),
        Extractor::StdSensor,
        SETPOINT_TEXT,
        UNITY_UNIT,
    )
}

/// Room-panel fan speed (DB3, stepped scale).
const fn panel_fan(eep_type: u8) -> SensorDescriptor {
    sensor_row(
        0,
        0x10,
        eep_type,
        DsGroup::BlueHeating,
        SensorType::FanSpeed,
        UsageHint::Room,
        -1.0,
        1.0,
        db(3, 7),
        db(3, 0),
        Extractor::FanSpeed,
        FAN_SPEED_TEXT,
        UNITY_UNIT,
    )
}

/// Room-panel occupancy button (DB0.0, active low).
const fn panel_occupancy(eep_type: u8) -> SensorDescriptor {
    input_row(
        0,
        0x10,
        eep_type,
        DsGroup::BlackJoker,
        BinaryInputType::Presence,
        UsageHint::User,
        1.0,
        0.0,
        db(0, 0),
        OCCUP_TEXT,
    )
}

/// Room-panel day/night control (DB0.0).
const fn panel_day_night(eep_type: u8) -> SensorDescriptor {
    input_row(
        0,
        0x10,
        eep_type,
        DsGroup::BlueHeating,
        BinaryInputType::DayNight,
        UsageHint::User,
        0.0,
        1.0,
        db(0, 0),
        DAY_NIGHT_TEXT,
    )
}

/// The 4BS table. Terminating sentinel not needed; slices know their length.
pub static FOURBS_DESCRIPTORS: &[SensorDescriptor] = &[
    // A5-02-xx temperature sensors, 40 degree ranges
    temp_row(0x01, UsageHint::Undefined, -40.0, 0.0),
    temp_row(0x02, UsageHint::Undefined, -30.0, 10.0),
    temp_row(0x03, UsageHint::Undefined, -20.0, 20.0),
    temp_row(0x04, UsageHint::Room, -10.0, 30.0),
    temp_row(0x05, UsageHint::Room, 0.0, 40.0),
    temp_row(0x06, UsageHint::Undefined, 10.0, 50.0),
    temp_row(0x07, UsageHint::Undefined, 20.0, 60.0),
    temp_row(0x08, UsageHint::Undefined, 30.0, 70.0),
    temp_row(0x09, UsageHint::Undefined, 40.0, 80.0),
    temp_row(0x0A, UsageHint::Undefined, 50.0, 90.0),
    temp_row(0x0B, UsageHint::Undefined, 60.0, 100.0),
    // - 80 degree ranges
    temp_row(0x10, UsageHint::Undefined, -60.0, 20.0),
    temp_row(0x11, UsageHint::Undefined, -50.0, 30.0),
    temp_row(0x12, UsageHint::Undefined, -40.0, 40.0),
    temp_row(0x13, UsageHint::Undefined, -30.0, 50.0),
    temp_row(0x14, UsageHint::Undefined, -20.0, 60.0),
    temp_row(0x15, UsageHint::Room, -10.0, 70.0),
    temp_row(0x16, UsageHint::Room, 0.0, 80.0),
    temp_row(0x17, UsageHint::Undefined, 10.0, 90.0),
    temp_row(0x18, UsageHint::Undefined, 20.0, 100.0),
    temp_row(0x19, UsageHint::Undefined, 30.0, 110.0),
    temp_row(0x1A, UsageHint::Undefined, 40.0, 120.0),
    temp_row(0x1B, UsageHint::Undefined, 50.0, 130.0),
    // - 10 bit ranges
    sensor_row(0, 0x02, 0x20, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        -10.0, 41.2, db(2, 1), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x02, 0x30, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Undefined,
        -40.0, 62.3, db(2, 1), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    // A5-04-xx temperature and humidity
    sensor_row(0, 0x04, 0x01, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x04, 0x01, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x04, 0x02, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Outdoors,
        -20.0, 61.6, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x04, 0x02, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Outdoors,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    // A5-06-xx light sensors (01/02 use the dual-range select bit)
    sensor_row(0, 0x06, 0x01, DsGroup::YellowLight, SensorType::Illumination, UsageHint::Outdoors,
        600.0, 60000.0, db(2, 0), db(1, 0), Extractor::Illumination, ILLUM_TEXT, ILLUM_UNIT),
    sensor_row(0, 0x06, 0x02, DsGroup::YellowLight, SensorType::Illumination, UsageHint::Room,
        0.0, 1024.0, db(2, 0), db(1, 0), Extractor::Illumination, ILLUM_TEXT, ILLUM_UNIT),
    sensor_row(0, 0x06, 0x03, DsGroup::YellowLight, SensorType::Illumination, UsageHint::Room,
        0.0, 1024.0, db(2, 7), db(1, 6), Extractor::StdSensor, ILLUM_TEXT, ILLUM_UNIT),
    // A5-07-xx occupancy sensors
    input_row(0, 0x07, 0x01, DsGroup::BlackJoker, BinaryInputType::Motion, UsageHint::Room,
        0.0, 1.0, db(1, 7), MOTION_TEXT),
    input_row(0, 0x07, 0x02, DsGroup::BlackJoker, BinaryInputType::Motion, UsageHint::Room,
        0.0, 1.0, db(0, 7), MOTION_TEXT),
    input_row(0, 0x07, 0x03, DsGroup::BlackJoker, BinaryInputType::Motion, UsageHint::Room,
        0.0, 1.0, db(0, 7), MOTION_TEXT),
    sensor_row(0, 0x07, 0x03, DsGroup::YellowLight, SensorType::Illumination, UsageHint::Room,
        0.0, 1024.0, db(2, 7), db(1, 6), Extractor::StdSensor, ILLUM_TEXT, ILLUM_UNIT),
    // A5-08-01 light, temperature and occupancy
    sensor_row(0, 0x08, 0x01, DsGroup::YellowLight, SensorType::Illumination, UsageHint::Room,
        0.0, 510.0, db(2, 7), db(2, 0), Extractor::StdSensor, ILLUM_TEXT, ILLUM_UNIT),
    sensor_row(0, 0x08, 0x01, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 51.0, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    input_row(0, 0x08, 0x01, DsGroup::BlackJoker, BinaryInputType::Motion, UsageHint::Room,
        1.0, 0.0, db(0, 1), MOTION_TEXT),
    input_row(0, 0x08, 0x01, DsGroup::BlackJoker, BinaryInputType::Presence, UsageHint::User,
        1.0, 0.0, db(0, 0), OCCUP_TEXT),
    // A5-10-01..0D room control panels
    panel_temp(0x01), panel_setpoint(0x01), panel_fan(0x01), panel_occupancy(0x01),
    panel_temp(0x02), panel_setpoint(0x02), panel_fan(0x02), panel_day_night(0x02),
    panel_temp(0x03), panel_setpoint(0x03),
    panel_temp(0x04), panel_setpoint(0x04), panel_fan(0x04),
    panel_temp(0x05), panel_setpoint(0x05), panel_occupancy(0x05),
    panel_temp(0x06), panel_setpoint(0x06), panel_day_night(0x06),
    // A5-10-06 variant 1: set point scaled as 0..40 degrees (e.g. FTR55D)
    sensor_row(1, 0x10, 0x06, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.0, db(1, 7), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(1, 0x10, 0x06, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::User,
        0.0, 40.0, db(2, 7), db(2, 0), Extractor::StdSensor, TEMP_SETPOINT_TEXT, TEMP_UNIT),
    input_row(1, 0x10, 0x06, DsGroup::BlueHeating, BinaryInputType::DayNight, UsageHint::User,
        0.0, 1.0, db(0, 0), DAY_NIGHT_TEXT),
    panel_temp(0x07), panel_fan(0x07),
    panel_temp(0x08), panel_fan(0x08), panel_occupancy(0x08),
    panel_temp(0x09), panel_fan(0x09), panel_day_night(0x09),
    panel_temp(0x0A), panel_setpoint(0x0A),
    input_row(0, 0x10, 0x0A, DsGroup::BlackJoker, BinaryInputType::Contact, UsageHint::User,
        1.0, 0.0, db(0, 0), CONTACT_TEXT),
    panel_temp(0x0B),
    input_row(0, 0x10, 0x0B, DsGroup::BlackJoker, BinaryInputType::Contact, UsageHint::User,
        1.0, 0.0, db(0, 0), CONTACT_TEXT),
    panel_temp(0x0C), panel_occupancy(0x0C),
    panel_temp(0x0D), panel_day_night(0x0D),
    // A5-10-10..14 panels with humidity (non-inverted 8-bit temperature)
    sensor_row(0, 0x10, 0x10, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(3, 7), db(3, 0), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x10, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x10, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    panel_occupancy(0x10),
    sensor_row(0, 0x10, 0x11, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(3, 7), db(3, 0), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x11, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x11, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    panel_day_night(0x11),
    sensor_row(0, 0x10, 0x12, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(3, 7), db(3, 0), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x12, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x12, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x10, 0x13, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x13, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    panel_occupancy(0x13),
    sensor_row(0, 0x10, 0x14, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x14, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    panel_day_night(0x14),
    // A5-10-15..17 panels with 10-bit temperature
    sensor_row(0, 0x10, 0x15, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        -10.0, 41.2, db(2, 1), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x10, 0x15, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(2, 7), db(2, 2), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x16, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        -10.0, 41.2, db(2, 1), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x10, 0x16, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(2, 7), db(2, 2), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    panel_occupancy(0x16),
    sensor_row(0, 0x10, 0x17, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        -10.0, 41.2, db(2, 1), db(1, 0), Extractor::InvSensor, TEMP_TEXT, TEMP_UNIT),
    panel_occupancy(0x17),
    // A5-10-22/23 panels with humidity and 3-bit fan control.
    // Per EEP, 23 equals 22 plus the occupancy button on DB0.0.
    sensor_row(0, 0x10, 0x22, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(3, 7), db(3, 0), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x22, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x22, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x10, 0x22, DsGroup::BlueHeating, SensorType::FanSpeed, UsageHint::Room,
        -1.0 / 3.0, 2.0, db(0, 7), db(0, 5), Extractor::StdSensor, FAN_SPEED_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x23, DsGroup::BlueHeating, SensorType::SetPoint, UsageHint::User,
        0.0, 1.0, db(3, 7), db(3, 0), Extractor::StdSensor, SETPOINT_TEXT, UNITY_UNIT),
    sensor_row(0, 0x10, 0x23, DsGroup::BlueHeating, SensorType::Humidity, UsageHint::Room,
        0.0, 102.0, db(2, 7), db(2, 0), Extractor::StdSensor, HUM_TEXT, HUM_UNIT),
    sensor_row(0, 0x10, 0x23, DsGroup::BlueHeating, SensorType::Temperature, UsageHint::Room,
        0.0, 40.8, db(1, 7), db(1, 0), Extractor::StdSensor, TEMP_TEXT, TEMP_UNIT),
    sensor_row(0, 0x10, 0x23, DsGroup::BlueHeating, SensorType::FanSpeed, UsageHint::Room,
        -1.0 / 3.0, 2.0, db(0, 7), db(0, 5), Extractor::StdSensor, FAN_SPEED_TEXT, UNITY_UNIT),
    panel_occupancy(0x23),
    // A5-12-01 energy meter: two siblings, the kind bit picks which publishes
    sensor_row(0, 0x12, 0x01, DsGroup::BlackJoker, SensorType::Power, UsageHint::Room,
        0.0, 2500.0, db(3, 7), db(1, 0), Extractor::PowerMeter, "Power", "W"),
    sensor_row(0, 0x12, 0x01, DsGroup::BlackJoker, SensorType::Energy, UsageHint::Room,
        0.0, 16e9, db(3, 7), db(1, 0), Extractor::PowerMeter, "Energy", "kWh"),
];

/// Rows matching a profile and subdevice index, in table order.
pub fn rows_for(
    variant: u8,
    func: u8,
    eep_type: u8,
    subdevice: u8,
) -> impl Iterator<Item = &'static SensorDescriptor> {
    FOURBS_DESCRIPTORS.iter().filter(move |row| {
        row.variant == variant
            && row.func == func
            && row.eep_type == eep_type
            && row.subdevice == subdevice
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_rows_have_sane_bit_fields() {
        for row in FOURBS_DESCRIPTORS {
            assert!(row.ms_bit >= row.ls_bit, "row '{}' bit order", row.label);
            assert!(row.ms_bit < 32, "row '{}' beyond 4BS data", row.label);
            match row.kind {
                BehaviourKind::Sensor(_) => {
                    assert!(row.min < row.max || row.extractor == Extractor::FanSpeed,
                        "row '{}' range", row.label);
                }
                BehaviourKind::Input(_) => {
                    assert_eq!(row.ms_bit, row.ls_bit, "input row '{}' single bit", row.label);
                }
            }
        }
    }

    #[test]
    fn every_linear_row_hits_min_and_max() {
        use super::super::descriptor::{apply_extractor, make_slot, BehaviourSlot};
        use crate::behaviour::testing::test_link;
        use crate::behaviour::UpstreamEvent;
        use std::time::{Duration, Instant};

        let mut now = Instant::now();
        for row in FOURBS_DESCRIPTORS {
            let linear = matches!(row.extractor, Extractor::StdSensor | Extractor::InvSensor);
            if !linear {
                continue;
            }
            let (link, rx) = test_link(0);
            let mut slot = make_slot(row, link);
            let value_of = |slot: &mut BehaviourSlot,
                            data: &[u8],
                            now: Instant,
                            rx: &crossbeam::channel::Receiver<UpstreamEvent>| {
                apply_extractor(row, slot, data, now);
                rx.try_iter()
                    .last()
                    .map(|e| match e {
                        UpstreamEvent::SensorValue { value, .. } => value,
                        other => panic!("unexpected event {:?}", other),
                    })
                    .unwrap_or_else(|| panic!("row '{}' pushed nothing", row.label))
            };
            let zero = value_of(&mut slot, &[0, 0, 0, 0], now, &rx);
            now += Duration::from_secs(3);
            let ones = value_of(&mut slot, &[0xFF, 0xFF, 0xFF, 0xFF], now, &rx);
            now += Duration::from_secs(3);
            let (expect_zero, expect_ones) = match row.extractor {
                Extractor::InvSensor => (row.max, row.min),
                _ => (row.min, row.max),
            };
            let half_lsb = row.resolution() / 2.0;
            assert!(
                (zero - expect_zero).abs() <= half_lsb,
                "row '{}' all-zero gave {}",
                row.label,
                zero
            );
            assert!(
                (ones - expect_ones).abs() <= half_lsb,
                "row '{}' all-ones gave {}",
                row.label,
                ones
            );
        }
    }

    #[test]
    fn known_profiles_resolve() {
        assert_eq!(rows_for(0, 0x02, 0x05, 0).count(), 1);
        assert_eq!(rows_for(0, 0x04, 0x01, 0).count(), 2);
        assert_eq!(rows_for(0, 0x10, 0x01, 0).count(), 4);
        assert_eq!(rows_for(0, 0x10, 0x23, 0).count(), 5);
        assert_eq!(rows_for(0, 0x12, 0x01, 0).count(), 2);
        assert_eq!(rows_for(1, 0x10, 0x06, 0).count(), 3);
        assert_eq!(rows_for(0, 0x42, 0x42, 0).count(), 0);
    }
}
