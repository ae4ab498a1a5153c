// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! A5-13-0X multi-telegram weather station (e.g. Eltako FWS61).
//!
//! One physical device alternates between two telegram sub-types; the high
//! nibble of data byte 3 identifies the bank: 1 = dawn / outdoor temperature
//! / wind / day / rain, 2 = sun west / south / east. One logical device owns
//! all eight behaviours and routes each telegram into the matching bank.

use super::descriptor::{
    apply_extractor, db, BehaviourKind, BehaviourSlot, Extractor, SensorDescriptor, BINARY_UNIT,
    ILLUM_TEXT, ILLUM_UNIT, TEMP_TEXT, TEMP_UNIT,
};
use crate::behaviour::{BinaryInputType, DsGroup, SensorType, UsageHint};
use crate::eep::{self, Rorg};
use crate::esp3::Esp3Packet;
use std::time::Instant;

const fn outdoor_sensor(
    eep_type: u8,
    sensor_type: SensorType,
    min: f64,
    max: f64,
    ms_bit: u8,
    ls_bit: u8,
    label: &'static str,
    unit: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        variant: 0,
        func: 0x13,
        eep_type,
        subdevice: 0,
        primary_group: DsGroup::BlackJoker,
        channel_group: DsGroup::BlackJoker,
        kind: BehaviourKind::Sensor(sensor_type),
        usage: UsageHint::Outdoors,
        min,
        max,
        ms_bit,
        ls_bit,
        update_interval_s: 100,
        alive_sign_interval_s: 40 * 60,
        extractor: Extractor::StdSensor,
        label,
        unit,
    }
}

const fn outdoor_input(eep_type: u8, input_type: BinaryInputType, min: f64, max: f64, bit: u8,
    label: &'static str) -> SensorDescriptor {
    SensorDescriptor {
        variant: 0,
        func: 0x13,
        eep_type,
        subdevice: 0,
        primary_group: DsGroup::BlackJoker,
        channel_group: DsGroup::BlackJoker,
        kind: BehaviourKind::Input(input_type),
        usage: UsageHint::Outdoors,
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

pub static DAWN_SENSOR: SensorDescriptor = outdoor_sensor(
    0x01, SensorType::Illumination, 0.0, 999.0, db(3, 7), db(3, 0), ILLUM_TEXT, ILLUM_UNIT);
pub static OUTDOOR_TEMP: SensorDescriptor = outdoor_sensor(
    0x01, SensorType::Temperature, -40.0, 80.0, db(2, 7), db(2, 0), TEMP_TEXT, TEMP_UNIT);
pub static WIND_SPEED: SensorDescriptor = outdoor_sensor(
    0x01, SensorType::WindSpeed, 0.0, 70.0, db(1, 7), db(1, 0), "Wind speed", "m/s");
pub static DAY_INDICATOR: SensorDescriptor = outdoor_input(
    0x01, BinaryInputType::DayNight, 1.0, 0.0, db(0, 2), "Day indicator");
pub static RAIN_INDICATOR: SensorDescriptor = outdoor_input(
    0x01, BinaryInputType::Rain, 0.0, 1.0, db(0, 1), "Rain indicator");
pub static SUN_WEST: SensorDescriptor = outdoor_sensor(
    0x02, SensorType::Illumination, 0.0, 150_000.0, db(3, 7), db(3, 0), "Sun west", ILLUM_UNIT);
pub static SUN_SOUTH: SensorDescriptor = outdoor_sensor(
    0x02, SensorType::Illumination, 0.0, 150_000.0, db(2, 7), db(2, 0), "Sun south", ILLUM_UNIT);
pub static SUN_EAST: SensorDescriptor = outdoor_sensor(
    0x02, SensorType::Illumination, 0.0, 150_000.0, db(1, 7), db(1, 0), "Sun east", ILLUM_UNIT);

/// One channel owning all behaviours of both telegram banks.
pub struct WeatherStationChannel {
    bank1: Vec<(&'static SensorDescriptor, BehaviourSlot)>,
    bank2: Vec<(&'static SensorDescriptor, BehaviourSlot)>,
}

impl WeatherStationChannel {
    /// `bank1` receives A5-13-01 telegrams, `bank2` A5-13-02 telegrams.
    #[must_use]
    pub fn new(
        bank1: Vec<(&'static SensorDescriptor, BehaviourSlot)>,
        bank2: Vec<(&'static SensorDescriptor, BehaviourSlot)>,
    ) -> Self {
        Self { bank1, bank2 }
    }

    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        if eep::has_teach_info(packet, 0, false) {
            return;
        }
        if packet.rorg_byte() != Some(Rorg::Bs4 as u8) {
            return;
        }
        let data = packet.radio_user_data();
        if data.len() != 4 {
            return;
        }
        let bank = match (data[3] >> 4) & 0x0F {
            1 => &mut self.bank1,
            2 => &mut self.bank2,
            // A5-13-03..06 sub-types are not supported
            _ => return,
        };
        for (descriptor, slot) in bank.iter_mut() {
            apply_extractor(descriptor, slot, data, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::testing::test_link;
    use crate::behaviour::{BinaryInputBehaviour, SensorBehaviour, UpstreamEvent};
    use crate::esp3::PacketType;
    use crossbeam::channel::Receiver;
    use std::time::Duration;

    fn slot_for(
        descriptor: &'static SensorDescriptor,
        channel: usize,
    ) -> ((&'static SensorDescriptor, BehaviourSlot), Receiver<UpstreamEvent>) {
        let (link, rx) = test_link(channel);
        let slot = match descriptor.kind {
            BehaviourKind::Sensor(t) => BehaviourSlot::Sensor(SensorBehaviour::new(
                t,
                descriptor.usage,
                descriptor.channel_group,
                descriptor.min,
                descriptor.max,
                descriptor.resolution(),
                Duration::from_secs(u64::from(descriptor.update_interval_s)),
                Duration::from_secs(u64::from(descriptor.alive_sign_interval_s)),
                link,
            )),
            BehaviourKind::Input(t) => BehaviourSlot::Input(BinaryInputBehaviour::new(
                t,
                descriptor.usage,
                descriptor.channel_group,
                link,
            )),
        };
        ((descriptor, slot), rx)
    }

    fn fourbs(user: [u8; 4]) -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(0xA5, 0);
        packet.radio_user_data_mut().copy_from_slice(&user);
        packet.set_radio_sender(0x00AA_BB01);
        packet.finalize();
        packet
    }

    #[test]
    fn bank_routing_by_identifier_nibble() {
        let (dawn, dawn_rx) = slot_for(&DAWN_SENSOR, 0);
        let (temp, temp_rx) = slot_for(&OUTDOOR_TEMP, 1);
        let (west, west_rx) = slot_for(&SUN_WEST, 5);
        let mut channel = WeatherStationChannel::new(vec![dawn, temp], vec![west]);
        let now = Instant::now();

        // identifier 1 with LRN bit set: dawn + temperature update
        channel.handle_radio(&fourbs([0x80, 0x40, 0x00, 0x18]), now);
        assert!(dawn_rx.try_iter().next().is_some());
        assert!(temp_rx.try_iter().next().is_some());
        assert!(west_rx.try_iter().next().is_none());

        // identifier 2: sun bank updates instead
        channel.handle_radio(&fourbs([0x80, 0x00, 0x00, 0x28]), now);
        assert!(dawn_rx.try_iter().next().is_none());
        assert!(west_rx.try_iter().next().is_some());

        // unsupported identifier: nothing moves
        channel.handle_radio(&fourbs([0x80, 0x00, 0x00, 0x38]), now);
        assert!(dawn_rx.try_iter().next().is_none());
        assert!(west_rx.try_iter().next().is_none());
    }

    #[test]
    fn teach_in_telegrams_skipped() {
        let (dawn, dawn_rx) = slot_for(&DAWN_SENSOR, 0);
        let mut channel = WeatherStationChannel::new(vec![dawn], vec![]);
        // LRN bit cleared
        channel.handle_radio(&fourbs([0x80, 0x40, 0x00, 0x10]), Instant::now());
        assert!(dawn_rx.try_iter().next().is_none());
    }
}
