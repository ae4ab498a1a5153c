// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! A5-20-01 heating valve actuator.
//!
//! The only profile in this connector with an outgoing data direction. The
//! battery-powered valve wakes up periodically, transmits its state and
//! expects a response telegram every time (the device carries the
//! update-at-every-receive flag for that). Incoming telegrams feed the
//! optional built-in temperature sensor and low-battery input (separate
//! descriptor channels) and raise hardware error observables; outgoing
//! telegrams carry the set point, the summer-mode bit and, during a
//! service (anti-calcification) cycle, the forced open/close bits across
//! two consecutive telegrams.
//!
//! Variant 2 models binary valves (e.g. MD10-FTL) that only move around a
//! mechanically preset point: requested increases are transmitted as >= 51%,
//! decreases as <= 49%, unchanged requests repeat the last actual value.

use super::descriptor::{db, BehaviourKind, Extractor, SensorDescriptor, TEMP_TEXT, TEMP_UNIT, BINARY_UNIT};
use super::OutgoingFrame;
use crate::behaviour::{
    BinaryInputType, DsGroup, HardwareError, OutputBehaviour, SensorType, UsageHint,
};
use crate::eep::{self, EepProfile, Rorg};
use crate::esp3::{Esp3Packet, LRN_EEP_INFO_VALID, LRN_BIT};

const fn dbmask(byte: u8, bit: u8) -> u32 {
    1 << db(byte, bit)
}

/// Built-in room temperature sensor (variants with feed-back enabled).
pub static VALVE_TEMP_SENSOR: SensorDescriptor = SensorDescriptor {
    variant: 0,
    func: 0x20,
    eep_type: 0x01,
    subdevice: 0,
    primary_group: DsGroup::BlueHeating,
    channel_group: DsGroup::BlueHeating,
    kind: BehaviourKind::Sensor(SensorType::Temperature),
    usage: UsageHint::Room,
    min: 0.0,
    max: 40.0,
    ms_bit: db(1, 7),
    ls_bit: db(1, 0),
    update_interval_s: 100,
    alive_sign_interval_s: 40 * 60,
    extractor: Extractor::StdSensor,
    label: TEMP_TEXT,
    unit: TEMP_UNIT,
};

/// Energy-storage low flag reported as a binary input.
pub static VALVE_LOW_BATTERY_INPUT: SensorDescriptor = SensorDescriptor {
    variant: 0,
    func: 0x20,
    eep_type: 0x01,
    subdevice: 0,
    primary_group: DsGroup::BlueHeating,
    channel_group: DsGroup::BlueHeating,
    kind: BehaviourKind::Input(BinaryInputType::LowBattery),
    usage: UsageHint::Room,
    min: 1.0,
    max: 0.0,
    ms_bit: db(2, 4),
    ls_bit: db(2, 4),
    update_interval_s: 100,
    alive_sign_interval_s: 40 * 60,
    extractor: Extractor::StdInput,
    label: "Low Battery",
    unit: BINARY_UNIT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceState {
    Idle,
    OpenValve,
    CloseValve,
}

pub struct ValveOutputChannel {
    pub profile: EepProfile,
    service_state: ServiceState,
    /// Valve position last put on air.
    last_actual_pos: u8,
    /// Set point last requested by the controller (binary-valve hysteresis).
    last_requested_pos: u8,
    pub output: OutputBehaviour,
}

impl ValveOutputChannel {
    #[must_use]
    pub fn new(profile: EepProfile, output: OutputBehaviour) -> Self {
        Self {
            profile,
            service_state: ServiceState::Idle,
            // assume centered until the first cycle
            last_actual_pos: 50,
            last_requested_pos: 50,
            output,
        }
    }

    /// Check error bits of an incoming valve telegram. The sensor values are
    /// handled by the separate descriptor channels.
    pub fn handle_radio(&mut self, packet: &Esp3Packet) {
        if eep::has_teach_info(packet, 0, false) {
            return;
        }
        if packet.rorg_byte() != Some(Rorg::Bs4 as u8) || packet.radio_user_data_length() != 4 {
            return;
        }
        let data = packet.fourbs_data();
        if data & dbmask(2, 0) != 0 {
            log::error!("[valve] actuator obstructed");
            self.output.set_hardware_error(HardwareError::Overload);
        } else if data & dbmask(2, 4) == 0 && data & dbmask(2, 5) == 0 {
            log::error!("[valve] energy storage and battery are both low");
            self.output.set_hardware_error(HardwareError::LowBattery);
        }
        log::debug!(
            "[valve] reports {}% open, service={}, energy input={}, storage charged={}",
            (data >> db(3, 0)) & 0xFF,
            data & dbmask(2, 7) != 0,
            data & dbmask(2, 6) != 0,
            data & dbmask(2, 5) != 0,
        );
    }

    /// Contribute this channel's state to the device's outgoing 4BS frame.
    pub fn collect_outgoing(&mut self, frame: &mut OutgoingFrame) {
        let mut data = frame.fourbs_data();
        if self.output.run_prophylaxis && self.service_state == ServiceState::Idle {
            self.output.run_prophylaxis = false;
            self.service_state = ServiceState::OpenValve;
        }
        match self.service_state {
            ServiceState::OpenValve => {
                log::info!("[valve] service cycle: fully opening");
                data |= dbmask(1, 0); // service on
                data |= dbmask(1, 5); // force open
                self.service_state = ServiceState::CloseValve;
                // one state per telegram; ask for another cycle
                frame.request_follow_up = true;
            }
            ServiceState::CloseValve => {
                log::info!("[valve] service cycle: fully closing");
                data |= dbmask(1, 0);
                data |= dbmask(1, 4); // force close
                self.service_state = ServiceState::Idle;
                frame.request_follow_up = true;
            }
            ServiceState::Idle => {
                let mut position = self.output.requested().round().clamp(0.0, 100.0) as u8;
                if self.profile.variant() == 2 {
                    // binary valve: transmit across the hysteresis points
                    if position > self.last_requested_pos {
                        log::info!(
                            "[valve] binary valve set point {} -> {}, opening to >=51%",
                            self.last_requested_pos,
                            position
                        );
                        self.last_requested_pos = position;
                        if position <= 50 {
                            position = 51;
                        }
                    } else if position < self.last_requested_pos {
                        log::info!(
                            "[valve] binary valve set point {} -> {}, closing to <=49%",
                            self.last_requested_pos,
                            position
                        );
                        self.last_requested_pos = position;
                        if position >= 50 {
                            position = 49;
                        }
                    } else {
                        position = self.last_actual_pos;
                    }
                }
                self.last_actual_pos = position;
                // DB3 carries the position as 0..100, not 0..255
                data |= u32::from(position) << db(3, 0);
                if self.output.climate_idle {
                    data |= dbmask(1, 3); // summer mode, slow updates
                }
                log::debug!("[valve] requesting set point {}%", position);
                self.output.value_applied();
            }
        }
        frame.set_fourbs_data(data);
    }
}

/// The teach-in response mirroring a learned A5-20-xx EEP back to the
/// device, with the learn-response flag byte set.
#[must_use]
pub fn teach_in_response(profile: EepProfile, address: u32) -> Esp3Packet {
    let mut packet = Esp3Packet::new();
    packet.init_for_rorg(Rorg::Bs4 as u8, 0);
    packet.set_fourbs_teach_in_eep(profile.pure());
    // LRN type with EEP | EEP supported | sender stored | LRN response,
    // LRN bit cleared (is a learn packet)
    packet.radio_user_data_mut()[3] = LRN_EEP_INFO_VALID | 0x40 | 0x20 | 0x10;
    debug_assert_eq!(packet.radio_user_data()[3] & LRN_BIT, 0);
    packet.set_radio_destination(address);
    packet
}
