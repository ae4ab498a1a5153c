// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # Logical devices
//!
//! A device is one logical entity behind a physical radio address; several
//! devices can share an address (each rocker half of a quad-rocker is its
//! own sub-device). The device owns its channel handlers, the
//! battery/line-power update flags and the outgoing aggregator that folds
//! every handler's contribution into a single 4BS telegram.

mod factory;
mod registry;
mod store;

pub use factory::{
    create_devices_from_eep, profile_variants, valid_variant_switch, FactoryOutput,
    ProfileVariantEntry,
};
pub use registry::DeviceRegistry;
pub use store::{DeviceRecord, DeviceStore, MemoryStore, StoreError};

use crate::behaviour::{DsGroup, UpstreamEvent};
use crate::config::ALIVE_TIMEOUT_FACTOR;
use crate::dsuid::DsUid;
use crate::eep::{manufacturer_name, EepProfile, Manufacturer};
use crate::esp3::Esp3Packet;
use crate::handlers::{ChannelHandler, OutgoingFrame, RadioOut};
use crossbeam::channel::Sender;
use std::time::Instant;

/// One logical device.
pub struct Device {
    address: u32,
    subdevice: u8,
    dsuid: DsUid,
    profile: EepProfile,
    manufacturer: Manufacturer,
    pub function_desc: String,
    pub primary_group: DsGroup,
    /// Line powered: output changes can be transmitted right away.
    pub always_updatable: bool,
    /// Transmit an outgoing frame after every reception, even without
    /// pending changes (heating valves feed their watchdog from this).
    pub update_at_every_receive: bool,
    pending_update: bool,
    last_packet_time: Instant,
    last_rssi: Option<i32>,
    last_repeater_count: u8,
    channels: Vec<ChannelHandler>,
    upstream: Sender<UpstreamEvent>,
}

impl Device {
    #[must_use]
    pub fn new(
        address: u32,
        subdevice: u8,
        profile: EepProfile,
        manufacturer: Manufacturer,
        upstream: Sender<UpstreamEvent>,
        created_at: Instant,
    ) -> Self {
        Self {
            address,
            subdevice,
            dsuid: DsUid::from_enocean_address(address, subdevice),
            profile,
            manufacturer,
            function_desc: "device".into(),
            primary_group: DsGroup::BlackJoker,
            always_updatable: false,
            update_at_every_receive: false,
            pending_update: false,
            // consider a packet received at creation so fresh devices do
            // not start out absent
            last_packet_time: created_at,
            last_rssi: None,
            last_repeater_count: 0,
            channels: Vec::new(),
            upstream,
        }
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        self.address
    }

    #[must_use]
    pub fn subdevice(&self) -> u8 {
        self.subdevice
    }

    #[must_use]
    pub fn dsuid(&self) -> &DsUid {
        &self.dsuid
    }

    #[must_use]
    pub fn profile(&self) -> EepProfile {
        self.profile
    }

    #[must_use]
    pub fn manufacturer(&self) -> Manufacturer {
        self.manufacturer
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelHandler] {
        &self.channels
    }

    #[must_use]
    pub fn channels_mut(&mut self) -> &mut [ChannelHandler] {
        &mut self.channels
    }

    pub fn add_channel(&mut self, handler: ChannelHandler) {
        self.channels.push(handler);
    }

    #[must_use]
    pub fn last_rssi(&self) -> Option<i32> {
        self.last_rssi
    }

    #[must_use]
    pub fn last_repeater_count(&self) -> u8 {
        self.last_repeater_count
    }

    #[must_use]
    pub fn last_packet_time(&self) -> Instant {
        self.last_packet_time
    }

    /// Persistable addressing/profile record.
    #[must_use]
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            address: self.address,
            subdevice: self.subdevice,
            profile: self.profile.0,
            manufacturer: self.manufacturer,
        }
    }

    /// Process an incoming radio packet from this device's address.
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant, radio: &mut dyn RadioOut) {
        self.last_packet_time = now;
        self.last_rssi = Some(packet.radio_dbm());
        self.last_repeater_count = packet.radio_repeater_count();
        for channel in &mut self.channels {
            channel.handle_radio(packet, now);
        }
        // battery powered devices get their pending output piggybacked onto
        // their own transmission cadence
        if self.pending_update || self.update_at_every_receive {
            self.pending_update = true;
            self.send_outgoing_update(radio);
        }
    }

    /// Route a new output value to the device's output channels.
    pub fn apply_output(&mut self, value: f64, now: Instant, radio: &mut dyn RadioOut) {
        for channel in &mut self.channels {
            if channel.apply_output(value, now, radio) {
                self.pending_update = true;
            }
        }
        if self.pending_update {
            if self.always_updatable {
                self.send_outgoing_update(radio);
            } else {
                log::info!(
                    "[device] {}: output update pending, sent on next reception",
                    self.dsuid
                );
            }
        }
    }

    /// Collect one outgoing 4BS frame from all channels and transmit it.
    pub fn send_outgoing_update(&mut self, radio: &mut dyn RadioOut) {
        if !self.pending_update {
            return;
        }
        // cleared first so handlers can re-arm it for follow-up cycles
        self.pending_update = false;
        let mut frame = OutgoingFrame::new();
        for channel in &mut self.channels {
            channel.collect_outgoing(&mut frame);
        }
        if frame.request_follow_up {
            self.pending_update = true;
        }
        if let Some(data) = frame.data() {
            let mut packet = Esp3Packet::new();
            packet.init_for_rorg(crate::eep::Rorg::Bs4 as u8, 0);
            packet.set_fourbs_data(data);
            packet.set_radio_destination(self.address);
            log::info!(
                "[device] {}: sending outgoing 4BS frame 0x{:08X}",
                self.dsuid,
                data
            );
            radio.send_radio(packet);
        }
    }

    /// A teach-in telegram arrived while not learning; treat it as the user
    /// identifying this device. Returns whether it was consumed.
    pub fn signal_user_action(&mut self) -> bool {
        let _ = self.upstream.try_send(UpstreamEvent::DeviceIdentified {
            dsuid: self.dsuid.clone(),
        });
        true
    }

    /// Present as long as every channel with an alive interval saw traffic
    /// recently enough.
    #[must_use]
    pub fn is_present(&self, now: Instant) -> bool {
        self.channels.iter().all(|channel| {
            channel.alive_sign_interval().is_none_or(|interval| {
                now.duration_since(self.last_packet_time) < interval * ALIVE_TIMEOUT_FACTOR
            })
        })
    }

    /// Earliest pending direct-action deadline across channels.
    #[must_use]
    pub fn next_action_deadline(&self) -> Option<Instant> {
        self.channels
            .iter()
            .filter_map(ChannelHandler::next_action_deadline)
            .min()
    }

    /// Fire due direct actions (simulated button releases).
    pub fn poll_actions(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        for channel in &mut self.channels {
            channel.poll_actions(now, radio);
        }
    }

    /// "Eltako EnOcean heating valve actuator (A5-20-01)" style model name.
    #[must_use]
    pub fn model_name(&self) -> String {
        match manufacturer_name(self.manufacturer) {
            Some(name) => format!("{} EnOcean {} ({})", name, self.function_desc, self.profile),
            None => format!("EnOcean {} ({})", self.function_desc, self.profile),
        }
    }

    /// Multi-line description for logs and the sniffer.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{}\n- address=0x{:08X} subdevice={} profile={} manufacturer=0x{:03X}\n",
            self.model_name(),
            self.address,
            self.subdevice,
            self.profile,
            self.manufacturer
        );
        for (index, channel) in self.channels.iter().enumerate() {
            text.push_str(&format!("- channel #{}: {}\n", index, channel.describe()));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::testing::test_link;
    use crate::behaviour::OutputBehaviour;
    use crate::handlers::valve::ValveOutputChannel;
    use crossbeam::channel::unbounded;

    struct RadioLog(Vec<Esp3Packet>);

    impl RadioOut for RadioLog {
        fn send_radio(&mut self, packet: Esp3Packet) {
            self.0.push(packet);
        }
    }

    fn valve_device() -> Device {
        let (tx, _rx) = unbounded();
        let mut device = Device::new(
            0x0123_4567,
            0,
            EepProfile(0x00A5_2001),
            0x00B,
            tx,
            Instant::now(),
        );
        device.update_at_every_receive = true;
        let (link, _rx) = test_link(0);
        device.add_channel(ChannelHandler::ValveOutput(ValveOutputChannel::new(
            device.profile(),
            OutputBehaviour::new(DsGroup::BlueHeating, link),
        )));
        device
    }

    fn valve_telegram() -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(0xA5, 0);
        // 40% open, all status flags healthy, LRN bit set
        packet.set_fourbs_data(0x2800_0008 | (1 << 20) | (1 << 21) | (1 << 22));
        packet.set_radio_sender(0x0123_4567);
        packet.finalize();
        packet
    }

    #[test]
    fn battery_device_piggybacks_output_on_reception() {
        let mut device = valve_device();
        device.update_at_every_receive = false;
        let mut radio = RadioLog(Vec::new());
        device.apply_output(42.0, Instant::now(), &mut radio);
        // nothing sent yet: device is battery powered
        assert!(radio.0.is_empty());
        device.handle_radio(&valve_telegram(), Instant::now(), &mut radio);
        assert_eq!(radio.0.len(), 1);
        let sent = &radio.0[0];
        assert_eq!(sent.radio_user_data(), &[0x2A, 0x00, 0x00, 0x08]);
        assert_eq!(sent.radio_destination(), 0x0123_4567);
        assert_eq!(sent.radio_status(), 0x00);
    }

    #[test]
    fn update_at_every_receive_forces_frames() {
        let mut device = valve_device();
        let mut radio = RadioLog(Vec::new());
        // no pending change at all, reception still triggers a frame
        device.handle_radio(&valve_telegram(), Instant::now(), &mut radio);
        assert_eq!(radio.0.len(), 1);
        device.handle_radio(&valve_telegram(), Instant::now(), &mut radio);
        assert_eq!(radio.0.len(), 2);
    }

    #[test]
    fn record_round_trip_fields() {
        let device = valve_device();
        let record = device.record();
        assert_eq!(record.address, 0x0123_4567);
        assert_eq!(record.subdevice, 0);
        assert_eq!(record.profile, 0x00A5_2001);
        assert_eq!(record.manufacturer, 0x00B);
    }
}
