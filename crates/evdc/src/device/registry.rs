// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Address-keyed device registry and radio dispatcher.
//!
//! The registry owns every logical device (arena style; everything else
//! refers to devices by `(address, subdevice)`). Incoming radio packets are
//! offered to every channel handler of every device at the sender address.
//! Packets originating from our own ID base (reflections via repeaters)
//! are suppressed before dispatch.

use super::Device;
use crate::config::MIN_LEARN_DBM;
use crate::eep::{self, Rorg};
use crate::esp3::Esp3Packet;
use crate::handlers::RadioOut;
use std::collections::BTreeMap;
use std::time::Instant;

/// Multi-map radio address -> logical sub-devices.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<u32, Vec<Device>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logical devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// True when any sub-device exists at this address.
    #[must_use]
    pub fn knows_address(&self, address: u32) -> bool {
        self.devices.get(&address).is_some_and(|list| !list.is_empty())
    }

    /// Insert a device; refuses duplicates of (address, subdevice).
    pub fn insert(&mut self, device: Device) -> bool {
        let list = self.devices.entry(device.address()).or_default();
        if list.iter().any(|d| d.subdevice() == device.subdevice()) {
            log::warn!(
                "[registry] duplicate device 0x{:08X}/{} ignored",
                device.address(),
                device.subdevice()
            );
            return false;
        }
        log::info!("[registry] added {}", device.model_name());
        list.push(device);
        true
    }

    /// Remove one logical device.
    pub fn remove(&mut self, address: u32, subdevice: u8) -> Option<Device> {
        let list = self.devices.get_mut(&address)?;
        let index = list.iter().position(|d| d.subdevice() == subdevice)?;
        let device = list.remove(index);
        if list.is_empty() {
            self.devices.remove(&address);
        }
        Some(device)
    }

    /// Remove every logical device at one physical address.
    pub fn remove_address(&mut self, address: u32) -> Vec<Device> {
        self.devices.remove(&address).unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, address: u32, subdevice: u8) -> Option<&Device> {
        self.devices
            .get(&address)?
            .iter()
            .find(|d| d.subdevice() == subdevice)
    }

    pub fn get_mut(&mut self, address: u32, subdevice: u8) -> Option<&mut Device> {
        self.devices
            .get_mut(&address)?
            .iter_mut()
            .find(|d| d.subdevice() == subdevice)
    }

    #[must_use]
    pub fn devices_at(&self, address: u32) -> &[Device] {
        self.devices.get(&address).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut().flatten()
    }

    /// Dispatch an operational radio packet to every device at the sender
    /// address.
    ///
    /// A teach-in packet from a known sender while *not* learning (RPS
    /// excepted: RPS has no separate teach-in) is offered as a user
    /// identification action first; a device consuming it suppresses the
    /// normal dispatch.
    pub fn dispatch_radio(
        &mut self,
        packet: &Esp3Packet,
        now: Instant,
        radio: &mut dyn RadioOut,
    ) {
        let sender = packet.radio_sender();
        let Some(list) = self.devices.get_mut(&sender) else {
            return;
        };
        let identify_attempt = eep::has_teach_info(packet, MIN_LEARN_DBM, false)
            && packet.rorg_byte() != Some(Rorg::Rps as u8);
        for device in list.iter_mut() {
            if identify_attempt && device.signal_user_action() {
                log::info!(
                    "[registry] teach-in from known device {} treated as identify",
                    device.dsuid()
                );
                break;
            }
            device.handle_radio(packet, now, radio);
        }
    }

    /// Earliest direct-action deadline over all devices.
    #[must_use]
    pub fn next_action_deadline(&self) -> Option<Instant> {
        self.iter().filter_map(Device::next_action_deadline).min()
    }

    /// Fire due direct actions on all devices.
    pub fn poll_actions(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        for device in self.iter_mut() {
            device.poll_actions(now, radio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::{ButtonBehaviour, DsGroup, UpstreamEvent, UpstreamLink};
    use crate::dsuid::DsUid;
    use crate::eep::EepProfile;
    use crate::esp3::PacketType;
    use crate::handlers::rps::RockerButtonChannel;
    use crate::handlers::ChannelHandler;
    use crossbeam::channel::{unbounded, Receiver};

    struct NullRadio;

    impl RadioOut for NullRadio {
        fn send_radio(&mut self, _packet: Esp3Packet) {}
    }

    fn rocker_device(address: u32) -> (Device, Receiver<UpstreamEvent>) {
        let (tx, rx) = unbounded();
        let mut device = Device::new(
            address,
            0,
            EepProfile(0x00F6_02FF),
            0xFFFF,
            tx.clone(),
            Instant::now(),
        );
        let link = UpstreamLink {
            sender: tx,
            dsuid: DsUid::from_enocean_address(address, 0),
            channel: 0,
        };
        device.add_channel(ChannelHandler::RockerButton(RockerButtonChannel::new(
            0,
            true,
            ButtonBehaviour::new(DsGroup::YellowLight, link),
        )));
        (device, rx)
    }

    fn rps_from(sender: u32, data: u8, status: u8) -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.set_packet_type(PacketType::Radio);
        packet.set_opt_data_length(7);
        packet.set_data_length(7);
        packet.data_mut()[0] = 0xF6;
        packet.radio_user_data_mut()[0] = data;
        packet.set_radio_sender(sender);
        packet.set_radio_status(status);
        packet.finalize();
        packet
    }

    #[test]
    fn dispatch_reaches_only_matching_address() {
        let mut registry = DeviceRegistry::new();
        let (device_a, rx_a) = rocker_device(0xAAAA_0001);
        let (device_b, rx_b) = rocker_device(0xBBBB_0002);
        registry.insert(device_a);
        registry.insert(device_b);
        assert_eq!(registry.len(), 2);

        let mut radio = NullRadio;
        registry.dispatch_radio(&rps_from(0xAAAA_0001, 0x30, 0x30), Instant::now(), &mut radio);
        assert!(rx_a.try_iter().any(|e| matches!(e, UpstreamEvent::ButtonAction { pressed: true, .. })));
        assert!(rx_b.try_iter().next().is_none());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut registry = DeviceRegistry::new();
        let (first, _rx1) = rocker_device(0xAAAA_0001);
        let (second, _rx2) = rocker_device(0xAAAA_0001);
        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_address_clears_all_subdevices() {
        let mut registry = DeviceRegistry::new();
        let (tx, _rx) = unbounded();
        for subdevice in [0u8, 2u8] {
            registry.insert(Device::new(
                0xCCCC_0003,
                subdevice,
                EepProfile(0x00F6_02FF),
                0xFFFF,
                tx.clone(),
                Instant::now(),
            ));
        }
        assert_eq!(registry.remove_address(0xCCCC_0003).len(), 2);
        assert!(!registry.knows_address(0xCCCC_0003));
    }

    #[test]
    fn operational_teach_in_becomes_identify() {
        let mut registry = DeviceRegistry::new();
        let (tx, rx) = unbounded();
        let device = Device::new(
            0x1122_3344,
            0,
            EepProfile(0x00A5_0205),
            0x002,
            tx,
            Instant::now(),
        );
        registry.insert(device);
        // 4BS teach-in telegram (LRN cleared) from the known address
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(0xA5, 0);
        packet
            .radio_user_data_mut()
            .copy_from_slice(&[0x08, 0x28, 0x02, 0x80]);
        packet.set_radio_sender(0x1122_3344);
        packet.opt_data_mut()[5] = 0x28;
        packet.finalize();
        let mut radio = NullRadio;
        registry.dispatch_radio(&packet, Instant::now(), &mut radio);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, UpstreamEvent::DeviceIdentified { .. })));
    }
}
