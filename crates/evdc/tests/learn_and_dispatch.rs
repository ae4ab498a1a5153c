// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! End-to-end device scenarios: teach-in, dispatch, sensor decoding and
//! the valve output cycle, wired through registry, learn controller,
//! factory and store exactly as the engine wires them.

use crossbeam::channel::{unbounded, Receiver, Sender};
use evdc::behaviour::UpstreamEvent;
use evdc::config::MIN_LEARN_DBM;
use evdc::device::{create_devices_from_eep, DeviceRegistry, DeviceStore, MemoryStore};
use evdc::esp3::{Esp3Packet, PacketType};
use evdc::handlers::RadioOut;
use evdc::learn::{LearnController, LearnOutcome};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RadioLog(Vec<Esp3Packet>);

impl RadioOut for RadioLog {
    fn send_radio(&mut self, packet: Esp3Packet) {
        self.0.push(packet);
    }
}

/// Minimal engine-like harness around registry + learn + store.
struct Harness {
    registry: DeviceRegistry,
    learn: LearnController,
    store: MemoryStore,
    upstream: Sender<UpstreamEvent>,
    events: Receiver<UpstreamEvent>,
    radio: RadioLog,
}

impl Harness {
    fn new() -> Self {
        let (upstream, events) = unbounded();
        Self {
            registry: DeviceRegistry::new(),
            learn: LearnController::new(MIN_LEARN_DBM),
            store: MemoryStore::new(),
            upstream,
            events,
            radio: RadioLog::default(),
        }
    }

    fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        let sender = packet.radio_sender();
        match self.learn.evaluate(packet, self.registry.knows_address(sender)) {
            LearnOutcome::NotLearning => {
                self.registry.dispatch_radio(packet, now, &mut self.radio);
            }
            LearnOutcome::NoTeachInfo => {}
            LearnOutcome::LearnIn {
                profile,
                manufacturer,
            } => {
                let output = create_devices_from_eep(
                    &self.upstream,
                    sender,
                    profile,
                    manufacturer,
                    true,
                    now,
                );
                for device in output.devices {
                    let record = device.record();
                    if self.registry.insert(device) {
                        self.store.save(&record).unwrap();
                    }
                }
            }
            LearnOutcome::LearnOut => {
                self.registry.remove_address(sender);
                self.store.remove_address(sender).unwrap();
            }
        }
    }

    fn arm_learning(&mut self, now: Instant) {
        self.learn
            .set_learn_mode(true, false, Duration::from_secs(60), now);
    }
}

fn radio_packet(rorg: u8, user: &[u8], sender: u32, status: u8, dbm: u8) -> Esp3Packet {
    let mut packet = Esp3Packet::new();
    packet.set_packet_type(PacketType::Radio);
    packet.set_opt_data_length(7);
    packet.set_data_length(1 + user.len() + 5);
    packet.data_mut()[0] = rorg;
    packet.radio_user_data_mut().copy_from_slice(user);
    packet.set_radio_sender(sender);
    packet.set_radio_status(status);
    packet.opt_data_mut()[0] = 1;
    packet.opt_data_mut()[5] = dbm;
    packet.finalize();
    packet
}

/// 4BS teach-in for A5-02-05, manufacturer 0x002.
fn teach_in_a50205(sender: u32) -> Esp3Packet {
    radio_packet(0xA5, &[0x08, 0x28, 0x02, 0x80], sender, 0x00, 0x2D)
}

#[test]
fn teach_in_creates_device_and_disarms_learning() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0x1122_3344), now);
    assert!(!harness.learn.is_learning(), "one learn action per arming");
    assert_eq!(harness.registry.len(), 1);
    assert!(harness.registry.knows_address(0x1122_3344));
    let device = &harness.registry.devices_at(0x1122_3344)[0];
    assert_eq!(device.profile().pure(), 0x00A5_0205);
    assert_eq!(device.manufacturer(), 0x002);
    assert_eq!(harness.store.load_all().unwrap().len(), 1);
}

#[test]
fn learning_is_idempotent_in_then_out() {
    let mut harness = Harness::new();
    let now = Instant::now();
    // learn two different devices
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0xAAAA_0001), now);
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0xBBBB_0002), now);
    assert_eq!(harness.registry.len(), 2);
    // teaching the first one again is a learn-out, not a duplicate
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0xAAAA_0001), now);
    assert_eq!(harness.registry.len(), 1);
    assert!(!harness.registry.knows_address(0xAAAA_0001));
    assert!(harness.registry.knows_address(0xBBBB_0002));
    assert_eq!(harness.store.load_all().unwrap().len(), 1);
    // and in again works
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0xAAAA_0001), now);
    assert_eq!(harness.registry.len(), 2);
}

#[test]
fn far_away_rps_cannot_teach_in() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    // -70 dBm is below the proximity gate
    harness.handle_radio(&radio_packet(0xF6, &[0x30], 0xDEAD_BEEF, 0x30, 0x46), now);
    assert!(harness.registry.is_empty());
    assert!(harness.learn.is_learning(), "gated telegram must not disarm");
    // close by it pairs
    harness.handle_radio(&radio_packet(0xF6, &[0x30], 0xDEAD_BEEF, 0x30, 0x28), now);
    assert!(harness.registry.knows_address(0xDEAD_BEEF));
}

#[test]
fn rocker_press_reaches_the_up_button() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    // 2-rocker teach-in via an A-up press nearby
    harness.handle_radio(&radio_packet(0xF6, &[0x30], 0xDEAD_BEEF, 0x30, 0x28), now);
    // two logical rockers at subdevices 0 and 2
    assert_eq!(harness.registry.len(), 2);
    while harness.events.try_recv().is_ok() {}

    // operational press A-up (action code 1, energy bow pressed)
    harness.handle_radio(&radio_packet(0xF6, &[0x30], 0xDEAD_BEEF, 0x30, 0x28), now);
    let presses: Vec<_> = harness
        .events
        .try_iter()
        .filter_map(|e| match e {
            UpstreamEvent::ButtonAction {
                dsuid,
                channel,
                pressed,
            } => Some((dsuid, channel, pressed)),
            _ => None,
        })
        .collect();
    assert_eq!(presses.len(), 1, "exactly one button acts");
    // subdevice 0 (rocker A), channel 1 is the up key
    assert_eq!(presses[0].1, 1);
    assert!(presses[0].2);

    // release: U-message, no buttons pressed any more
    harness.handle_radio(&radio_packet(0xF6, &[0x00], 0xDEAD_BEEF, 0x20, 0x28), now);
    let releases: Vec<_> = harness
        .events
        .try_iter()
        .filter_map(|e| match e {
            UpstreamEvent::ButtonAction { pressed, .. } => Some(pressed),
            _ => None,
        })
        .collect();
    assert_eq!(releases, vec![false]);
}

#[test]
fn temperature_midpoint_decodes_to_twenty_degrees() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0x1122_3344), now);
    while harness.events.try_recv().is_ok() {}

    // operational telegram: DB1 = 0x80 on the inverted 0..40 scale
    harness.handle_radio(
        &radio_packet(0xA5, &[0x00, 0x00, 0x80, 0x08], 0x1122_3344, 0x00, 0x2D),
        now,
    );
    let value = harness
        .events
        .try_iter()
        .find_map(|e| match e {
            UpstreamEvent::SensorValue { value, .. } => Some(value),
            _ => None,
        })
        .expect("sensor value pushed");
    assert!((value - 20.0).abs() < 0.1, "got {}", value);
}

#[test]
fn valve_output_cycle_produces_the_literal_telegram() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    // A5-20-01 teach-in (FUNC 0x20, TYPE 0x01): D0=0x80, D1=0x08
    harness.handle_radio(
        &radio_packet(0xA5, &[0x80, 0x08, 0x02, 0x80], 0x0123_4567, 0x00, 0x2D),
        now,
    );
    assert_eq!(harness.registry.len(), 1);
    // the valve asked for a teach-in response
    assert_eq!(harness.radio.0.len(), 0, "responses go through the command queue");

    // the controller requests 42%
    let device = harness.registry.get_mut(0x0123_4567, 0).unwrap();
    device.apply_output(42.0, now, &mut harness.radio);
    // battery powered: nothing on air yet
    assert!(harness.radio.0.is_empty());

    // the valve's own next telegram (40% open, healthy status in DB2)
    // triggers the aggregated answer
    harness.handle_radio(
        &radio_packet(
            0xA5,
            &[0x28, 0x70, 0x00, 0x08],
            0x0123_4567,
            0x00,
            0x2D,
        ),
        now,
    );
    assert_eq!(harness.radio.0.len(), 1);
    let sent = &harness.radio.0[0];
    assert_eq!(sent.radio_user_data(), &[0x2A, 0x00, 0x00, 0x08]);
    assert_eq!(sent.radio_destination(), 0x0123_4567);
    assert_eq!(sent.radio_status(), 0x00);
}

#[test]
fn registry_survives_reload_from_store() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    harness.handle_radio(&teach_in_a50205(0x1122_3344), now);
    let records = harness.store.load_all().unwrap();

    // "restart": a fresh registry rebuilt from the records
    let (upstream, _events) = unbounded();
    let mut rebuilt = DeviceRegistry::new();
    for record in &records {
        let output = create_devices_from_eep(
            &upstream,
            record.address,
            evdc::eep::EepProfile(record.profile),
            record.manufacturer,
            false,
            now,
        );
        for device in output.devices {
            rebuilt.insert(device);
        }
    }
    assert_eq!(rebuilt.len(), 1);
    let device = &rebuilt.devices_at(0x1122_3344)[0];
    assert_eq!(device.profile().pure(), 0x00A5_0205);
    assert_eq!(device.manufacturer(), 0x002);
}

#[test]
fn illumination_dual_range_scenario() {
    let mut harness = Harness::new();
    let now = Instant::now();
    harness.arm_learning(now);
    // A5-06-01 teach-in: FUNC 0x06, TYPE 0x01 -> D0=0x18, D1=0x08
    harness.handle_radio(
        &radio_packet(0xA5, &[0x18, 0x08, 0x02, 0x80], 0x00AB_CDEF, 0x00, 0x2D),
        now,
    );
    assert!(harness.registry.knows_address(0x00AB_CDEF));
    while harness.events.try_recv().is_ok() {}

    let resolution = (60000.0 - 600.0) / 511.0;
    // select bit set: fine-range byte 0x20 used as-is (9-bit value 32)
    harness.handle_radio(
        &radio_packet(0xA5, &[0x00, 0x00, 0x20, 0x09], 0x00AB_CDEF, 0x00, 0x2D),
        now,
    );
    let value = harness
        .events
        .try_iter()
        .find_map(|e| match e {
            UpstreamEvent::SensorValue { value, .. } => Some(value),
            _ => None,
        })
        .expect("fine-range value pushed");
    assert!((value - (600.0 + 32.0 * resolution)).abs() < 1e-6);

    // select bit cleared: coarse-range byte 0x80 doubled (9-bit value 256)
    harness.handle_radio(
        &radio_packet(0xA5, &[0x00, 0x80, 0x00, 0x08], 0x00AB_CDEF, 0x00, 0x2D),
        now + Duration::from_secs(3),
    );
    let value = harness
        .events
        .try_iter()
        .find_map(|e| match e {
            UpstreamEvent::SensorValue { value, .. } => Some(value),
            _ => None,
        })
        .expect("coarse-range value pushed");
    assert!((value - (600.0 + 256.0 * resolution)).abs() < 1e-6);
}
