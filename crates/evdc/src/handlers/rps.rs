// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! RPS (repeated switch) channel handlers.
//!
//! RPS telegrams have no learn/operate distinction; every telegram is a user
//! action. The handlers decode N-messages (explicit button position) and
//! U-messages (count of buttons still pressed) into per-half-rocker press
//! and release events, window-handle positions into two binary inputs, and
//! the vendor-specific key-card / smoke / leakage encodings.

use crate::behaviour::{BinaryInputBehaviour, ButtonBehaviour};
use crate::eep::EepProfile;
use crate::esp3::{Esp3Packet, STATUS_NU, STATUS_T21};
use std::time::Instant;

/// One half of one rocker (or one standalone button).
pub struct RockerButtonChannel {
    /// Which rocker of the physical switch this half belongs to (0..=3).
    pub switch_index: u8,
    /// Upper (O) or lower (I) half.
    pub is_up: bool,
    pressed: bool,
    pub behaviour: ButtonBehaviour,
}

impl RockerButtonChannel {
    #[must_use]
    pub fn new(switch_index: u8, is_up: bool, behaviour: ButtonBehaviour) -> Self {
        Self {
            switch_index,
            is_up,
            pressed: false,
            behaviour,
        }
    }

    pub fn handle_radio(&mut self, packet: &Esp3Packet) {
        let Some(&data) = packet.radio_user_data().first() else {
            return;
        };
        let status = packet.radio_status();
        if status & STATUS_NU != 0 {
            // N-message: first action in bits 7..5, second in 3..1 when
            // bit 0 flags it
            for action_index in [1u8, 0u8] {
                if action_index == 0 && data & 0x01 == 0 {
                    break;
                }
                let action = (data >> (4 * action_index + 1)) & 0x07;
                if (action >> 1) & 0x03 == self.switch_index
                    && (action & 0x01 != 0) == self.is_up
                {
                    // bit 4 is the energy bow: pressed or released
                    self.set_button_state(data & 0x10 != 0);
                }
            }
        } else {
            // U-message: bits 7..5 count buttons still pressed
            let still_pressed = (data >> 5) & 0x07;
            let pressed = data & 0x10 != 0;
            if !pressed && still_pressed == 0 {
                // all buttons released, including this one
                self.set_button_state(false);
            }
            // more than two simultaneous actions: nothing usable
        }
    }

    fn set_button_state(&mut self, pressed: bool) {
        if pressed == self.pressed {
            return;
        }
        self.pressed = pressed;
        self.behaviour.button_action(pressed);
    }
}

/// Window handle mapped onto two binary inputs (open / tilted) so the
/// upstream model stays simple. ERP1 carries the position in the high
/// nibble, ERP2 in the low nibble.
pub struct WindowHandleChannel {
    pub erp2: bool,
    /// Which of the two inputs this channel feeds.
    pub reports_tilted: bool,
    pub behaviour: BinaryInputBehaviour,
}

impl WindowHandleChannel {
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        let Some(&data) = packet.radio_user_data().first() else {
            return;
        };
        let status = packet.radio_status();
        let (tilted, closed) = if self.erp2 {
            ((data & 0x0F) == 0x0D, (data & 0x0F) == 0x0F)
        } else if status & STATUS_NU == 0 && status & STATUS_T21 != 0 {
            ((data & 0xF0) == 0xD0, (data & 0xF0) == 0xF0)
        } else {
            return; // unknown position encoding, leave inputs alone
        };
        if self.reports_tilted {
            self.behaviour.update_state(tilted, now);
        } else {
            // open means "handle not down", matching the upstream
            // windowOpen semantics
            self.behaviour.update_state(!closed, now);
        }
    }
}

/// Key-card switch. Covers ERP1 (F6-04-01), ERP2 (F6-04-02) and the
/// Eltako FKC/FKF encoding (pseudo-EEP F6-04-C0) which can also tell
/// service cards from guest cards.
pub struct KeyCardChannel {
    pub profile: EepProfile,
    /// Second input of FKC/FKF: reports card type instead of presence.
    pub service_card_detector: bool,
    pub behaviour: BinaryInputBehaviour,
}

impl KeyCardChannel {
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        let Some(&data) = packet.radio_user_data().first() else {
            return;
        };
        let status = packet.radio_status();
        let mut service_card = false;
        let inserted = match self.profile.pure() {
            0x00F6_0402 => data & 0x04 != 0,
            0x00F6_04C0 => {
                let inserted = data & 0x10 != 0;
                // insertion with an N-message marks a service card
                service_card = inserted && status & STATUS_NU != 0;
                inserted
            }
            _ => status & STATUS_NU != 0 && data == 0x70,
        };
        if self.service_card_detector {
            self.behaviour.update_state(service_card, now);
        } else {
            self.behaviour.update_state(inserted, now);
        }
    }
}

/// Smoke detector (pseudo-EEP F6-05-C0, Eltako FRW / alphaEOS GUARD):
/// alarm on one input, battery state on a second.
pub struct SmokeDetectorChannel {
    pub battery_status: bool,
    pub behaviour: BinaryInputBehaviour,
}

impl SmokeDetectorChannel {
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        let Some(&data) = packet.radio_user_data().first() else {
            return;
        };
        if self.battery_status {
            self.behaviour.update_state(data & 0x30 == 0x30, now);
        } else {
            self.behaviour.update_state(data & 0x30 == 0x10, now);
        }
    }
}

/// Liquid leakage detector (F6-05-01): water contact on one input.
pub struct LeakageDetectorChannel {
    pub behaviour: BinaryInputBehaviour,
}

impl LeakageDetectorChannel {
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        let Some(&data) = packet.radio_user_data().first() else {
            return;
        };
        self.behaviour.update_state(data == 0x11, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::testing::test_link;
    use crate::behaviour::{BinaryInputType, DsGroup, UpstreamEvent, UsageHint};
    use crate::esp3::PacketType;
    use crossbeam::channel::Receiver;

    fn rps(data: u8, status: u8) -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.set_packet_type(PacketType::Radio);
        packet.set_opt_data_length(7);
        packet.set_data_length(7);
        packet.data_mut()[0] = 0xF6;
        packet.radio_user_data_mut()[0] = data;
        packet.set_radio_sender(0xDEAD_BEEF);
        packet.set_radio_status(status);
        packet.finalize();
        packet
    }

    fn button(switch_index: u8, is_up: bool) -> (RockerButtonChannel, Receiver<UpstreamEvent>) {
        let (link, rx) = test_link(0);
        (
            RockerButtonChannel::new(switch_index, is_up, ButtonBehaviour::new(DsGroup::YellowLight, link)),
            rx,
        )
    }

    fn presses(rx: &Receiver<UpstreamEvent>) -> Vec<bool> {
        rx.try_iter()
            .map(|e| match e {
                UpstreamEvent::ButtonAction { pressed, .. } => pressed,
                other => panic!("unexpected event {:?}", other),
            })
            .collect()
    }

    #[test]
    fn a_up_press_and_release() {
        // action code 1 (rocker 0, up half), energy bow pressed
        let (mut channel, rx) = button(0, true);
        channel.handle_radio(&rps(0x30, STATUS_T21 | STATUS_NU));
        assert_eq!(presses(&rx), vec![true]);
        // U-message: all released
        channel.handle_radio(&rps(0x00, STATUS_T21));
        assert_eq!(presses(&rx), vec![false]);
    }

    #[test]
    fn b_up_press_targets_second_rocker() {
        // action code 3 (rocker 1, up half)
        let (mut channel_a, rx_a) = button(0, true);
        let (mut channel_b, rx_b) = button(1, true);
        let telegram = rps(0x70, STATUS_T21 | STATUS_NU);
        channel_a.handle_radio(&telegram);
        channel_b.handle_radio(&telegram);
        assert!(presses(&rx_a).is_empty());
        assert_eq!(presses(&rx_b), vec![true]);
    }

    #[test]
    fn second_action_decoded() {
        // A-up (code 1) + B-up (code 3) pressed simultaneously:
        // 001 1 011 1
        let telegram = rps(0b0011_0111, STATUS_T21 | STATUS_NU);
        let (mut channel_b, rx_b) = button(1, true);
        channel_b.handle_radio(&telegram);
        assert_eq!(presses(&rx_b), vec![true]);
    }

    #[test]
    fn duplicate_press_not_repeated() {
        let (mut channel, rx) = button(0, true);
        channel.handle_radio(&rps(0x30, STATUS_T21 | STATUS_NU));
        channel.handle_radio(&rps(0x30, STATUS_T21 | STATUS_NU));
        assert_eq!(presses(&rx), vec![true]);
    }

    #[test]
    fn release_without_press_ignored() {
        let (mut channel, rx) = button(0, true);
        channel.handle_radio(&rps(0x00, STATUS_T21));
        assert!(presses(&rx).is_empty());
    }

    fn window_input(
        erp2: bool,
        reports_tilted: bool,
    ) -> (WindowHandleChannel, Receiver<UpstreamEvent>) {
        let (link, rx) = test_link(0);
        let input_type = if reports_tilted {
            BinaryInputType::WindowTilted
        } else {
            BinaryInputType::WindowOpen
        };
        (
            WindowHandleChannel {
                erp2,
                reports_tilted,
                behaviour: BinaryInputBehaviour::new(
                    input_type,
                    UsageHint::Undefined,
                    DsGroup::BlackJoker,
                    link,
                ),
            },
            rx,
        )
    }

    fn states(rx: &Receiver<UpstreamEvent>) -> Vec<bool> {
        rx.try_iter()
            .map(|e| match e {
                UpstreamEvent::InputState { state, .. } => state,
                other => panic!("unexpected event {:?}", other),
            })
            .collect()
    }

    #[test]
    fn window_handle_positions_erp1() {
        let now = Instant::now();
        let (mut open_input, rx) = window_input(false, false);
        // handle down = closed
        open_input.handle_radio(&rps(0xF0, STATUS_T21), now);
        assert_eq!(states(&rx), vec![false]);
        // handle sideways = open
        open_input.handle_radio(&rps(0xC0, STATUS_T21), now);
        assert_eq!(states(&rx), vec![true]);

        let (mut tilted_input, rx) = window_input(false, true);
        tilted_input.handle_radio(&rps(0xD0, STATUS_T21), now);
        assert_eq!(states(&rx), vec![true]);
        tilted_input.handle_radio(&rps(0xC0, STATUS_T21), now);
        assert_eq!(states(&rx), vec![false]);
        // N-message is not a position report
        tilted_input.handle_radio(&rps(0xD0, STATUS_T21 | STATUS_NU), now);
        assert!(states(&rx).is_empty());
    }

    #[test]
    fn window_handle_positions_erp2() {
        let now = Instant::now();
        let (mut tilted_input, rx) = window_input(true, true);
        tilted_input.handle_radio(&rps(0x0D, 0x00), now);
        assert_eq!(states(&rx), vec![true]);
        tilted_input.handle_radio(&rps(0x0F, 0x00), now);
        assert_eq!(states(&rx), vec![false]);
    }

    #[test]
    fn key_card_fkc_service_card() {
        let now = Instant::now();
        let (link, rx) = test_link(0);
        let mut inserted = KeyCardChannel {
            profile: EepProfile(0x00F6_04C0),
            service_card_detector: false,
            behaviour: BinaryInputBehaviour::new(
                BinaryInputType::Generic,
                UsageHint::Undefined,
                DsGroup::BlackJoker,
                link,
            ),
        };
        inserted.handle_radio(&rps(0x10, 0x30), now);
        assert_eq!(states(&rx), vec![true]);
        inserted.handle_radio(&rps(0x00, 0x20), now);
        assert_eq!(states(&rx), vec![false]);

        let (link, rx) = test_link(1);
        let mut service = KeyCardChannel {
            profile: EepProfile(0x00F6_04C0),
            service_card_detector: true,
            behaviour: BinaryInputBehaviour::new(
                BinaryInputType::Generic,
                UsageHint::Undefined,
                DsGroup::BlackJoker,
                link,
            ),
        };
        // guest card: insertion with U-message
        service.handle_radio(&rps(0x10, 0x20), now);
        assert!(states(&rx).is_empty() || states(&rx) == vec![false]);
        // service card: insertion with N-message
        service.handle_radio(&rps(0x10, 0x30), now);
        assert_eq!(states(&rx), vec![true]);
    }

    #[test]
    fn smoke_detector_alarm_and_battery() {
        let now = Instant::now();
        let (link, alarm_rx) = test_link(0);
        let mut alarm = SmokeDetectorChannel {
            battery_status: false,
            behaviour: BinaryInputBehaviour::new(
                BinaryInputType::Smoke,
                UsageHint::Room,
                DsGroup::BlackJoker,
                link,
            ),
        };
        alarm.handle_radio(&rps(0x10, 0x30), now);
        assert_eq!(states(&alarm_rx), vec![true]);
        alarm.handle_radio(&rps(0x00, 0x20), now);
        assert_eq!(states(&alarm_rx), vec![false]);

        let (link, bat_rx) = test_link(1);
        let mut battery = SmokeDetectorChannel {
            battery_status: true,
            behaviour: BinaryInputBehaviour::new(
                BinaryInputType::LowBattery,
                UsageHint::Room,
                DsGroup::BlackJoker,
                link,
            ),
        };
        battery.handle_radio(&rps(0x30, 0x30), now);
        assert_eq!(states(&bat_rx), vec![true]);
    }

    #[test]
    fn leakage_detector() {
        let now = Instant::now();
        let (link, rx) = test_link(0);
        let mut channel = LeakageDetectorChannel {
            behaviour: BinaryInputBehaviour::new(
                BinaryInputType::Generic,
                UsageHint::Undefined,
                DsGroup::BlackJoker,
                link,
            ),
        };
        channel.handle_radio(&rps(0x11, 0x30), now);
        assert_eq!(states(&rx), vec![true]);
    }
}
