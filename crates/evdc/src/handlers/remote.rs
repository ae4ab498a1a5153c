// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Remote-control devices (pseudo-RORG 0xFF).
//!
//! These are not radios we listen to but actors we command: the connector
//! transmits RPS telegrams from an ID-base-derived sender address,
//! simulating the physical rocker switch the actor was taught to obey.
//! Relays and switched lights get a short press/release pair; blinds use
//! the usual long-press/short-press semantics (a press longer than one
//! second latches the actuator into permanent movement, a short press
//! stops it).
//!
//! All timing runs over the engine's action timers: a press schedules its
//! own release, never blocking the main loop.

use super::RadioOut;
use crate::behaviour::OutputBehaviour;
use crate::config::{
    BLIND_LONGPRESS_TIME, BLIND_SHORTPRESS_TIME, BUTTON_PRESS_TIME, TEACH_IN_PRESS_TIME,
};
use crate::esp3::{Esp3Packet, BROADCAST_ADDRESS, STATUS_NU, STATUS_T21};
use std::time::Instant;

/// Build one simulated switch telegram (press or release).
#[must_use]
pub fn switch_beacon(sender: u32, right: bool, up: bool, press: bool) -> Esp3Packet {
    let mut packet = Esp3Packet::new();
    packet.init_for_rorg(0xF6, 0);
    packet.set_radio_destination(BROADCAST_ADDRESS);
    if press {
        let mut data = 0x10; // energy bow pressed
        if up {
            data |= 0x20;
        }
        if right {
            data |= 0x40;
        }
        packet.radio_user_data_mut()[0] = data;
        packet.set_radio_status(STATUS_NU | STATUS_T21);
    } else {
        packet.radio_user_data_mut()[0] = 0x00;
        packet.set_radio_status(STATUS_T21);
    }
    packet.set_radio_sender(sender);
    packet
}

/// On/off relay or switched light commanded via simulated presses:
/// key up switches on, key down switches off.
pub struct RelayControlChannel {
    /// ID-base-derived sender address learned into the actor.
    pub sender: u32,
    release_at: Option<(Instant, bool)>,
    pub output: OutputBehaviour,
}

impl RelayControlChannel {
    #[must_use]
    pub fn new(sender: u32, output: OutputBehaviour) -> Self {
        Self {
            sender,
            release_at: None,
            output,
        }
    }

    /// Apply the requested output value by pressing the matching key.
    pub fn apply_output(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        if !self.output.needs_applying() {
            return;
        }
        let up = self.output.requested() >= 50.0;
        log::info!("[remote] relay 0x{:08X}: switching {}", self.sender, if up { "on" } else { "off" });
        radio.send_radio(switch_beacon(self.sender, false, up, true));
        self.release_at = Some((now + BUTTON_PRESS_TIME, up));
        self.output.value_applied();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.release_at.map(|(at, _)| at)
    }

    pub fn poll_actions(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        if let Some((at, up)) = self.release_at {
            if now >= at {
                self.release_at = None;
                radio.send_radio(switch_beacon(self.sender, false, up, false));
            }
        }
    }

    /// Simulated teach-in press so an actor can learn this address.
    pub fn teach_in_signal(&mut self, variant: u8, now: Instant, radio: &mut dyn RadioOut) {
        let right = variant & 0x02 != 0;
        let up = variant & 0x01 == 0;
        radio.send_radio(switch_beacon(self.sender, right, up, true));
        self.release_at = Some((now + TEACH_IN_PRESS_TIME, up));
    }
}

/// Time-controlled blind actuator.
pub struct BlindControlChannel {
    pub sender: u32,
    /// -1 = moving down, 0 = stopped, +1 = moving up.
    moving_direction: i8,
    /// Pending release of a held button; `None` when the button is free.
    release_at: Option<Instant>,
    /// Where we believe the blind ended up, 0..=100.
    position_estimate: f64,
    pub output: OutputBehaviour,
}

impl BlindControlChannel {
    #[must_use]
    pub fn new(sender: u32, output: OutputBehaviour) -> Self {
        Self {
            sender,
            moving_direction: 0,
            release_at: None,
            // assume fully up at start
            position_estimate: 100.0,
            output,
        }
    }

    pub fn apply_output(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        if !self.output.needs_applying() {
            return;
        }
        let target = self.output.requested();
        let direction = if (target - self.position_estimate).abs() < 1.0 {
            0
        } else if target > self.position_estimate {
            1
        } else {
            -1
        };
        self.change_movement(direction, now, radio);
        self.position_estimate = target;
        self.output.value_applied();
    }

    /// Stop an ongoing movement (explicit stop request).
    pub fn stop(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        self.change_movement(0, now, radio);
    }

    fn change_movement(&mut self, direction: i8, now: Instant, radio: &mut dyn RadioOut) {
        if direction == self.moving_direction {
            return;
        }
        let previous = self.moving_direction;
        self.moving_direction = direction;
        log::debug!(
            "[remote] blind 0x{:08X}: movement {} -> {}",
            self.sender,
            previous,
            direction
        );
        if direction == 0 {
            if self.release_at.take().is_some() {
                // start button still held: release it right now
                radio.send_radio(switch_beacon(self.sender, false, previous > 0, false));
            } else {
                // short press in the current direction stops the blind
                // without latching a new movement
                radio.send_radio(switch_beacon(self.sender, false, previous > 0, true));
                self.release_at = Some(now + BLIND_SHORTPRESS_TIME);
            }
        } else {
            // press and hold past the latch point
            radio.send_radio(switch_beacon(self.sender, false, direction > 0, true));
            self.release_at = Some(now + BLIND_LONGPRESS_TIME);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.release_at
    }

    pub fn poll_actions(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        if let Some(at) = self.release_at {
            if now >= at {
                self.release_at = None;
                radio.send_radio(switch_beacon(self.sender, false, false, false));
            }
        }
    }

    pub fn teach_in_signal(&mut self, variant: u8, now: Instant, radio: &mut dyn RadioOut) {
        let right = variant & 0x02 != 0;
        let up = variant & 0x01 == 0;
        radio.send_radio(switch_beacon(self.sender, right, up, true));
        self.release_at = Some(now + TEACH_IN_PRESS_TIME);
    }
}
