// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! 1BS single input contact (D5-00-01), the only EEP defined for 1BS.
//!
//! Bit 0 of the single data byte carries the contact; a profile variant
//! flips the interpretation (window contacts report "closed" as active).

use crate::behaviour::BinaryInputBehaviour;
use crate::eep::{self, Rorg};
use crate::esp3::Esp3Packet;
use std::time::Instant;

pub struct SingleContactChannel {
    /// Which raw contact level is reported as `true`.
    pub active_state: bool,
    pub behaviour: BinaryInputBehaviour,
}

impl SingleContactChannel {
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        if eep::has_teach_info(packet, 0, false) {
            return;
        }
        if packet.rorg_byte() != Some(Rorg::Bs1 as u8) || packet.radio_user_data_length() != 1 {
            return;
        }
        let data = packet.radio_user_data()[0];
        self.behaviour
            .update_state((data & 0x01 != 0) == self.active_state, now);
    }
}
