// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Learn-in controller.
//!
//! Learn mode is armed for a bounded time on explicit user request and is
//! never extended by traffic. The first telegram carrying valid teach-in
//! information (RPS gated by radio strength unless the proximity check is
//! skipped) either pairs a new address or unpairs a known one, then learn
//! mode disarms itself so repetitions of the same user action cannot
//! toggle the device again.

use crate::eep::{self, EepProfile, Manufacturer};
use crate::esp3::Esp3Packet;
use std::time::{Duration, Instant};

/// What one incoming telegram means to the learn controller.
#[derive(Debug, PartialEq, Eq)]
pub enum LearnOutcome {
    /// Not in learn mode; dispatch normally.
    NotLearning,
    /// In learn mode but the telegram carries no usable teach-in info.
    NoTeachInfo,
    /// Unknown sender with valid teach-in: pair it.
    LearnIn {
        profile: EepProfile,
        manufacturer: Manufacturer,
    },
    /// Known sender with valid teach-in: unpair it.
    LearnOut,
}

pub struct LearnController {
    learning: bool,
    skip_proximity: bool,
    min_learn_dbm: i32,
    deadline: Option<Instant>,
}

impl LearnController {
    #[must_use]
    pub fn new(min_learn_dbm: i32) -> Self {
        Self {
            learning: false,
            skip_proximity: false,
            min_learn_dbm,
            deadline: None,
        }
    }

    #[must_use]
    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Arm or disarm learn mode.
    pub fn set_learn_mode(
        &mut self,
        enable: bool,
        skip_proximity: bool,
        timeout: Duration,
        now: Instant,
    ) {
        self.learning = enable;
        self.skip_proximity = skip_proximity;
        self.deadline = enable.then(|| now + timeout);
        log::info!(
            "[learn] learn mode {} (proximity check {})",
            if enable { "armed" } else { "disarmed" },
            if skip_proximity { "skipped" } else { "active" }
        );
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Expire the learn window.
    pub fn poll(&mut self, now: Instant) {
        if self.learning && self.deadline.is_some_and(|t| now >= t) {
            log::info!("[learn] learn window expired");
            self.learning = false;
            self.deadline = None;
        }
    }

    /// Judge one incoming radio telegram. On any valid teach-in action the
    /// controller disarms itself, successful or not.
    pub fn evaluate(&mut self, packet: &Esp3Packet, sender_known: bool) -> LearnOutcome {
        if !self.learning {
            return LearnOutcome::NotLearning;
        }
        let gate = if self.skip_proximity {
            0
        } else {
            self.min_learn_dbm
        };
        if !eep::has_teach_info(packet, gate, false) {
            return LearnOutcome::NoTeachInfo;
        }
        // one learn action per arming
        self.learning = false;
        self.deadline = None;
        if sender_known {
            LearnOutcome::LearnOut
        } else {
            LearnOutcome::LearnIn {
                profile: eep::profile(packet),
                manufacturer: eep::manufacturer(packet),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_LEARN_DBM;
    use crate::esp3::PacketType;

    fn teach_4bs(dbm: u8) -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(0xA5, 0);
        packet
            .radio_user_data_mut()
            .copy_from_slice(&[0x08, 0x28, 0x02, 0x80]);
        packet.set_radio_sender(0x1122_3344);
        packet.opt_data_mut()[5] = dbm;
        packet.finalize();
        assert_eq!(packet.packet_type(), Some(PacketType::Radio));
        packet
    }

    fn rps_near() -> Esp3Packet {
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(0xF6, 0);
        packet.radio_user_data_mut()[0] = 0x30;
        packet.set_radio_sender(0xDEAD_BEEF);
        packet.set_radio_status(0x30);
        packet.opt_data_mut()[5] = 0x28; // -40 dBm
        packet.finalize();
        packet
    }

    #[test]
    fn learn_in_then_self_disarm() {
        let mut learn = LearnController::new(MIN_LEARN_DBM);
        let now = Instant::now();
        learn.set_learn_mode(true, false, Duration::from_secs(60), now);
        let outcome = learn.evaluate(&teach_4bs(0x2D), false);
        assert!(matches!(outcome, LearnOutcome::LearnIn { profile, manufacturer }
            if profile.pure() == 0x00A5_0205 && manufacturer == 0x002));
        assert!(!learn.is_learning());
        // the repeated teach-in telegram no longer acts
        assert_eq!(learn.evaluate(&teach_4bs(0x2D), true), LearnOutcome::NotLearning);
    }

    #[test]
    fn known_sender_learns_out() {
        let mut learn = LearnController::new(MIN_LEARN_DBM);
        let now = Instant::now();
        learn.set_learn_mode(true, false, Duration::from_secs(60), now);
        assert_eq!(learn.evaluate(&teach_4bs(0x2D), true), LearnOutcome::LearnOut);
    }

    #[test]
    fn rps_gated_by_proximity() {
        let mut learn = LearnController::new(MIN_LEARN_DBM);
        let now = Instant::now();
        learn.set_learn_mode(true, false, Duration::from_secs(60), now);
        let mut far = rps_near();
        far.opt_data_mut()[5] = 0x46; // -70 dBm
        far.finalize();
        assert_eq!(learn.evaluate(&far, false), LearnOutcome::NoTeachInfo);
        assert!(learn.is_learning(), "failed gate must not disarm");
        // skipping the proximity check accepts the same telegram
        learn.set_learn_mode(true, true, Duration::from_secs(60), now);
        assert!(matches!(learn.evaluate(&far, false), LearnOutcome::LearnIn { .. }));
    }

    #[test]
    fn window_expiry_disarms() {
        let mut learn = LearnController::new(MIN_LEARN_DBM);
        let now = Instant::now();
        learn.set_learn_mode(true, false, Duration::from_secs(60), now);
        learn.poll(now + Duration::from_secs(61));
        assert!(!learn.is_learning());
        assert_eq!(learn.evaluate(&rps_near(), false), LearnOutcome::NotLearning);
    }
}
