// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Pure EEP classification of incoming radio telegrams.
//!
//! RPS telegrams carry no explicit teach-in; their profile is inferred from
//! the status byte (T21, N/U) and the first data byte:
//!
//! ```text
//! T21 NU   D[0] bits 7..0   RORG FUNC TYPE  device
//! --- --   --------------   ---- ---- ----  -------------------------
//!  1   0   1 1 x x x x x x  F6   10   00    window handle (ERP1)
//!  x   x   0 1 0 0 1 1 x x  F6   10   01    window handle (ERP2)
//!  1   x   0 x x x 0 x x x  F6   02   ??    2-rocker (overlaps key card)
//!  0   x   x x x x x x x x  F6   03   ??    4-rocker
//! ```
//!
//! Key-card switches overlap with the 2-rocker signature; when ambiguous the
//! 2-rocker wins and a variant switch can correct it later.
//!
//! 4BS teach-in layout:
//!
//! ```text
//!      D[0]      |      D[1]      |      D[2]      |        D[3]
//! f f f f f f t t  t t t t t m m m  m m m m m m m m  LRN EEP x x LRN x x x
//!    FUNC     |       TYPE  |     MANUFACTURER     | typ ok      bit
//! ```

use super::{EepProfile, Manufacturer, Rorg, FUNC_UNKNOWN, MANUFACTURER_UNKNOWN, TYPE_UNKNOWN};
use crate::esp3::{Esp3Packet, LRN_BIT, LRN_EEP_INFO_VALID, STATUS_NU, STATUS_T21};

/// Whether the telegram carries information usable for teach-in.
///
/// `min_learn_dbm` gates the implicit (RPS) teach-in by radio strength; with
/// `min_dbm_for_all` the gate also applies to explicit 1BS/4BS/Smart-Ack
/// teach-in. A gate of 0 disables the check.
///
/// 4BS teach-in without valid EEP info (D3 bit 7 cleared) still counts as
/// teach-in; [`profile`] returns unknown FUNC/TYPE for it.
#[must_use]
pub fn has_teach_info(packet: &Esp3Packet, min_learn_dbm: i32, min_dbm_for_all: bool) -> bool {
    let strength_ok = min_learn_dbm == 0 || packet.radio_dbm() > min_learn_dbm;
    let explicit_ok = !min_dbm_for_all || strength_ok;
    match packet.rorg_byte().and_then(Rorg::from_wire) {
        // every RPS telegram carries its (limited) signature
        Some(Rorg::Rps) => strength_ok,
        // 1BS/4BS teach-in if the LRN bit is *cleared*
        Some(Rorg::Bs1) => {
            packet.radio_user_data().first().is_some_and(|d| d & LRN_BIT == 0) && explicit_ok
        }
        Some(Rorg::Bs4) => {
            packet.radio_user_data().get(3).is_some_and(|d| d & LRN_BIT == 0) && explicit_ok
        }
        // smart ack learn requests are teach-in by definition
        Some(Rorg::SmartAckLearnRequest) => explicit_ok,
        _ => false,
    }
}

/// Derive the EEP profile of a radio telegram.
///
/// Returns [`EepProfile::UNKNOWN`] when the telegram carries no usable
/// signature.
#[must_use]
pub fn profile(packet: &Esp3Packet) -> EepProfile {
    let Some(rorg) = packet.rorg_byte().and_then(Rorg::from_wire) else {
        return EepProfile::UNKNOWN;
    };
    let user = packet.radio_user_data();
    match rorg {
        Rorg::Rps => {
            let Some(&data) = user.first() else {
                return EepProfile::UNKNOWN;
            };
            let status = packet.radio_status();
            // ERP2 has neither T21 nor N/U, check the data-only signature first
            if data & 0xFC == 0x4C {
                EepProfile::new(Rorg::Rps as u8, 0x10, 0x01)
            } else if status & STATUS_T21 != 0 {
                if data & 0x80 != 0 && status & STATUS_NU == 0 {
                    // ERP1 window handle
                    EepProfile::new(Rorg::Rps as u8, 0x10, 0x00)
                } else if data & 0x88 == 0 {
                    // 2-rocker; key cards overlap and stay indistinguishable here
                    EepProfile::new(Rorg::Rps as u8, 0x02, TYPE_UNKNOWN)
                } else {
                    EepProfile::UNKNOWN
                }
            } else {
                // T21 cleared: must be a 4-rocker
                EepProfile::new(Rorg::Rps as u8, 0x03, TYPE_UNKNOWN)
            }
        }
        Rorg::Bs1 => {
            if has_teach_info(packet, 0, false) {
                // only one 1BS EEP is defined: single input contact
                EepProfile::new(Rorg::Bs1 as u8, 0x00, 0x01)
            } else {
                EepProfile::UNKNOWN
            }
        }
        Rorg::Bs4 => {
            if !has_teach_info(packet, 0, false) {
                return EepProfile::UNKNOWN;
            }
            if user.len() == 4 && user[3] & LRN_EEP_INFO_VALID != 0 {
                let func = user[0] >> 2;
                let eep_type = ((user[0] & 0x03) << 5) | (user[1] >> 3);
                EepProfile::new(Rorg::Bs4 as u8, func, eep_type)
            } else {
                // teach-in without EEP info
                EepProfile::new(Rorg::Bs4 as u8, FUNC_UNKNOWN, TYPE_UNKNOWN)
            }
        }
        Rorg::SmartAckLearnRequest => {
            if user.len() < 5 {
                return EepProfile::UNKNOWN;
            }
            EepProfile::new(user[2], user[3], user[4])
        }
        _ => EepProfile::UNKNOWN,
    }
}

/// Manufacturer code of a teach-in telegram.
///
/// 11 bits, only carried by 4BS (with EEP info) and Smart-Ack learn
/// telegrams; [`MANUFACTURER_UNKNOWN`] otherwise.
#[must_use]
pub fn manufacturer(packet: &Esp3Packet) -> Manufacturer {
    if !has_teach_info(packet, 0, false) {
        return MANUFACTURER_UNKNOWN;
    }
    let user = packet.radio_user_data();
    match packet.rorg_byte().and_then(Rorg::from_wire) {
        Some(Rorg::Bs4) if user.len() == 4 && user[3] & LRN_EEP_INFO_VALID != 0 => {
            (Manufacturer::from(user[1] & 0x07) << 8) | Manufacturer::from(user[2])
        }
        Some(Rorg::SmartAckLearnRequest) if user.len() >= 2 => {
            (Manufacturer::from(user[0] & 0x07) << 8) | Manufacturer::from(user[1])
        }
        _ => MANUFACTURER_UNKNOWN,
    }
}
