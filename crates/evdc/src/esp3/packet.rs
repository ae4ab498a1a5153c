// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Owned ESP3 packet with typed accessors.
//!
//! A packet is a 6-byte header plus a payload buffer holding data, optional
//! data and the trailing payload CRC. Radio packets expose derived views
//! (RORG, user data span, sender, destination, RSSI, status bits); packets
//! coming out of [`super::FrameDecoder`] have both CRCs verified, packets
//! built locally become valid when [`Esp3Packet::finalize`] runs.
//!
//! Radio data layout: `RORG(1) user-data(N) sender(4) status(1) [crc(1), VLD only]`.
//! Radio optional data layout (7 bytes):
//! `subtelegrams(1) destination(4, BE) dBm(1, negated) security(1)`.

use super::crc8::{crc8, crc8_extend};
use super::{PacketType, ResponseError, ReturnCode, STATUS_REPEATER_MASK};
use crate::config::{ESP3_HEADER_BYTES, ESP3_SYNC_BYTE};
use std::fmt;

const RORG_4BS: u8 = 0xA5;
const RORG_VLD: u8 = 0xD2;
const RORG_RPS: u8 = 0xF6;
const RORG_1BS: u8 = 0xD5;

/// One ESP3 message, incoming or under construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Esp3Packet {
    header: [u8; ESP3_HEADER_BYTES],
    /// data + optional data + trailing CRC byte
    payload: Vec<u8>,
}

impl Esp3Packet {
    /// Empty packet, ready for the outgoing builders.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: [0; ESP3_HEADER_BYTES],
            payload: Vec::new(),
        }
    }

    /// Assemble from decoder output. `header` and `payload` must already be
    /// CRC-verified; the decoder is the only caller.
    pub(super) fn from_parts(header: [u8; ESP3_HEADER_BYTES], payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Command/event/response factory: one code byte plus `params`.
    #[must_use]
    pub fn new_command(packet_type: PacketType, code: u8, params: &[u8]) -> Self {
        let mut packet = Self::new();
        packet.set_packet_type(packet_type);
        packet.set_data_length(1 + params.len());
        packet.data_mut()[0] = code;
        packet.data_mut()[1..1 + params.len()].copy_from_slice(params);
        packet
    }

    // ===== header fields =====

    #[must_use]
    pub fn data_length(&self) -> usize {
        (usize::from(self.header[1]) << 8) + usize::from(self.header[2])
    }

    /// Set the data length and re-size the payload buffer (zeroed).
    pub fn set_data_length(&mut self, len: usize) {
        self.header[1] = ((len >> 8) & 0xFF) as u8;
        self.header[2] = (len & 0xFF) as u8;
        self.resize_payload();
    }

    #[must_use]
    pub fn opt_data_length(&self) -> usize {
        usize::from(self.header[3])
    }

    /// Set the optional data length and re-size the payload buffer (zeroed).
    pub fn set_opt_data_length(&mut self, len: usize) {
        self.header[3] = len as u8;
        self.resize_payload();
    }

    #[must_use]
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_wire(self.header[4])
    }

    #[must_use]
    pub fn packet_type_byte(&self) -> u8 {
        self.header[4]
    }

    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        self.header[4] = packet_type as u8;
    }

    fn resize_payload(&mut self) {
        let wanted = self.data_length() + self.opt_data_length() + 1;
        if self.payload.len() != wanted {
            self.payload.clear();
            self.payload.resize(wanted, 0);
        }
    }

    // ===== raw spans =====

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.data_length().min(self.payload.len())]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.data_length().min(self.payload.len());
        &mut self.payload[..len]
    }

    #[must_use]
    pub fn opt_data(&self) -> &[u8] {
        let start = self.data_length();
        let end = (start + self.opt_data_length()).min(self.payload.len());
        if start >= end {
            return &[];
        }
        &self.payload[start..end]
    }

    pub fn opt_data_mut(&mut self) -> &mut [u8] {
        let start = self.data_length();
        let end = (start + self.opt_data_length()).min(self.payload.len());
        if start >= end {
            return &mut [];
        }
        &mut self.payload[start..end]
    }

    // ===== command responses =====

    /// Interpret this packet as a command response.
    pub fn response_status(&self) -> Result<(), ResponseError> {
        if self.packet_type() != Some(PacketType::Response) || self.data_length() < 1 {
            return Err(ResponseError::WrongPacket);
        }
        match ReturnCode::from_wire(self.data()[0]) {
            Some(ReturnCode::Ok) => Ok(()),
            Some(code) => Err(ResponseError::Status(code)),
            None => Err(ResponseError::UnknownStatus(self.data()[0])),
        }
    }

    // ===== radio telegram views =====

    /// RORG byte, `None` for non-radio packets.
    #[must_use]
    pub fn rorg_byte(&self) -> Option<u8> {
        if self.packet_type() != Some(PacketType::Radio) || self.data_length() < 1 {
            return None;
        }
        Some(self.payload[0])
    }

    /// Number of RORG-specific user data bytes.
    #[must_use]
    pub fn radio_user_data_length(&self) -> usize {
        let Some(rorg) = self.rorg_byte() else {
            return 0;
        };
        // data = RORG + user data + 4 sender bytes + status (+ CRC for VLD)
        let overhead = if rorg == RORG_VLD { 7 } else { 6 };
        self.data_length().saturating_sub(overhead)
    }

    /// Grow the data length so it holds `len` user data bytes.
    pub fn set_radio_user_data_length(&mut self, len: usize) {
        let rorg = self.rorg_byte().unwrap_or(0);
        let overhead = if rorg == RORG_VLD { 7 } else { 6 };
        self.set_data_length(len + overhead);
    }

    #[must_use]
    pub fn radio_user_data(&self) -> &[u8] {
        let len = self.radio_user_data_length();
        if len == 0 {
            return &[];
        }
        &self.payload[1..1 + len]
    }

    pub fn radio_user_data_mut(&mut self) -> &mut [u8] {
        let len = self.radio_user_data_length();
        if len == 0 {
            return &mut [];
        }
        &mut self.payload[1..1 + len]
    }

    #[must_use]
    pub fn radio_sender(&self) -> u32 {
        let len = self.radio_user_data_length();
        if len == 0 {
            return 0;
        }
        read_be32(&self.payload[1 + len..])
    }

    pub fn set_radio_sender(&mut self, address: u32) {
        let len = self.radio_user_data_length();
        if len == 0 {
            return;
        }
        write_be32(&mut self.payload[1 + len..], address);
    }

    /// Radio status byte (last data byte, except for VLD where the CRC
    /// trails it).
    #[must_use]
    pub fn radio_status(&self) -> u8 {
        let Some(rorg) = self.rorg_byte() else {
            return 0;
        };
        let trailer = if rorg == RORG_VLD { 2 } else { 1 };
        match self.data_length().checked_sub(trailer) {
            Some(offset) => self.payload[offset],
            None => 0,
        }
    }

    pub fn set_radio_status(&mut self, status: u8) {
        let len = self.radio_user_data_length();
        if len == 0 {
            return;
        }
        self.payload[1 + len + 4] = status;
    }

    #[must_use]
    pub fn radio_repeater_count(&self) -> u8 {
        self.radio_status() & STATUS_REPEATER_MASK
    }

    #[must_use]
    pub fn radio_subtelegrams(&self) -> u8 {
        self.opt_data().first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn radio_destination(&self) -> u32 {
        let opt = self.opt_data();
        if opt.len() < 7 {
            return 0;
        }
        read_be32(&opt[1..])
    }

    pub fn set_radio_destination(&mut self, address: u32) {
        let opt = self.opt_data_mut();
        if opt.len() < 7 {
            return;
        }
        write_be32(&mut opt[1..], address);
    }

    /// RSSI in dBm; stored negated on the wire, so always <= 0.
    #[must_use]
    pub fn radio_dbm(&self) -> i32 {
        let opt = self.opt_data();
        if opt.len() < 7 {
            return 0;
        }
        -i32::from(opt[5])
    }

    #[must_use]
    pub fn radio_security_level(&self) -> u8 {
        let opt = self.opt_data();
        if opt.len() < 7 {
            return 0;
        }
        opt[6]
    }

    pub fn set_radio_security_level(&mut self, level: u8) {
        let opt = self.opt_data_mut();
        if opt.len() >= 7 {
            opt[6] = level;
        }
    }

    /// Initialise an outgoing radio telegram for the given RORG byte.
    ///
    /// Allocates the RORG-specific user data span, the 7 optional data bytes
    /// and the sending defaults (3 subtelegrams, dBm 0xFF, security 0).
    /// `vld_size` only matters for VLD and is clamped to 1..=14.
    pub fn init_for_rorg(&mut self, rorg: u8, vld_size: usize) {
        self.header = [0; ESP3_HEADER_BYTES];
        self.payload.clear();
        self.set_packet_type(PacketType::Radio);
        self.set_opt_data_length(7);
        let user_len = match rorg {
            RORG_RPS | RORG_1BS => 1,
            RORG_4BS => 4,
            RORG_VLD => vld_size.clamp(1, 14),
            _ => 0,
        };
        // order matters: RORG must be in place before the VLD overhead check
        self.set_data_length(1);
        self.payload[0] = rorg;
        self.set_radio_user_data_length(user_len);
        self.payload[0] = rorg;
        let opt = self.opt_data_mut();
        opt[0] = 3; // subtelegram count for sending
        opt[5] = 0xFF; // dBm placeholder for sending
        opt[6] = 0; // unencrypted
    }

    // ===== 4BS helpers =====

    /// The four user data bytes as one 32-bit word (DB3..DB0 MSB first).
    #[must_use]
    pub fn fourbs_data(&self) -> u32 {
        if self.rorg_byte() != Some(RORG_4BS) || self.radio_user_data_length() != 4 {
            return 0;
        }
        read_be32(self.radio_user_data())
    }

    pub fn set_fourbs_data(&mut self, data: u32) {
        if self.rorg_byte() == Some(RORG_4BS) && self.radio_user_data_length() == 4 {
            write_be32(self.radio_user_data_mut(), data);
        }
    }

    /// Embed an EEP into the FUNC/TYPE fields of a 4BS teach-in telegram.
    pub fn set_fourbs_teach_in_eep(&mut self, profile: u32) {
        if self.rorg_byte() != Some(RORG_4BS) || ((profile >> 16) & 0xFF) as u8 != RORG_4BS {
            return;
        }
        let user = self.radio_user_data_mut();
        user[0] = (((profile >> 6) & 0xFC) | ((profile >> 5) & 0x03)) as u8;
        user[1] = ((profile << 3) & 0xF8) as u8;
    }

    // ===== finalisation and encoding =====

    /// Complete the packet: sync byte, header CRC, payload CRC.
    pub fn finalize(&mut self) {
        self.resize_payload();
        self.header[0] = ESP3_SYNC_BYTE;
        self.header[ESP3_HEADER_BYTES - 1] = crc8(&self.header[1..ESP3_HEADER_BYTES - 1]);
        if let Some(last) = self.payload.len().checked_sub(1) {
            self.payload[last] = crc8_extend(0, &self.payload[..last]);
        }
    }

    /// Wire encoding of a finalised packet.
    #[must_use]
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ESP3_HEADER_BYTES + self.payload.len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Multi-line human readable dump, for debug logging and the sniffer.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = match self.packet_type() {
            Some(PacketType::Radio) => format!(
                "ESP3 RADIO rorg=0x{:02X} sender=0x{:08X} status=0x{:02X}\n\
                 - subtelegrams={} destination=0x{:08X} dBm={} repeated={} secLevel={}",
                self.rorg_byte().unwrap_or(0),
                self.radio_sender(),
                self.radio_status(),
                self.radio_subtelegrams(),
                self.radio_destination(),
                self.radio_dbm(),
                self.radio_repeater_count(),
                self.radio_security_level(),
            ),
            Some(PacketType::Response) => format!(
                "ESP3 response, return code = {}",
                self.data().first().copied().unwrap_or(0)
            ),
            Some(PacketType::CommonCommand) => format!(
                "ESP3 common command ({})",
                self.data().first().copied().unwrap_or(0)
            ),
            Some(PacketType::SmartAckCommand) => format!(
                "ESP3 SmartAck command ({})",
                self.data().first().copied().unwrap_or(0)
            ),
            Some(PacketType::Event) => format!(
                "ESP3 event message ({})",
                self.data().first().copied().unwrap_or(0)
            ),
            _ => format!("unknown ESP3 packet type ({})", self.header[4]),
        };
        text.push_str(&format!("\n- {:3} data bytes:", self.data_length()));
        for byte in self.data() {
            text.push_str(&format!(" {:02X}", byte));
        }
        if self.packet_type() == Some(PacketType::Radio) {
            text.push_str(&format!("\n- {:3} opt  bytes:", self.opt_data_length()));
            for byte in self.opt_data() {
                text.push_str(&format!(" {:02X}", byte));
            }
        }
        text
    }
}

impl Default for Esp3Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Esp3Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn read_be32(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 24)
        | (u32::from(bytes[1]) << 16)
        | (u32::from(bytes[2]) << 8)
        | u32::from(bytes[3])
}

fn write_be32(bytes: &mut [u8], value: u32) {
    bytes[0] = (value >> 24) as u8;
    bytes[1] = (value >> 16) as u8;
    bytes[2] = (value >> 8) as u8;
    bytes[3] = value as u8;
}
