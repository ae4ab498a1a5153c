// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # ESP3 wire protocol
//!
//! Framing, CRC and the packet model for the EnOcean Serial Protocol v3.
//!
//! Frame layout:
//!
//! ```text
//! +------+----------+----------+--------+------+----------------+------+
//! | 0x55 | len (BE) | opt len  | type   | CRCH | data + optdata | CRCD |
//! |  1   |    2     |    1     |   1    |  1   |  len + optlen  |  1   |
//! +------+----------+----------+--------+------+----------------+------+
//! ```
//!
//! CRCH covers header bytes 1..4, CRCD covers data + optional data.
//! Both are CRC-8 with polynomial 0x07 ([`crc8`]).

mod frame;
mod packet;

pub mod crc8;

pub use frame::{FrameDecoder, FrameError};
pub use packet::Esp3Packet;

use std::fmt;

/// ESP3 packet type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// ERP1 radio telegram
    Radio = 0x01,
    /// Response to any request
    Response = 0x02,
    /// Radio subtelegram
    RadioSubTel = 0x03,
    /// Asynchronous event from the modem
    Event = 0x04,
    /// Common command to the modem
    CommonCommand = 0x05,
    /// Smart Ack command
    SmartAckCommand = 0x06,
    /// Remote management command
    RemoteManCommand = 0x07,
}

impl PacketType {
    /// Decode a wire byte; `None` for unknown or manufacturer-specific types.
    #[must_use]
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Radio),
            0x02 => Some(Self::Response),
            0x03 => Some(Self::RadioSubTel),
            0x04 => Some(Self::Event),
            0x05 => Some(Self::CommonCommand),
            0x06 => Some(Self::SmartAckCommand),
            0x07 => Some(Self::RemoteManCommand),
            _ => None,
        }
    }
}

/// ESP3 response return codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnCode {
    Ok = 0x00,
    Error = 0x01,
    NotSupported = 0x02,
    WrongParam = 0x03,
    OperationDenied = 0x04,
}

impl ReturnCode {
    #[must_use]
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Ok),
            0x01 => Some(Self::Error),
            0x02 => Some(Self::NotSupported),
            0x03 => Some(Self::WrongParam),
            0x04 => Some(Self::OperationDenied),
            _ => None,
        }
    }
}

// Common commands issued by this connector.

/// Read modem SW/HW version, chip ID.
pub const CO_RD_VERSION: u8 = 0x03;
/// Read ID range base number.
pub const CO_RD_IDBASE: u8 = 0x08;

/// Smart Ack: write learn mode (6 parameter bytes).
pub const SA_WR_LEARNMODE: u8 = 0x01;

/// Radio status byte: RPS T21 bit.
pub const STATUS_T21: u8 = 0x20;
/// Radio status byte: RPS N/U bit, set for N-messages.
pub const STATUS_NU: u8 = 0x10;
/// Radio status byte: repeater hop count mask.
pub const STATUS_REPEATER_MASK: u8 = 0x0F;

/// Broadcast destination address.
pub const BROADCAST_ADDRESS: u32 = 0xFFFF_FFFF;

/// LRN bit: bit 3 of data byte 0 (1BS) / data byte 3 (4BS).
/// Cleared = teach-in, set = operational data.
pub const LRN_BIT: u8 = 0x08;
/// 4BS teach-in: "EEP info valid" bit (bit 7 of data byte 3).
pub const LRN_EEP_INFO_VALID: u8 = 0x80;

/// Error from interpreting a response packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseError {
    /// The packet is not a response or carries no return code.
    WrongPacket,
    /// The modem answered with a non-OK return code.
    Status(ReturnCode),
    /// The modem answered with a return code outside the specification.
    UnknownStatus(u8),
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongPacket => write!(f, "packet is not a command response"),
            Self::Status(code) => write!(f, "modem returned {:?}", code),
            Self::UnknownStatus(b) => write!(f, "modem returned unknown status 0x{:02X}", b),
        }
    }
}

impl std::error::Error for ResponseError {}
