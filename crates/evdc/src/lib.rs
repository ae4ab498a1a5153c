// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # evdc - EnOcean virtual device connector core
//!
//! Bridges physical EnOcean radio devices to a digitalSTROM ("dS") control
//! bus. One side terminates the EnOcean Serial Protocol v3 (ESP3) spoken by
//! TCM310-class radio modems; the other side exposes every learned-in radio
//! device as one or more logical, addressable sub-devices with typed sensor,
//! input, button and output channels.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          Engine main loop                          |
//! |   crossbeam select over {io bytes, control msgs, timer deadlines}  |
//! +--------------------------------------------------------------------+
//! |  Learn controller | Device registry | Outgoing aggregator          |
//! +--------------------------------------------------------------------+
//! |  EEP classifier   | Channel handlers (table-driven + specials)     |
//! +--------------------------------------------------------------------+
//! |  Modem supervisor | Command queue (FIFO, one outstanding)          |
//! +--------------------------------------------------------------------+
//! |  ESP3 frame codec | Packet model | CRC-8                          |
//! +--------------------------------------------------------------------+
//! |  Transport (serial 57600 8N1 or TCP)  | optional reset GPIO        |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Data flow in: bytes -> frame codec -> packet -> {command queue | learn
//! controller | registry} -> channel handler -> behaviour -> upstream event.
//!
//! Data flow out: output change -> aggregator (collects one 4BS frame from
//! every handler of a device) -> packet -> frame codec -> bytes.
//!
//! ## Key types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`esp3::Esp3Packet`] | One ESP3 message with typed radio accessors |
//! | [`esp3::FrameDecoder`] | Byte-stream scanner producing whole packets |
//! | [`eep::EepProfile`] | Packed variant/RORG/FUNC/TYPE profile word |
//! | [`device::DeviceRegistry`] | Multi-map radio address -> sub-devices |
//! | [`engine::VdcEngine`] | Single-threaded cooperative main loop |
//! | [`dsuid::DsUid`] | 17-byte upstream device identifier |
//!
//! The dS API connection itself, scene logic and the outer behaviour
//! property model are out of scope; behaviours emit [`behaviour::UpstreamEvent`]s
//! on a channel and the host forwards them.

/// Behaviour sinks (sensor, binary input, button, output) and upstream events.
pub mod behaviour;
/// Protocol constants and runtime configuration. Single source of truth.
pub mod config;
/// Logical devices, the address-keyed registry and the per-RORG factories.
pub mod device;
/// dSUID derivation (UUIDv5 in the EnOcean namespace, SGTIN96).
pub mod dsuid;
/// EnOcean Equipment Profile model and the pure telegram classifier.
pub mod eep;
/// Engine: main loop, timers, control handle.
pub mod engine;
/// ESP3 wire protocol: CRC-8, frame codec, packet model.
pub mod esp3;
/// Channel handlers: descriptor-driven sensor codec and special profiles.
pub mod handlers;
/// Learn-in/learn-out controller.
pub mod learn;
/// Modem link: command queue, init handshake, liveness watchdog.
pub mod modem;
/// Byte transports (serial, TCP) and the modem reset line.
pub mod transport;

pub use behaviour::UpstreamEvent;
pub use device::{Device, DeviceRegistry, DeviceStore};
pub use dsuid::DsUid;
pub use eep::{EepProfile, Manufacturer, Rorg};
pub use engine::{EngineHandle, VdcEngine};
pub use esp3::{Esp3Packet, FrameDecoder, PacketType};
