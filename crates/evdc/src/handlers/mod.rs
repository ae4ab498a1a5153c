// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # Channel handlers
//!
//! A channel handler binds one decoded telegram aspect to one behaviour.
//! The fixed set of handler shapes is a tagged enum ([`ChannelHandler`]):
//! the descriptor-driven sensor codec covers most 4BS profiles, the rest
//! are hand-written (RPS rockers, window handles, key cards, detectors,
//! 1BS contact, the A5-20-01 valve with its outgoing direction, the
//! A5-13-0X weather station, and the simulated remote controls).
//!
//! Handlers that receive a malformed or unexpected telegram ignore it;
//! nothing propagates upward as an error.

pub mod descriptor;
pub mod onebs;
pub mod remote;
pub mod rps;
pub mod table;
pub mod valve;
pub mod weather;

use crate::eep;
use crate::esp3::{Esp3Packet, LRN_BIT};
use descriptor::{apply_extractor, BehaviourSlot, SensorDescriptor};
use onebs::SingleContactChannel;
use remote::{BlindControlChannel, RelayControlChannel};
use rps::{
    KeyCardChannel, LeakageDetectorChannel, RockerButtonChannel, SmokeDetectorChannel,
    WindowHandleChannel,
};
use std::time::{Duration, Instant};
use valve::ValveOutputChannel;
use weather::WeatherStationChannel;

/// Transmission access handed to handlers that talk back to the radio.
pub trait RadioOut {
    fn send_radio(&mut self, packet: Esp3Packet);
}

/// One outgoing 4BS frame under construction, shared by all handlers of a
/// device during an outgoing cycle.
#[derive(Debug, Default)]
pub struct OutgoingFrame {
    data: Option<u32>,
    /// A handler wants another outgoing cycle after this one (valve
    /// service sequence).
    pub request_follow_up: bool,
}

impl OutgoingFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current 4BS word, starting the frame on first use. Operational
    /// telegrams always carry the LRN bit set.
    #[must_use]
    pub fn fourbs_data(&mut self) -> u32 {
        *self.data.get_or_insert(u32::from(LRN_BIT))
    }

    pub fn set_fourbs_data(&mut self, data: u32) {
        self.data = Some(data);
    }

    /// `None` when no handler contributed anything.
    #[must_use]
    pub fn data(&self) -> Option<u32> {
        self.data
    }
}

/// Descriptor-driven sensor or binary input channel.
pub struct SensorChannel {
    pub descriptor: &'static SensorDescriptor,
    pub slot: BehaviourSlot,
}

impl SensorChannel {
    #[must_use]
    pub fn new(descriptor: &'static SensorDescriptor, slot: BehaviourSlot) -> Self {
        Self { descriptor, slot }
    }

    fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        if eep::has_teach_info(packet, 0, false) {
            return;
        }
        let data = packet.radio_user_data();
        if data.is_empty() {
            return;
        }
        apply_extractor(self.descriptor, &mut self.slot, data, now);
    }
}

/// The fixed set of handler shapes.
pub enum ChannelHandler {
    Sensor(SensorChannel),
    RockerButton(RockerButtonChannel),
    WindowHandle(WindowHandleChannel),
    KeyCard(KeyCardChannel),
    SmokeDetector(SmokeDetectorChannel),
    LeakageDetector(LeakageDetectorChannel),
    SingleContact(SingleContactChannel),
    ValveOutput(ValveOutputChannel),
    WeatherStation(WeatherStationChannel),
    RelayControl(RelayControlChannel),
    BlindControl(BlindControlChannel),
}

impl ChannelHandler {
    /// Offer an incoming radio packet; every handler decides on its own
    /// whether to act.
    pub fn handle_radio(&mut self, packet: &Esp3Packet, now: Instant) {
        match self {
            Self::Sensor(c) => c.handle_radio(packet, now),
            Self::RockerButton(c) => c.handle_radio(packet),
            Self::WindowHandle(c) => c.handle_radio(packet, now),
            Self::KeyCard(c) => c.handle_radio(packet, now),
            Self::SmokeDetector(c) => c.handle_radio(packet, now),
            Self::LeakageDetector(c) => c.handle_radio(packet, now),
            Self::SingleContact(c) => c.handle_radio(packet, now),
            Self::ValveOutput(c) => c.handle_radio(packet),
            Self::WeatherStation(c) => c.handle_radio(packet, now),
            // remote controls only transmit
            Self::RelayControl(_) | Self::BlindControl(_) => {}
        }
    }

    /// Contribute to the device's shared outgoing 4BS frame.
    pub fn collect_outgoing(&mut self, frame: &mut OutgoingFrame) {
        if let Self::ValveOutput(c) = self {
            c.collect_outgoing(frame);
        }
    }

    /// Route a new output value into this channel. Returns true when the
    /// change must go out through the aggregated 4BS frame (rather than
    /// being transmitted directly by the handler).
    pub fn apply_output(&mut self, value: f64, now: Instant, radio: &mut dyn RadioOut) -> bool {
        match self {
            Self::ValveOutput(c) => {
                c.output.set_requested(value);
                c.output.needs_applying()
            }
            Self::RelayControl(c) => {
                c.output.set_requested(value);
                c.apply_output(now, radio);
                false
            }
            Self::BlindControl(c) => {
                c.output.set_requested(value);
                c.apply_output(now, radio);
                false
            }
            _ => false,
        }
    }

    /// Mark climate-control idle (summer) mode on output channels.
    pub fn set_climate_idle(&mut self, idle: bool) {
        if let Self::ValveOutput(c) = self {
            c.output.climate_idle = idle;
        }
    }

    /// Request one valve service (anti-calcification) cycle.
    pub fn request_prophylaxis(&mut self) {
        if let Self::ValveOutput(c) = self {
            c.output.run_prophylaxis = true;
        }
    }

    /// Earliest pending direct-action deadline (simulated button releases).
    #[must_use]
    pub fn next_action_deadline(&self) -> Option<Instant> {
        match self {
            Self::RelayControl(c) => c.next_deadline(),
            Self::BlindControl(c) => c.next_deadline(),
            _ => None,
        }
    }

    /// Fire due direct actions.
    pub fn poll_actions(&mut self, now: Instant, radio: &mut dyn RadioOut) {
        match self {
            Self::RelayControl(c) => c.poll_actions(now, radio),
            Self::BlindControl(c) => c.poll_actions(now, radio),
            _ => {}
        }
    }

    /// Issue a teach-in signal towards a remote actor. Returns the number
    /// of supported variants, or 0 when this channel cannot teach.
    pub fn teach_in_signal(&mut self, variant: u8, now: Instant, radio: &mut dyn RadioOut) -> u8 {
        match self {
            Self::RelayControl(c) => {
                if variant < 4 {
                    c.teach_in_signal(variant, now, radio);
                }
                4
            }
            Self::BlindControl(c) => {
                if variant < 4 {
                    c.teach_in_signal(variant, now, radio);
                }
                4
            }
            _ => 0,
        }
    }

    /// Interval after which silence from the device marks this channel's
    /// source absent, if it has one.
    #[must_use]
    pub fn alive_sign_interval(&self) -> Option<Duration> {
        match self {
            Self::Sensor(c) if c.descriptor.alive_sign_interval_s > 0 => Some(
                Duration::from_secs(u64::from(c.descriptor.alive_sign_interval_s)),
            ),
            _ => None,
        }
    }

    /// Short description for device dumps.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Sensor(c) => format!(
                "{}, {:.1}..{:.1} {}",
                c.descriptor.label, c.descriptor.min, c.descriptor.max, c.descriptor.unit
            ),
            Self::RockerButton(c) => format!(
                "pushbutton (rocker {}, {})",
                c.switch_index,
                if c.is_up { "up" } else { "down" }
            ),
            Self::WindowHandle(c) => format!(
                "window handle ({})",
                if c.reports_tilted { "tilted" } else { "open" }
            ),
            Self::KeyCard(c) => {
                if c.service_card_detector {
                    "key card switch (service card)".into()
                } else {
                    "key card switch".into()
                }
            }
            Self::SmokeDetector(c) => {
                if c.battery_status {
                    "smoke detector (battery)".into()
                } else {
                    "smoke detector (alarm)".into()
                }
            }
            Self::LeakageDetector(_) => "leakage detector".into(),
            Self::SingleContact(_) => "single contact".into(),
            Self::ValveOutput(_) => "valve output, 0..100 %".into(),
            Self::WeatherStation(_) => "dawn/temp/wind/rain/sun outdoor sensor".into(),
            Self::RelayControl(_) => "simulated switch (relay)".into(),
            Self::BlindControl(_) => "simulated switch (blind)".into(),
        }
    }
}
