// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Behaviour sinks.
//!
//! Channel handlers decode telegram bit-fields into behaviours: sensors,
//! binary inputs, buttons and outputs. Behaviours debounce/throttle what
//! they forward and emit [`UpstreamEvent`]s on a channel; the host process
//! owns the other end and forwards to the dS API (out of scope here).

use crate::config::{ALIVE_TIMEOUT_FACTOR, MIN_PUSH_INTERVAL};
use crate::dsuid::DsUid;
use crossbeam::channel::Sender;
use std::time::{Duration, Instant};

/// dS group colours used for device classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DsGroup {
    YellowLight = 1,
    GreyShadow = 2,
    BlueHeating = 3,
    CyanAudio = 4,
    MagentaVideo = 5,
    RedSecurity = 6,
    GreenAccess = 7,
    BlackJoker = 8,
}

/// Sensor semantics, mirrored from the dS sensor type enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorType {
    Temperature,
    Humidity,
    Illumination,
    SetPoint,
    FanSpeed,
    WindSpeed,
    Power,
    Energy,
}

/// Binary input semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryInputType {
    Generic,
    Motion,
    Presence,
    Smoke,
    Rain,
    LowBattery,
    WindowOpen,
    WindowTilted,
    DayNight,
    Contact,
}

/// Where a channel is physically measured / mounted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageHint {
    Undefined,
    Room,
    Outdoors,
    User,
}

/// Hardware fault states a telegram can report for its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareError {
    None,
    Overload,
    LowBattery,
}

/// What the core pushes upward. The dS API connection consumes these.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamEvent {
    SensorValue {
        dsuid: DsUid,
        channel: usize,
        sensor_type: SensorType,
        value: f64,
    },
    InputState {
        dsuid: DsUid,
        channel: usize,
        input_type: BinaryInputType,
        state: bool,
    },
    ButtonAction {
        dsuid: DsUid,
        channel: usize,
        pressed: bool,
    },
    HardwareError {
        dsuid: DsUid,
        error: HardwareError,
    },
    /// A device was learned in.
    DeviceLearnedIn { dsuid: DsUid },
    /// A device was learned out.
    DeviceLearnedOut { dsuid: DsUid },
    /// A known device sent a teach-in telegram in operational mode; the
    /// user is probably waving it at us to identify it.
    DeviceIdentified { dsuid: DsUid },
}

/// Shared emission plumbing: target channel plus addressing.
#[derive(Clone)]
pub struct UpstreamLink {
    pub sender: Sender<UpstreamEvent>,
    pub dsuid: DsUid,
    pub channel: usize,
}

impl UpstreamLink {
    fn emit(&self, event: UpstreamEvent) {
        // a full/closed upstream never blocks dispatch
        if self.sender.try_send(event).is_err() {
            log::warn!("[behaviour] upstream channel gone, event dropped");
        }
    }
}

/// A value-carrying sensor channel.
pub struct SensorBehaviour {
    pub sensor_type: SensorType,
    pub usage: UsageHint,
    pub group: DsGroup,
    pub min: f64,
    pub max: f64,
    /// Physical units per LSB of the engineering value.
    pub resolution: f64,
    /// Expected time between hardware updates.
    pub update_interval: Duration,
    /// No telegram for longer than `ALIVE_TIMEOUT_FACTOR` times this
    /// interval marks the sensor absent. Zero disables the check.
    pub alive_sign_interval: Duration,

    current_value: Option<f64>,
    last_update: Option<Instant>,
    last_push: Option<Instant>,
    /// Do not push more often than this.
    min_push_interval: Duration,
    /// Re-push an unchanged value only after this long. Zero = every update.
    changes_only_interval: Duration,
    link: UpstreamLink,
}

impl SensorBehaviour {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sensor_type: SensorType,
        usage: UsageHint,
        group: DsGroup,
        min: f64,
        max: f64,
        resolution: f64,
        update_interval: Duration,
        alive_sign_interval: Duration,
        link: UpstreamLink,
    ) -> Self {
        Self {
            sensor_type,
            usage,
            group,
            min,
            max,
            resolution,
            update_interval,
            alive_sign_interval,
            current_value: None,
            last_update: None,
            last_push: None,
            min_push_interval: MIN_PUSH_INTERVAL,
            changes_only_interval: Duration::ZERO,
            link,
        }
    }

    /// Feed a raw engineering value extracted from a telegram bit-field.
    pub fn update_engineering_value(&mut self, raw: u64, now: Instant) {
        self.update_value(self.min + (raw as f64) * self.resolution, now);
    }

    /// Feed an already scaled physical value.
    pub fn update_value(&mut self, value: f64, now: Instant) {
        self.last_update = Some(now);
        let changed = self.current_value != Some(value);
        let repush_due = self
            .last_push
            .is_none_or(|t| now > t + self.changes_only_interval);
        if !changed && !repush_due {
            return;
        }
        self.current_value = Some(value);
        let throttled = self
            .last_push
            .is_some_and(|t| now <= t + self.min_push_interval);
        if throttled {
            return;
        }
        log::debug!(
            "[behaviour] sensor {:?} = {:.3} (channel {})",
            self.sensor_type,
            value,
            self.link.channel
        );
        self.link.emit(UpstreamEvent::SensorValue {
            dsuid: self.link.dsuid.clone(),
            channel: self.link.channel,
            sensor_type: self.sensor_type,
            value,
        });
        self.last_push = Some(now);
    }

    #[must_use]
    pub fn current_value(&self) -> Option<f64> {
        self.current_value
    }

    /// Whether the sensor reported within its alive window.
    #[must_use]
    pub fn is_alive(&self, now: Instant) -> bool {
        if self.alive_sign_interval.is_zero() {
            return true;
        }
        match self.last_update {
            None => true, // nothing expected yet right after creation
            Some(t) => now - t < self.alive_sign_interval * ALIVE_TIMEOUT_FACTOR,
        }
    }
}

/// A two-state input channel.
pub struct BinaryInputBehaviour {
    pub input_type: BinaryInputType,
    pub usage: UsageHint,
    pub group: DsGroup,
    current_state: Option<bool>,
    link: UpstreamLink,
}

impl BinaryInputBehaviour {
    #[must_use]
    pub fn new(
        input_type: BinaryInputType,
        usage: UsageHint,
        group: DsGroup,
        link: UpstreamLink,
    ) -> Self {
        Self {
            input_type,
            usage,
            group,
            current_state: None,
            link,
        }
    }

    pub fn update_state(&mut self, state: bool, _now: Instant) {
        if self.current_state == Some(state) {
            return;
        }
        self.current_state = Some(state);
        log::debug!(
            "[behaviour] input {:?} = {} (channel {})",
            self.input_type,
            state,
            self.link.channel
        );
        self.link.emit(UpstreamEvent::InputState {
            dsuid: self.link.dsuid.clone(),
            channel: self.link.channel,
            input_type: self.input_type,
            state,
        });
    }

    #[must_use]
    pub fn current_state(&self) -> Option<bool> {
        self.current_state
    }
}

/// A push button channel; press/release pairs, no click logic here.
pub struct ButtonBehaviour {
    pub group: DsGroup,
    link: UpstreamLink,
}

impl ButtonBehaviour {
    #[must_use]
    pub fn new(group: DsGroup, link: UpstreamLink) -> Self {
        Self { group, link }
    }

    pub fn button_action(&mut self, pressed: bool) {
        log::info!(
            "[behaviour] button channel {} {}",
            self.link.channel,
            if pressed { "pressed" } else { "released" }
        );
        self.link.emit(UpstreamEvent::ButtonAction {
            dsuid: self.link.dsuid.clone(),
            channel: self.link.channel,
            pressed,
        });
    }
}

/// An output channel (valve position, relay state, blind position).
pub struct OutputBehaviour {
    pub group: DsGroup,
    /// Value the controller asked for, 0..=100.
    requested: f64,
    /// Value last put on air.
    applied: Option<f64>,
    /// Climate-control idle (summer mode): actuator may slow its updates.
    pub climate_idle: bool,
    /// One-shot request to run the valve service (anti-calcification) cycle.
    pub run_prophylaxis: bool,
    link: UpstreamLink,
}

impl OutputBehaviour {
    #[must_use]
    pub fn new(group: DsGroup, link: UpstreamLink) -> Self {
        Self {
            group,
            requested: 0.0,
            applied: None,
            climate_idle: false,
            run_prophylaxis: false,
            link,
        }
    }

    pub fn set_requested(&mut self, value: f64) {
        self.requested = value.clamp(0.0, 100.0);
    }

    #[must_use]
    pub fn requested(&self) -> f64 {
        self.requested
    }

    #[must_use]
    pub fn needs_applying(&self) -> bool {
        self.applied != Some(self.requested)
    }

    pub fn value_applied(&mut self) {
        self.applied = Some(self.requested);
    }

    /// Report a hardware fault seen in a telegram (an observable, not a
    /// control-flow failure).
    pub fn set_hardware_error(&mut self, error: HardwareError) {
        self.link.emit(UpstreamEvent::HardwareError {
            dsuid: self.link.dsuid.clone(),
            error,
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::test_link;
    use super::*;

    #[test]
    fn engineering_value_scaling() {
        let (link, rx) = test_link(0);
        let mut sensor = SensorBehaviour::new(
            SensorType::Temperature,
            UsageHint::Room,
            DsGroup::BlueHeating,
            0.0,
            40.0,
            40.0 / 255.0,
            Duration::from_secs(100),
            Duration::from_secs(2400),
            link,
        );
        let now = Instant::now();
        sensor.update_engineering_value(255, now);
        let event = rx.try_recv().expect("pushed");
        match event {
            UpstreamEvent::SensorValue { value, .. } => assert!((value - 40.0).abs() < 1e-9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn min_push_interval_throttles() {
        let (link, rx) = test_link(0);
        let mut sensor = SensorBehaviour::new(
            SensorType::Humidity,
            UsageHint::Room,
            DsGroup::BlueHeating,
            0.0,
            102.0,
            0.4,
            Duration::from_secs(100),
            Duration::ZERO,
            link,
        );
        let now = Instant::now();
        sensor.update_engineering_value(10, now);
        sensor.update_engineering_value(20, now + Duration::from_millis(500));
        // second value arrives inside the push window: recorded, not pushed
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(sensor.current_value(), Some(8.0));
        sensor.update_engineering_value(30, now + Duration::from_secs(3));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn binary_input_reports_changes_only() {
        let (link, rx) = test_link(1);
        let mut input = BinaryInputBehaviour::new(
            BinaryInputType::WindowOpen,
            UsageHint::Undefined,
            DsGroup::BlackJoker,
            link,
        );
        let now = Instant::now();
        input.update_state(true, now);
        input.update_state(true, now);
        input.update_state(false, now);
        let states: Vec<_> = rx
            .try_iter()
            .map(|e| match e {
                UpstreamEvent::InputState { state, .. } => state,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(states, vec![true, false]);
    }

    #[test]
    fn output_apply_tracking() {
        let (link, _rx) = test_link(0);
        let mut output = OutputBehaviour::new(DsGroup::BlueHeating, link);
        assert!(output.needs_applying() || output.requested() == 0.0);
        output.set_requested(42.0);
        assert!(output.needs_applying());
        output.value_applied();
        assert!(!output.needs_applying());
        output.set_requested(142.0);
        assert_eq!(output.requested(), 100.0);
    }
}
