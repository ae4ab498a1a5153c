// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # Engine
//!
//! The single-threaded cooperative main loop. An I/O driver thread reads
//! transport bytes and pushes them onto a channel; the engine thread
//! selects over that channel and the control channel with a timeout equal
//! to the earliest pending deadline (command timeout, liveness probe,
//! learn expiry, button-release sequencing). Every protocol structure is
//! owned by the engine thread; nothing in the dispatch path takes a lock.

mod reader;

use crate::behaviour::UpstreamEvent;
use crate::config::{RECONNECT_BACKOFF_FIRST, RECONNECT_BACKOFF_NEXT, VdcConfig};
use crate::device::{
    create_devices_from_eep, valid_variant_switch, DeviceRegistry, DeviceStore,
};
use crate::eep::{EepProfile, MANUFACTURER_UNKNOWN};
use crate::esp3::FrameDecoder;
use crate::learn::{LearnController, LearnOutcome};
use crate::modem::{LinkEvent, ModemLink};
use crate::transport::{self, ResetPin, Transport};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use std::time::{Duration, Instant};

pub use reader::IoEvent;

/// Control surface of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<ControlMsg>,
}

impl EngineHandle {
    pub fn set_learn_mode(&self, enable: bool, skip_proximity: bool) {
        let _ = self.tx.send(ControlMsg::SetLearnMode {
            enable,
            skip_proximity,
        });
    }

    /// Request a new output value (0..=100) for one logical device.
    pub fn apply_output(&self, address: u32, subdevice: u8, value: f64) {
        let _ = self.tx.send(ControlMsg::ApplyOutput {
            address,
            subdevice,
            value,
        });
    }

    /// Mark climate-control idle (summer) mode.
    pub fn set_climate_idle(&self, address: u32, subdevice: u8, idle: bool) {
        let _ = self.tx.send(ControlMsg::SetClimateIdle {
            address,
            subdevice,
            idle,
        });
    }

    /// Run one valve anti-calcification cycle.
    pub fn run_prophylaxis(&self, address: u32, subdevice: u8) {
        let _ = self.tx.send(ControlMsg::RunProphylaxis { address, subdevice });
    }

    /// Switch a learned address to another variant of its profile.
    pub fn set_profile_variant(&self, address: u32, profile: u32) {
        let _ = self.tx.send(ControlMsg::SetProfileVariant { address, profile });
    }

    /// Create a remote-control device. `address_spec` follows the
    /// original convention: `0xFF8000oo` picks ID-base offset `oo`,
    /// `0xFF8000FF` auto-assigns the first free offset, anything else is
    /// used verbatim.
    pub fn add_remote_device(&self, eep: u32, address_spec: u32) {
        let _ = self.tx.send(ControlMsg::AddRemoteDevice { eep, address_spec });
    }

    /// Transmit a teach-in signal from a remote-control device so an
    /// actor can learn it.
    pub fn teach_in_signal(&self, address: u32, subdevice: u8, variant: u8) {
        let _ = self.tx.send(ControlMsg::TeachInSignal {
            address,
            subdevice,
            variant,
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ControlMsg::Shutdown);
    }
}

enum ControlMsg {
    SetLearnMode { enable: bool, skip_proximity: bool },
    ApplyOutput { address: u32, subdevice: u8, value: f64 },
    SetClimateIdle { address: u32, subdevice: u8, idle: bool },
    RunProphylaxis { address: u32, subdevice: u8 },
    SetProfileVariant { address: u32, profile: u32 },
    AddRemoteDevice { eep: u32, address_spec: u32 },
    TeachInSignal { address: u32, subdevice: u8, variant: u8 },
    Shutdown,
}

/// The connector core: modem link, registry, learn controller, timers.
pub struct VdcEngine {
    config: VdcConfig,
    link: ModemLink,
    decoder: FrameDecoder,
    registry: DeviceRegistry,
    learn: LearnController,
    store: Box<dyn DeviceStore>,
    upstream: Sender<UpstreamEvent>,
    control_rx: Receiver<ControlMsg>,
    io_rx: Receiver<IoEvent>,
    io_tx: Sender<IoEvent>,
    transport: Option<Box<dyn Transport>>,
    reader: Option<reader::ReaderHandle>,
    reconnect_attempts: u32,
    reopen_at: Option<Instant>,
}

impl VdcEngine {
    /// Build an engine. Returns the engine, its control handle and the
    /// upstream event stream.
    #[must_use]
    pub fn new(
        config: VdcConfig,
        store: Box<dyn DeviceStore>,
        reset_pin: Option<Box<dyn ResetPin>>,
    ) -> (Self, EngineHandle, Receiver<UpstreamEvent>) {
        let (control_tx, control_rx) = unbounded();
        let (upstream_tx, upstream_rx) = unbounded();
        let (io_tx, io_rx) = bounded(64);
        let min_learn_dbm = config.min_learn_dbm;
        let engine = Self {
            config,
            link: ModemLink::new(reset_pin),
            decoder: FrameDecoder::new(),
            registry: DeviceRegistry::new(),
            learn: LearnController::new(min_learn_dbm),
            store,
            upstream: upstream_tx,
            control_rx,
            io_rx,
            io_tx,
            transport: None,
            reader: None,
            reconnect_attempts: 0,
            reopen_at: None,
        };
        (engine, EngineHandle { tx: control_tx }, upstream_rx)
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn modem(&self) -> &ModemLink {
        &self.link
    }

    /// Rehydrate the learned set from the store.
    pub fn load_devices(&mut self) {
        let records = match self.store.load_all() {
            Ok(records) => records,
            Err(e) => {
                log::error!("[engine] cannot load device store: {}", e);
                return;
            }
        };
        let now = Instant::now();
        // group records by address; one factory run per address recreates
        // every subdevice
        let mut seen = std::collections::BTreeSet::new();
        for record in &records {
            if !seen.insert(record.address) {
                continue;
            }
            let output = create_devices_from_eep(
                &self.upstream,
                record.address,
                EepProfile(record.profile),
                record.manufacturer,
                false,
                now,
            );
            if output.devices.is_empty() {
                log::error!(
                    "[engine] no device could be rebuilt for 0x{:08X} profile 0x{:08X}",
                    record.address,
                    record.profile
                );
            }
            for device in output.devices {
                self.registry.insert(device);
            }
        }
        log::info!("[engine] rehydrated {} devices", self.registry.len());
    }

    /// Open the transport and start the modem handshake.
    pub fn start(&mut self) -> Result<(), transport::TransportError> {
        let transport = transport::open(&self.config)?;
        let writer = transport.writer()?;
        self.reader = Some(reader::spawn(transport.reader()?, self.io_tx.clone()));
        self.transport = Some(transport);
        self.link.start(writer, Instant::now());
        Ok(())
    }

    /// Run until shutdown. Consumes the calling thread.
    pub fn run(&mut self) {
        loop {
            let now = Instant::now();
            let deadline = [
                self.link.next_deadline(),
                self.learn.next_deadline(),
                self.registry.next_action_deadline(),
                self.reopen_at,
            ]
            .into_iter()
            .flatten()
            .min();
            let timeout = deadline
                .map(|d| d.saturating_duration_since(now))
                .unwrap_or(Duration::from_secs(1));

            enum Wake {
                Io(IoEvent),
                Control(ControlMsg),
                Tick,
            }
            let wake = crossbeam::select! {
                recv(self.io_rx) -> msg => match msg {
                    Ok(event) => Wake::Io(event),
                    Err(_) => Wake::Tick,
                },
                recv(self.control_rx) -> msg => match msg {
                    Ok(control) => Wake::Control(control),
                    // every handle dropped: treat like a shutdown request
                    Err(_) => Wake::Control(ControlMsg::Shutdown),
                },
                default(timeout) => Wake::Tick,
            };

            let mut events = Vec::new();
            match wake {
                Wake::Io(IoEvent::Bytes(bytes)) => {
                    let mut packets = Vec::new();
                    self.decoder.push_bytes(&bytes, &mut packets);
                    let now = Instant::now();
                    for packet in packets {
                        self.link.feed_packet(packet, now, &mut events);
                    }
                }
                Wake::Io(IoEvent::Lost(reason)) => {
                    log::warn!("[engine] transport lost: {}", reason);
                    self.link.transport_lost(&mut events);
                    self.schedule_reconnect();
                }
                Wake::Control(ControlMsg::Shutdown) => {
                    log::info!("[engine] shutting down");
                    self.close_transport();
                    return;
                }
                Wake::Control(msg) => self.handle_control(msg),
                Wake::Tick => {}
            }

            let now = Instant::now();
            self.link.poll(now, &mut events);
            self.learn.poll(now);
            self.registry.poll_actions(now, &mut self.link);
            if self.reopen_at.is_some_and(|t| now >= t) {
                self.reopen_at = None;
                self.reopen_transport();
            }
            for event in events {
                self.handle_link_event(event, now);
            }
        }
    }

    // ===== link events =====

    fn handle_link_event(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Radio(packet) => self.handle_radio(&packet, now),
            LinkEvent::ModemEvent(packet) => {
                log::info!(
                    "[engine] modem event {}",
                    packet.data().first().copied().unwrap_or(0)
                );
            }
            LinkEvent::Ready => {
                self.reconnect_attempts = 0;
                log::info!(
                    "[engine] modem ready: app=0x{:08X} api=0x{:08X} idBase=0x{:08X}",
                    self.link.app_version(),
                    self.link.api_version(),
                    self.link.id_base()
                );
            }
            LinkEvent::InitFailed(error) => {
                log::error!("[engine] modem initialisation failed: {}", error);
            }
            LinkEvent::CloseTransport => self.close_transport(),
            // init retries and the watchdog space their reopen requests
            // themselves; reader-side losses go through schedule_reconnect
            LinkEvent::ReopenTransport => self.reopen_transport(),
        }
    }

    fn close_transport(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        if self.transport.take().is_some() {
            log::info!("[engine] transport closed");
        }
    }

    fn reopen_transport(&mut self) {
        self.close_transport();
        match transport::open(&self.config) {
            Ok(transport) => match (transport.writer(), transport.reader()) {
                (Ok(writer), Ok(reader_half)) => {
                    self.reader = Some(reader::spawn(reader_half, self.io_tx.clone()));
                    self.transport = Some(transport);
                    self.decoder = FrameDecoder::new();
                    self.reconnect_attempts = 0;
                    self.link.transport_reopened(writer, Instant::now());
                }
                (Err(e), _) | (_, Err(e)) => {
                    log::error!("[engine] cannot split reopened transport: {}", e);
                    self.schedule_reconnect();
                }
            },
            Err(e) => {
                log::error!("[engine] reopen failed: {}", e);
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let backoff = if self.reconnect_attempts == 0 {
            RECONNECT_BACKOFF_FIRST
        } else {
            RECONNECT_BACKOFF_NEXT
        };
        self.reconnect_attempts += 1;
        self.reopen_at = Some(Instant::now() + backoff);
    }

    // ===== radio dispatch =====

    fn handle_radio(&mut self, packet: &crate::esp3::Esp3Packet, now: Instant) {
        let sender = packet.radio_sender();
        // our own transmissions reflected by repeaters
        if self.link.is_own_base_id(sender) {
            log::debug!("[engine] suppressed reflection from own base id 0x{:08X}", sender);
            return;
        }
        match self.learn.evaluate(packet, self.registry.knows_address(sender)) {
            LearnOutcome::NotLearning => {
                self.registry.dispatch_radio(packet, now, &mut self.link);
            }
            LearnOutcome::NoTeachInfo => {
                // learn mode pauses regular dispatch
            }
            LearnOutcome::LearnIn {
                profile,
                manufacturer,
            } => {
                log::info!(
                    "[engine] learn-in: 0x{:08X} as {} (manufacturer 0x{:03X})",
                    sender,
                    profile,
                    manufacturer
                );
                self.create_and_register(sender, profile, manufacturer, true, now);
            }
            LearnOutcome::LearnOut => {
                log::info!("[engine] learn-out: 0x{:08X}", sender);
                let removed = self.registry.remove_address(sender);
                if let Err(e) = self.store.remove_address(sender) {
                    log::error!("[engine] cannot clear store for 0x{:08X}: {}", sender, e);
                }
                if let Some(first) = removed.first() {
                    let _ = self.upstream.try_send(UpstreamEvent::DeviceLearnedOut {
                        dsuid: first.dsuid().clone(),
                    });
                }
            }
        }
    }

    fn create_and_register(
        &mut self,
        address: u32,
        profile: EepProfile,
        manufacturer: u16,
        announce: bool,
        now: Instant,
    ) -> usize {
        let output =
            create_devices_from_eep(&self.upstream, address, profile, manufacturer, true, now);
        let count = output.devices.len();
        if count == 0 {
            return 0;
        }
        if announce {
            if let Some(first) = output.devices.first() {
                let _ = self.upstream.try_send(UpstreamEvent::DeviceLearnedIn {
                    dsuid: first.dsuid().clone(),
                });
            }
        }
        for device in output.devices {
            let record = device.record();
            if self.registry.insert(device) {
                if let Err(e) = self.store.save(&record) {
                    log::error!("[engine] cannot persist device: {}", e);
                }
            }
        }
        for response in output.responses {
            self.link.send_command_discard(response, now);
        }
        count
    }

    // ===== control =====

    fn handle_control(&mut self, msg: ControlMsg) {
        let now = Instant::now();
        match msg {
            ControlMsg::SetLearnMode {
                enable,
                skip_proximity,
            } => {
                let timeout = self.config.learn_timeout;
                self.learn.set_learn_mode(enable, skip_proximity, timeout, now);
                // mirror into the modem so smart-ack clients can join too
                self.link.smart_ack_learn_mode(enable, timeout, now);
            }
            ControlMsg::ApplyOutput {
                address,
                subdevice,
                value,
            } => {
                if let Some(device) = self.registry.get_mut(address, subdevice) {
                    device.apply_output(value, now, &mut self.link);
                } else {
                    log::warn!("[engine] apply on unknown device 0x{:08X}/{}", address, subdevice);
                }
            }
            ControlMsg::SetClimateIdle {
                address,
                subdevice,
                idle,
            } => {
                if let Some(device) = self.registry.get_mut(address, subdevice) {
                    for channel in device.channels_mut() {
                        channel.set_climate_idle(idle);
                    }
                }
            }
            ControlMsg::RunProphylaxis { address, subdevice } => {
                if let Some(device) = self.registry.get_mut(address, subdevice) {
                    for channel in device.channels_mut() {
                        channel.request_prophylaxis();
                    }
                }
            }
            ControlMsg::SetProfileVariant { address, profile } => {
                self.switch_profile_variant(address, EepProfile(profile), now);
            }
            ControlMsg::AddRemoteDevice { eep, address_spec } => {
                match self.resolve_remote_address(address_spec) {
                    Some(address) => {
                        let created = self.create_and_register(
                            address,
                            EepProfile(eep),
                            MANUFACTURER_UNKNOWN,
                            false,
                            now,
                        );
                        log::info!(
                            "[engine] created {} remote-control device(s) at 0x{:08X}",
                            created,
                            address
                        );
                    }
                    None => log::error!("[engine] no free ID base offset available"),
                }
            }
            ControlMsg::TeachInSignal {
                address,
                subdevice,
                variant,
            } => {
                if let Some(device) = self.registry.get_mut(address, subdevice) {
                    for channel in device.channels_mut() {
                        channel.teach_in_signal(variant, now, &mut self.link);
                    }
                }
            }
            ControlMsg::Shutdown => {}
        }
    }

    /// Switch every device at `address` to another variant of its profile.
    /// Tears the devices down and recreates them, keeping the manufacturer.
    fn switch_profile_variant(&mut self, address: u32, wanted: EepProfile, now: Instant) {
        let Some(current) = self.registry.devices_at(address).first() else {
            log::warn!("[engine] variant switch on unknown address 0x{:08X}", address);
            return;
        };
        let current_profile = current.profile();
        let manufacturer = current.manufacturer();
        if current_profile == wanted {
            return;
        }
        if !valid_variant_switch(current_profile, wanted) {
            log::warn!(
                "[engine] {} is not a variant of {}",
                wanted,
                current_profile
            );
            return;
        }
        self.registry.remove_address(address);
        if let Err(e) = self.store.remove_address(address) {
            log::error!("[engine] cannot clear store for variant switch: {}", e);
        }
        self.create_and_register(address, wanted, manufacturer, false, now);
    }

    /// Resolve the remote-device address convention against the ID base.
    fn resolve_remote_address(&self, spec: u32) -> Option<u32> {
        if spec & 0xFFFF_FF00 != 0xFF80_0000 {
            return Some(spec);
        }
        let offset = spec & 0xFF;
        if offset != 0xFF {
            return Some(self.link.id_base() + offset);
        }
        // auto-assign: first offset not used by any registered device
        let id_base = self.link.id_base();
        (0..128u32)
            .map(|o| id_base + o)
            .find(|candidate| !self.registry.knows_address(*candidate))
    }
}
