// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! # Modem link
//!
//! Supervises the TCM310-class modem behind the transport: the
//! `CO_RD_VERSION` / `CO_RD_IDBASE` init handshake with retry and
//! line-flush, the periodic liveness probe with hardware-reset recovery,
//! and the demultiplexing of incoming packets into command responses,
//! events and radio telegrams.
//!
//! The link never owns the transport itself; it holds the writer half and
//! asks its owner (the engine) to close or reopen the transport through
//! [`LinkEvent`]s, keeping all I/O lifetime handling in one place.

mod queue;

pub use queue::{CommandError, CommandQueue};

use crate::config::{
    ALIVE_CHECK_INTERVAL, ALIVE_CHECK_REOPEN_DELAY, ALIVE_CHECK_STARTUP_DELAY, COMMAND_TIMEOUT,
    INIT_RETRIES, INIT_RETRY_INTERVAL, LINE_FLUSH_ZEROES, RESET_HOLD_TIME, RESET_SETTLE_TIME,
};
use crate::esp3::{Esp3Packet, PacketType, CO_RD_IDBASE, CO_RD_VERSION, SA_WR_LEARNMODE};
use crate::transport::ResetPin;
use std::io::Write;
use std::time::{Duration, Instant};

/// Where a command response is routed once it arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    InitVersion,
    InitIdBase,
    AliveCheck,
    /// Fire-and-forget; the response only pops the queue.
    Fire,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    /// No handshake attempted yet, or given up.
    Idle,
    /// Waiting for CO_RD_VERSION.
    InitVersion { retries_left: u32 },
    /// Waiting for CO_RD_IDBASE.
    InitIdBase { retries_left: u32 },
    /// Handshake done, watchdog running.
    Running,
    /// Liveness lost; reset/reopen cycle in progress.
    Recovering,
}

/// What the link asks its owner to do, or hands it to process.
#[derive(Debug)]
pub enum LinkEvent {
    /// An ERP1 radio telegram for the dispatcher.
    Radio(Esp3Packet),
    /// An asynchronous modem event packet.
    ModemEvent(Esp3Packet),
    /// Init handshake completed; versions and ID base are valid.
    Ready,
    /// Init handshake failed after all retries.
    InitFailed(CommandError),
    /// Owner should drop the transport and its reader thread.
    CloseTransport,
    /// Owner should open a fresh transport and call
    /// [`ModemLink::transport_reopened`].
    ReopenTransport,
}

/// Modem supervisor and packet demultiplexer.
pub struct ModemLink {
    writer: Option<Box<dyn Write + Send>>,
    reset_pin: Option<Box<dyn ResetPin>>,
    queue: CommandQueue<Route>,
    state: LinkState,

    app_version: u32,
    api_version: u32,
    modem_address: u32,
    id_base: u32,

    alive_at: Option<Instant>,
    init_retry_at: Option<Instant>,
    reset_release_at: Option<Instant>,
    reopen_at: Option<Instant>,
}

impl ModemLink {
    #[must_use]
    pub fn new(reset_pin: Option<Box<dyn ResetPin>>) -> Self {
        Self {
            writer: None,
            reset_pin,
            queue: CommandQueue::new(COMMAND_TIMEOUT),
            state: LinkState::Idle,
            app_version: 0,
            api_version: 0,
            modem_address: 0,
            id_base: 0,
            alive_at: None,
            init_retry_at: None,
            reset_release_at: None,
            reopen_at: None,
        }
    }

    /// Modem application version as 0xMMbbaaBB.
    #[must_use]
    pub fn app_version(&self) -> u32 {
        self.app_version
    }

    /// Modem API version as 0xMMbbaaBB.
    #[must_use]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// The modem's own radio address (chip ID).
    #[must_use]
    pub fn modem_address(&self) -> u32 {
        self.modem_address
    }

    /// Base of the 128-entry range of synthesisable sender addresses.
    #[must_use]
    pub fn id_base(&self) -> u32 {
        self.id_base
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == LinkState::Running
    }

    /// True once the given sender address falls into our ID base range
    /// (our own transmission reflected by a repeater).
    #[must_use]
    pub fn is_own_base_id(&self, sender: u32) -> bool {
        self.id_base != 0 && (sender & !0x7F) == self.id_base
    }

    // ===== lifecycle =====

    /// Adopt a fresh transport writer and start the init handshake.
    pub fn start(&mut self, writer: Box<dyn Write + Send>, now: Instant) {
        self.writer = Some(writer);
        self.state = LinkState::InitVersion {
            retries_left: INIT_RETRIES,
        };
        self.send_command(Esp3Packet::new_command(PacketType::CommonCommand, CO_RD_VERSION, &[]),
            Route::InitVersion, now);
    }

    /// The owner reopened the transport after [`LinkEvent::ReopenTransport`].
    pub fn transport_reopened(&mut self, writer: Box<dyn Write + Send>, now: Instant) {
        self.writer = Some(writer);
        match self.state {
            LinkState::InitVersion { retries_left } | LinkState::InitIdBase { retries_left } => {
                // retry the whole sequence from the version query
                self.state = LinkState::InitVersion { retries_left };
                self.send_command(
                    Esp3Packet::new_command(PacketType::CommonCommand, CO_RD_VERSION, &[]),
                    Route::InitVersion,
                    now,
                );
            }
            LinkState::Recovering => {
                self.state = LinkState::Running;
                // not too soon after a reset
                self.alive_at = Some(now + ALIVE_CHECK_REOPEN_DELAY);
                log::info!("[modem] transport reopened, watchdog resumes");
            }
            _ => {}
        }
    }

    /// The reader thread saw EOF/HUP or a read error. The owner closes the
    /// transport and re-establishes it on its own backoff schedule.
    pub fn transport_lost(&mut self, events: &mut Vec<LinkEvent>) {
        log::warn!("[modem] transport lost");
        self.writer = None;
        for route in self.queue.drain() {
            log::debug!("[modem] dropping queued command for {:?}", route);
        }
        events.push(LinkEvent::CloseTransport);
    }

    // ===== deadlines =====

    /// Earliest pending deadline across command timeout and watchdog timers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.queue.next_deadline(),
            self.alive_at,
            self.init_retry_at,
            self.reset_release_at,
            self.reopen_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fire everything due at `now`.
    pub fn poll(&mut self, now: Instant, events: &mut Vec<LinkEvent>) {
        if self.init_retry_at.is_some_and(|t| now >= t) {
            self.init_retry_at = None;
            events.push(LinkEvent::ReopenTransport);
        }
        if self.reset_release_at.is_some_and(|t| now >= t) {
            self.reset_release_at = None;
            log::info!("[modem] releasing reset line");
            if let Some(pin) = self.reset_pin.as_mut() {
                pin.set_asserted(false);
            }
            self.reopen_at = Some(now + RESET_SETTLE_TIME);
        }
        if self.reopen_at.is_some_and(|t| now >= t) {
            self.reopen_at = None;
            events.push(LinkEvent::ReopenTransport);
        }
        if self.alive_at.is_some_and(|t| now >= t) {
            self.alive_at = None;
            log::debug!("[modem] liveness probe (CO_RD_VERSION)");
            self.send_command(
                Esp3Packet::new_command(PacketType::CommonCommand, CO_RD_VERSION, &[]),
                Route::AliveCheck,
                now,
            );
        }
        // command timeout last, so a probe queued above cannot instantly expire
        let (timed_out, follow_up) = self.queue.on_timeout(now);
        if let Some(packet) = follow_up {
            self.transmit(packet);
        }
        if let Some(route) = timed_out {
            self.route_result(route, Err(CommandError::Timeout), now, events);
        }
    }

    // ===== packet input =====

    /// Demultiplex one decoded packet.
    pub fn feed_packet(&mut self, packet: Esp3Packet, now: Instant, events: &mut Vec<LinkEvent>) {
        match packet.packet_type() {
            Some(PacketType::Radio) => events.push(LinkEvent::Radio(packet)),
            Some(PacketType::Event) => events.push(LinkEvent::ModemEvent(packet)),
            Some(PacketType::Response) => {
                let (completion, follow_up) = self.queue.on_response(&packet, now);
                if let Some(next) = follow_up {
                    self.transmit(next);
                }
                match completion {
                    Some((route, result)) => self.route_result(route, result, now, events),
                    None => log::warn!(
                        "[modem] unexpected response packet of length {}",
                        packet.data_length()
                    ),
                }
            }
            _ => log::info!(
                "[modem] ignoring packet type {} of length {}",
                packet.packet_type_byte(),
                packet.data_length()
            ),
        }
    }

    // ===== output =====

    /// Finalise and transmit a packet immediately, bypassing the queue.
    /// Used for outgoing radio telegrams, which have no response.
    pub fn send_packet(&mut self, mut packet: Esp3Packet) {
        packet.finalize();
        self.transmit(packet);
    }

    /// Queue a command packet; its response is discarded.
    pub fn send_command_discard(&mut self, packet: Esp3Packet, now: Instant) {
        self.send_command(packet, Route::Fire, now);
    }

    /// Write a run of zero bytes to force the modem out of any
    /// partial-receive state.
    pub fn flush_line(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_all(&[0u8; LINE_FLUSH_ZEROES]) {
                log::error!("[modem] line flush failed: {}", e);
            }
        }
    }

    /// Enable or disable Smart-Ack learn in the modem.
    pub fn smart_ack_learn_mode(&mut self, enabled: bool, timeout: Duration, now: Instant) {
        let timeout_ms = if enabled { timeout.as_millis() as u32 } else { 0 };
        let params = [
            u8::from(enabled),
            0, // simple learn mode
            (timeout_ms >> 24) as u8,
            (timeout_ms >> 16) as u8,
            (timeout_ms >> 8) as u8,
            timeout_ms as u8,
        ];
        log::debug!("[modem] smart-ack learn mode: {}", enabled);
        self.send_command(
            Esp3Packet::new_command(PacketType::SmartAckCommand, SA_WR_LEARNMODE, &params),
            Route::Fire,
            now,
        );
    }

    fn send_command(&mut self, mut packet: Esp3Packet, route: Route, now: Instant) {
        packet.finalize();
        if let Some(to_send) = self.queue.push(packet, route, now) {
            self.transmit(to_send);
        }
    }

    fn transmit(&mut self, packet: Esp3Packet) {
        let Some(writer) = self.writer.as_mut() else {
            log::warn!("[modem] dropping outgoing packet, no transport");
            return;
        };
        let bytes = packet.wire_bytes();
        #[cfg(feature = "wire-hexdump")]
        log::trace!("[modem] tx {:02X?}", bytes);
        if let Err(e) = writer.write_all(&bytes) {
            log::error!("[modem] transmit failed: {}", e);
        }
    }

    // ===== response routing =====

    fn route_result(
        &mut self,
        route: Route,
        result: Result<Esp3Packet, CommandError>,
        now: Instant,
        events: &mut Vec<LinkEvent>,
    ) {
        match (route, result) {
            (Route::InitVersion, Ok(response)) => {
                let d = response.data();
                if d.len() >= 13 {
                    self.app_version = be32(&d[1..5]);
                    self.api_version = be32(&d[5..9]);
                    self.modem_address = be32(&d[9..13]);
                }
                log::debug!(
                    "[modem] CO_RD_VERSION: app=0x{:08X} api=0x{:08X} address=0x{:08X}",
                    self.app_version,
                    self.api_version,
                    self.modem_address
                );
                let retries_left = match self.state {
                    LinkState::InitVersion { retries_left } => retries_left,
                    _ => INIT_RETRIES,
                };
                self.state = LinkState::InitIdBase { retries_left };
                self.send_command(
                    Esp3Packet::new_command(PacketType::CommonCommand, CO_RD_IDBASE, &[]),
                    Route::InitIdBase,
                    now,
                );
            }
            (Route::InitIdBase, Ok(response)) => {
                let d = response.data();
                if d.len() >= 5 {
                    self.id_base = be32(&d[1..5]);
                }
                log::info!(
                    "[modem] ready: idBase=0x{:08X} address=0x{:08X}",
                    self.id_base,
                    self.modem_address
                );
                self.state = LinkState::Running;
                self.alive_at = Some(now + ALIVE_CHECK_STARTUP_DELAY);
                events.push(LinkEvent::Ready);
            }
            (Route::InitVersion | Route::InitIdBase, Err(error)) => {
                self.init_attempt_failed(error, now, events);
            }
            (Route::AliveCheck, Ok(response)) => {
                if response.data_length() != 33 {
                    log::debug!(
                        "[modem] liveness answer has odd length {} (expected 33)",
                        response.data_length()
                    );
                }
                self.alive_at = Some(now + ALIVE_CHECK_INTERVAL);
            }
            (Route::AliveCheck, Err(error)) => {
                log::error!("[modem] liveness check failed ({}), restarting module", error);
                self.state = LinkState::Recovering;
                self.writer = None;
                events.push(LinkEvent::CloseTransport);
                if self.reset_pin.is_some() {
                    if let Some(pin) = self.reset_pin.as_mut() {
                        pin.set_asserted(true);
                    }
                    self.reset_release_at = Some(now + RESET_HOLD_TIME);
                } else {
                    // no reset line wired; plain reopen after the settle time
                    self.reopen_at = Some(now + RESET_SETTLE_TIME);
                }
            }
            (Route::Fire, Ok(_)) => {}
            (Route::Fire, Err(error)) => {
                log::warn!("[modem] fire-and-forget command failed: {}", error);
            }
        }
    }

    fn init_attempt_failed(
        &mut self,
        error: CommandError,
        now: Instant,
        events: &mut Vec<LinkEvent>,
    ) {
        let retries_left = match self.state {
            LinkState::InitVersion { retries_left } | LinkState::InitIdBase { retries_left } => {
                retries_left
            }
            _ => 0,
        };
        if retries_left > 0 {
            log::warn!(
                "[modem] init command failed ({}), {} attempts left",
                error,
                retries_left
            );
            // flush the line on the first half of attempts
            if retries_left > INIT_RETRIES / 2 {
                self.flush_line();
            }
            self.state = LinkState::InitVersion {
                retries_left: retries_left - 1,
            };
            self.writer = None;
            events.push(LinkEvent::CloseTransport);
            self.init_retry_at = Some(now + INIT_RETRY_INTERVAL);
        } else {
            log::error!("[modem] init failed after {} attempts", INIT_RETRIES);
            self.state = LinkState::Idle;
            events.push(LinkEvent::InitFailed(error));
        }
    }
}

impl crate::handlers::RadioOut for ModemLink {
    fn send_radio(&mut self, packet: Esp3Packet) {
        self.send_packet(packet);
    }
}

fn be32(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 24)
        | (u32::from(bytes[1]) << 16)
        | (u32::from(bytes[2]) << 8)
        | u32::from(bytes[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{RecordingResetPin, SharedBuffer};
    use crate::esp3::FrameDecoder;

    fn version_response() -> Esp3Packet {
        let mut params = [0u8; 32];
        params[..4].copy_from_slice(&[0x02, 0x11, 0x01, 0x00]); // app
        params[4..8].copy_from_slice(&[0x02, 0x06, 0x03, 0x00]); // api
        params[8..12].copy_from_slice(&[0xFF, 0x87, 0x20, 0x00]); // chip id
        let mut p = Esp3Packet::new_command(PacketType::Response, 0x00, &params);
        p.finalize();
        p
    }

    fn idbase_response() -> Esp3Packet {
        let mut p =
            Esp3Packet::new_command(PacketType::Response, 0x00, &[0xFF, 0x9B, 0x12, 0x80]);
        p.finalize();
        p
    }

    fn sent_commands(buffer: &SharedBuffer) -> Vec<Esp3Packet> {
        let bytes = buffer.0.lock().unwrap().clone();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        decoder.push_bytes(&bytes, &mut out);
        out
    }

    #[test]
    fn init_handshake_reads_version_and_idbase() {
        let buffer = SharedBuffer::default();
        let mut link = ModemLink::new(None);
        let now = Instant::now();
        let mut events = Vec::new();

        link.start(Box::new(buffer.clone()), now);
        let sent = sent_commands(&buffer);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data()[0], CO_RD_VERSION);

        link.feed_packet(version_response(), now, &mut events);
        let sent = sent_commands(&buffer);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].data()[0], CO_RD_IDBASE);

        link.feed_packet(idbase_response(), now, &mut events);
        assert!(matches!(events.as_slice(), [LinkEvent::Ready]));
        assert!(link.is_running());
        assert_eq!(link.id_base(), 0xFF9B_1280);
        assert_eq!(link.modem_address(), 0xFF87_2000);
        assert_eq!(link.app_version(), 0x0211_0100);
        // first liveness probe scheduled shortly after init
        assert!(link.next_deadline().is_some());
    }

    #[test]
    fn own_base_id_detection() {
        let buffer = SharedBuffer::default();
        let mut link = ModemLink::new(None);
        let now = Instant::now();
        let mut events = Vec::new();
        link.start(Box::new(buffer.clone()), now);
        link.feed_packet(version_response(), now, &mut events);
        link.feed_packet(idbase_response(), now, &mut events);
        assert!(link.is_own_base_id(0xFF9B_1280));
        assert!(link.is_own_base_id(0xFF9B_12FF));
        assert!(!link.is_own_base_id(0xFF9B_1200));
        assert!(!link.is_own_base_id(0x0123_4567));
    }

    #[test]
    fn alive_timeout_triggers_reset_cycle() {
        let buffer = SharedBuffer::default();
        let pin = RecordingResetPin::default();
        let mut link = ModemLink::new(Some(Box::new(pin.clone())));
        let mut now = Instant::now();
        let mut events = Vec::new();

        link.start(Box::new(buffer.clone()), now);
        link.feed_packet(version_response(), now, &mut events);
        link.feed_packet(idbase_response(), now, &mut events);
        events.clear();

        // let the first probe fire
        now += ALIVE_CHECK_STARTUP_DELAY;
        link.poll(now, &mut events);
        let sent = sent_commands(&buffer);
        assert_eq!(sent.last().map(|p| p.data()[0]), Some(CO_RD_VERSION));

        // no response: command timeout elapses -> reset asserted
        now += COMMAND_TIMEOUT;
        link.poll(now, &mut events);
        assert!(events.iter().any(|e| matches!(e, LinkEvent::CloseTransport)));
        assert_eq!(pin.0.lock().unwrap().as_slice(), &[true]);
        events.clear();

        // reset released after the hold time
        now += RESET_HOLD_TIME;
        link.poll(now, &mut events);
        assert_eq!(pin.0.lock().unwrap().as_slice(), &[true, false]);
        assert!(events.is_empty());

        // reopen requested after the settle time
        now += RESET_SETTLE_TIME;
        link.poll(now, &mut events);
        assert!(events.iter().any(|e| matches!(e, LinkEvent::ReopenTransport)));

        // owner reopens; watchdog resumes later
        link.transport_reopened(Box::new(buffer.clone()), now);
        assert!(link.is_running());
        assert!(link.next_deadline().is_some());
    }

    #[test]
    fn failed_init_retries_with_line_flush() {
        let buffer = SharedBuffer::default();
        let mut link = ModemLink::new(None);
        let mut now = Instant::now();
        let mut events = Vec::new();

        link.start(Box::new(buffer.clone()), now);
        now += COMMAND_TIMEOUT;
        link.poll(now, &mut events);
        // first retry writes the zero-run flush before closing
        let written = buffer.0.lock().unwrap().clone();
        assert!(written.ends_with(&[0u8; LINE_FLUSH_ZEROES]));
        assert!(events.iter().any(|e| matches!(e, LinkEvent::CloseTransport)));
        events.clear();

        // retry timer reopens the transport and re-issues CO_RD_VERSION
        now += INIT_RETRY_INTERVAL;
        link.poll(now, &mut events);
        assert!(events.iter().any(|e| matches!(e, LinkEvent::ReopenTransport)));
        buffer.0.lock().unwrap().clear();
        link.transport_reopened(Box::new(buffer.clone()), now);
        let sent = sent_commands(&buffer);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data()[0], CO_RD_VERSION);
    }

    #[test]
    fn init_gives_up_after_all_retries() {
        let buffer = SharedBuffer::default();
        let mut link = ModemLink::new(None);
        let mut now = Instant::now();
        let mut events = Vec::new();
        link.start(Box::new(buffer.clone()), now);
        for _ in 0..INIT_RETRIES {
            now += COMMAND_TIMEOUT;
            link.poll(now, &mut events);
            now += INIT_RETRY_INTERVAL;
            link.poll(now, &mut events);
            link.transport_reopened(Box::new(buffer.clone()), now);
        }
        now += COMMAND_TIMEOUT;
        link.poll(now, &mut events);
        assert!(events.iter().any(|e| matches!(e, LinkEvent::InitFailed(_))));
        assert!(!link.is_running());
    }
}
