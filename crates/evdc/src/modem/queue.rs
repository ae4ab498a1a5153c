// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Serialised command/response bookkeeping.
//!
//! The modem answers every command packet with exactly one response packet
//! and nothing correlates them but ordering, so the queue is strictly FIFO
//! with at most one outstanding response. The front entry either still holds
//! its outgoing packet (awaiting send) or holds `None` (sent, awaiting
//! response). Responses and timeouts pop the front and yield the caller's
//! route token; the owner performs the actual transmission.

use crate::esp3::{Esp3Packet, ResponseError};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Why a queued command completed without a usable response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// No response within the per-command deadline.
    Timeout,
    /// The response carried a non-OK status.
    Response(ResponseError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "command response timeout"),
            Self::Response(e) => write!(f, "command failed: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

struct Entry<R> {
    /// `Some` while awaiting send; `None` marks "sent, awaiting response".
    packet: Option<Esp3Packet>,
    route: R,
}

/// FIFO command queue, generic over the owner's route token.
pub struct CommandQueue<R> {
    entries: VecDeque<Entry<R>>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl<R> CommandQueue<R> {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            timeout,
            deadline: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deadline of the outstanding command, if one is awaiting its response.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Queue a command. Returns the packet to transmit right now, if this
    /// entry reached an idle front.
    pub fn push(&mut self, packet: Esp3Packet, route: R, now: Instant) -> Option<Esp3Packet> {
        self.entries.push_back(Entry {
            packet: Some(packet),
            route,
        });
        self.advance(now)
    }

    /// A response packet arrived. Returns the route and result for the
    /// outstanding command plus, possibly, the next packet to transmit.
    ///
    /// An unexpected response (nothing outstanding) yields `None` and is the
    /// caller's to log.
    pub fn on_response(
        &mut self,
        response: &Esp3Packet,
        now: Instant,
    ) -> (Option<(R, Result<Esp3Packet, CommandError>)>, Option<Esp3Packet>) {
        let front_is_waiting = matches!(self.entries.front(), Some(e) if e.packet.is_none());
        if !front_is_waiting {
            return (None, None);
        }
        self.deadline = None;
        let Some(entry) = self.entries.pop_front() else {
            return (None, None);
        };
        let result = match response.response_status() {
            Ok(()) => Ok(response.clone()),
            Err(e) => Err(CommandError::Response(e)),
        };
        let next = self.advance(now);
        (Some((entry.route, result)), next)
    }

    /// The outstanding command's deadline passed. Returns its route plus,
    /// possibly, the next packet to transmit.
    pub fn on_timeout(&mut self, now: Instant) -> (Option<R>, Option<Esp3Packet>) {
        let due = self.deadline.is_some_and(|d| now >= d);
        let front_is_waiting = matches!(self.entries.front(), Some(e) if e.packet.is_none());
        if !due || !front_is_waiting {
            return (None, None);
        }
        self.deadline = None;
        let Some(entry) = self.entries.pop_front() else {
            return (None, None);
        };
        let next = self.advance(now);
        (Some(entry.route), next)
    }

    /// Drop every entry (transport went away); yields the routes so the
    /// owner can fail them.
    pub fn drain(&mut self) -> Vec<R> {
        self.deadline = None;
        self.entries.drain(..).map(|e| e.route).collect()
    }

    /// If the front entry is still awaiting send, take its packet for
    /// transmission and replace it by the waiting-for-response marker.
    fn advance(&mut self, now: Instant) -> Option<Esp3Packet> {
        let front = self.entries.front_mut()?;
        let packet = front.packet.take()?;
        self.deadline = Some(now + self.timeout);
        Some(packet)
    }
}
