// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Transport reader thread.
//!
//! Blocks on the transport's reader half (which times out every 100 ms so
//! the thread stays stoppable) and forwards raw byte chunks to the engine.
//! A zero-length read on a stream transport or a hard error reports the
//! transport as lost and ends the thread.

use crossbeam::channel::Sender;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// What the reader thread sends to the engine.
#[derive(Debug)]
pub enum IoEvent {
    /// Raw bytes read from the transport, in arrival order.
    Bytes(Vec<u8>),
    /// The transport is gone (EOF, HUP, hard read error).
    Lost(String),
}

/// Running reader thread; dropping the handle leaves the thread to stop on
/// its own, [`ReaderHandle::stop`] stops it eagerly.
pub struct ReaderHandle {
    alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Signal the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start a reader thread over the given transport half.
pub fn spawn(mut reader: Box<dyn Read + Send>, tx: Sender<IoEvent>) -> ReaderHandle {
    let alive = Arc::new(AtomicBool::new(true));
    let thread_alive = Arc::clone(&alive);
    let thread = std::thread::Builder::new()
        .name("evdc-io".into())
        .spawn(move || {
            let mut buffer = [0u8; 256];
            while thread_alive.load(Ordering::Relaxed) {
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        // EOF on stream transports
                        let _ = tx.send(IoEvent::Lost("end of stream".into()));
                        return;
                    }
                    Ok(n) => {
                        if tx.send(IoEvent::Bytes(buffer[..n].to_vec())).is_err() {
                            return; // engine gone
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) =>
                    {
                        // read timeout: just check the stop flag again
                    }
                    Err(e) => {
                        let _ = tx.send(IoEvent::Lost(e.to_string()));
                        return;
                    }
                }
            }
        });
    let thread = match thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("[engine] cannot spawn reader thread: {}", e);
            None
        }
    };
    ReaderHandle { alive, thread }
}
