// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Dump decoded ESP3 traffic from an EnOcean modem.
//!
//! Prints every frame with its classification (profile, manufacturer,
//! teach-in flag) without touching any device state. Useful for checking
//! reception, RSSI and EEP signatures before learning devices in.

use anyhow::{Context, Result};
use clap::Parser;
use evdc::config::{VdcConfig, MIN_LEARN_DBM};
use evdc::eep;
use evdc::esp3::{FrameDecoder, PacketType};
use evdc::transport;
use std::io::Read;

#[derive(Parser, Debug)]
#[command(name = "evdc-sniffer", version, about = "EnOcean ESP3 traffic dump")]
struct Args {
    /// Serial device (/dev/ttyUSB0) or host[:port] of a TCP radio gateway
    #[arg(short = 'c', long, default_value = "/dev/ttyUSB0")]
    connection: String,

    /// Default port for TCP gateway connections
    #[arg(long, default_value_t = 9713)]
    gateway_port: u16,

    /// Only show radio telegrams
    #[arg(short = 'r', long)]
    radio_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = VdcConfig {
        connection: args.connection.clone(),
        default_port: args.gateway_port,
        ..VdcConfig::default()
    };
    let transport = transport::open(&config)
        .with_context(|| format!("opening transport {}", args.connection))?;
    let mut reader = transport
        .reader()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("listening on {} (ctrl-c to stop)", transport.endpoint());
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; 256];
    let mut packets = Vec::new();
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => anyhow::bail!("transport closed"),
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                continue;
            }
            Err(e) => return Err(e).context("reading transport"),
        };
        decoder.push_bytes(&buffer[..n], &mut packets);
        for packet in packets.drain(..) {
            if args.radio_only && packet.packet_type() != Some(PacketType::Radio) {
                continue;
            }
            println!("{}", packet.describe());
            if packet.packet_type() == Some(PacketType::Radio)
                && eep::has_teach_info(&packet, 0, false)
            {
                let profile = eep::profile(&packet);
                let manufacturer = eep::manufacturer(&packet);
                let gate_ok = packet.radio_dbm() > MIN_LEARN_DBM;
                println!(
                    "- teach-in: profile {} manufacturer {} ({:03X}){}",
                    profile,
                    eep::manufacturer_name(manufacturer).unwrap_or("<unknown>"),
                    manufacturer,
                    if gate_ok { "" } else { " [too far for RPS learn]" }
                );
            }
            println!();
        }
    }
}
