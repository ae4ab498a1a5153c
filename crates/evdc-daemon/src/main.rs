// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! evdcd - the EnOcean virtual device connector daemon.
//!
//! Wires the core engine to a serial/TCP modem transport, the SQLite
//! device store and the mDNS advertiser, then prints upstream events.
//! Interactive keys on stdin: `l` toggles learn mode, `q` quits.

use anyhow::{Context, Result};
use clap::Parser;
use evdc::behaviour::UpstreamEvent;
use evdc::config::VdcConfig;
use evdc::device::{DeviceStore, MemoryStore};
use evdc::dsuid::{DsUid, VDC_NAMESPACE_UUID};
use evdc::engine::VdcEngine;
use evdc::transport::GpioResetPin;
use evdc_announce::{Advertiser, AnnounceConfig, MasterEvent};
use evdc_persistence::SqliteDeviceStore;
use std::io::BufRead;

#[derive(Parser, Debug)]
#[command(name = "evdcd", version, about = "EnOcean virtual device connector")]
struct Args {
    /// Serial device (/dev/ttyUSB0) or host[:port] of a TCP radio gateway
    #[arg(short = 'c', long, default_value = "/dev/ttyUSB0")]
    connection: String,

    /// Default port for TCP gateway connections
    #[arg(long, default_value_t = 9713)]
    gateway_port: u16,

    /// SQLite database path for the learned-device table
    #[arg(short = 'd', long, default_value = "evdc_devices.sqlite3")]
    database: String,

    /// Keep the learned set in memory only (testing)
    #[arg(long)]
    ephemeral: bool,

    /// sysfs GPIO number wired to the modem reset pin
    #[arg(long)]
    reset_gpio: Option<u32>,

    /// Advertise this vDC on the LAN via mDNS
    #[arg(long)]
    announce: bool,

    /// vDC API port carried in the announcement
    #[arg(long, default_value_t = 8440)]
    vdc_port: u16,

    /// Announce the `noauto` flag (controllers must not auto-connect)
    #[arg(long)]
    noauto: bool,

    /// Instance name for mDNS records (defaults to the hostname)
    #[arg(long)]
    name: Option<String>,

    /// Arm learn mode right at startup
    #[arg(short = 'l', long)]
    learn: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store: Box<dyn DeviceStore> = if args.ephemeral {
        log::warn!("ephemeral mode: learned devices will not survive a restart");
        Box::new(MemoryStore::new())
    } else {
        Box::new(
            SqliteDeviceStore::open(&args.database)
                .with_context(|| format!("opening device store {}", args.database))?,
        )
    };

    let reset_pin = match args.reset_gpio {
        Some(gpio) => Some(Box::new(
            GpioResetPin::new(gpio).with_context(|| format!("exporting reset GPIO {}", gpio))?,
        ) as Box<dyn evdc::transport::ResetPin>),
        None => None,
    };

    let config = VdcConfig {
        connection: args.connection.clone(),
        default_port: args.gateway_port,
        reset_gpio: args.reset_gpio,
        ..VdcConfig::default()
    };

    let (mut engine, handle, upstream) = VdcEngine::new(config, store, reset_pin);
    engine.load_devices();
    engine
        .start()
        .with_context(|| format!("opening modem transport {}", args.connection))?;

    // mDNS announcement plus master-vdsm arbitration
    let name = args
        .name
        .or_else(hostname)
        .unwrap_or_else(|| "evdc".to_string());
    let advertiser = if args.announce {
        let dsuid = DsUid::name_in_space(&name, VDC_NAMESPACE_UUID);
        let (advertiser, master_rx) = Advertiser::start(AnnounceConfig {
            dsuid: dsuid.to_hex(),
            vdc_port: args.vdc_port,
            noauto: args.noauto,
            name: name.clone(),
            http_port: None,
            ssh_port: None,
            vdsm: None,
        })
        .map_err(|e| anyhow::anyhow!("{}", e))?;
        std::thread::spawn(move || {
            for event in master_rx {
                match event {
                    MasterEvent::MasterAppeared { name } => {
                        log::info!("master vdsm on the network: {}", name);
                    }
                    MasterEvent::MasterVanished { name } => {
                        log::info!("master vdsm gone: {}", name);
                    }
                }
            }
        });
        Some(advertiser)
    } else {
        None
    };

    // upstream event printer; a real deployment forwards these to the dS API
    std::thread::spawn(move || {
        for event in upstream {
            match event {
                UpstreamEvent::SensorValue {
                    dsuid,
                    channel,
                    sensor_type,
                    value,
                } => log::info!("{} ch{} {:?} = {:.2}", dsuid, channel, sensor_type, value),
                UpstreamEvent::InputState {
                    dsuid,
                    channel,
                    input_type,
                    state,
                } => log::info!("{} ch{} {:?} = {}", dsuid, channel, input_type, state),
                UpstreamEvent::ButtonAction {
                    dsuid,
                    channel,
                    pressed,
                } => log::info!(
                    "{} ch{} button {}",
                    dsuid,
                    channel,
                    if pressed { "pressed" } else { "released" }
                ),
                UpstreamEvent::HardwareError { dsuid, error } => {
                    log::warn!("{} hardware error {:?}", dsuid, error);
                }
                UpstreamEvent::DeviceLearnedIn { dsuid } => log::info!("learned in {}", dsuid),
                UpstreamEvent::DeviceLearnedOut { dsuid } => log::info!("learned out {}", dsuid),
                UpstreamEvent::DeviceIdentified { dsuid } => log::info!("identified {}", dsuid),
            }
        }
    });

    if args.learn {
        handle.set_learn_mode(true, false);
    }

    // interactive console: l = toggle learn, q = quit
    let console_handle = handle.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut learning = args.learn;
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "l" => {
                    learning = !learning;
                    console_handle.set_learn_mode(learning, false);
                    println!("learn mode {}", if learning { "armed" } else { "off" });
                }
                "q" => {
                    console_handle.shutdown();
                    break;
                }
                "" => {}
                other => println!("unknown command '{}' (l = learn, q = quit)", other),
            }
        }
    });

    engine.run();
    if let Some(advertiser) = advertiser {
        advertiser.shutdown();
    }
    Ok(())
}

fn hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
