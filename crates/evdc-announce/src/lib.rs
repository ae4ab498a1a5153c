// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! mDNS advertising for the vDC.
//!
//! Publishes the service records a digitalSTROM controller looks for:
//!
//! - `_ds-vdc._tcp` -- this connector's API port, TXT `dSUID=<34 hex>`
//!   plus an optional `noauto` flag,
//! - `_ds-vdsm._tcp` -- a co-hosted auxiliary vdsm, when one runs here,
//! - `_http._tcp` / `_ssh._tcp` -- mirrors of the configured web/ssh ports.
//!
//! It also *browses* for other `_ds-vdsm._tcp` instances: if a master vdsm
//! is present on the LAN, the auxiliary vdsm on this host should not run.
//! The host gets told through [`MasterEvent`]s and flips the vdsm record
//! with [`Advertiser::set_vdsm_registered`].

use crossbeam::channel::{unbounded, Receiver, Sender};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::fmt;

const VDC_SERVICE: &str = "_ds-vdc._tcp.local.";
const VDSM_SERVICE: &str = "_ds-vdsm._tcp.local.";
const HTTP_SERVICE: &str = "_http._tcp.local.";
const SSH_SERVICE: &str = "_ssh._tcp.local.";

/// Announcement failure.
#[derive(Debug)]
pub struct AnnounceError(pub String);

impl fmt::Display for AnnounceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "announce error: {}", self.0)
    }
}

impl std::error::Error for AnnounceError {}

impl From<mdns_sd::Error> for AnnounceError {
    fn from(e: mdns_sd::Error) -> Self {
        Self(e.to_string())
    }
}

/// What the browser observed about master vdsm presence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterEvent {
    /// Another (non-auxiliary) vdsm appeared on the LAN.
    MasterAppeared { name: String },
    /// A previously seen vdsm went away.
    MasterVanished { name: String },
}

/// What to announce.
#[derive(Clone, Debug)]
pub struct AnnounceConfig {
    /// This vDC's dSUID, 34 hex characters.
    pub dsuid: String,
    /// The vDC API port.
    pub vdc_port: u16,
    /// Advertise `noauto`: controllers should not connect on their own.
    pub noauto: bool,
    /// Instance name prefix, usually the hostname.
    pub name: String,
    /// Mirror of the device's web interface, if any.
    pub http_port: Option<u16>,
    /// Mirror of the device's ssh port, if any.
    pub ssh_port: Option<u16>,
    /// Port and dSUID of a co-hosted auxiliary vdsm, if one exists.
    pub vdsm: Option<VdsmAnnounce>,
}

#[derive(Clone, Debug)]
pub struct VdsmAnnounce {
    pub dsuid: String,
    pub port: u16,
}

/// Running advertiser.
pub struct Advertiser {
    daemon: ServiceDaemon,
    config: AnnounceConfig,
    vdsm_registered: bool,
}

impl Advertiser {
    /// Register all records and start browsing for master vdsm instances.
    pub fn start(config: AnnounceConfig) -> Result<(Self, Receiver<MasterEvent>), AnnounceError> {
        let daemon = ServiceDaemon::new()?;

        let mut vdc_txt = HashMap::new();
        vdc_txt.insert("dSUID".to_string(), config.dsuid.clone());
        if config.noauto {
            vdc_txt.insert("noauto".to_string(), "1".to_string());
        }
        register(&daemon, VDC_SERVICE, &config.name, config.vdc_port, vdc_txt)?;
        log::info!(
            "[announce] advertising {} on port {} (dSUID {})",
            VDC_SERVICE,
            config.vdc_port,
            config.dsuid
        );

        if let Some(port) = config.http_port {
            register(&daemon, HTTP_SERVICE, &config.name, port, HashMap::new())?;
        }
        if let Some(port) = config.ssh_port {
            register(&daemon, SSH_SERVICE, &config.name, port, HashMap::new())?;
        }

        let (tx, rx) = unbounded();
        let browse_rx = daemon.browse(VDSM_SERVICE)?;
        let own_vdsm_dsuid = config.vdsm.as_ref().map(|v| v.dsuid.clone());
        std::thread::Builder::new()
            .name("evdc-announce".into())
            .spawn(move || browse_loop(&browse_rx, own_vdsm_dsuid.as_deref(), &tx))
            .map_err(|e| AnnounceError(e.to_string()))?;

        Ok((
            Self {
                daemon,
                config,
                vdsm_registered: false,
            },
            rx,
        ))
    }

    /// Advertise (or withdraw) the co-hosted auxiliary vdsm. The host calls
    /// this when master presence changes.
    pub fn set_vdsm_registered(&mut self, registered: bool) -> Result<(), AnnounceError> {
        let Some(vdsm) = self.config.vdsm.clone() else {
            return Ok(());
        };
        if registered == self.vdsm_registered {
            return Ok(());
        }
        if registered {
            let mut txt = HashMap::new();
            txt.insert("dSUID".to_string(), vdsm.dsuid);
            register(&self.daemon, VDSM_SERVICE, &self.config.name, vdsm.port, txt)?;
            log::info!("[announce] auxiliary vdsm advertised on port {}", vdsm.port);
        } else {
            let fullname = format!("{}.{}", self.config.name, VDSM_SERVICE);
            self.daemon.unregister(&fullname)?;
            log::info!("[announce] auxiliary vdsm withdrawn");
        }
        self.vdsm_registered = registered;
        Ok(())
    }

    /// Withdraw everything.
    pub fn shutdown(self) {
        if let Err(e) = self.daemon.shutdown() {
            log::warn!("[announce] shutdown: {}", e);
        }
    }
}

fn register(
    daemon: &ServiceDaemon,
    service: &str,
    name: &str,
    port: u16,
    txt: HashMap<String, String>,
) -> Result<(), AnnounceError> {
    let host = format!("{}.local.", name);
    let info = ServiceInfo::new(service, name, &host, "", port, txt)?.enable_addr_auto();
    daemon.register(info)?;
    Ok(())
}

/// Forward master vdsm appearances/disappearances, filtering out the
/// record this host publishes itself.
fn browse_loop(
    browse_rx: &mdns_sd::Receiver<ServiceEvent>,
    own_vdsm_dsuid: Option<&str>,
    tx: &Sender<MasterEvent>,
) {
    while let Ok(event) = browse_rx.recv() {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let dsuid = info.get_property_val_str("dSUID").unwrap_or_default();
                if own_vdsm_dsuid.is_some_and(|own| own == dsuid) {
                    continue; // that is us
                }
                log::info!("[announce] master vdsm present: {}", info.get_fullname());
                if tx
                    .send(MasterEvent::MasterAppeared {
                        name: info.get_fullname().to_string(),
                    })
                    .is_err()
                {
                    return;
                }
            }
            ServiceEvent::ServiceRemoved(_ty, fullname) => {
                log::info!("[announce] vdsm vanished: {}", fullname);
                if tx
                    .send(MasterEvent::MasterVanished { name: fullname })
                    .is_err()
                {
                    return;
                }
            }
            _ => {}
        }
    }
}
