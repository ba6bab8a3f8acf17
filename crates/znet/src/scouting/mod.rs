// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scouting: discover routers, peers and clients reachable from this host.
//!
//! [`scout`] sends a scout message to the scouting address (multicast by default) and
//! collects the [`Hello`]s that answer within the scouting window. Scouts are
//! repeated every `scouting_delay` while the window is open, since datagrams
//! may be lost.

mod responder;
mod socket;
pub mod wire;

pub use responder::ScoutResponder;
pub use socket::{non_loopback_interfaces, MULTICAST_IF_ENV};

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::config::{Properties, SessionConfig};
use crate::error::Result;
use crate::types::{Hello, PeerId, WhatAmI};
use wire::ScoutingMessage;

const MAX_DATAGRAM: usize = 1500;
/// Lower bound for a blocking receive, so a tiny remaining window still polls.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Scout for entities whose kind intersects `what`.
///
/// Returns once `period` has elapsed. With a zero `period` one scout is sent
/// and only the hellos already buffered are returned. Hellos are
/// deduplicated by peer id (last seen wins). An empty result is not an error;
/// nor is an unsendable scout (logged), since no peer can answer it anyway.
///
/// # Errors
///
/// `InvalidConfig` for bad properties, `IoError` if the socket cannot be set up.
pub fn scout(what: WhatAmI, properties: &Properties, period: Duration) -> Result<Vec<Hello>> {
    let config = SessionConfig::from_properties(properties)?;
    if !config.multicast_scouting {
        log::debug!("[SCOUT] Multicast scouting disabled, nothing to do");
        return Ok(Vec::new());
    }

    let target = config.multicast_address;
    let socket = socket::scout_socket(&target, &config.multicast_interface)?;
    let message = wire::encode_scout(what, true);
    let mut collector = HelloCollector::new(what);
    let mut buf = [0u8; MAX_DATAGRAM];

    let started = Instant::now();
    let deadline = started + period;
    send_scout(&socket, &message, target);

    if period.is_zero() {
        drain_nonblocking(&socket, &mut buf, &mut collector)?;
    } else {
        let delay = config.scouting_delay.max(MIN_WAIT);
        let mut next_scout = started + delay;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if now >= next_scout {
                send_scout(&socket, &message, target);
                next_scout = now + delay;
            }

            let wait = deadline.min(next_scout).saturating_duration_since(now);
            socket.set_read_timeout(Some(wait.max(MIN_WAIT)))?;
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => collector.accept(&buf[..len], from),
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        drain_nonblocking(&socket, &mut buf, &mut collector)?;
    }

    let hellos = collector.into_hellos();
    log::debug!(
        "[SCOUT] Found {} entit{} for {} in {:?}",
        hellos.len(),
        if hellos.len() == 1 { "y" } else { "ies" },
        what,
        started.elapsed()
    );
    Ok(hellos)
}

/// [`scout`] with the window taken from the `scouting_timeout` property.
///
/// # Errors
///
/// Same as [`scout`].
pub fn scout_configured(what: WhatAmI, properties: &Properties) -> Result<Vec<Hello>> {
    let period = SessionConfig::from_properties(properties)?.scouting_timeout;
    log::debug!("[SCOUT] Using configured scouting window {:?}", period);
    scout(what, properties, period)
}

fn send_scout(socket: &UdpSocket, message: &[u8], target: SocketAddr) {
    if let Err(e) = socket.send_to(message, target) {
        log::warn!("[SCOUT] Failed to send scout to {}: {}", target, e);
    }
}

fn drain_nonblocking(
    socket: &UdpSocket,
    buf: &mut [u8],
    collector: &mut HelloCollector,
) -> Result<()> {
    socket.set_nonblocking(true)?;
    loop {
        match socket.recv_from(buf) {
            Ok((len, from)) => collector.accept(&buf[..len], from),
            Err(e) if is_timeout(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Accumulates hellos for one scouting run.
struct HelloCollector {
    what: WhatAmI,
    hellos: Vec<Hello>,
    by_pid: HashMap<PeerId, usize>,
}

impl HelloCollector {
    fn new(what: WhatAmI) -> Self {
        Self {
            what,
            hellos: Vec::new(),
            by_pid: HashMap::new(),
        }
    }

    fn accept(&mut self, datagram: &[u8], from: SocketAddr) {
        let mut hello = match wire::decode(datagram) {
            Ok(ScoutingMessage::Hello(hello)) => hello,
            // our own scout looped back, or another scout
            Ok(ScoutingMessage::Scout { .. }) => return,
            Err(e) => {
                log::debug!("[SCOUT] Ignoring datagram from {}: {}", from, e);
                return;
            }
        };

        if !hello.whatami.intersects(self.what) {
            log::trace!("[SCOUT] Ignoring {} hello from {}", hello.whatami, from);
            return;
        }
        if hello.locators.is_empty() {
            hello.locators.push(format!("udp/{}", from));
        }

        match hello.pid.clone() {
            Some(pid) => match self.by_pid.get(&pid) {
                Some(&index) => self.hellos[index] = hello,
                None => {
                    self.by_pid.insert(pid, self.hellos.len());
                    self.hellos.push(hello);
                }
            },
            None => {
                if !self.hellos.contains(&hello) {
                    self.hellos.push(hello);
                }
            }
        }
    }

    fn into_hellos(self) -> Vec<Hello> {
        self.hellos
    }
}
