// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP sockets used by scouting.
//!
//! The scouting address is normally a multicast group, but any unicast
//! address works too (a responder bound to `127.0.0.1:port`, for instance).

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Multicast TTL for scout messages: stay on the local link.
const SCOUT_TTL: u32 = 1;

/// Environment override for the scouting interface.
pub const MULTICAST_IF_ENV: &str = "ZNET_MULTICAST_IF";

fn new_udp_socket(target: &SocketAddr) -> io::Result<Socket> {
    let domain = match target {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
}

/// Resolve the configured interface (`"auto"` or an IPv4 address).
pub fn resolve_interface(interface: &str) -> Ipv4Addr {
    if let Ok(var) = std::env::var(MULTICAST_IF_ENV) {
        if let Ok(addr) = var.parse::<Ipv4Addr>() {
            log::debug!("[SCOUT] Using {} override: {}", MULTICAST_IF_ENV, addr);
            return addr;
        }
    }
    if interface != "auto" {
        if let Ok(addr) = interface.parse::<Ipv4Addr>() {
            return addr;
        }
        log::warn!("[SCOUT] Unusable multicast interface '{}', using auto", interface);
    }
    non_loopback_interfaces()
        .into_iter()
        .next()
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

/// Non-loopback IPv4 addresses of this host.
pub fn non_loopback_interfaces() -> Vec<Ipv4Addr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::debug!("[SCOUT] Failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|(_name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect()
}

/// Ephemeral socket used to send scout messages and receive hellos.
pub fn scout_socket(target: &SocketAddr, interface: &str) -> io::Result<UdpSocket> {
    let socket = new_udp_socket(target)?;
    let bind: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&bind.into())?;

    if let SocketAddr::V4(v4) = target {
        if v4.ip().is_multicast() {
            let iface = resolve_interface(interface);
            if !iface.is_unspecified() {
                socket.set_multicast_if_v4(&iface)?;
            }
            socket.set_multicast_loop_v4(true)?;
            socket.set_multicast_ttl_v4(SCOUT_TTL)?;
            log::debug!("[SCOUT] Probing {} via interface {}", target, iface);
        }
    }
    Ok(socket.into())
}

/// Socket listening for scout messages on the scouting address.
///
/// Multicast groups are joined on the configured interface with address and
/// port reuse, so several responders can share a host.
pub fn listen_socket(addr: &SocketAddr, interface: &str) -> io::Result<UdpSocket> {
    let socket = new_udp_socket(addr)?;

    match addr {
        SocketAddr::V4(v4) if v4.ip().is_multicast() => {
            socket.set_reuse_address(true)?;
            #[cfg(unix)]
            socket.set_reuse_port(true)?;
            let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, v4.port()).into();
            socket.bind(&bind.into())?;

            let iface = resolve_interface(interface);
            socket.join_multicast_v4(v4.ip(), &iface)?;
            socket.set_multicast_loop_v4(true)?;
            log::debug!("[SCOUT] Joined {} on interface {}", v4.ip(), iface);
        }
        _ => {
            socket.bind(&(*addr).into())?;
        }
    }
    Ok(socket.into())
}
