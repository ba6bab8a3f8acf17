// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration.
//!
//! # Architecture
//!
//! - **Level 1 (Properties)**: an ordered `u64 -> String` map keyed by the
//!   `ZN_CONFIG_*` constants, exactly what callers pass to [`crate::Session::open`].
//! - **Level 2 (Typed)**: [`SessionConfig`], the validated view the session and
//!   the scouting engine actually read.
//!
//! # Example
//!
//! ```
//! use znet::config::{self, Properties, SessionConfig, ZN_CONFIG_LOCAL_ROUTING_KEY};
//!
//! let mut props = config::config_peer();
//! props.insert(ZN_CONFIG_LOCAL_ROUTING_KEY, "false");
//! let typed = SessionConfig::from_properties(&props).unwrap();
//! assert!(!typed.local_routing);
//!
//! let parsed: Properties = "mode=client;peer=tcp/10.0.0.1:7447".parse().unwrap();
//! assert_eq!(parsed.get(config::ZN_CONFIG_MODE_KEY), Some("client"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::WhatAmI;

// =======================================================================
// Configuration keys
// =======================================================================

/// Entity kind of the session: `"peer"` or `"client"`.
pub const ZN_CONFIG_MODE_KEY: u64 = 0x40;
/// Comma-separated locators of peers to connect to.
pub const ZN_CONFIG_PEER_KEY: u64 = 0x41;
/// Comma-separated locators to listen on.
pub const ZN_CONFIG_LISTENER_KEY: u64 = 0x42;
pub const ZN_CONFIG_USER_KEY: u64 = 0x43;
pub const ZN_CONFIG_PASSWORD_KEY: u64 = 0x44;
/// `"true"` / `"false"`: enable multicast scouting.
pub const ZN_CONFIG_MULTICAST_SCOUTING_KEY: u64 = 0x45;
/// Interface used for multicast scouting, `"auto"` to pick one.
pub const ZN_CONFIG_MULTICAST_INTERFACE_KEY: u64 = 0x46;
/// `ip:port` the scout message is sent to.
pub const ZN_CONFIG_MULTICAST_ADDRESS_KEY: u64 = 0x47;
/// Seconds (float) a client spends looking for a router.
pub const ZN_CONFIG_SCOUTING_TIMEOUT_KEY: u64 = 0x48;
/// Seconds (float) between two scout messages.
pub const ZN_CONFIG_SCOUTING_DELAY_KEY: u64 = 0x49;
/// `"true"` / `"false"`: timestamp every written sample.
pub const ZN_CONFIG_ADD_TIMESTAMP_KEY: u64 = 0x4A;
/// `"true"` / `"false"`: deliver writes to subscribers of the same session.
pub const ZN_CONFIG_LOCAL_ROUTING_KEY: u64 = 0x4B;

/// Peer id of the local session (hex).
pub const ZN_INFO_PID_KEY: u64 = 0x00;
/// Comma-separated peer ids of connected peers.
pub const ZN_INFO_PEER_PID_KEY: u64 = 0x01;
/// Comma-separated peer ids of connected routers.
pub const ZN_INFO_ROUTER_PID_KEY: u64 = 0x02;

/// Default scouting group and port.
pub const DEFAULT_MULTICAST_ADDRESS: &str = "224.0.0.224:7447";
pub const DEFAULT_MULTICAST_INTERFACE: &str = "auto";
pub const DEFAULT_SCOUTING_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SCOUTING_DELAY: Duration = Duration::from_millis(200);

const NAMES: &[(&str, u64)] = &[
    ("mode", ZN_CONFIG_MODE_KEY),
    ("peer", ZN_CONFIG_PEER_KEY),
    ("listener", ZN_CONFIG_LISTENER_KEY),
    ("user", ZN_CONFIG_USER_KEY),
    ("password", ZN_CONFIG_PASSWORD_KEY),
    ("multicast_scouting", ZN_CONFIG_MULTICAST_SCOUTING_KEY),
    ("multicast_interface", ZN_CONFIG_MULTICAST_INTERFACE_KEY),
    ("multicast_address", ZN_CONFIG_MULTICAST_ADDRESS_KEY),
    ("scouting_timeout", ZN_CONFIG_SCOUTING_TIMEOUT_KEY),
    ("scouting_delay", ZN_CONFIG_SCOUTING_DELAY_KEY),
    ("add_timestamp", ZN_CONFIG_ADD_TIMESTAMP_KEY),
    ("local_routing", ZN_CONFIG_LOCAL_ROUTING_KEY),
];

/// Numeric key for a configuration name (`"mode"` -> `0x40`).
pub fn key_of(name: &str) -> Option<u64> {
    NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, k)| *k)
}

/// Configuration name for a numeric key.
pub fn name_of(key: u64) -> Option<&'static str> {
    NAMES.iter().find(|(_, k)| *k == key).map(|(n, _)| *n)
}

// =======================================================================
// Properties
// =======================================================================

/// Ordered map of numeric property keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<u64, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, key: u64, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key, value.into());
        self
    }

    pub fn with(mut self, key: u64, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: u64) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn remove(&mut self, key: u64) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl FromIterator<(u64, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromStr for Properties {
    type Err = Error;

    /// Parses `name=value` pairs separated by `;`. Blank entries are skipped.
    fn from_str(s: &str) -> Result<Self> {
        let mut props = Properties::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| Error::UnknownConfigName(entry.to_string()))?;
            let key = key_of(name.trim())
                .ok_or_else(|| Error::UnknownConfigName(name.trim().to_string()))?;
            props.insert(key, value.trim());
        }
        Ok(props)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            match name_of(key) {
                Some(name) => write!(f, "{}={}", name, value)?,
                None => write!(f, "{:#x}={}", key, value)?,
            }
        }
        Ok(())
    }
}

/// No property set: every value takes its default.
pub fn config_empty() -> Properties {
    Properties::new()
}

/// Default configuration (peer mode).
pub fn config_default() -> Properties {
    config_peer()
}

/// Peer mode configuration.
pub fn config_peer() -> Properties {
    Properties::new().with(ZN_CONFIG_MODE_KEY, "peer")
}

/// Client mode configuration, optionally pinned to one peer locator.
pub fn config_client(peer: Option<&str>) -> Properties {
    let mut props = Properties::new().with(ZN_CONFIG_MODE_KEY, "client");
    if let Some(locator) = peer {
        props.insert(ZN_CONFIG_PEER_KEY, locator);
    }
    props
}

// =======================================================================
// Typed view
// =======================================================================

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: WhatAmI,
    pub peers: Vec<String>,
    pub listeners: Vec<String>,
    pub multicast_scouting: bool,
    pub multicast_interface: String,
    pub multicast_address: SocketAddr,
    pub scouting_timeout: Duration,
    pub scouting_delay: Duration,
    pub add_timestamp: bool,
    pub local_routing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: WhatAmI::PEER,
            peers: Vec::new(),
            listeners: Vec::new(),
            multicast_scouting: true,
            multicast_interface: DEFAULT_MULTICAST_INTERFACE.to_string(),
            multicast_address: SocketAddr::from(([224, 0, 0, 224], 7447)),
            scouting_timeout: DEFAULT_SCOUTING_TIMEOUT,
            scouting_delay: DEFAULT_SCOUTING_DELAY,
            add_timestamp: false,
            local_routing: true,
        }
    }
}

impl SessionConfig {
    /// Build the typed view, applying defaults for absent keys.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first property whose value cannot be parsed.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut cfg = SessionConfig::default();

        if let Some(mode) = props.get(ZN_CONFIG_MODE_KEY) {
            cfg.mode = match mode.trim().to_lowercase().as_str() {
                "peer" => WhatAmI::PEER,
                "client" => WhatAmI::CLIENT,
                "router" => WhatAmI::ROUTER,
                _ => return Err(invalid(ZN_CONFIG_MODE_KEY, mode)),
            };
        }
        if let Some(peers) = props.get(ZN_CONFIG_PEER_KEY) {
            cfg.peers = split_list(peers);
        }
        if let Some(listeners) = props.get(ZN_CONFIG_LISTENER_KEY) {
            cfg.listeners = split_list(listeners);
        }
        if let Some(value) = props.get(ZN_CONFIG_MULTICAST_SCOUTING_KEY) {
            cfg.multicast_scouting = parse_bool(ZN_CONFIG_MULTICAST_SCOUTING_KEY, value)?;
        }
        if let Some(iface) = props.get(ZN_CONFIG_MULTICAST_INTERFACE_KEY) {
            cfg.multicast_interface = iface.trim().to_string();
        }
        if let Some(addr) = props.get(ZN_CONFIG_MULTICAST_ADDRESS_KEY) {
            cfg.multicast_address = addr
                .trim()
                .parse()
                .map_err(|_| invalid(ZN_CONFIG_MULTICAST_ADDRESS_KEY, addr))?;
        }
        if let Some(value) = props.get(ZN_CONFIG_SCOUTING_TIMEOUT_KEY) {
            cfg.scouting_timeout = parse_seconds(ZN_CONFIG_SCOUTING_TIMEOUT_KEY, value)?;
        }
        if let Some(value) = props.get(ZN_CONFIG_SCOUTING_DELAY_KEY) {
            cfg.scouting_delay = parse_seconds(ZN_CONFIG_SCOUTING_DELAY_KEY, value)?;
        }
        if let Some(value) = props.get(ZN_CONFIG_ADD_TIMESTAMP_KEY) {
            cfg.add_timestamp = parse_bool(ZN_CONFIG_ADD_TIMESTAMP_KEY, value)?;
        }
        if let Some(value) = props.get(ZN_CONFIG_LOCAL_ROUTING_KEY) {
            cfg.local_routing = parse_bool(ZN_CONFIG_LOCAL_ROUTING_KEY, value)?;
        }

        Ok(cfg)
    }
}

fn invalid(key: u64, value: &str) -> Error {
    Error::InvalidConfig {
        key,
        value: value.to_string(),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: u64, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_seconds(key: u64, value: &str) -> Result<Duration> {
    let secs: f64 = value.trim().parse().map_err(|_| invalid(key, value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid(key, value));
    }
    Ok(Duration::from_secs_f64(secs))
}
