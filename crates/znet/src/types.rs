// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plain data types exchanged between the session, its entities and callers.
//!
//! Everything here is immutable once built and cheap to clone: keys are
//! `Arc<str>` and payloads are reference-counted [`Bytes`].

use bitflags::bitflags;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Entity kinds
// ============================================================================

bitflags! {
    /// Kind of znet entity, used as a bitmask when scouting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WhatAmI: u32 {
        const ROUTER = 0x01;
        const PEER = 0x02;
        const CLIENT = 0x04;
    }
}

impl WhatAmI {
    /// Human readable name of a single-kind mask (`"router"`, `"peer"`, `"client"`).
    pub fn name(self) -> &'static str {
        if self == WhatAmI::ROUTER {
            "router"
        } else if self == WhatAmI::PEER {
            "peer"
        } else if self == WhatAmI::CLIENT {
            "client"
        } else {
            "mixed"
        }
    }
}

impl FromStr for WhatAmI {
    type Err = String;

    /// Parses `router`, `peer`, `client`, or a `|`-separated combination.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = WhatAmI::empty();
        for part in s.split('|').map(str::trim) {
            mask |= match part.to_lowercase().as_str() {
                "router" | "r" => WhatAmI::ROUTER,
                "peer" | "p" => WhatAmI::PEER,
                "client" | "c" => WhatAmI::CLIENT,
                _ => return Err(format!("Unknown entity kind: {}", part)),
            };
        }
        Ok(mask)
    }
}

impl fmt::Display for WhatAmI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(WhatAmI::name).collect();
        write!(f, "{}", names.join("|"))
    }
}

bitflags! {
    /// Queryable kind mask.
    ///
    /// `ALL_KINDS` on either the query target or the queryable matches any kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueryableKind: u32 {
        const ALL_KINDS = 0x01;
        const STORAGE = 0x02;
        const EVAL = 0x04;
    }
}

impl QueryableKind {
    /// Whether a queryable of kind `self` is eligible for a query targeting `wanted`.
    #[inline]
    pub fn accepts(self, wanted: QueryableKind) -> bool {
        self.contains(QueryableKind::ALL_KINDS)
            || wanted.contains(QueryableKind::ALL_KINDS)
            || self.intersects(wanted)
    }
}

// ============================================================================
// Identity and time
// ============================================================================

/// Maximum peer-id length accepted on the wire.
pub const PEER_ID_MAX_LEN: usize = 16;

/// Opaque identifier of a znet runtime instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Bytes);

static PEER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl PeerId {
    /// Build a peer id from raw bytes (truncated to [`PEER_ID_MAX_LEN`]).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(PEER_ID_MAX_LEN);
        Self(Bytes::copy_from_slice(&bytes[..len]))
    }

    /// Generate a process-unique peer id from wall clock, pid, thread and a counter.
    pub fn generate() -> Self {
        use std::hash::{Hash, Hasher};

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = PEER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::process::id().hash(&mut hasher);
        std::thread::current().id().hash(&mut hasher);
        counter.hash(&mut hasher);
        let mix = hasher.finish();

        let mut id = [0u8; PEER_ID_MAX_LEN];
        id[0..8].copy_from_slice(&nanos.to_le_bytes());
        id[8..16].copy_from_slice(&(mix ^ counter.rotate_left(32)).to_le_bytes());
        Self(Bytes::copy_from_slice(&id))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

/// NTP64 time stamped by the peer that produced a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    /// Seconds since the UNIX epoch in the upper 32 bits, fraction in the lower 32.
    pub time: u64,
    pub id: PeerId,
}

impl Timestamp {
    pub fn now(id: PeerId) -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let frac = (u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000;
        Self {
            time: (since_epoch.as_secs() << 32) | frac,
            id,
        }
    }
}

// ============================================================================
// Samples
// ============================================================================

/// A value associated with a resource key at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    key: Arc<str>,
    value: Bytes,
    timestamp: Option<Timestamp>,
}

impl Sample {
    pub fn new(key: impl Into<Arc<str>>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub(crate) fn with_timestamp(mut self, timestamp: Option<Timestamp>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Canonical resource name of this sample.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn key_arc(&self) -> &Arc<str> {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Payload as shared bytes (no copy).
    pub fn payload(&self) -> Bytes {
        self.value.clone()
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.timestamp.as_ref()
    }
}

// ============================================================================
// Subscription info
// ============================================================================

/// Delivery guarantee requested by a subscription, enforced by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    BestEffort,
    #[default]
    Reliable,
}

/// Subscription mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubMode {
    /// Samples are delivered as soon as they are written.
    #[default]
    Push,
    /// Samples are buffered until [`crate::Subscriber::pull`] is called.
    Pull,
}

/// Periodic subscription window (advisory, forwarded to the transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub origin: u64,
    pub period: u64,
    pub duration: u64,
}

/// Number of samples a pull subscription keeps between two pulls by default.
pub const DEFAULT_PULL_DEPTH: usize = 1;

/// Configuration of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubInfo {
    pub reliability: Reliability,
    pub mode: SubMode,
    pub period: Option<Period>,
    /// Pull mode only: samples retained between pulls (oldest dropped first).
    pub pull_depth: usize,
}

impl Default for SubInfo {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            mode: SubMode::Push,
            period: None,
            pull_depth: DEFAULT_PULL_DEPTH,
        }
    }
}

impl SubInfo {
    pub fn pull() -> Self {
        Self {
            mode: SubMode::Pull,
            ..Self::default()
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.reliability = Reliability::BestEffort;
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    /// Keep up to `depth` samples between pulls (minimum 1).
    pub fn pull_depth(mut self, depth: usize) -> Self {
        self.pull_depth = depth.max(1);
        self
    }
}

// ============================================================================
// Query target and consolidation
// ============================================================================

/// Which of the matching queryables receive a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// The nearest complete queryable if any, else all matching queryables.
    #[default]
    BestMatching,
    /// Up to `n` complete queryables.
    Complete { n: u64 },
    /// All matching queryables.
    All,
    /// No queryable.
    None,
}

/// Queryable kind mask combined with a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTarget {
    pub kind: QueryableKind,
    pub target: Target,
}

impl Default for QueryTarget {
    fn default() -> Self {
        Self {
            kind: QueryableKind::ALL_KINDS,
            target: Target::BestMatching,
        }
    }
}

impl QueryTarget {
    pub fn new(kind: QueryableKind, target: Target) -> Self {
        Self { kind, target }
    }

    pub fn all() -> Self {
        Self::new(QueryableKind::ALL_KINDS, Target::All)
    }

    pub fn none() -> Self {
        Self::new(QueryableKind::ALL_KINDS, Target::None)
    }
}

/// Deduplication applied to replies at one stage of the reply path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsolidationMode {
    /// No consolidation: every reply is forwarded.
    None,
    /// Forward the first reply per key at once, drop exact re-deliveries.
    Lazy,
    /// One reply per key (the most recent), released when the query completes.
    Full,
}

/// Consolidation modes for the three stages of the reply path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConsolidation {
    pub first_routers: ConsolidationMode,
    pub last_router: ConsolidationMode,
    pub reception: ConsolidationMode,
}

impl Default for QueryConsolidation {
    fn default() -> Self {
        Self {
            first_routers: ConsolidationMode::Lazy,
            last_router: ConsolidationMode::Lazy,
            reception: ConsolidationMode::Full,
        }
    }
}

impl QueryConsolidation {
    /// Same mode at every stage.
    pub fn uniform(mode: ConsolidationMode) -> Self {
        Self {
            first_routers: mode,
            last_router: mode,
            reception: mode,
        }
    }

    pub fn full() -> Self {
        Self::uniform(ConsolidationMode::Full)
    }

    pub fn none() -> Self {
        Self::uniform(ConsolidationMode::None)
    }

    /// Stages in pipeline order.
    pub fn stages(&self) -> [ConsolidationMode; 3] {
        [self.first_routers, self.last_router, self.reception]
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Origin of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Kind of the replying queryable.
    pub kind: QueryableKind,
    /// Peer id of the runtime hosting the queryable.
    pub id: PeerId,
}

/// One reply to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub source: SourceInfo,
    pub sample: Sample,
}

/// Event delivered to a query's reply handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Data(Reply),
    /// No more replies will follow.
    Final,
}

// ============================================================================
// Scouting
// ============================================================================

/// Response to a scout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub whatami: WhatAmI,
    pub pid: Option<PeerId>,
    pub locators: Vec<String>,
}

impl fmt::Display for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pid = self
            .pid
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "Hello {{ pid: {}, whatami: {}, locators: [{}] }}",
            pid,
            self.whatami,
            self.locators.join(", ")
        )
    }
}
