// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boundary towards the wire.
//!
//! Framing and delivery of samples between sessions are not part of this
//! crate. A session hands every written sample and every entity declaration
//! to its [`Transport`]; samples arriving from remote peers come back in
//! through [`crate::Session::handle_sample`].

use crate::keys::ResourceId;
use crate::types::{PeerId, QueryableKind, Sample, SubInfo, WhatAmI};

/// Entity declarations announced to remote peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Resource { id: ResourceId, name: String },
    Publisher { key: String },
    Subscriber { key: String, info: SubInfo },
    Queryable { key: String, kind: QueryableKind },
    ForgetPublisher { key: String },
    ForgetSubscriber { key: String },
    ForgetQueryable { key: String },
}

/// Outbound side of a session.
///
/// Called with table locks released, from the thread that issued the
/// operation. Implementations must not block for long.
pub trait Transport: Send + Sync {
    /// A sample written by the local session.
    fn send_sample(&self, sample: &Sample);

    /// A local entity was declared or undeclared.
    fn declare(&self, declaration: &Declaration);

    /// Peer ids of connected remote entities of kind `whatami`.
    fn connected(&self, whatami: WhatAmI) -> Vec<PeerId> {
        let _ = whatami;
        Vec::new()
    }
}

/// Transport that delivers nothing remotely.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

impl Transport for LocalOnly {
    fn send_sample(&self, sample: &Sample) {
        log::trace!("[TRANSPORT] Local-only session, '{}' not forwarded", sample.key());
    }

    fn declare(&self, declaration: &Declaration) {
        log::trace!("[TRANSPORT] Local-only session, {:?} not announced", declaration);
    }
}
