// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource keys: the three key variants, the wildcard matcher and the
//! per-session registry that interns names to numeric ids.

pub mod matcher;
mod registry;

use std::fmt;

pub use matcher::{includes, intersect};
pub use registry::ResourceRegistry;

/// Numeric resource id assigned by [`ResourceRegistry::declare`]. Ids start at 1.
pub type ResourceId = u64;

/// A reference to a resource.
///
/// All three forms resolve to one canonical name within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResKey {
    /// A previously declared numeric id.
    RId(ResourceId),
    /// A declared id followed by a suffix appended to its name.
    RIdWithSuffix(ResourceId, String),
    /// A full resource name, possibly containing wildcards.
    RName(String),
}

impl ResKey {
    pub fn rname(name: impl Into<String>) -> Self {
        ResKey::RName(name.into())
    }

    pub fn rid_with_suffix(id: ResourceId, suffix: impl Into<String>) -> Self {
        ResKey::RIdWithSuffix(id, suffix.into())
    }

    /// Numeric id part of the key, if any.
    pub fn rid(&self) -> Option<ResourceId> {
        match self {
            ResKey::RId(id) | ResKey::RIdWithSuffix(id, _) => Some(*id),
            ResKey::RName(_) => None,
        }
    }
}

impl From<&str> for ResKey {
    fn from(name: &str) -> Self {
        ResKey::RName(name.to_string())
    }
}

impl From<String> for ResKey {
    fn from(name: String) -> Self {
        ResKey::RName(name)
    }
}

impl From<&ResKey> for ResKey {
    fn from(key: &ResKey) -> Self {
        key.clone()
    }
}

impl From<ResourceId> for ResKey {
    fn from(id: ResourceId) -> Self {
        ResKey::RId(id)
    }
}

impl fmt::Display for ResKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResKey::RId(id) => write!(f, "{}", id),
            ResKey::RIdWithSuffix(id, suffix) => write!(f, "{}{}", id, suffix),
            ResKey::RName(name) => f.write_str(name),
        }
    }
}
