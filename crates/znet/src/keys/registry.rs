// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-session resource registry.
//!
//! Readers load an immutable snapshot through [`ArcSwap`] and never block.
//! Writers serialize on a mutex, clone the snapshot, append, and swap.
//! Entries are never removed: ids stay valid for the lifetime of the session.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ResKey, ResourceId};
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone)]
struct Snapshot {
    /// Canonical names indexed by `id - 1`.
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, ResourceId>,
}

impl Snapshot {
    fn name_of(&self, id: ResourceId) -> Option<&Arc<str>> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.names.get(index)
    }
}

/// Interns resource names to numeric ids and resolves [`ResKey`]s.
pub struct ResourceRegistry {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
        }
    }

    /// Resolve any key variant to its canonical name.
    ///
    /// # Errors
    ///
    /// `UnknownResource` when the id was never declared, `InvalidKey` for an
    /// empty name.
    pub fn resolve(&self, key: &ResKey) -> Result<Arc<str>> {
        match key {
            ResKey::RName(name) => {
                if name.is_empty() {
                    return Err(Error::InvalidKey(name.clone()));
                }
                Ok(Arc::from(name.as_str()))
            }
            ResKey::RId(id) => self
                .snapshot
                .load()
                .name_of(*id)
                .cloned()
                .ok_or(Error::UnknownResource(*id)),
            ResKey::RIdWithSuffix(id, suffix) => {
                let snapshot = self.snapshot.load();
                let base = snapshot.name_of(*id).ok_or(Error::UnknownResource(*id))?;
                if suffix.is_empty() {
                    return Ok(base.clone());
                }
                let mut full = String::with_capacity(base.len() + suffix.len());
                full.push_str(base);
                full.push_str(suffix);
                Ok(Arc::from(full))
            }
        }
    }

    /// Intern the canonical name of `key` and return its id.
    ///
    /// Declaring a name twice returns the id assigned the first time.
    pub fn declare(&self, key: &ResKey) -> Result<ResourceId> {
        let name = self.resolve(key)?;

        let _guard = self.writer.lock();
        let current = self.snapshot.load_full();
        if let Some(id) = current.ids.get(&name) {
            return Ok(*id);
        }

        let mut next = Snapshot::clone(&current);
        next.names.push(name.clone());
        let id = next.names.len() as ResourceId;
        next.ids.insert(name.clone(), id);
        self.snapshot.store(Arc::new(next));

        log::debug!("[REGISTRY] Declared resource {} -> '{}'", id, name);
        Ok(id)
    }

    /// Name interned under `id`, if any.
    pub fn name_of(&self, id: ResourceId) -> Option<Arc<str>> {
        self.snapshot.load().name_of(id).cloned()
    }

    /// Id interned for `name`, if any.
    pub fn id_of(&self, name: &str) -> Option<ResourceId> {
        self.snapshot.load().ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_are_distinct() {
        let registry = ResourceRegistry::new();
        let a = registry.declare(&ResKey::rname("/a")).expect("declare /a");
        let b = registry.declare(&ResKey::rname("/b")).expect("declare /b");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_redeclare_returns_same_id() {
        let registry = ResourceRegistry::new();
        let first = registry.declare(&ResKey::rname("/demo")).expect("declare");
        let again = registry.declare(&ResKey::rname("/demo")).expect("redeclare");
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_variants() {
        let registry = ResourceRegistry::new();
        let id = registry.declare(&ResKey::rname("/demo")).expect("declare");

        assert_eq!(&*registry.resolve(&ResKey::RId(id)).expect("rid"), "/demo");
        assert_eq!(
            &*registry
                .resolve(&ResKey::rid_with_suffix(id, "/sub"))
                .expect("rid+suffix"),
            "/demo/sub"
        );
        assert_eq!(&*registry.resolve(&ResKey::rname("/x")).expect("rname"), "/x");
    }

    #[test]
    fn test_unknown_id_fails() {
        let registry = ResourceRegistry::new();
        assert!(matches!(
            registry.resolve(&ResKey::RId(0)),
            Err(Error::UnknownResource(0))
        ));
        assert!(matches!(
            registry.resolve(&ResKey::rid_with_suffix(9, "/x")),
            Err(Error::UnknownResource(9))
        ));
        assert!(matches!(
            registry.resolve(&ResKey::rname("")),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_declare_through_suffix_interns_full_name() {
        let registry = ResourceRegistry::new();
        let base = registry.declare(&ResKey::rname("/base")).expect("declare");
        let full = registry
            .declare(&ResKey::rid_with_suffix(base, "/leaf"))
            .expect("declare suffix");
        assert_ne!(base, full);
        assert_eq!(registry.id_of("/base/leaf"), Some(full));
    }
}
