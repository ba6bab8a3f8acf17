// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queryable table entries and query target selection.

use std::fmt;
use std::sync::{Arc, Weak};

use super::SessionInner;
use crate::engine::dispatcher::QueryGate;
use crate::engine::Handle;
use crate::keys::{includes, intersect};
use crate::types::{QueryTarget, QueryableKind, Target};

/// Completeness and distance of a queryable.
///
/// A complete queryable answers for every key its own key covers. Distance
/// orders complete queryables for `BestMatching` and `Complete { n }`; it is
/// always 0 for a queryable declared on the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryableInfo {
    pub complete: bool,
    pub distance: u64,
}

impl QueryableInfo {
    /// Storages are complete by default, evals are not.
    pub fn for_kind(kind: QueryableKind) -> Self {
        Self {
            complete: kind.contains(QueryableKind::STORAGE),
            distance: 0,
        }
    }
}

pub(crate) struct QueryableEntry {
    pub key: Arc<str>,
    pub kind: QueryableKind,
    pub info: QueryableInfo,
    pub gate: Arc<QueryGate>,
}

impl QueryableEntry {
    fn matches(&self, res_name: &str, kind: QueryableKind) -> bool {
        self.kind.accepts(kind) && intersect(&self.key, res_name)
    }

    fn is_complete_for(&self, res_name: &str) -> bool {
        self.info.complete && includes(&self.key, res_name)
    }
}

/// Pick the queryables that receive a query on `res_name`.
pub(crate) fn select_targets<'a>(
    entries: impl Iterator<Item = &'a QueryableEntry>,
    res_name: &str,
    target: &QueryTarget,
) -> Vec<&'a QueryableEntry> {
    if target.target == Target::None {
        return Vec::new();
    }

    let matching: Vec<&QueryableEntry> = entries
        .filter(|entry| entry.matches(res_name, target.kind))
        .collect();

    let complete_nearest_first = |matching: &[&'a QueryableEntry]| {
        let mut complete: Vec<&'a QueryableEntry> = matching
            .iter()
            .copied()
            .filter(|entry| entry.is_complete_for(res_name))
            .collect();
        complete.sort_by_key(|entry| entry.info.distance);
        complete
    };

    match target.target {
        Target::All => matching,
        Target::BestMatching => {
            let complete = complete_nearest_first(&matching);
            match complete.first() {
                Some(best) => vec![*best],
                None => matching,
            }
        }
        Target::Complete { n } => {
            let mut complete = complete_nearest_first(&matching);
            complete.truncate(usize::try_from(n).unwrap_or(usize::MAX));
            complete
        }
        Target::None => Vec::new(),
    }
}

/// A declared queryable. Undeclared when dropped.
pub struct Queryable {
    pub(super) handle: Handle,
    pub(super) key: Arc<str>,
    pub(super) kind: QueryableKind,
    pub(super) session: Weak<SessionInner>,
}

impl Queryable {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> QueryableKind {
        self.kind
    }

    /// Stop receiving queries. Returns `false` if already undeclared.
    ///
    /// When this returns, the handler is not running and will not run again.
    pub fn undeclare(&self) -> bool {
        match self.session.upgrade() {
            Some(session) => session.undeclare_queryable(self.handle),
            None => false,
        }
    }
}

impl Drop for Queryable {
    fn drop(&mut self) {
        self.undeclare();
    }
}

impl fmt::Debug for Queryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}
