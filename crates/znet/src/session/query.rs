// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query sessions.
//!
//! One [`QueryState`] per `query()` call, shared by the caller's
//! [`QueryHandle`] and the [`Query`] objects handed to every selected
//! queryable.
//!
//! ```text
//! Open --start(n>0)--> Collecting --last replier closed--> Consolidating --> Closed
//!   |                      |
//!   +--start(0)------------+--close()-----------------------------------> Closed
//! ```
//!
//! Reply events are queued to the dispatcher while the progress lock is held,
//! so the reply handler observes them in consolidation order and the final
//! marker always comes last.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::consolidation::Consolidator;
use super::SessionInner;
use crate::engine::dispatcher::{DispatchHandle, Job, ReplyGate};
use crate::engine::gate::Release;
use crate::types::{QueryConsolidation, QueryTarget, Reply, ReplyEvent, Sample, SourceInfo};

/// Lifecycle of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// Created, not yet forwarded.
    Open,
    /// Forwarded; waiting for repliers to close.
    Collecting,
    /// Every replier closed; held replies are being released.
    Consolidating,
    /// Terminal. No reply callback runs after this point.
    Closed,
}

struct Progress {
    phase: QueryPhase,
    pending: usize,
    consolidator: Consolidator,
}

pub(crate) struct QueryState {
    id: u64,
    res_name: Arc<str>,
    predicate: Arc<str>,
    target: QueryTarget,
    consolidation: QueryConsolidation,
    progress: Mutex<Progress>,
    closed: Condvar,
    gate: Arc<ReplyGate>,
    dispatch: DispatchHandle,
    session: Weak<SessionInner>,
}

pub(crate) struct QueryParams {
    pub res_name: Arc<str>,
    pub predicate: Arc<str>,
    pub target: QueryTarget,
    pub consolidation: QueryConsolidation,
}

impl QueryState {
    pub fn new(
        id: u64,
        params: QueryParams,
        gate: Arc<ReplyGate>,
        dispatch: DispatchHandle,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            id,
            progress: Mutex::new(Progress {
                phase: QueryPhase::Open,
                pending: 0,
                consolidator: Consolidator::new(&params.consolidation),
            }),
            res_name: params.res_name,
            predicate: params.predicate,
            target: params.target,
            consolidation: params.consolidation,
            closed: Condvar::new(),
            gate,
            dispatch,
            session,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> QueryPhase {
        self.progress.lock().phase
    }

    /// Enter Collecting with `repliers` outstanding, or finish at once when zero.
    pub fn start(&self, repliers: usize) {
        let mut progress = self.progress.lock();
        if progress.phase != QueryPhase::Open {
            return;
        }
        if repliers == 0 {
            self.finish(progress);
            return;
        }
        progress.phase = QueryPhase::Collecting;
        progress.pending = repliers;
    }

    fn on_reply(&self, reply: Reply) {
        let mut progress = self.progress.lock();
        if progress.phase != QueryPhase::Collecting {
            log::trace!(
                "[QUERY] Reply on '{}' after query {} stopped collecting",
                reply.sample.key(),
                self.id
            );
            return;
        }
        for released in progress.consolidator.push(reply) {
            self.emit(ReplyEvent::Data(released));
        }
    }

    fn on_replier_closed(&self) {
        let mut progress = self.progress.lock();
        if progress.phase != QueryPhase::Collecting {
            return;
        }
        progress.pending = progress.pending.saturating_sub(1);
        if progress.pending == 0 {
            self.finish(progress);
        }
    }

    /// Flush, emit the final marker and release the reply handler.
    fn finish(&self, mut progress: MutexGuard<'_, Progress>) {
        progress.phase = QueryPhase::Consolidating;
        for released in progress.consolidator.flush() {
            self.emit(ReplyEvent::Data(released));
        }
        self.emit(ReplyEvent::Final);
        let release: Arc<dyn Release> = self.gate.clone();
        if !self.dispatch.submit(Job::Release(release)) {
            self.gate.close();
        }
        progress.phase = QueryPhase::Closed;
        self.closed.notify_all();
        drop(progress);

        log::debug!("[QUERY] Query {} on '{}' completed", self.id, self.res_name);
        self.forget();
    }

    /// Close before completion. Returns `false` if already closed.
    pub fn cancel(&self) -> bool {
        {
            let mut progress = self.progress.lock();
            if progress.phase == QueryPhase::Closed {
                return false;
            }
            progress.phase = QueryPhase::Closed;
            self.closed.notify_all();
        }
        self.dispatch.close_gate(&self.gate);
        log::debug!("[QUERY] Query {} on '{}' closed early", self.id, self.res_name);
        self.forget();
        true
    }

    fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.progress.lock();
        while progress.phase != QueryPhase::Closed {
            if self.closed.wait_until(&mut progress, deadline).timed_out() {
                return progress.phase == QueryPhase::Closed;
            }
        }
        true
    }

    fn emit(&self, event: ReplyEvent) {
        let job = Job::Reply {
            gate: self.gate.clone(),
            event,
        };
        if !self.dispatch.submit(job) {
            log::trace!("[QUERY] Dispatcher stopped, reply for query {} dropped", self.id);
        }
    }

    fn forget(&self) {
        if let Some(session) = self.session.upgrade() {
            session.forget_query(self.id);
        }
    }
}

// ============================================================================
// Query (replier side)
// ============================================================================

/// A query delivered to a queryable.
///
/// Reply with [`Query::reply`] any number of times, then drop the query (or
/// call [`Query::close`]). The query may be moved to another thread and
/// answered later.
pub struct Query {
    state: Arc<QueryState>,
    source: SourceInfo,
    closed: bool,
}

impl Query {
    pub(crate) fn new(state: Arc<QueryState>, source: SourceInfo) -> Self {
        Self {
            state,
            source,
            closed: false,
        }
    }

    /// Resource name the query was issued on.
    pub fn res_name(&self) -> &str {
        &self.state.res_name
    }

    pub fn predicate(&self) -> &str {
        &self.state.predicate
    }

    pub fn target(&self) -> QueryTarget {
        self.state.target
    }

    pub fn consolidation(&self) -> QueryConsolidation {
        self.state.consolidation
    }

    /// Send one reply. Ignored once the query is closed.
    pub fn reply(&self, key: &str, payload: &[u8]) {
        self.reply_bytes(key, Bytes::copy_from_slice(payload));
    }

    pub fn reply_bytes(&self, key: &str, payload: Bytes) {
        let reply = Reply {
            source: self.source.clone(),
            sample: Sample::new(key, payload),
        };
        self.state.on_reply(reply);
    }

    /// Signal that this queryable has no more replies.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.on_replier_closed();
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.state.id)
            .field("res_name", &self.state.res_name)
            .field("predicate", &self.state.predicate)
            .finish()
    }
}

// ============================================================================
// QueryHandle (caller side)
// ============================================================================

/// Handle on an in-flight query, returned by [`crate::Session::query`].
///
/// Dropping the handle does not close the query.
pub struct QueryHandle {
    state: Arc<QueryState>,
}

impl QueryHandle {
    pub(crate) fn new(state: Arc<QueryState>) -> Self {
        Self { state }
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    pub fn phase(&self) -> QueryPhase {
        self.state.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == QueryPhase::Closed
    }

    /// Stop the query. No reply callback starts after this returns.
    ///
    /// Returns `false` if the query was already closed.
    pub fn close(&self) -> bool {
        self.state.cancel()
    }

    /// Block until the query is closed or `timeout` elapses.
    ///
    /// Closure is reached once every replier closed; the final marker may
    /// still be queued for the reply handler at that point.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.state.wait_closed(timeout)
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.state.id)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatcher::Dispatcher;
    use crate::engine::gate::Gate;
    use crate::engine::handler::ReplyHandler;
    use crate::types::{ConsolidationMode, PeerId, QueryableKind};
    use crossbeam::channel::{self, Receiver};

    fn new_state(
        dispatcher: &Dispatcher,
        consolidation: QueryConsolidation,
    ) -> (Arc<QueryState>, Receiver<ReplyEvent>) {
        let (tx, rx) = channel::unbounded::<ReplyEvent>();
        let boxed: Box<dyn ReplyHandler> = Box::new(tx);
        let state = QueryState::new(
            1,
            QueryParams {
                res_name: Arc::from("/q"),
                predicate: Arc::from(""),
                target: QueryTarget::default(),
                consolidation,
            },
            Arc::new(Gate::new(boxed)),
            dispatcher.handle().clone(),
            Weak::new(),
        );
        (Arc::new(state), rx)
    }

    fn source() -> SourceInfo {
        SourceInfo {
            kind: QueryableKind::EVAL,
            id: PeerId::from_bytes(&[7]),
        }
    }

    fn collect(rx: &Receiver<ReplyEvent>) -> Vec<ReplyEvent> {
        rx.iter().collect()
    }

    #[test]
    fn test_zero_repliers_closes_with_final_only() {
        let dispatcher = Dispatcher::start("znet-query-test").expect("start");
        let (state, rx) = new_state(&dispatcher, QueryConsolidation::default());

        state.start(0);
        assert_eq!(state.phase(), QueryPhase::Closed);
        assert_eq!(collect(&rx), vec![ReplyEvent::Final]);
    }

    #[test]
    fn test_final_after_last_replier_closes() {
        let dispatcher = Dispatcher::start("znet-query-test").expect("start");
        let (state, rx) = new_state(&dispatcher, QueryConsolidation::none());
        state.start(2);

        let first = Query::new(Arc::clone(&state), source());
        let second = Query::new(Arc::clone(&state), source());
        first.reply("/q/a", b"1");
        first.close();
        assert_eq!(state.phase(), QueryPhase::Collecting);

        second.reply("/q/b", b"2");
        drop(second);
        assert!(state.wait_closed(Duration::from_secs(1)));

        let events = collect(&rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events.last(), Some(&ReplyEvent::Final));
    }

    #[test]
    fn test_full_consolidation_keeps_later_reply() {
        let dispatcher = Dispatcher::start("znet-query-test").expect("start");
        let (state, rx) = new_state(
            &dispatcher,
            QueryConsolidation::uniform(ConsolidationMode::Full),
        );
        state.start(1);

        let query = Query::new(Arc::clone(&state), source());
        query.reply("/q/a", b"old");
        query.reply("/q/a", b"new");
        drop(query);

        let events = collect(&rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            ReplyEvent::Data(reply) => assert_eq!(reply.sample.value(), b"new"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cancel_stops_replies() {
        let dispatcher = Dispatcher::start("znet-query-test").expect("start");
        let (state, rx) = new_state(&dispatcher, QueryConsolidation::none());
        state.start(1);

        let query = Query::new(Arc::clone(&state), source());
        assert!(state.cancel());
        assert!(!state.cancel());
        query.reply("/q/a", b"late");
        drop(query);

        // the handler was dropped on cancel, so the channel disconnects empty
        assert!(collect(&rx).is_empty());
    }
}
