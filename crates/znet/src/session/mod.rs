// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session: one local znet runtime instance.
//!
//! A session owns the resource registry, the publisher, subscriber and
//! queryable tables, the in-flight queries and the dispatch thread that runs
//! every handler.
//!
//! # Locking
//!
//! - `write`, `pull` and `query` take table **read** locks; declare and
//!   undeclare take **write** locks. Locks are never held while a handler
//!   runs or while undeclare waits for one.
//! - Handlers are invoked through a delivery gate; undeclaring closes the gate
//!   and waits for an in-flight invocation, except from the dispatch thread
//!   itself where the handler is released after the current callback.
//!
//! # Example
//!
//! ```no_run
//! use znet::{config, QueryConsolidation, QueryTarget, QueryableKind, ReplyEvent, Session, SubInfo};
//!
//! let session = Session::open(config::config_default())?;
//!
//! let _sub = session.declare_subscriber("/demo/**", SubInfo::default(), |sample: znet::Sample| {
//!     println!(">> {} : {:?}", sample.key(), sample.value());
//! })?;
//! session.write("/demo/hello", b"world")?;
//!
//! let _eval = session.declare_queryable("/demo/eval", QueryableKind::EVAL, |query: znet::Query| {
//!     query.reply("/demo/eval", b"42");
//! })?;
//! let handle = session.query(
//!     "/demo/eval",
//!     "",
//!     QueryTarget::default(),
//!     QueryConsolidation::default(),
//!     |event: ReplyEvent| println!("{:?}", event),
//! )?;
//! handle.wait_closed(std::time::Duration::from_secs(1));
//! # Ok::<(), znet::Error>(())
//! ```

mod consolidation;
mod publisher;
mod query;
mod queryable;
mod subscriber;

pub use publisher::Publisher;
pub use query::{Query, QueryHandle, QueryPhase};
pub use queryable::{Queryable, QueryableInfo};
pub use subscriber::Subscriber;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{
    Properties, SessionConfig, ZN_INFO_PEER_PID_KEY, ZN_INFO_PID_KEY, ZN_INFO_ROUTER_PID_KEY,
};
use crate::engine::dispatcher::{DispatchHandle, Dispatcher, Job};
use crate::engine::gate::Gate;
use crate::engine::{Arena, DispatchSnapshot, Handle, QueryHandler, ReplyHandler, SampleHandler};
use crate::error::{Error, Result};
use crate::keys::{intersect, ResKey, ResourceId, ResourceRegistry};
use crate::transport::{Declaration, LocalOnly, Transport};
use crate::types::{
    Hello, PeerId, QueryConsolidation, QueryTarget, QueryableKind, Sample, SourceInfo, SubInfo,
    Timestamp, WhatAmI,
};
use publisher::PublisherEntry;
use query::{QueryParams, QueryState};
use queryable::{select_targets, QueryableEntry};
use subscriber::SubscriberEntry;

// ============================================================================
// Session
// ============================================================================

/// Builder for sessions that need a custom transport or peer id.
pub struct SessionBuilder {
    properties: Properties,
    transport: Option<Arc<dyn Transport>>,
    pid: Option<PeerId>,
}

impl SessionBuilder {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            transport: None,
            pid: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn pid(mut self, pid: PeerId) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Validate the configuration, start the dispatch thread and open the session.
    pub fn open(self) -> Result<Session> {
        let config = SessionConfig::from_properties(&self.properties)?;
        let pid = self.pid.unwrap_or_else(PeerId::generate);
        let dispatcher = Dispatcher::start(&format!("znet-dispatch-{}", short_pid(&pid)))?;

        log::debug!(
            "[SESSION] Opened {} session {} (local_routing={}, add_timestamp={})",
            config.mode,
            pid,
            config.local_routing,
            config.add_timestamp
        );

        Ok(Session {
            inner: Arc::new(SessionInner {
                pid,
                config,
                properties: self.properties,
                closed: AtomicBool::new(false),
                registry: ResourceRegistry::new(),
                publishers: RwLock::new(Arena::new()),
                subscribers: RwLock::new(Arena::new()),
                queryables: RwLock::new(Arena::new()),
                queries: DashMap::new(),
                next_query_id: AtomicU64::new(1),
                dispatcher,
                transport: self.transport.unwrap_or_else(|| Arc::new(LocalOnly)),
            }),
        })
    }
}

/// An open session. Closed when dropped.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a session with the given configuration and the local-only transport.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for unparsable properties, `DispatcherStart` if the
    /// dispatch thread cannot be spawned.
    pub fn open(properties: Properties) -> Result<Session> {
        SessionBuilder::new(properties).open()
    }

    pub fn builder(properties: Properties) -> SessionBuilder {
        SessionBuilder::new(properties)
    }

    /// Close the session: undeclare every entity, stop in-flight queries and
    /// stop the dispatch thread. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn pid(&self) -> &PeerId {
        &self.inner.pid
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Properties the session was opened with.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// Session information keyed by `ZN_INFO_*`.
    pub fn info(&self) -> Properties {
        let join = |kind: WhatAmI| {
            self.inner
                .transport
                .connected(kind)
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        Properties::new()
            .with(ZN_INFO_PID_KEY, self.inner.pid.to_string())
            .with(ZN_INFO_PEER_PID_KEY, join(WhatAmI::PEER))
            .with(ZN_INFO_ROUTER_PID_KEY, join(WhatAmI::ROUTER))
    }

    /// Hello describing this session, as a [`crate::ScoutResponder`] would send it.
    pub fn hello(&self) -> Hello {
        Hello {
            whatami: self.inner.config.mode,
            pid: Some(self.inner.pid.clone()),
            locators: self.inner.config.listeners.clone(),
        }
    }

    pub fn metrics(&self) -> DispatchSnapshot {
        self.inner.dispatcher.metrics().snapshot()
    }

    /// Number of queries issued by this session that are not closed yet.
    pub fn pending_queries(&self) -> usize {
        self.inner.queries.len()
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    /// Intern the key's canonical name and return its numeric id.
    pub fn declare_resource(&self, key: impl Into<ResKey>) -> Result<ResourceId> {
        self.inner.declare_resource(&key.into())
    }

    /// Canonical name of a key.
    pub fn resolve(&self, key: impl Into<ResKey>) -> Result<String> {
        self.inner
            .registry
            .resolve(&key.into())
            .map(|name| name.to_string())
    }

    // ------------------------------------------------------------------------
    // Publish / subscribe
    // ------------------------------------------------------------------------

    pub fn declare_publisher(&self, key: impl Into<ResKey>) -> Result<Publisher> {
        self.inner.declare_publisher(&key.into())
    }

    /// Register `handler` for samples whose key intersects `key`.
    pub fn declare_subscriber<H>(
        &self,
        key: impl Into<ResKey>,
        info: SubInfo,
        handler: H,
    ) -> Result<Subscriber>
    where
        H: SampleHandler + 'static,
    {
        self.inner
            .declare_subscriber(&key.into(), info, Box::new(handler))
    }

    /// Write a sample. Zero matching subscribers is not an error.
    ///
    /// # Errors
    ///
    /// `UnknownResource` / `InvalidKey` when the key cannot be resolved,
    /// `SessionClosed` after [`Session::close`].
    pub fn write(&self, key: impl Into<ResKey>, payload: &[u8]) -> Result<()> {
        self.write_bytes(key, Bytes::copy_from_slice(payload))
    }

    /// Write a sample without copying the payload.
    pub fn write_bytes(&self, key: impl Into<ResKey>, payload: Bytes) -> Result<()> {
        self.inner.ensure_open()?;
        let name = self.inner.registry.resolve(&key.into())?;
        self.inner.write_resolved(name, payload)
    }

    /// Inbound path: deliver a sample received from a remote peer to the
    /// matching local subscribers.
    pub fn handle_sample(&self, key: impl Into<ResKey>, payload: Bytes) -> Result<()> {
        self.inner.ensure_open()?;
        let name = self.inner.registry.resolve(&key.into())?;
        self.inner.route_sample(&Sample::new(name, payload));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Query / reply
    // ------------------------------------------------------------------------

    /// Declare a queryable with the default info for its kind.
    pub fn declare_queryable<H>(
        &self,
        key: impl Into<ResKey>,
        kind: QueryableKind,
        handler: H,
    ) -> Result<Queryable>
    where
        H: QueryHandler + 'static,
    {
        self.declare_queryable_with_info(key, kind, QueryableInfo::for_kind(kind), handler)
    }

    pub fn declare_queryable_with_info<H>(
        &self,
        key: impl Into<ResKey>,
        kind: QueryableKind,
        info: QueryableInfo,
        handler: H,
    ) -> Result<Queryable>
    where
        H: QueryHandler + 'static,
    {
        self.inner
            .declare_queryable(&key.into(), kind, info, Box::new(handler))
    }

    /// Issue a query. Replies reach `handler` after consolidation, followed by
    /// [`crate::ReplyEvent::Final`].
    ///
    /// A query no queryable is eligible for is closed immediately and only
    /// delivers the final marker.
    pub fn query<H>(
        &self,
        key: impl Into<ResKey>,
        predicate: &str,
        target: QueryTarget,
        consolidation: QueryConsolidation,
        handler: H,
    ) -> Result<QueryHandle>
    where
        H: ReplyHandler + 'static,
    {
        self.inner.query(
            &key.into(),
            predicate,
            target,
            consolidation,
            Box::new(handler),
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pid", &self.inner.pid)
            .field("mode", &self.inner.config.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn short_pid(pid: &PeerId) -> String {
    let mut s = pid.to_string();
    s.truncate(8);
    s
}

// ============================================================================
// Session internals
// ============================================================================

pub(crate) struct SessionInner {
    pid: PeerId,
    config: SessionConfig,
    properties: Properties,
    closed: AtomicBool,
    registry: ResourceRegistry,
    publishers: RwLock<Arena<PublisherEntry>>,
    subscribers: RwLock<Arena<SubscriberEntry>>,
    queryables: RwLock<Arena<QueryableEntry>>,
    queries: DashMap<u64, Arc<QueryState>>,
    next_query_id: AtomicU64,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
}

impl SessionInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn dispatch(&self) -> &DispatchHandle {
        self.dispatcher.handle()
    }

    fn declare_resource(&self, key: &ResKey) -> Result<ResourceId> {
        self.ensure_open()?;
        let id = self.registry.declare(key)?;
        if let Some(name) = self.registry.name_of(id) {
            self.transport.declare(&Declaration::Resource {
                id,
                name: name.to_string(),
            });
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Publishers
    // ------------------------------------------------------------------------

    fn declare_publisher(self: &Arc<Self>, key: &ResKey) -> Result<Publisher> {
        self.ensure_open()?;
        let name = self.registry.resolve(key)?;
        let handle = self
            .publishers
            .write()
            .insert(PublisherEntry { key: name.clone() });

        self.transport.declare(&Declaration::Publisher {
            key: name.to_string(),
        });
        log::debug!("[SESSION] Declared publisher on '{}'", name);

        Ok(Publisher {
            handle,
            key: name,
            session: Arc::downgrade(self),
        })
    }

    fn publisher_alive(&self, handle: Handle) -> bool {
        self.publishers.read().contains(handle)
    }

    fn undeclare_publisher(&self, handle: Handle) -> bool {
        let Some(entry) = self.publishers.write().remove(handle) else {
            return false;
        };
        self.transport.declare(&Declaration::ForgetPublisher {
            key: entry.key.to_string(),
        });
        log::debug!("[SESSION] Undeclared publisher on '{}'", entry.key);
        true
    }

    // ------------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------------

    fn declare_subscriber(
        self: &Arc<Self>,
        key: &ResKey,
        info: SubInfo,
        handler: Box<dyn SampleHandler>,
    ) -> Result<Subscriber> {
        self.ensure_open()?;
        let name = self.registry.resolve(key)?;
        let entry = SubscriberEntry::new(name.clone(), info, Arc::new(Gate::new(handler)));
        let handle = self.subscribers.write().insert(entry);

        self.transport.declare(&Declaration::Subscriber {
            key: name.to_string(),
            info,
        });
        log::debug!("[SESSION] Declared {:?} subscriber on '{}'", info.mode, name);

        Ok(Subscriber {
            handle,
            key: name,
            info,
            session: Arc::downgrade(self),
        })
    }

    fn undeclare_subscriber(&self, handle: Handle) -> bool {
        // table lock released before waiting on the gate
        let Some(entry) = self.subscribers.write().remove(handle) else {
            return false;
        };
        self.dispatch().close_gate(&entry.gate);
        self.transport.declare(&Declaration::ForgetSubscriber {
            key: entry.key.to_string(),
        });
        log::debug!("[SESSION] Undeclared subscriber on '{}'", entry.key);
        true
    }

    fn pull(&self, handle: Handle) -> Result<()> {
        self.ensure_open()?;
        let subscribers = self.subscribers.read();
        let entry = subscribers.get(handle).ok_or(Error::StaleHandle)?;
        let count = entry.flush_pending(self.dispatch());
        log::trace!("[SESSION] Pulled {} sample(s) on '{}'", count, entry.key);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    fn write_resolved(&self, name: Arc<str>, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        let timestamp = self
            .config
            .add_timestamp
            .then(|| Timestamp::now(self.pid.clone()));
        let sample = Sample::new(name, payload).with_timestamp(timestamp);

        self.transport.send_sample(&sample);
        if self.config.local_routing {
            self.route_sample(&sample);
        }
        Ok(())
    }

    /// Offer `sample` to every subscriber whose key intersects it.
    fn route_sample(&self, sample: &Sample) {
        let subscribers = self.subscribers.read();
        let mut matched = 0usize;
        for (_, entry) in subscribers.iter() {
            if intersect(&entry.key, sample.key()) {
                entry.offer(sample, self.dispatch());
                matched += 1;
            }
        }
        log::trace!(
            "[SESSION] Sample on '{}' matched {} subscriber(s)",
            sample.key(),
            matched
        );
    }

    // ------------------------------------------------------------------------
    // Queryables
    // ------------------------------------------------------------------------

    fn declare_queryable(
        self: &Arc<Self>,
        key: &ResKey,
        kind: QueryableKind,
        info: QueryableInfo,
        handler: Box<dyn QueryHandler>,
    ) -> Result<Queryable> {
        self.ensure_open()?;
        let name = self.registry.resolve(key)?;
        let handle = self.queryables.write().insert(QueryableEntry {
            key: name.clone(),
            kind,
            info,
            gate: Arc::new(Gate::new(handler)),
        });

        self.transport.declare(&Declaration::Queryable {
            key: name.to_string(),
            kind,
        });
        log::debug!("[SESSION] Declared queryable {:?} on '{}'", kind, name);

        Ok(Queryable {
            handle,
            key: name,
            kind,
            session: Arc::downgrade(self),
        })
    }

    fn undeclare_queryable(&self, handle: Handle) -> bool {
        let Some(entry) = self.queryables.write().remove(handle) else {
            return false;
        };
        self.dispatch().close_gate(&entry.gate);
        self.transport.declare(&Declaration::ForgetQueryable {
            key: entry.key.to_string(),
        });
        log::debug!("[SESSION] Undeclared queryable on '{}'", entry.key);
        true
    }

    // ------------------------------------------------------------------------
    // Query path
    // ------------------------------------------------------------------------

    fn query(
        self: &Arc<Self>,
        key: &ResKey,
        predicate: &str,
        target: QueryTarget,
        consolidation: QueryConsolidation,
        handler: Box<dyn ReplyHandler>,
    ) -> Result<QueryHandle> {
        self.ensure_open()?;
        let res_name = self.registry.resolve(key)?;
        let id = self.next_query_id.fetch_add(1, Ordering::Relaxed);

        let state = Arc::new(QueryState::new(
            id,
            QueryParams {
                res_name: res_name.clone(),
                predicate: Arc::from(predicate),
                target,
                consolidation,
            },
            Arc::new(Gate::new(handler)),
            self.dispatch().clone(),
            Arc::downgrade(self),
        ));

        let jobs: Vec<Job> = if self.config.local_routing {
            let queryables = self.queryables.read();
            select_targets(queryables.iter().map(|(_, e)| e), &res_name, &target)
                .into_iter()
                .map(|entry| Job::Query {
                    gate: entry.gate.clone(),
                    query: Query::new(
                        Arc::clone(&state),
                        SourceInfo {
                            kind: entry.kind,
                            id: self.pid.clone(),
                        },
                    ),
                })
                .collect()
        } else {
            Vec::new()
        };

        log::debug!(
            "[SESSION] Query {} on '{}' ({:?}) forwarded to {} queryable(s)",
            id,
            res_name,
            target.target,
            jobs.len()
        );

        self.queries.insert(id, Arc::clone(&state));
        // Collecting must be entered before any replier can close
        state.start(jobs.len());
        for job in jobs {
            // a rejected job drops its Query, which closes it
            self.dispatch().submit(job);
        }

        Ok(QueryHandle::new(state))
    }

    fn forget_query(&self, id: u64) {
        self.queries.remove(&id);
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscribers = self.subscribers.write().drain();
        for entry in &subscribers {
            self.dispatch().close_gate(&entry.gate);
        }
        let queryables = self.queryables.write().drain();
        for entry in &queryables {
            self.dispatch().close_gate(&entry.gate);
        }
        let publishers = self.publishers.write().drain();

        let queries: Vec<Arc<QueryState>> =
            self.queries.iter().map(|q| Arc::clone(q.value())).collect();
        for query in &queries {
            query.cancel();
        }

        self.dispatcher.shutdown();
        log::debug!(
            "[SESSION] Closed session {} ({} subscriber(s), {} queryable(s), {} publisher(s), {} query(ies))",
            self.pid,
            subscribers.len(),
            queryables.len(),
            publishers.len(),
            queries.len()
        );
    }
}
