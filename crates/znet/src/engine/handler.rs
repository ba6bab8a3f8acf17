// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler traits for samples, queries and replies.
//!
//! Every handler runs on the session's dispatch thread. Closures and
//! `crossbeam::channel::Sender`s implement the traits out of the box:
//!
//! ```no_run
//! use crossbeam::channel;
//! use znet::{config, Sample, Session, SubInfo};
//!
//! let session = Session::open(config::config_default())?;
//!
//! // Closure handler
//! let _logger = session.declare_subscriber("/demo/**", SubInfo::default(), |s: Sample| {
//!     println!("{} -> {} bytes", s.key(), s.value().len());
//! })?;
//!
//! // Channel handler: the receiver disconnects once the subscriber is undeclared
//! let (tx, rx) = channel::unbounded::<Sample>();
//! let sub = session.declare_subscriber("/demo/*", SubInfo::default(), tx)?;
//! sub.undeclare();
//! assert!(rx.recv().is_err());
//! # Ok::<(), znet::Error>(())
//! ```

use crossbeam::channel::Sender;

use crate::session::Query;
use crate::types::{ReplyEvent, Sample};

/// Receives samples matching a subscription.
///
/// # Panics
/// A panicking handler is caught by the dispatcher and counted in
/// [`DispatchMetrics::handler_panics`](super::DispatchMetrics); delivery to
/// other handlers continues.
pub trait SampleHandler: Send + Sync {
    fn on_sample(&self, sample: Sample);
}

/// Receives queries addressed to a queryable.
///
/// The handler owns the [`Query`]: it may reply immediately, keep it and reply
/// later from any thread, or drop it (which closes it).
pub trait QueryHandler: Send + Sync {
    fn on_query(&self, query: Query);
}

/// Receives the consolidated replies of one query, then [`ReplyEvent::Final`].
pub trait ReplyHandler: Send + Sync {
    fn on_reply(&self, event: ReplyEvent);
}

impl<F> SampleHandler for F
where
    F: Fn(Sample) + Send + Sync,
{
    fn on_sample(&self, sample: Sample) {
        self(sample)
    }
}

impl<F> QueryHandler for F
where
    F: Fn(Query) + Send + Sync,
{
    fn on_query(&self, query: Query) {
        self(query)
    }
}

impl<F> ReplyHandler for F
where
    F: Fn(ReplyEvent) + Send + Sync,
{
    fn on_reply(&self, event: ReplyEvent) {
        self(event)
    }
}

// A disconnected receiver only means nobody listens anymore.
impl SampleHandler for Sender<Sample> {
    fn on_sample(&self, sample: Sample) {
        let _ = self.send(sample);
    }
}

impl QueryHandler for Sender<Query> {
    fn on_query(&self, query: Query) {
        let _ = self.send(query);
    }
}

impl ReplyHandler for Sender<ReplyEvent> {
    fn on_reply(&self, event: ReplyEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handler = move |_s: Sample| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        };

        handler.on_sample(Sample::new("/a", &b"x"[..]));
        handler.on_sample(Sample::new("/a", &b"y"[..]));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_channel_handler_ignores_disconnect() {
        let (tx, rx) = channel::unbounded::<ReplyEvent>();
        tx.on_reply(ReplyEvent::Final);
        assert_eq!(rx.recv().expect("event"), ReplyEvent::Final);

        drop(rx);
        tx.on_reply(ReplyEvent::Final);
    }
}
