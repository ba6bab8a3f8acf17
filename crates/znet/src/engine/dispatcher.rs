// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session dispatch thread.
//!
//! Every handler invocation of a session happens here, in submission order,
//! so callbacks never run on the thread that issued `write` or `query`.
//! Jobs carry the target [`Gate`]; a job whose gate closed after submission
//! is skipped and counted as stale.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use super::gate::{Gate, Release};
use super::handler::{QueryHandler, ReplyHandler, SampleHandler};
use crate::error::{Error, Result};
use crate::session::Query;
use crate::types::{ReplyEvent, Sample};

pub(crate) type SampleGate = Gate<dyn SampleHandler>;
pub(crate) type QueryGate = Gate<dyn QueryHandler>;
pub(crate) type ReplyGate = Gate<dyn ReplyHandler>;

// ============================================================================
// Dispatch Metrics
// ============================================================================

/// Counters updated by the dispatch thread.
#[derive(Debug)]
pub struct DispatchMetrics {
    pub samples_delivered: AtomicU64,
    pub queries_delivered: AtomicU64,
    pub replies_delivered: AtomicU64,
    /// Handler invocations that panicked (caught, delivery continued)
    pub handler_panics: AtomicU64,
    /// Jobs dropped because their target was undeclared after submission
    pub stale_jobs: AtomicU64,
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub samples_delivered: u64,
    pub queries_delivered: u64,
    pub replies_delivered: u64,
    pub handler_panics: u64,
    pub stale_jobs: u64,
}

impl DispatchMetrics {
    #[inline]
    pub fn new() -> Self {
        Self {
            samples_delivered: AtomicU64::new(0),
            queries_delivered: AtomicU64::new(0),
            replies_delivered: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            stale_jobs: AtomicU64::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            queries_delivered: self.queries_delivered.load(Ordering::Relaxed),
            replies_delivered: self.replies_delivered.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            stale_jobs: self.stale_jobs.load(Ordering::Relaxed),
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Jobs
// ============================================================================

pub(crate) enum Job {
    Sample {
        gate: Arc<SampleGate>,
        sample: Sample,
    },
    Query {
        gate: Arc<QueryGate>,
        query: Query,
    },
    Reply {
        gate: Arc<ReplyGate>,
        event: ReplyEvent,
    },
    /// Close a gate after the callback that asked for it has returned.
    Release(Arc<dyn Release>),
    Shutdown,
}

/// Cloneable submission side of the dispatcher.
#[derive(Clone)]
pub(crate) struct DispatchHandle {
    tx: Sender<Job>,
    thread_id: ThreadId,
}

impl DispatchHandle {
    /// Queue a job. Returns `false` once the dispatch thread has exited.
    pub fn submit(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }

    #[inline]
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Close `gate`, waiting for an in-flight invocation.
    ///
    /// On the dispatch thread the gate is only marked dead (jobs already
    /// queued for it are skipped) and the handler is released after the
    /// current callback returns.
    pub fn close_gate<H>(&self, gate: &Arc<Gate<H>>)
    where
        H: ?Sized + Send + Sync + 'static,
    {
        if self.is_dispatch_thread() {
            gate.mark_dead();
            let release: Arc<dyn Release> = gate.clone();
            if !self.submit(Job::Release(release)) {
                log::trace!("[DISPATCH] Dispatcher stopped, handler released by its last job");
            }
        } else {
            gate.close();
        }
    }
}

/// Owner of the dispatch thread.
pub(crate) struct Dispatcher {
    handle: DispatchHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn start(name: &str) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let metrics = Arc::new(DispatchMetrics::new());
        let metrics_clone = Arc::clone(&metrics);

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || dispatch_loop(rx, metrics_clone))
            .map_err(Error::DispatcherStart)?;

        Ok(Self {
            handle: DispatchHandle {
                tx,
                thread_id: thread.thread().id(),
            },
            thread: Mutex::new(Some(thread)),
            metrics,
        })
    }

    pub fn handle(&self) -> &DispatchHandle {
        &self.handle
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Drain queued jobs and stop the thread.
    ///
    /// Joins unless called from the dispatch thread itself, in which case the
    /// loop exits after the current callback returns.
    pub fn shutdown(&self) {
        let _ = self.handle.submit(Job::Shutdown);
        if self.handle.is_dispatch_thread() {
            return;
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                log::warn!("[DISPATCH] Dispatch thread terminated abnormally");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(rx: Receiver<Job>, metrics: Arc<DispatchMetrics>) {
    log::debug!("[DISPATCH] Dispatch thread started");

    for job in rx.iter() {
        match job {
            Job::Sample { gate, sample } => {
                deliver(&gate, &metrics, &metrics.samples_delivered, |h| {
                    h.on_sample(sample)
                });
            }
            Job::Query { gate, query } => {
                deliver(&gate, &metrics, &metrics.queries_delivered, |h| {
                    h.on_query(query)
                });
            }
            Job::Reply { gate, event } => {
                deliver(&gate, &metrics, &metrics.replies_delivered, |h| {
                    h.on_reply(event)
                });
            }
            Job::Release(gate) => gate.release(),
            Job::Shutdown => break,
        }
    }

    log::debug!("[DISPATCH] Dispatch thread exiting");
}

/// Invoke one handler with panic isolation.
fn deliver<H: ?Sized>(
    gate: &Gate<H>,
    metrics: &DispatchMetrics,
    delivered: &AtomicU64,
    f: impl FnOnce(&H),
) {
    let result = catch_unwind(AssertUnwindSafe(|| gate.invoke(f)));
    match result {
        Ok(Some(())) => {
            delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(None) => {
            metrics.stale_jobs.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            metrics.handler_panics.fetch_add(1, Ordering::Relaxed);
            log::warn!("[DISPATCH] Handler panicked during delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn sample_gate(handler: impl SampleHandler + 'static) -> Arc<SampleGate> {
        let boxed: Box<dyn SampleHandler> = Box::new(handler);
        Arc::new(Gate::new(boxed))
    }

    #[test]
    fn test_delivers_on_dispatch_thread() {
        let dispatcher = Dispatcher::start("znet-dispatch-test").expect("start");
        let caller = thread::current().id();
        let (tx, rx) = channel::unbounded();
        let gate = sample_gate(move |_s: Sample| {
            tx.send(thread::current().id()).expect("send");
        });

        assert!(dispatcher.handle().submit(Job::Sample {
            gate,
            sample: Sample::new("/a", &b"1"[..]),
        }));
        let callback_thread = rx.recv_timeout(Duration::from_secs(2)).expect("delivery");
        assert_ne!(callback_thread, caller);
        assert!(!dispatcher.handle().is_dispatch_thread());
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let dispatcher = Dispatcher::start("znet-dispatch-test").expect("start");
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let bad = sample_gate(|_s: Sample| panic!("handler failure"));
        let good = sample_gate(move |_s: Sample| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        let handle = dispatcher.handle().clone();
        handle.submit(Job::Sample {
            gate: bad,
            sample: Sample::new("/a", &b"1"[..]),
        });
        handle.submit(Job::Sample {
            gate: good,
            sample: Sample::new("/a", &b"2"[..]),
        });

        assert!(wait_for(|| count.load(Ordering::Relaxed) == 1));
        let metrics = dispatcher.metrics().snapshot();
        assert_eq!(metrics.handler_panics, 1);
        assert_eq!(metrics.samples_delivered, 1);
    }

    #[test]
    fn test_closed_gate_counts_as_stale() {
        let dispatcher = Dispatcher::start("znet-dispatch-test").expect("start");
        let gate = sample_gate(|_s: Sample| {});
        gate.close();

        dispatcher.handle().submit(Job::Sample {
            gate,
            sample: Sample::new("/a", &b"1"[..]),
        });
        dispatcher.shutdown();
        assert_eq!(dispatcher.metrics().snapshot().stale_jobs, 1);
        assert!(!dispatcher.handle().submit(Job::Shutdown));
    }
}
