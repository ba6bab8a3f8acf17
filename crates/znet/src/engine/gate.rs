// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery gate: the handler slot shared by an entity and its queued jobs.
//!
//! Invocations hold the slot mutex for the duration of the callback. Closing
//! first clears `alive`, then takes the mutex (so it waits for an in-flight
//! callback) and drops the handler. After [`Gate::close`] returns no
//! invocation is running and none will start.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Gate<H: ?Sized> {
    alive: AtomicBool,
    handler: Mutex<Option<Box<H>>>,
}

impl<H: ?Sized> Gate<H> {
    pub fn new(handler: Box<H>) -> Self {
        Self {
            alive: AtomicBool::new(true),
            handler: Mutex::new(Some(handler)),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Run `f` against the handler if the gate is still open.
    pub fn invoke<R>(&self, f: impl FnOnce(&H) -> R) -> Option<R> {
        if !self.is_alive() {
            return None;
        }
        let slot = self.handler.lock();
        // close() may have won the race while we waited for the lock
        if !self.is_alive() {
            return None;
        }
        slot.as_deref().map(f)
    }

    /// Stop future invocations without waiting. Returns `true` on the first call.
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Stop future invocations, wait for the in-flight one and drop the handler.
    ///
    /// Must not be called from inside this gate's own callback.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
        let handler = self.handler.lock().take();
        drop(handler);
    }
}

/// Type-erased close, used to release a gate from the dispatch thread.
pub trait Release: Send + Sync {
    fn release(&self);
}

impl<H: ?Sized + Send + Sync> Release for Gate<H> {
    fn release(&self) {
        self.close();
    }
}
