// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription table entries and the subscriber handle.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use super::SessionInner;
use crate::engine::dispatcher::{DispatchHandle, Job, SampleGate};
use crate::engine::Handle;
use crate::error::{Error, Result};
use crate::types::{Sample, SubInfo, SubMode};

pub(crate) struct SubscriberEntry {
    pub key: Arc<str>,
    pub info: SubInfo,
    pub gate: Arc<SampleGate>,
    /// Pull mode only.
    pending: Mutex<VecDeque<Sample>>,
}

impl SubscriberEntry {
    pub fn new(key: Arc<str>, info: SubInfo, gate: Arc<SampleGate>) -> Self {
        Self {
            key,
            info,
            gate,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Deliver (push) or buffer (pull) one matching sample.
    pub fn offer(&self, sample: &Sample, dispatch: &DispatchHandle) {
        match self.info.mode {
            SubMode::Push => {
                dispatch.submit(Job::Sample {
                    gate: self.gate.clone(),
                    sample: sample.clone(),
                });
            }
            SubMode::Pull => {
                let mut pending = self.pending.lock();
                pending.push_back(sample.clone());
                while pending.len() > self.info.pull_depth {
                    pending.pop_front();
                }
            }
        }
    }

    /// Queue every buffered sample for delivery; returns how many.
    pub fn flush_pending(&self, dispatch: &DispatchHandle) -> usize {
        let drained: Vec<Sample> = self.pending.lock().drain(..).collect();
        let count = drained.len();
        for sample in drained {
            dispatch.submit(Job::Sample {
                gate: self.gate.clone(),
                sample,
            });
        }
        count
    }
}

/// A declared subscriber. Undeclared when dropped.
pub struct Subscriber {
    pub(super) handle: Handle,
    pub(super) key: Arc<str>,
    pub(super) info: SubInfo,
    pub(super) session: Weak<SessionInner>,
}

impl Subscriber {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> SubInfo {
        self.info
    }

    /// Deliver the samples buffered since the last pull.
    ///
    /// No-op for push subscribers.
    pub fn pull(&self) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::SessionClosed)?;
        session.pull(self.handle)
    }

    /// Stop receiving samples. Returns `false` if already undeclared.
    ///
    /// When this returns, the handler is not running and will not run again.
    /// From inside a handler the handler is released once it returns.
    pub fn undeclare(&self) -> bool {
        match self.session.upgrade() {
            Some(session) => session.undeclare_subscriber(self.handle),
            None => false,
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.undeclare();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("key", &self.key)
            .field("info", &self.info)
            .finish()
    }
}
