// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher handle.

use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};

use super::SessionInner;
use crate::engine::Handle;
use crate::error::{Error, Result};

pub(crate) struct PublisherEntry {
    pub key: Arc<str>,
}

/// A declared publisher. Undeclared when dropped.
///
/// Declaring a publisher announces the key to the transport; writes through
/// it behave like [`crate::Session::write`] on the same key.
pub struct Publisher {
    pub(super) handle: Handle,
    pub(super) key: Arc<str>,
    pub(super) session: Weak<SessionInner>,
}

impl Publisher {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write a sample on the publisher's key.
    ///
    /// # Errors
    ///
    /// `StaleHandle` after `undeclare`, `SessionClosed` once the session is gone.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        self.write_bytes(Bytes::copy_from_slice(payload))
    }

    pub fn write_bytes(&self, payload: Bytes) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::SessionClosed)?;
        if !session.publisher_alive(self.handle) {
            return Err(Error::StaleHandle);
        }
        session.write_resolved(self.key.clone(), payload)
    }

    /// Returns `false` if already undeclared; a second call is a no-op.
    pub fn undeclare(&self) -> bool {
        match self.session.upgrade() {
            Some(session) => session.undeclare_publisher(self.handle),
            None => false,
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.undeclare();
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("key", &self.key).finish()
    }
}
