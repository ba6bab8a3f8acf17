// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery engine: handler traits, the delivery gate, the generational
//! arena backing entity handles, and the session dispatch thread.

pub mod arena;
pub(crate) mod dispatcher;
pub(crate) mod gate;
pub mod handler;

pub use arena::{Arena, Handle};
pub use dispatcher::{DispatchMetrics, DispatchSnapshot};
pub use handler::{QueryHandler, ReplyHandler, SampleHandler};
