// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # znet - publish/subscribe and query/reply core
//!
//! Participants exchange samples on hierarchical resource keys, issue queries
//! answered by matching queryables with configurable reply consolidation, and
//! discover each other by scouting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use znet::{config, Result, Sample, Session, SubInfo};
//!
//! fn main() -> Result<()> {
//!     znet::logging::init_logger();
//!     let session = Session::open(config::config_default())?;
//!
//!     let rid = session.declare_resource("/sensors/temperature")?;
//!     let _sub = session.declare_subscriber("/sensors/*", SubInfo::default(), |s: Sample| {
//!         println!("{} = {:?}", s.key(), s.value());
//!     })?;
//!
//!     session.write(rid, b"21.5")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                             Session                                 |
//! |   Publisher | Subscriber (push/pull) | Queryable | Query sessions   |
//! +---------------------------------------------------------------------+
//! |                             Keys                                    |
//! |   ResKey resolution | Resource registry (COW) | Wildcard matcher    |
//! +---------------------------------------------------------------------+
//! |                            Engine                                   |
//! |   Dispatch thread | Delivery gates | Generational handles           |
//! +---------------------------------------------------------------------+
//! |                Transport boundary    |    Scouting (UDP)            |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | One local runtime instance, factory for all entities |
//! | [`ResKey`] | Resource key: numeric id, id + suffix, or name |
//! | [`Subscriber`] | Receives samples whose key intersects its own |
//! | [`Queryable`] | Answers queries whose key intersects its own |
//! | [`QueryHandle`] | Tracks one in-flight query |
//! | [`config::Properties`] | `u64 -> String` configuration map |
//!
//! ## Threading
//!
//! Every handler runs on the session's dispatch thread, never on the thread
//! that called `write` or `query`. Entity handles undeclare themselves when
//! dropped, so keep them alive for as long as they should receive data.

pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod logging;
pub mod scouting;
pub mod session;
pub mod transport;
pub mod types;

pub use engine::{DispatchMetrics, DispatchSnapshot, QueryHandler, ReplyHandler, SampleHandler};
pub use error::{Error, Result};
pub use keys::{ResKey, ResourceId};
pub use scouting::{scout, scout_configured, ScoutResponder};
pub use session::{
    Publisher, Query, QueryHandle, QueryPhase, Queryable, QueryableInfo, Session, SessionBuilder,
    Subscriber,
};
pub use transport::{Declaration, LocalOnly, Transport};
pub use types::{
    ConsolidationMode, Hello, PeerId, Period, QueryConsolidation, QueryTarget, QueryableKind,
    Reliability, Reply, ReplyEvent, Sample, SourceInfo, SubInfo, SubMode, Target, Timestamp,
    WhatAmI,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
