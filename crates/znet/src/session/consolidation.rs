// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reply consolidation.
//!
//! A query's replies pass through three stages (first routers, last router,
//! reception) left to right. Each stage may hold replies back until it is
//! flushed, which happens once every replier has closed.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::{ConsolidationMode, QueryConsolidation, Reply};

#[derive(Debug)]
enum Stage {
    /// Forwards everything.
    Passthrough,
    /// Forwards the first copy of each (key, value), drops exact repeats.
    Lazy {
        forwarded: HashSet<(Arc<str>, Bytes)>,
    },
    /// Latest reply per key, kept in first-seen key order until flush.
    Full {
        held: Vec<Reply>,
        index: HashMap<Arc<str>, usize>,
    },
}

impl Stage {
    fn new(mode: ConsolidationMode) -> Self {
        match mode {
            ConsolidationMode::None => Stage::Passthrough,
            ConsolidationMode::Lazy => Stage::Lazy {
                forwarded: HashSet::new(),
            },
            ConsolidationMode::Full => Stage::Full {
                held: Vec::new(),
                index: HashMap::new(),
            },
        }
    }

    fn push(&mut self, reply: Reply, out: &mut Vec<Reply>) {
        match self {
            Stage::Passthrough => out.push(reply),
            Stage::Lazy { forwarded } => {
                let id = (reply.sample.key_arc().clone(), reply.sample.payload());
                if forwarded.insert(id) {
                    out.push(reply);
                }
            }
            Stage::Full { held, index } => match index.get(reply.sample.key_arc()) {
                Some(&slot) => held[slot] = reply,
                None => {
                    index.insert(reply.sample.key_arc().clone(), held.len());
                    held.push(reply);
                }
            },
        }
    }

    fn flush(&mut self, out: &mut Vec<Reply>) {
        if let Stage::Full { held, index } = self {
            index.clear();
            out.append(held);
        }
    }
}

/// The three stages of one query.
#[derive(Debug)]
pub(crate) struct Consolidator {
    stages: [Stage; 3],
}

impl Consolidator {
    pub fn new(modes: &QueryConsolidation) -> Self {
        let [first, last, reception] = modes.stages();
        Self {
            stages: [Stage::new(first), Stage::new(last), Stage::new(reception)],
        }
    }

    /// Feed one reply; returns what comes out of the last stage now.
    pub fn push(&mut self, reply: Reply) -> Vec<Reply> {
        self.run(vec![reply], 0)
    }

    /// Flush every stage in order; returns the replies that were held back.
    pub fn flush(&mut self) -> Vec<Reply> {
        let mut output = Vec::new();
        for stage in 0..self.stages.len() {
            let mut released = Vec::new();
            self.stages[stage].flush(&mut released);
            if !released.is_empty() {
                // later stages may still hold these until their own flush
                output.extend(self.run(released, stage + 1));
            }
        }
        output
    }

    /// Push `replies` through the stages starting at `from`.
    fn run(&mut self, mut replies: Vec<Reply>, from: usize) -> Vec<Reply> {
        for stage in &mut self.stages[from..] {
            let mut out = Vec::with_capacity(replies.len());
            for reply in replies {
                stage.push(reply, &mut out);
            }
            replies = out;
            if replies.is_empty() {
                break;
            }
        }
        replies
    }
}
