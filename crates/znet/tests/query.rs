// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queries, queryables and reply consolidation through a local session.

use crossbeam::channel::{self, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use znet::config::{self, ZN_CONFIG_LOCAL_ROUTING_KEY};
use znet::{
    ConsolidationMode, Error, Query, QueryConsolidation, QueryHandle, QueryPhase, QueryTarget,
    QueryableInfo, QueryableKind, Reply, ReplyEvent, Session, Target,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn open() -> Session {
    Session::open(config::config_default()).expect("session should open")
}

fn run_query(
    session: &Session,
    key: &str,
    target: QueryTarget,
    consolidation: QueryConsolidation,
) -> (QueryHandle, Receiver<ReplyEvent>) {
    let (tx, rx) = channel::unbounded();
    let handle = session
        .query(key, "", target, consolidation, tx)
        .expect("query should be issued");
    (handle, rx)
}

/// Collect replies up to the final marker.
fn replies(rx: &Receiver<ReplyEvent>) -> Vec<Reply> {
    let mut out = Vec::new();
    loop {
        match rx.recv_timeout(TIMEOUT).expect("reply event before timeout") {
            ReplyEvent::Data(reply) => out.push(reply),
            ReplyEvent::Final => return out,
        }
    }
}

fn answer_with(pairs: &'static [(&'static str, &'static [u8])]) -> impl Fn(Query) + Send + Sync {
    move |query: Query| {
        for (key, value) in pairs {
            query.reply(key, value);
        }
    }
}

#[test]
fn test_target_none_yields_no_reply_and_closes_immediately() {
    let session = open();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let _q = session
        .declare_queryable("/a/**", QueryableKind::STORAGE, move |_q: Query| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("declare queryable");

    let (handle, rx) = run_query(
        &session,
        "/a/b",
        QueryTarget::none(),
        QueryConsolidation::default(),
    );
    assert!(handle.is_closed());
    assert!(replies(&rx).is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_no_matching_queryable_closes_immediately() {
    let session = open();
    let _q = session
        .declare_queryable("/other", QueryableKind::EVAL, answer_with(&[("/other", b"x")]))
        .expect("declare queryable");

    let (handle, rx) = run_query(
        &session,
        "/a/b",
        QueryTarget::all(),
        QueryConsolidation::default(),
    );
    assert_eq!(handle.phase(), QueryPhase::Closed);
    assert!(replies(&rx).is_empty());
    assert_eq!(session.pending_queries(), 0);
}

#[test]
fn test_full_consolidation_keeps_later_reply_per_key() {
    let session = open();
    let _q = session
        .declare_queryable(
            "/k/*",
            QueryableKind::EVAL,
            answer_with(&[("/k/a", b"old"), ("/k/b", b"only"), ("/k/a", b"new")]),
        )
        .expect("declare queryable");

    let (handle, rx) = run_query(
        &session,
        "/k/*",
        QueryTarget::all(),
        QueryConsolidation::full(),
    );
    let got = replies(&rx);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].sample.key(), "/k/a");
    assert_eq!(got[0].sample.value(), b"new");
    assert_eq!(got[1].sample.key(), "/k/b");
    assert!(handle.wait_closed(TIMEOUT));
}

#[test]
fn test_no_consolidation_forwards_everything() {
    let session = open();
    let _q = session
        .declare_queryable(
            "/k/*",
            QueryableKind::EVAL,
            answer_with(&[("/k/a", b"1"), ("/k/a", b"1"), ("/k/a", b"2")]),
        )
        .expect("declare queryable");

    let (_handle, rx) = run_query(&session, "/k/a", QueryTarget::all(), QueryConsolidation::none());
    assert_eq!(replies(&rx).len(), 3);
}

#[test]
fn test_lazy_consolidation_drops_duplicates_across_queryables() {
    let session = open();
    let _first = session
        .declare_queryable("/dup", QueryableKind::EVAL, answer_with(&[("/dup", b"same")]))
        .expect("declare first");
    let _second = session
        .declare_queryable("/dup", QueryableKind::EVAL, answer_with(&[("/dup", b"same")]))
        .expect("declare second");

    let lazy = QueryConsolidation::uniform(ConsolidationMode::Lazy);
    let (_handle, rx) = run_query(&session, "/dup", QueryTarget::all(), lazy);
    let got = replies(&rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].source.kind, QueryableKind::EVAL);
    assert_eq!(&got[0].source.id, session.pid());
}

#[test]
fn test_best_matching_prefers_complete_storage() {
    let session = open();
    let eval_hits = Arc::new(AtomicUsize::new(0));
    let eval_hits_clone = Arc::clone(&eval_hits);

    let _eval = session
        .declare_queryable("/s/*", QueryableKind::EVAL, move |_q: Query| {
            eval_hits_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("declare eval");
    let _storage = session
        .declare_queryable("/s/**", QueryableKind::STORAGE, answer_with(&[("/s/x", b"stored")]))
        .expect("declare storage");

    let (_handle, rx) = run_query(
        &session,
        "/s/x",
        QueryTarget::default(),
        QueryConsolidation::default(),
    );
    let got = replies(&rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].sample.value(), b"stored");
    assert_eq!(eval_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_best_matching_without_complete_reaches_all() {
    let session = open();
    let _a = session
        .declare_queryable("/e/*", QueryableKind::EVAL, answer_with(&[("/e/1", b"a")]))
        .expect("declare a");
    let _b = session
        .declare_queryable("/e/1", QueryableKind::EVAL, answer_with(&[("/e/1", b"b")]))
        .expect("declare b");

    let (_handle, rx) = run_query(
        &session,
        "/e/1",
        QueryTarget::default(),
        QueryConsolidation::none(),
    );
    assert_eq!(replies(&rx).len(), 2);
}

#[test]
fn test_complete_n_limits_repliers() {
    let session = open();
    let _near = session
        .declare_queryable_with_info(
            "/c/**",
            QueryableKind::STORAGE,
            QueryableInfo { complete: true, distance: 0 },
            answer_with(&[("/c/v", b"near")]),
        )
        .expect("declare near");
    let _far = session
        .declare_queryable_with_info(
            "/c/**",
            QueryableKind::STORAGE,
            QueryableInfo { complete: true, distance: 9 },
            answer_with(&[("/c/v", b"far")]),
        )
        .expect("declare far");

    let target = QueryTarget::new(QueryableKind::ALL_KINDS, Target::Complete { n: 1 });
    let (_handle, rx) = run_query(&session, "/c/v", target, QueryConsolidation::none());
    let got = replies(&rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].sample.value(), b"near");
}

#[test]
fn test_kind_mask_filters_queryables() {
    let session = open();
    let _storage = session
        .declare_queryable("/m", QueryableKind::STORAGE, answer_with(&[("/m", b"storage")]))
        .expect("declare storage");
    let _eval = session
        .declare_queryable("/m", QueryableKind::EVAL, answer_with(&[("/m", b"eval")]))
        .expect("declare eval");

    let target = QueryTarget::new(QueryableKind::EVAL, Target::All);
    let (_handle, rx) = run_query(&session, "/m", target, QueryConsolidation::none());
    let got = replies(&rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].sample.value(), b"eval");
}

#[test]
fn test_predicate_and_name_reach_queryable() {
    let session = open();
    let (seen_tx, seen_rx) = channel::unbounded();
    let _q = session
        .declare_queryable("/p/**", QueryableKind::EVAL, move |query: Query| {
            seen_tx
                .send((query.res_name().to_string(), query.predicate().to_string()))
                .expect("send");
        })
        .expect("declare");

    let (tx, _rx) = channel::unbounded::<ReplyEvent>();
    session
        .query("/p/x", "temp>20", QueryTarget::all(), QueryConsolidation::none(), tx)
        .expect("query");
    let (name, predicate) = seen_rx.recv_timeout(TIMEOUT).expect("query seen");
    assert_eq!(name, "/p/x");
    assert_eq!(predicate, "temp>20");
}

#[test]
fn test_reply_later_from_another_thread() {
    let session = open();
    let (query_tx, query_rx) = channel::unbounded::<Query>();
    let _q = session
        .declare_queryable("/later", QueryableKind::EVAL, query_tx)
        .expect("declare");

    let (handle, rx) = run_query(&session, "/later", QueryTarget::all(), QueryConsolidation::none());
    let worker = thread::spawn(move || {
        let query = query_rx.recv_timeout(TIMEOUT).expect("query delivered");
        thread::sleep(Duration::from_millis(20));
        query.reply("/later", b"done");
        query.close();
    });

    assert_eq!(handle.phase(), QueryPhase::Collecting);
    let got = replies(&rx);
    assert_eq!(got.len(), 1);
    assert!(handle.wait_closed(TIMEOUT));
    worker.join().expect("worker");
}

#[test]
fn test_close_query_stops_reply_callbacks() {
    let session = open();
    let (query_tx, query_rx) = channel::unbounded::<Query>();
    let _q = session
        .declare_queryable("/cancel", QueryableKind::EVAL, query_tx)
        .expect("declare");

    let (handle, rx) = run_query(&session, "/cancel", QueryTarget::all(), QueryConsolidation::none());
    let query = query_rx.recv_timeout(TIMEOUT).expect("query delivered");

    assert!(handle.close());
    assert!(!handle.close());
    assert!(handle.is_closed());
    query.reply("/cancel", b"too late");
    drop(query);

    assert!(rx.recv_timeout(TIMEOUT).is_err(), "no event after close");
    assert_eq!(session.pending_queries(), 0);
}

#[test]
fn test_undeclared_queryable_gets_no_query() {
    let session = open();
    let queryable = session
        .declare_queryable("/gone", QueryableKind::EVAL, answer_with(&[("/gone", b"x")]))
        .expect("declare");
    assert!(queryable.undeclare());
    assert!(!queryable.undeclare());

    let (handle, rx) = run_query(&session, "/gone", QueryTarget::all(), QueryConsolidation::none());
    assert!(handle.is_closed());
    assert!(replies(&rx).is_empty());
}

#[test]
fn test_local_routing_disabled_skips_local_queryables() {
    let props = config::config_peer().with(ZN_CONFIG_LOCAL_ROUTING_KEY, "false");
    let session = Session::open(props).expect("open");
    let _q = session
        .declare_queryable("/l", QueryableKind::EVAL, answer_with(&[("/l", b"x")]))
        .expect("declare");

    let (handle, rx) = run_query(&session, "/l", QueryTarget::all(), QueryConsolidation::none());
    assert!(handle.is_closed());
    assert!(replies(&rx).is_empty());
}

#[test]
fn test_closing_session_closes_pending_queries() {
    let session = open();
    let (query_tx, query_rx) = channel::unbounded::<Query>();
    let _q = session
        .declare_queryable("/pending", QueryableKind::EVAL, query_tx)
        .expect("declare");

    let (handle, _rx) = run_query(&session, "/pending", QueryTarget::all(), QueryConsolidation::none());
    let _held = query_rx.recv_timeout(TIMEOUT).expect("query delivered");
    assert_eq!(session.pending_queries(), 1);

    session.close();
    assert!(handle.is_closed());
    assert!(matches!(
        session.query("/pending", "", QueryTarget::all(), QueryConsolidation::none(), |_e: ReplyEvent| {}),
        Err(Error::SessionClosed)
    ));
}
