// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource declaration and resolution, alone and through a session.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use znet::keys::ResourceRegistry;
use znet::{config, Error, ResKey, Session};

#[test]
fn test_distinct_names_get_distinct_ids() {
    let registry = ResourceRegistry::new();
    let a = registry.declare(&ResKey::from("/a")).expect("declare /a");
    let b = registry.declare(&ResKey::from("/b")).expect("declare /b");
    let again = registry.declare(&ResKey::from("/a")).expect("redeclare /a");

    assert_ne!(a, b);
    assert_eq!(a, again);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_resolve_round_trips_every_form() {
    let registry = ResourceRegistry::new();
    let id = registry.declare(&ResKey::from("/home")).expect("declare");

    assert_eq!(&*registry.resolve(&ResKey::RId(id)).expect("rid"), "/home");
    assert_eq!(
        &*registry
            .resolve(&ResKey::rid_with_suffix(id, "/lamp"))
            .expect("rid+suffix"),
        "/home/lamp"
    );
    assert_eq!(
        &*registry.resolve(&ResKey::from("/other")).expect("name"),
        "/other"
    );
}

#[test]
fn test_declaring_suffixed_key_interns_full_name() {
    let registry = ResourceRegistry::new();
    let base = registry.declare(&ResKey::from("/base")).expect("declare base");
    let full = registry
        .declare(&ResKey::rid_with_suffix(base, "/leaf"))
        .expect("declare suffixed");

    assert_ne!(base, full);
    assert_eq!(registry.id_of("/base/leaf"), Some(full));
}

#[test]
fn test_concurrent_declarations_agree() {
    let registry = Arc::new(ResourceRegistry::new());
    let names: Vec<String> = (0..32).map(|i| format!("/r/{}", i)).collect();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let names = names.clone();
            thread::spawn(move || {
                names
                    .iter()
                    .map(|n| registry.declare(&ResKey::from(n.as_str())).expect("declare"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<u64>> = workers
        .into_iter()
        .map(|w| w.join().expect("worker"))
        .collect();
    for other in &results[1..] {
        assert_eq!(other, &results[0], "every thread sees the same ids");
    }
    let unique: HashSet<u64> = results[0].iter().copied().collect();
    assert_eq!(unique.len(), names.len());
    assert_eq!(registry.len(), names.len());
}

#[test]
fn test_session_resolves_declared_resources() {
    let session = Session::open(config::config_default()).expect("open");
    let rid = session.declare_resource("/demo/example").expect("declare");

    assert_eq!(session.resolve(rid).expect("resolve"), "/demo/example");
    assert_eq!(
        session
            .resolve(ResKey::rid_with_suffix(rid, "/zenoh"))
            .expect("resolve suffix"),
        "/demo/example/zenoh"
    );
    assert!(matches!(
        session.resolve(ResKey::RId(rid + 100)),
        Err(Error::UnknownResource(_))
    ));
    assert!(matches!(
        session.declare_resource(""),
        Err(Error::InvalidKey(_))
    ));
}
