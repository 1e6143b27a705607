//! Registry membership properties under arbitrary connect/disconnect sequences

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use relay_core::{
    Broadcaster, ClientRegistry, ConnectionId, ConnectionState, RemoteClientConnection,
};
use serde_json::json;
use types::MessageEnvelope;

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Disconnect(usize),
    Evict(usize),
    Broadcast,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Connect),
        2 => any::<usize>().prop_map(Op::Disconnect),
        1 => any::<usize>().prop_map(Op::Evict),
        2 => Just(Op::Broadcast),
    ]
}

fn new_connection(capacity: usize) -> Arc<RemoteClientConnection> {
    let peer: SocketAddr = "127.0.0.1:43000".parse().unwrap();
    // queue receiver dropped: nothing here broadcasts
    let (conn, _rx) = RemoteClientConnection::new(peer, capacity);
    Arc::new(conn)
}

fn assert_membership_matches_open(registry: &ClientRegistry, all: &[Arc<RemoteClientConnection>]) {
    let open: HashSet<ConnectionId> = all
        .iter()
        .filter(|c| c.state() == ConnectionState::Open)
        .map(|c| c.id())
        .collect();
    let members: HashSet<ConnectionId> = registry.snapshot().iter().map(|c| c.id()).collect();
    assert_eq!(members, open);
    assert_eq!(registry.len(), open.len());
}

proptest! {
    #[test]
    fn prop_membership_equals_open_set(ops in prop::collection::vec(arb_op(), 1..64)) {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut all = Vec::new();
        let mut receivers = Vec::new();

        for op in ops {
            match op {
                Op::Connect => {
                    let peer: SocketAddr = "127.0.0.1:43000".parse().unwrap();
                    let (conn, rx) = RemoteClientConnection::new(peer, 4);
                    let conn = Arc::new(conn);
                    prop_assert!(registry.add(conn.clone()));
                    all.push(conn);
                    receivers.push(rx);
                }
                Op::Disconnect(i) if !all.is_empty() => {
                    let conn = &all[i % all.len()];
                    let was_member = registry.contains(&conn.id());
                    prop_assert_eq!(registry.remove(&conn.id()).is_some(), was_member);
                    // second removal is always a no-op
                    prop_assert!(registry.remove(&conn.id()).is_none());
                    prop_assert_ne!(conn.state(), ConnectionState::Open);
                }
                Op::Evict(i) if !all.is_empty() => {
                    // Saturate one queue so the next broadcast evicts it
                    let idx = i % all.len();
                    if all[idx].is_open() {
                        while all[idx].enqueue(Arc::from("filler")).is_ok() {}
                    }
                }
                Op::Broadcast => {
                    let report = broadcaster.broadcast(&MessageEnvelope::new("PING", json!(null)));
                    prop_assert_eq!(report.delivered + report.evicted.len(), report.recipients);
                    for id in &report.evicted {
                        prop_assert!(!registry.contains(id));
                    }
                }
                _ => {}
            }
            assert_membership_matches_open(&registry, &all);
        }
    }
}

#[test]
fn concurrent_add_remove_keeps_registry_consistent() {
    let registry = Arc::new(ClientRegistry::new());
    let threads = 8;
    let per_thread = 200;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..per_thread {
                    let conn = new_connection(2);
                    assert!(registry.add(conn.clone()));
                    if (i + t) % 2 == 0 {
                        assert!(registry.remove(&conn.id()).is_some());
                        assert_eq!(conn.state(), ConnectionState::Closing);
                    } else {
                        kept.push(conn);
                    }
                    // snapshots never expose a non-open connection
                    assert!(registry.snapshot().iter().all(|c| c.is_open()));
                }
                kept
            })
        })
        .collect();

    let mut kept = Vec::new();
    for handle in handles {
        kept.extend(handle.join().unwrap());
    }

    assert_eq!(registry.len(), kept.len());
    for conn in &kept {
        assert!(registry.contains(&conn.id()));
        assert!(conn.is_open());
    }
}
