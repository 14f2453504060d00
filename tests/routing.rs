//! End-to-end coverage for scenario S7: routing table discovery, read/write
//! dispatch to the discovered servers, and forgetting a writer that reports
//! `Neo.ClientError.Cluster.NotALeader`.

mod common;

use std::sync::Arc;

use bolt_core::pool::routing::{AccessMode, RoutingPool};
use bolt_core::protocol::tags;
use bolt_core::value::Value;
use bolt_core::{Address, Auth, ConnectorConfig, Scheme};

fn server_entry(role: &str, address: &Address) -> Value {
    Value::dict(vec![
        ("role".to_string(), Value::string(role)),
        (
            "addresses".to_string(),
            Value::list(vec![Value::string(format!("{}:{}", address.host(), address.service()))]),
        ),
    ])
}

#[test]
fn s7_discovery_routes_reads_and_writes_then_forgets_a_failed_writer() {
    let reader_address = common::spawn_scripted_server(
        3,
        vec![(tags::HELLO, common::success(Vec::new())), (tags::RESET, common::success(Vec::new()))],
    );
    let writer_address = common::spawn_scripted_server(
        3,
        vec![
            (tags::HELLO, common::success(Vec::new())),
            (
                tags::RUN,
                common::failure("Neo.ClientError.Cluster.NotALeader", "not a leader"),
            ),
            (tags::PULL_ALL, common::ignored()),
            (tags::RESET, common::success(Vec::new())),
        ],
    );

    // The ROUTE entry only needs to satisfy `from_discovery_record`'s
    // non-empty check; this test never forces a second discovery round, so
    // it's never dialed.
    let route_entry = server_entry("ROUTE", &Address::new("127.0.0.1", "1"));
    let read_entry = server_entry("READ", &reader_address);
    let write_entry = server_entry("WRITE", &writer_address);

    let discovery_fields = common::success(vec![(
        "fields".to_string(),
        Value::list(vec![Value::string("ttl"), Value::string("servers")]),
    )]);
    let mut discovery_record = common::framed_structure(
        tags::RECORD,
        vec![Value::list(vec![
            Value::Integer(300),
            Value::list(vec![route_entry, read_entry, write_entry]),
        ])],
    );
    discovery_record.extend(common::success(vec![("type".to_string(), Value::string("r"))]));

    let router_address = common::spawn_scripted_server(
        3,
        vec![
            (tags::HELLO, common::success(Vec::new())),
            (tags::RUN, discovery_fields),
            (tags::PULL_ALL, discovery_record),
        ],
    );

    let config = Arc::new(ConnectorConfig::new(Scheme::Neo4j, router_address));
    let seed = Arc::clone(&config.address);
    let pool = RoutingPool::new(seed, Arc::clone(&config), Auth::None);

    let reader_leased = pool.acquire(AccessMode::Read).expect("read acquisition discovers and connects");
    drop(reader_leased);

    let table = pool.routing_table();
    assert_eq!(table.readers.len(), 1);
    assert_eq!(table.readers[0].host(), reader_address.host());
    assert_eq!(table.writers.len(), 1);
    assert_eq!(table.writers[0].host(), writer_address.host());

    let mut writer_leased = pool.acquire(AccessMode::Write).expect("write acquisition reuses the discovered writer");
    writer_leased.with(|conn| {
        let run_id = conn.run("CREATE (n)", Vec::new(), Default::default()).unwrap();
        let pull_id = conn.pull_all().unwrap();
        let _ = conn.fetch(run_id);
        let _ = conn.fetch(pull_id);
    });
    drop(writer_leased);

    let table = pool.routing_table();
    assert!(
        table.writers.is_empty(),
        "a NotALeader failure on the writer must remove it from the writer role"
    );
    assert_eq!(table.readers.len(), 1, "the reader role is unaffected by a writer-only failure");
}
