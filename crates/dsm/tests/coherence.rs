use {
    dsm::{Cluster, CoherenceError, Engine, EngineConfig, HomePolicy},
    dsm_core::{BlockId, Message, NodeId},
    std::time::{Duration, Instant},
};

const B0: BlockId = BlockId::new(0);

fn node(n: usize) -> NodeId {
    NodeId::new(n).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spins until `cond` holds, failing the test after a generous bound.
fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn sees_owner(engine: &Engine, block: BlockId, owner: NodeId) -> bool {
    engine.owner(block).unwrap() == owner
}

#[test]
fn two_node_scenario() {
    init_tracing();
    let cluster = Cluster::start(EngineConfig::new(2, 1)).unwrap();
    let (one, two) = (cluster.node(node(1)).engine(), cluster.node(node(2)).engine());

    // Node 2 has never seen block 0, so it fetches the home default from node 1.
    assert!(!two.cache_line(B0).unwrap().valid);
    assert_eq!(two.read(B0).unwrap(), 0);
    assert!(two.cache_line(B0).unwrap().valid);
    assert!(one.directory_entry(B0).unwrap().sharers.contains(&node(2)));

    one.write(B0, 42).unwrap();
    eventually("node 2 to drop its copy", || !two.cache_line(B0).unwrap().valid);
    assert_eq!(two.read(B0).unwrap(), 42);

    assert_eq!(cluster.shutdown().unwrap(), 2);
}

#[test]
fn read_after_local_write_needs_no_fetch() {
    init_tracing();
    // A timeout this short would fail any read that had to go to the network and wait.
    let config = EngineConfig::new(3, 4).fetch_timeout(Duration::from_millis(1));
    let cluster = Cluster::start(config).unwrap();
    let three = cluster.node(node(3)).engine();
    for block in (0..4).map(BlockId::new) {
        three.write(block, block.get() as i32 * 10).unwrap();
        assert_eq!(three.read(block).unwrap(), block.get() as i32 * 10);
    }
    cluster.shutdown().unwrap();
}

#[test]
fn ownership_converges_on_last_writer() {
    init_tracing();
    let cluster = Cluster::start(EngineConfig::new(4, 2)).unwrap();
    let block = BlockId::new(1);
    for writer in [node(2), node(4), node(3)] {
        cluster.node(writer).engine().write(block, writer.get() as i32).unwrap();
        for n in cluster.nodes() {
            eventually("every view to name the writer", || {
                sees_owner(n.engine(), block, writer)
            });
        }
    }
    for n in cluster.nodes() {
        let entry = n.engine().directory_entry(block).unwrap();
        assert_eq!(entry.owner, node(3));
        assert_eq!(entry.sharers.into_iter().collect::<Vec<_>>(), vec![node(3)]);
        assert_eq!(n.engine().read(block).unwrap(), 3);
    }
    cluster.shutdown().unwrap();
}

#[test]
fn invalidation_holds_until_refetch() {
    init_tracing();
    let cluster = Cluster::start(EngineConfig::new(3, 1)).unwrap();
    let (one, two, three) = (
        cluster.node(node(1)).engine(),
        cluster.node(node(2)).engine(),
        cluster.node(node(3)).engine(),
    );
    assert_eq!(three.read(B0).unwrap(), 0);
    two.write(B0, 7).unwrap();
    eventually("node 3 to learn the new owner", || sees_owner(three, B0, node(2)));
    eventually("node 1 to learn the new owner", || sees_owner(one, B0, node(2)));
    // Nothing refreshes node 3 on its own.
    std::thread::sleep(Duration::from_millis(20));
    assert!(!three.cache_line(B0).unwrap().valid);
    assert!(!one.cache_line(B0).unwrap().valid);
    assert_eq!(three.read(B0).unwrap(), 7);
    assert_eq!(one.read(B0).unwrap(), 7);
    cluster.shutdown().unwrap();
}

#[test]
fn interleaved_homes_serve_their_blocks() {
    init_tracing();
    let config = EngineConfig::new(3, 6).home(HomePolicy::Interleaved);
    let cluster = Cluster::start(config).unwrap();
    for block in (0..6).map(BlockId::new) {
        let home = node(block.get() % 3 + 1);
        for n in cluster.nodes() {
            let engine = n.engine();
            assert_eq!(engine.owner(block).unwrap(), home);
            assert_eq!(engine.cache_line(block).unwrap().valid, engine.id() == home);
            assert_eq!(engine.read(block).unwrap(), 0);
        }
    }
    cluster.shutdown().unwrap();
}

#[test]
fn fetch_from_owner_without_copy_times_out() {
    init_tracing();
    let config = EngineConfig::new(2, 1).fetch_timeout(Duration::from_millis(50));
    let cluster = Cluster::start(config).unwrap();
    let (one, two) = (cluster.node(node(1)).engine(), cluster.node(node(2)).engine());

    // Node 1 still owns the block but has lost its copy, so it cannot serve node 2.
    one.handle(Message::invalidate(B0, node(2))).unwrap();
    assert!(matches!(
        one.handle(Message::fetch_req(B0, node(2))),
        Err(CoherenceError::DirectoryInconsistency { requester, .. }) if requester == node(2)
    ));
    let err = two.read(B0).unwrap_err();
    assert!(matches!(err, CoherenceError::Timeout { owner, .. } if owner == node(1)));

    // The failure is not sticky: a later write makes the block readable again.
    one.write(B0, 5).unwrap();
    assert_eq!(two.read(B0).unwrap(), 5);
    cluster.shutdown().unwrap();
}

#[test]
fn out_of_range_blocks_fail_fast() {
    init_tracing();
    let cluster = Cluster::start(EngineConfig::new(2, 2)).unwrap();
    let engine = cluster.node(node(1)).engine();
    assert!(matches!(
        engine.write(BlockId::new(2), 1),
        Err(CoherenceError::BlockOutOfRange { .. })
    ));
    assert!(matches!(
        engine.read(BlockId::new(9)),
        Err(CoherenceError::BlockOutOfRange { .. })
    ));
    cluster.shutdown().unwrap();
}
