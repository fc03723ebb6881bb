use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use nestset::{
    ForestLocks, LockScope, NewNode, NodeId, Result, SqliteStore, TreeConfig, TreeEngine,
};
use tempfile::TempDir;

const NUM_THREADS: usize = 4;
const OPERATIONS_PER_THREAD: usize = 25;

fn open(path: &Path, config: &TreeConfig, locks: &Arc<ForestLocks>) -> TreeEngine<SqliteStore> {
    let store = SqliteStore::open(path, config).unwrap();
    TreeEngine::with_locks(store, config.clone(), Arc::clone(locks)).unwrap()
}

#[test]
fn concurrent_writers_keep_one_forest_consistent() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("shared.db"));
    let config = TreeConfig::multi_tree();
    let locks = Arc::new(ForestLocks::new());

    let root = open(&path, &config, &locks).make_root(NewNode::new("root"))?;
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::new();

    for thread_id in 0..NUM_THREADS {
        let path = Arc::clone(&path);
        let config = config.clone();
        let locks = Arc::clone(&locks);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || -> Result<()> {
            let mut engine = open(&path, &config, &locks);
            let branch = engine.append_to(NewNode::new(format!("t{thread_id}")), root.id)?;
            barrier.wait();
            let mut last = branch.id;
            for i in 0..OPERATIONS_PER_THREAD {
                let node = engine.append_to(NewNode::new(format!("t{thread_id}-{i}")), branch.id)?;
                if i % 5 == 4 {
                    // shuffle: move the previous node to the front of the branch
                    engine.prepend_to(last, branch.id)?;
                }
                last = node.id;
            }
            Ok(())
        }));
    }

    for handle in handles {
        handle.join().unwrap()?;
    }

    let engine = open(&path, &config, &locks);
    let report = engine.verify()?;
    assert!(report.success, "{:#?}", report.findings);
    assert_eq!(
        report.counts.nodes_found as usize,
        1 + NUM_THREADS * (OPERATIONS_PER_THREAD + 1)
    );
    Ok(())
}

#[test]
fn opposite_cross_forest_moves_do_not_deadlock() -> Result<()> {
    const MOVES: usize = 20;
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("swap.db"));
    let config = TreeConfig::multi_tree();
    let locks = Arc::new(ForestLocks::new());

    let mut engine = open(&path, &config, &locks);
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.make_root(NewNode::new("B"))?;
    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    for i in 0..MOVES {
        from_a.push(engine.append_to(NewNode::new(format!("a{i}")), a.id)?.id);
        from_b.push(engine.append_to(NewNode::new(format!("b{i}")), b.id)?.id);
    }
    drop(engine);

    let barrier = Arc::new(Barrier::new(2));
    let spawn_mover = |nodes: Vec<NodeId>, target: NodeId| {
        let path = Arc::clone(&path);
        let config = config.clone();
        let locks = Arc::clone(&locks);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || -> Result<()> {
            let mut engine = open(&path, &config, &locks);
            barrier.wait();
            for (i, id) in nodes.into_iter().enumerate() {
                let moved = if i % 2 == 0 {
                    engine.append_to(id, target)?
                } else {
                    engine.prepend_to(id, target)?
                };
                assert_eq!(moved.tree, Some(target));
            }
            Ok(())
        })
    };

    let a_to_b = spawn_mover(from_a.clone(), b.id);
    let b_to_a = spawn_mover(from_b.clone(), a.id);
    a_to_b.join().unwrap()?;
    b_to_a.join().unwrap()?;

    let engine = open(&path, &config, &locks);
    let report = engine.verify()?;
    assert!(report.success, "{:#?}", report.findings);
    let q = engine.query();
    let mut in_a: Vec<_> = q
        .children(&q.require(a.id)?, Some(1))?
        .into_iter()
        .map(|n| n.id)
        .collect();
    let mut in_b: Vec<_> = q
        .children(&q.require(b.id)?, Some(1))?
        .into_iter()
        .map(|n| n.id)
        .collect();
    in_a.sort();
    in_b.sort();
    assert_eq!(in_a, from_b);
    assert_eq!(in_b, from_a);
    assert_eq!(locks.tracked(), 0);
    Ok(())
}

#[test]
fn forest_lock_blocks_only_its_forest() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = Arc::new(dir.path().join("forests.db"));
    let config = TreeConfig::multi_tree();
    let locks = Arc::new(ForestLocks::new());

    let mut engine = open(&path, &config, &locks);
    let busy = engine.make_root(NewNode::new("busy"))?;
    let free = engine.make_root(NewNode::new("free"))?;
    drop(engine);

    let guard = locks.acquire(&[LockScope::Forest(busy.id)]);

    let spawn_append = |target: NodeId| {
        let (tx, rx) = mpsc::channel();
        let path = Arc::clone(&path);
        let config = config.clone();
        let locks = Arc::clone(&locks);
        let handle = thread::spawn(move || {
            let mut engine = open(&path, &config, &locks);
            let result = engine.append_to(NewNode::new("child"), target).map(|n| n.id);
            let _ = tx.send(());
            result
        });
        (handle, rx)
    };

    let (free_handle, free_done) = spawn_append(free.id);
    free_done
        .recv_timeout(Duration::from_secs(10))
        .expect("append to an unlocked forest should not wait");
    free_handle.join().unwrap()?;

    let (busy_handle, busy_done) = spawn_append(busy.id);
    assert!(busy_done.recv_timeout(Duration::from_millis(200)).is_err());
    drop(guard);
    busy_done
        .recv_timeout(Duration::from_secs(10))
        .expect("append should finish once the forest lock is released");
    busy_handle.join().unwrap()?;

    let engine = open(&path, &config, &locks);
    assert!(engine.verify()?.success);
    assert_eq!(engine.query().leaves_of_store()?.len(), 2);
    Ok(())
}
