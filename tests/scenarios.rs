use nestset::{
    ErrorKind, MemoryStore, NewNode, Node, NodeId, Result, TreeConfig, TreeEngine,
};

fn engine(config: TreeConfig) -> TreeEngine<MemoryStore> {
    TreeEngine::new(MemoryStore::new(), config).unwrap()
}

fn pos(engine: &TreeEngine<MemoryStore>, id: NodeId) -> (i64, i64, i64) {
    let node = engine.query().require(id).unwrap();
    (node.left, node.right, node.depth)
}

fn snapshot(engine: &TreeEngine<MemoryStore>) -> Vec<Node> {
    let q = engine.query();
    let mut nodes = Vec::new();
    for root in q.roots().unwrap() {
        nodes.extend(q.forest(&root).unwrap());
    }
    nodes
}

fn assert_valid(engine: &TreeEngine<MemoryStore>) {
    let report = engine.verify().unwrap();
    assert!(report.success, "{:#?}", report.findings);
}

#[test]
fn root_then_child() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    assert_eq!((a.left, a.right, a.depth), (1, 2, 0));

    let b = engine.append_to(NewNode::new("B"), a.id)?;
    assert_eq!((b.left, b.right, b.depth), (2, 3, 1));
    assert_eq!(pos(&engine, a.id), (1, 4, 0));
    Ok(())
}

#[test]
fn insert_after_shifts_later_siblings() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    let c = engine.append_to(NewNode::new("C"), a.id)?;
    assert_eq!(pos(&engine, a.id), (1, 6, 0));

    let d = engine.insert_after(NewNode::new("D"), b.id)?;
    assert_eq!((d.left, d.right, d.depth), (4, 5, 1));
    assert_eq!(pos(&engine, c.id), (6, 7, 1));
    assert_eq!(pos(&engine, a.id), (1, 8, 0));
    assert_valid(&engine);
    Ok(())
}

#[test]
fn delete_with_children_closes_gap() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    let x = engine.append_to(NewNode::new("X"), a.id)?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    let y = engine.append_to(NewNode::new("Y"), a.id)?;
    let c = engine.append_to(NewNode::new("C"), b.id)?;
    assert_eq!(pos(&engine, a.id), (1, 10, 0));
    assert_eq!(pos(&engine, b.id), (4, 7, 1));
    assert_eq!(pos(&engine, c.id), (5, 6, 2));
    assert_eq!(pos(&engine, y.id), (8, 9, 1));

    let removed = engine.delete_with_children(b.id)?;
    assert_eq!(removed, 2);
    assert_eq!(engine.store().len(), 3);
    assert_eq!(pos(&engine, a.id), (1, 6, 0));
    assert_eq!(pos(&engine, x.id), (2, 3, 1));
    assert_eq!(pos(&engine, y.id), (4, 5, 1));
    assert!(engine.query().node(c.id)?.is_none());
    assert_valid(&engine);
    Ok(())
}

#[test]
fn cyclic_move_leaves_bounds_unchanged() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let root = engine.make_root(NewNode::new("root"))?;
    let a = engine.append_to(NewNode::new("A"), root.id)?;
    let inner = engine.append_to(NewNode::new("inner"), a.id)?;
    let deep = engine.append_to(NewNode::new("deep"), inner.id)?;
    let before = snapshot(&engine);

    let err = engine.insert_before(a.id, deep.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicMove);
    let err = engine.append_to(a.id, inner.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicMove);
    assert_eq!(snapshot(&engine), before);
    Ok(())
}

#[test]
fn precondition_failures() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let root = engine.make_root(NewNode::new("root"))?;
    let a = engine.append_to(NewNode::new("A"), root.id)?;
    let before = snapshot(&engine);

    let cases = [
        (engine.append_to(a.id, a.id).map(|_| ()), ErrorKind::SameNode),
        (
            engine.append_to(NewNode::new("x"), NodeId(404)).map(|_| ()),
            ErrorKind::TargetNotPersisted,
        ),
        (
            engine.append_to(NodeId(404), root.id).map(|_| ()),
            ErrorKind::NotPersisted,
        ),
        (
            engine.make_root(NewNode::new("second")).map(|_| ()),
            ErrorKind::ForestLimitExceeded,
        ),
        (
            engine.make_root(a.id).map(|_| ()),
            ErrorKind::ForestLimitExceeded,
        ),
        (
            engine.insert_after(NewNode::new("x"), root.id).map(|_| ()),
            ErrorKind::TargetIsRoot,
        ),
        (engine.delete(root.id), ErrorKind::UnsupportedOperation),
        (engine.delete(NodeId(404)), ErrorKind::NotPersisted),
        (
            engine.delete_with_children(NodeId(404)).map(|_| ()),
            ErrorKind::NotPersisted,
        ),
    ];
    for (result, kind) in cases {
        assert_eq!(result.unwrap_err().kind(), kind);
    }
    assert_eq!(snapshot(&engine), before);
    Ok(())
}

#[test]
fn single_delete_only_removes_leaves() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let root = engine.make_root(NewNode::new("root"))?;
    let a = engine.append_to(NewNode::new("A"), root.id)?;
    let b = engine.append_to(NewNode::new("B"), root.id)?;
    engine.append_to(NewNode::new("A1"), a.id)?;

    let err = engine.delete(a.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);

    engine.delete(b.id)?;
    assert_eq!(pos(&engine, root.id), (1, 6, 0));
    assert_valid(&engine);
    Ok(())
}

#[test]
fn move_subtree_within_forest() -> Result<()> {
    let mut engine = engine(TreeConfig::single_tree());
    let root = engine.make_root(NewNode::new("root"))?;
    let a = engine.append_to(NewNode::new("A"), root.id)?;
    let b = engine.append_to(NewNode::new("B"), root.id)?;
    let a1 = engine.append_to(NewNode::new("A1"), a.id)?;
    engine.append_to(NewNode::new("A2"), a.id)?;

    // A (with children) becomes the first child of B
    let moved = engine.prepend_to(a.id, b.id)?;
    assert_eq!(moved.depth, 2);
    assert_eq!(pos(&engine, b.id), (2, 9, 1));
    assert_eq!(pos(&engine, a.id), (3, 8, 2));
    assert_eq!(pos(&engine, a1.id), (4, 5, 3));
    assert_valid(&engine);

    // and back out, after B
    engine.insert_after(a.id, b.id)?;
    assert_eq!(pos(&engine, b.id), (2, 3, 1));
    assert_eq!(pos(&engine, a.id), (4, 9, 1));
    assert_eq!(pos(&engine, a1.id), (5, 6, 2));
    assert_valid(&engine);
    Ok(())
}

#[test]
fn cross_forest_move() -> Result<()> {
    let mut engine = engine(TreeConfig::multi_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    let c = engine.append_to(NewNode::new("C"), a.id)?;
    let x = engine.make_root(NewNode::new("X"))?;
    engine.append_to(NewNode::new("Y"), x.id)?;

    let moved = engine.append_to(b.id, x.id)?;
    assert_eq!((moved.left, moved.right, moved.depth), (4, 5, 1));
    assert_eq!(moved.tree, Some(x.id));
    assert_eq!(pos(&engine, x.id), (1, 6, 0));
    assert_eq!(pos(&engine, a.id), (1, 4, 0));
    assert_eq!(pos(&engine, c.id), (2, 3, 1));
    assert_valid(&engine);
    Ok(())
}

#[test]
fn absorbing_a_ranked_forest_closes_its_rank() -> Result<()> {
    let mut engine = engine(TreeConfig::ranked_forest());
    let a = engine.make_root(NewNode::new("A"))?;
    let x = engine.make_root(NewNode::new("X"))?;
    let y = engine.append_to(NewNode::new("Y"), x.id)?;
    let z = engine.make_root(NewNode::new("Z"))?;

    engine.append_to(x.id, a.id)?;
    let q = engine.query();
    let x = q.require(x.id)?;
    let y = q.require(y.id)?;
    assert_eq!((x.left, x.right, x.depth, x.tree), (2, 5, 1, Some(a.id)));
    assert_eq!((y.left, y.right, y.depth, y.order), (3, 4, 2, Some(1)));
    assert_eq!(q.require(z.id)?.order, Some(2));
    assert_valid(&engine);
    Ok(())
}

#[test]
fn make_root_detaches_subtree() -> Result<()> {
    let mut engine = engine(TreeConfig::ranked_forest());
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    let c = engine.append_to(NewNode::new("C"), b.id)?;
    let d = engine.append_to(NewNode::new("D"), a.id)?;

    let b = engine.make_root(b.id)?;
    assert_eq!((b.left, b.right, b.depth), (1, 4, 0));
    assert_eq!(b.tree, Some(b.id));
    assert_eq!(b.order, Some(2));

    let c = engine.query().require(c.id)?;
    assert_eq!((c.left, c.right, c.depth, c.tree), (2, 3, 1, Some(b.id)));
    assert_eq!(pos(&engine, a.id), (1, 4, 0));
    assert_eq!(pos(&engine, d.id), (2, 3, 1));
    assert_valid(&engine);

    let err = engine.make_root(b.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    Ok(())
}

#[test]
fn root_promotion_reorders_forests() -> Result<()> {
    let mut engine = engine(TreeConfig::ranked_forest());
    let a = engine.make_root(NewNode::new("A"))?;
    let d = engine.append_to(NewNode::new("D"), a.id)?;

    let n = engine.insert_before(NewNode::new("N"), a.id)?;
    assert!(n.is_root());
    assert_eq!(n.order, Some(1));

    let d = engine.insert_after(d.id, a.id)?;
    assert!(d.is_root());
    assert_eq!(d.tree, Some(d.id));

    let order = |engine: &TreeEngine<MemoryStore>| -> Vec<NodeId> {
        engine
            .query()
            .ranked_roots()
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect()
    };
    assert_eq!(order(&engine), vec![n.id, a.id, d.id]);

    engine.insert_before(d.id, n.id)?;
    assert_eq!(order(&engine), vec![d.id, n.id, a.id]);
    assert_valid(&engine);
    Ok(())
}

#[test]
fn sibling_placement_against_root_without_ranking() -> Result<()> {
    let mut engine = engine(TreeConfig::multi_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    let err = engine.insert_before(b.id, a.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TargetIsRoot);
    Ok(())
}

#[test]
fn store_failure_rolls_back_everything() -> Result<()> {
    let mut engine = engine(TreeConfig::multi_tree());
    let a = engine.make_root(NewNode::new("A"))?;
    let b = engine.append_to(NewNode::new("B"), a.id)?;
    engine.append_to(NewNode::new("B1"), b.id)?;
    let x = engine.make_root(NewNode::new("X"))?;
    let before = snapshot(&engine);

    // gap opened, second shift fails
    engine.store_mut().fail_after_writes(1);
    let err = engine.append_to(NewNode::new("C"), a.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(snapshot(&engine), before);

    // subtree already translated into X when the source gap fails to close
    engine.store_mut().fail_after_writes(3);
    let err = engine.append_to(b.id, x.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
    assert_eq!(snapshot(&engine), before);
    assert!(!engine.store().in_transaction());

    engine.store_mut().clear_fault();
    engine.append_to(b.id, x.id)?;
    assert_eq!(pos(&engine, x.id), (1, 6, 0));
    assert_valid(&engine);
    Ok(())
}
