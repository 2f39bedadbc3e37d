//! End-to-end tests for the async engine surface: lazy loading,
//! single-flight, search force-loading and document replacement.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tree_action::ChildrenLoader;
use tree_action::LoadError;
use tree_action::NodeId;
use tree_action::NodeSnapshot;
use tree_action::NodeSpec;
use tree_action::OpCode;
use tree_action::OperationState;
use tree_action::TreeAction;
use tree_action::TreeError;
use tree_action::TreeEvent;

/// Serves pre-baked children per folder id; counts invocations and can be
/// switched into failure mode.
struct MapLoader {
    children: HashMap<String, Vec<NodeSpec>>,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MapLoader {
    fn new(children: HashMap<String, Vec<NodeSpec>>) -> Self {
        Self {
            children,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ChildrenLoader for MapLoader {
    async fn load(&self, node: NodeSnapshot, _query: Option<&str>) -> Result<Vec<NodeSpec>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Suspend so a competing expand can observe the Loading state.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err("loader unavailable".into());
        }
        Ok(self
            .children
            .get(node.id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

fn code(s: &str) -> OpCode {
    OpCode::from(s)
}

/// root → docs (lazy) → { report.pdf, sub (lazy) → unique-note.txt }
fn lazy_fixture() -> (TreeAction, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let mut children = HashMap::new();
    children.insert(
        "docs".to_string(),
        vec![
            NodeSpec::file("report", "report.pdf").with_operations(["R", "D"]),
            NodeSpec::lazy_folder("sub", "Subfolder").with_operations(["R"]),
        ],
    );
    children.insert(
        "sub".to_string(),
        vec![NodeSpec::file("note", "unique-note.txt").with_operations(["R"])],
    );
    let loader = MapLoader::new(children);
    let calls = loader.calls.clone();
    let fail = loader.fail.clone();

    let tree = TreeAction::new(loader);
    tree.attach_child(
        &tree.root_id(),
        NodeSpec::lazy_folder("docs", "Documents").with_operations(["C", "R", "U", "D", "S"]),
    )
    .unwrap();
    (tree, calls, fail)
}

#[tokio::test]
async fn test_concurrent_expands_invoke_loader_once() {
    let (tree, calls, _) = lazy_fixture();
    let docs_id = id("docs");
    let tree2 = tree.clone();
    let (a, b) = tokio::join!(tree.expand(&docs_id), tree2.expand(&docs_id));
    a.unwrap();
    b.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let docs = tree.node(&id("docs")).unwrap();
    assert!(docs.load_state.is_loaded());
    assert!(!docs.collapsed);
    assert_eq!(docs.children.len(), 2);
}

#[tokio::test]
async fn test_expand_is_one_shot_per_load() {
    let (tree, calls, _) = lazy_fixture();
    tree.expand(&id("docs")).await.unwrap();
    tree.collapse(&id("docs"));
    // Children survive the collapse; re-expanding does not refetch.
    tree.expand(&id("docs")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(tree.node(&id("docs")).unwrap().children.len(), 2);
}

#[tokio::test]
async fn test_failed_load_reverts_and_is_retryable() {
    let (tree, calls, fail) = lazy_fixture();
    let mut events = tree.subscribe();

    fail.store(true, Ordering::SeqCst);
    let err = tree.expand(&id("docs")).await.unwrap_err();
    assert!(matches!(err, TreeError::LoadFailed { .. }));
    assert!(!tree.node(&id("docs")).unwrap().load_state.is_loaded());

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if event == TreeEvent::LoadFailed(id("docs")) {
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    fail.store(false, Ordering::SeqCst);
    tree.expand(&id("docs")).await.unwrap();
    assert!(tree.node(&id("docs")).unwrap().load_state.is_loaded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expand_all_loads_transitively() {
    let (tree, calls, _) = lazy_fixture();
    tree.expand_all().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let sub = tree.node(&id("sub")).unwrap();
    assert!(sub.load_state.is_loaded());
    assert!(!sub.collapsed);
    assert!(tree.node(&id("note")).is_some());
}

#[tokio::test]
async fn test_expand_to_depth_respects_level() {
    let (tree, calls, _) = lazy_fixture();
    // docs is level 1: only folders with level < 2 expand, so sub
    // (level 2) is revealed but not loaded.
    tree.expand_to_depth(2).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!tree.node(&id("sub")).unwrap().load_state.is_loaded());
}

#[tokio::test]
async fn test_search_force_loads_unloaded_subtrees() {
    let (tree, calls, _) = lazy_fixture();
    let mut events = tree.subscribe();
    tree.search("unique-note").await.unwrap();

    // Both lazy folders were loaded to complete the search.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(tree.is_search_active());

    let note = tree.node(&id("note")).unwrap();
    assert!(note.visible);
    for ancestor in ["sub", "docs", "root"] {
        let node = tree.node(&id(ancestor)).unwrap();
        assert!(node.visible, "ancestor `{ancestor}` must be visible");
        assert!(!node.collapsed, "ancestor `{ancestor}` must be expanded");
    }
    // Non-matching sibling of the match path stays hidden.
    assert!(!tree.node(&id("report")).unwrap().visible);

    let mut saw_started = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        saw_started |= event == TreeEvent::SearchStarted;
        saw_completed |= event == TreeEvent::SearchCompleted;
    }
    assert!(saw_started && saw_completed);
}

#[tokio::test]
async fn test_clear_search_restores_visibility_and_drops_speculative_loads() {
    let (tree, _, _) = lazy_fixture();
    tree.search("unique-note").await.unwrap();
    tree.clear_search();

    assert!(!tree.is_search_active());
    for node_id in tree.node_ids() {
        assert!(tree.node(&node_id).unwrap().visible);
    }
    // The search-loaded subtree was discarded for freshness.
    assert!(!tree.node(&id("docs")).unwrap().load_state.is_loaded());
    assert!(tree.node(&id("note")).is_none());
}

#[tokio::test]
async fn test_user_expand_sanctions_search_loaded_data() {
    let (tree, calls, _) = lazy_fixture();
    tree.search("unique-note").await.unwrap();
    // The user opens `docs` while the search is active.
    tree.expand(&id("docs")).await.unwrap();
    tree.clear_search();

    assert!(tree.node(&id("docs")).unwrap().load_state.is_loaded());
    assert!(tree.node(&id("report")).is_some());
    // Nested `sub` stayed speculative and was dropped.
    assert!(!tree.node(&id("sub")).unwrap().load_state.is_loaded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_search_with_no_matches_hides_everything_but_keeps_nodes() {
    let (tree, _, _) = lazy_fixture();
    tree.search("no-such-name").await.unwrap();
    let root = tree.node(&tree.root_id()).unwrap();
    assert!(!root.visible);
    // Nodes are hidden, never removed.
    assert!(tree.node(&id("report")).is_some());
}

#[tokio::test]
async fn test_set_operation_cascades_through_loaded_tree() {
    let (tree, _, _) = lazy_fixture();
    tree.expand_all().await.unwrap();

    tree.set_operation(&id("docs"), &code("R"), OperationState::Allowed);
    for node_id in ["report", "sub", "note"] {
        assert_eq!(
            tree.node(&id(node_id)).unwrap().operation_state(&code("R")),
            OperationState::Allowed
        );
    }

    // Disagreement below `docs` flips its mixed indicator.
    tree.set_operation(&id("report"), &code("R"), OperationState::Denied);
    assert!(tree.node(&id("docs")).unwrap().is_mixed(&code("R")));
}

#[tokio::test]
async fn test_add_operation_is_root_only_and_remove_purges() {
    let (tree, _, _) = lazy_fixture();
    tree.expand_all().await.unwrap();

    tree.add_operation("X", "Export").unwrap();
    assert!(tree
        .node(&tree.root_id())
        .unwrap()
        .is_operation_available(&code("X")));
    assert!(!tree.node(&id("docs")).unwrap().is_operation_available(&code("X")));

    assert!(tree.remove_operation(&code("R")));
    for node_id in tree.node_ids() {
        let node = tree.node(&node_id).unwrap();
        assert!(!node.is_operation_available(&code("R")));
        assert!(!node.operation_state.contains_key(&code("R")));
        assert!(!node.is_mixed(&code("R")));
    }
    // Removing an absent code is a no-op.
    assert!(!tree.remove_operation(&code("R")));
}

#[tokio::test]
async fn test_round_trip_preserves_states_and_shape() {
    let (tree, _, _) = lazy_fixture();
    tree.expand_all().await.unwrap();
    tree.set_operation(&id("sub"), &code("R"), OperationState::Denied);

    let json = tree.to_json().unwrap();
    let reloaded = TreeAction::new(MapLoader::new(HashMap::new()));
    reloaded.load_json(&json).unwrap();

    assert_eq!(reloaded.node_ids(), tree.node_ids());
    for node_id in tree.node_ids() {
        let before = tree.node(&node_id).unwrap();
        let after = reloaded.node(&node_id).unwrap();
        assert_eq!(before.level, after.level);
        assert_eq!(before.available_operations, after.available_operations);
        assert_eq!(before.operation_state, after.operation_state);
    }
}

#[tokio::test]
async fn test_malformed_document_leaves_tree_intact() {
    let (tree, _, _) = lazy_fixture();
    tree.expand_all().await.unwrap();
    let before = tree.node_ids();

    let err = tree.load_json("{\"operations\": []}").unwrap_err();
    assert!(matches!(err, TreeError::Json(_)));

    // Duplicate ids are rejected as a structured error.
    let dup = r#"{
        "operations": [{"code": "R", "label": "Read"}],
        "tree": {
            "id": "root", "name": "Root", "isFolder": true,
            "children": [
                {"id": "a", "name": "a", "isFolder": false},
                {"id": "a", "name": "a again", "isFolder": false}
            ]
        }
    }"#;
    let err = tree.load_json(dup).unwrap_err();
    assert!(matches!(err, TreeError::MalformedDocument { .. }));

    assert_eq!(tree.node_ids(), before);
}

#[tokio::test]
async fn test_stale_completion_after_tree_replacement_is_discarded() {
    let (tree, _, _) = lazy_fixture();
    let expanding = {
        let tree = tree.clone();
        tokio::spawn(async move { tree.expand(&id("docs")).await })
    };
    // Let the fetch reach the loader, then replace the tree underneath it.
    tokio::task::yield_now().await;
    let doc = r#"{
        "operations": [{"code": "R", "label": "Read"}],
        "tree": {"id": "fresh-root", "name": "Fresh", "isFolder": true, "availableOperations": ["R"]}
    }"#;
    tree.load_json(doc).unwrap();

    expanding.await.unwrap().unwrap();
    // The old load completed against a replaced tree and was dropped.
    assert_eq!(tree.root_id(), id("fresh-root"));
    assert!(tree.node(&id("report")).is_none());
    assert!(tree.node(&id("docs")).is_none());
}

#[tokio::test]
async fn test_unavailable_operation_is_silent_noop() {
    let (tree, _, _) = lazy_fixture();
    tree.expand(&id("docs")).await.unwrap();
    // `report` only carries R and D.
    tree.set_operation(&id("report"), &code("C"), OperationState::Allowed);
    assert_eq!(
        tree.node(&id("report")).unwrap().operation_state(&code("C")),
        OperationState::Unselected
    );
}
