//! Serialized tree format (JSON document, both directions)
//!
//! The document carries the operation catalog plus a recursive node
//! record, camelCase-keyed. Transient data (`mixedOperations`, `visible`)
//! never serializes; on load, levels are rebuilt from attachment and
//! mixed flags are recomputed rather than trusted. Deserialization is
//! all-or-nothing: a malformed document leaves the previous tree intact.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::engine::state::recompute_mixed;
use crate::engine::TreeState;
use crate::error::Result;
use crate::error::TreeError;
use crate::model::LoadState;
use crate::model::Node;
use crate::model::NodeId;
use crate::model::OpCode;
use crate::model::OperationCatalog;
use crate::model::OperationState;
use crate::model::OperationType;

/// A complete serialized tree: catalog plus the root node record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    /// The operation catalog, in order.
    pub operations: Vec<OperationType>,
    /// The root node record.
    pub tree: NodeRecord,
}

/// One serialized node record, camelCase-keyed.
///
/// The stored `level` is informational only; deserialization re-derives
/// levels from parent attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Unique node id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the node is a folder.
    pub is_folder: bool,
    /// Stored depth; ignored on load.
    #[serde(default)]
    pub level: u32,
    /// Applicable operation codes.
    #[serde(default)]
    pub available_operations: Vec<OpCode>,
    /// Tri-state per code.
    #[serde(default)]
    pub operation_state: HashMap<OpCode, OperationState>,
    /// Whether children are fetched on demand.
    #[serde(default)]
    pub lazy_load: bool,
    /// Whether children are present (an in-flight load serializes as `false`).
    #[serde(default = "default_true")]
    pub loaded: bool,
    /// View intent.
    #[serde(default = "default_true")]
    pub collapsed: bool,
    /// Child records, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

fn default_true() -> bool {
    true
}

/// Serializes the whole tree into a document.
pub(crate) fn to_document(state: &TreeState) -> TreeDocument {
    TreeDocument {
        operations: state.catalog.operations().to_vec(),
        tree: node_record(state, &state.root),
    }
}

fn node_record(state: &TreeState, id: &NodeId) -> NodeRecord {
    let Some(node) = state.node(id) else {
        // Unreachable for a consistent arena; emit an inert leaf record.
        return NodeRecord {
            id: id.as_str().to_string(),
            name: String::new(),
            is_folder: false,
            level: 0,
            available_operations: Vec::new(),
            operation_state: HashMap::new(),
            lazy_load: false,
            loaded: true,
            collapsed: true,
            children: Vec::new(),
        };
    };
    NodeRecord {
        id: node.id.as_str().to_string(),
        name: node.name.clone(),
        is_folder: node.is_folder,
        level: node.level,
        available_operations: node.available_operations.clone(),
        operation_state: node.operation_state.clone(),
        lazy_load: node.lazy_load,
        loaded: node.load_state.is_loaded(),
        collapsed: node.collapsed,
        children: node
            .children
            .iter()
            .map(|child| node_record(state, child))
            .collect(),
    }
}

/// Builds a fresh `TreeState` from a document.
///
/// Validates unique ids, catalog-bounded operation references and
/// folder-only children; rebuilds levels from attachment and recomputes
/// mixed flags. The caller swaps the returned state in atomically.
pub(crate) fn build_state(doc: &TreeDocument) -> Result<TreeState> {
    let catalog = OperationCatalog::from_operations(doc.operations.iter().cloned())?;

    let mut seen = HashSet::new();
    validate_record(&doc.tree, &catalog, &mut seen)?;

    let mut state = TreeState::new(catalog);
    let root_id = NodeId::from(doc.tree.id.as_str());
    let root = build_node(&doc.tree, root_id.clone());
    state.nodes.clear();
    state.nodes.insert(root_id.clone(), root);
    state.root = root_id.clone();

    for child in &doc.tree.children {
        insert_record(&mut state, &root_id, child)?;
    }
    recompute_mixed(&mut state);
    Ok(state)
}

fn validate_record(
    record: &NodeRecord,
    catalog: &OperationCatalog,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if record.id.is_empty() {
        return Err(TreeError::malformed("node with empty id"));
    }
    if !seen.insert(record.id.clone()) {
        return Err(TreeError::malformed(format!("duplicate node id `{}`", record.id)));
    }
    if !record.is_folder && !record.children.is_empty() {
        return Err(TreeError::malformed(format!(
            "non-folder node `{}` has children",
            record.id
        )));
    }
    for code in &record.available_operations {
        if !catalog.contains(code) {
            return Err(TreeError::malformed(format!(
                "node `{}` references operation `{code}` outside the catalog",
                record.id
            )));
        }
    }
    for code in record.operation_state.keys() {
        if !record.available_operations.contains(code) {
            return Err(TreeError::malformed(format!(
                "node `{}` holds state for unavailable operation `{code}`",
                record.id
            )));
        }
    }
    for child in &record.children {
        validate_record(child, catalog, seen)?;
    }
    Ok(())
}

fn build_node(record: &NodeRecord, id: NodeId) -> Node {
    let mut node = Node::new(id, record.name.clone(), record.is_folder, record.lazy_load);
    node.available_operations = record.available_operations.clone();
    node.operation_state = record.operation_state.clone();
    node.collapsed = record.collapsed;
    if node.lazy_load {
        node.load_state = if record.loaded {
            LoadState::Loaded
        } else {
            LoadState::NotLoaded
        };
    }
    node
}

fn insert_record(state: &mut TreeState, parent_id: &NodeId, record: &NodeRecord) -> Result<()> {
    let id = NodeId::from(record.id.as_str());
    let node = build_node(record, id.clone());
    state.attach(parent_id, node)?;
    for child in &record.children {
        insert_record(state, &id, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::set_operation;

    fn sample_doc() -> TreeDocument {
        let json = r#"{
            "operations": [
                {"code": "R", "label": "Read"},
                {"code": "U", "label": "Update"}
            ],
            "tree": {
                "id": "root",
                "name": "Root",
                "isFolder": true,
                "level": 0,
                "availableOperations": ["R", "U"],
                "operationState": {},
                "lazyLoad": false,
                "loaded": true,
                "collapsed": false,
                "children": [
                    {
                        "id": "a",
                        "name": "Folder A",
                        "isFolder": true,
                        "level": 99,
                        "availableOperations": ["R"],
                        "operationState": {"R": "allowed"},
                        "lazyLoad": true,
                        "loaded": true,
                        "collapsed": true,
                        "children": [
                            {
                                "id": "a1",
                                "name": "file.txt",
                                "isFolder": false,
                                "availableOperations": ["R"],
                                "operationState": {"R": "denied"}
                            }
                        ]
                    }
                ]
            }
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_levels_rebuilt_from_attachment() {
        let state = build_state(&sample_doc()).unwrap();
        // The stored level 99 on `a` is ignored.
        assert_eq!(state.node(&NodeId::from("a")).unwrap().level, 1);
        assert_eq!(state.node(&NodeId::from("a1")).unwrap().level, 2);
    }

    #[test]
    fn test_mixed_recomputed_not_trusted() {
        let state = build_state(&sample_doc()).unwrap();
        // a holds Allowed, its only relevant child holds Denied: not mixed
        // (children agree among themselves), and root aggregates from a.
        assert!(!state.node(&NodeId::from("a1")).unwrap().is_mixed(&OpCode::from("R")));
        assert!(!state.node(&NodeId::from("a")).unwrap().is_mixed(&OpCode::from("R")));
    }

    #[test]
    fn test_round_trip_preserves_shape_and_states() {
        let mut state = build_state(&sample_doc()).unwrap();
        set_operation(
            &mut state,
            &NodeId::from("a1"),
            &OpCode::from("R"),
            OperationState::Allowed,
        );
        let doc = to_document(&state);
        let json = serde_json::to_string(&doc).unwrap();
        let reloaded = build_state(&serde_json::from_str(&json).unwrap()).unwrap();

        for id in state.all_ids() {
            let before = state.node(&id).unwrap();
            let after = reloaded.node(&id).unwrap();
            assert_eq!(before.name, after.name);
            assert_eq!(before.level, after.level);
            assert_eq!(before.children, after.children);
            assert_eq!(before.available_operations, after.available_operations);
            assert_eq!(before.operation_state, after.operation_state);
        }
    }

    #[test]
    fn test_serialized_json_uses_camel_case() {
        let state = build_state(&sample_doc()).unwrap();
        let json = serde_json::to_string(&to_document(&state)).unwrap();
        assert!(json.contains("\"isFolder\""));
        assert!(json.contains("\"availableOperations\""));
        assert!(json.contains("\"lazyLoad\""));
        assert!(!json.contains("\"is_folder\""));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut doc = sample_doc();
        doc.tree.children.push(doc.tree.children[0].clone());
        let err = build_state(&doc).unwrap_err();
        assert!(matches!(err, TreeError::MalformedDocument { .. }));
    }

    #[test]
    fn test_operation_outside_catalog_rejected() {
        let mut doc = sample_doc();
        doc.tree.children[0]
            .available_operations
            .push(OpCode::from("X"));
        let err = build_state(&doc).unwrap_err();
        assert!(matches!(err, TreeError::MalformedDocument { .. }));
    }

    #[test]
    fn test_missing_required_field_is_a_json_error() {
        let err = serde_json::from_str::<NodeRecord>(r#"{"name": "no id"}"#).unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_unloaded_lazy_folder_round_trips() {
        let doc = sample_doc();
        let mut state = build_state(&doc).unwrap();
        // Flip `a` to not loaded and drop its children, then round-trip.
        state.remove_descendants(&NodeId::from("a"));
        if let Some(node) = state.node_mut(&NodeId::from("a")) {
            node.load_state = LoadState::NotLoaded;
        }
        let reloaded = build_state(&to_document(&state)).unwrap();
        let a = reloaded.node(&NodeId::from("a")).unwrap();
        assert_eq!(a.load_state, LoadState::NotLoaded);
        assert!(a.children.is_empty());
    }
}
