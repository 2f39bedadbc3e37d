//! Engine internals: the node arena and the state/load/search algorithms

pub(crate) mod load;
pub(crate) mod search;
pub(crate) mod state;

use std::collections::HashMap;
use std::collections::HashSet;

use crate::error::Result;
use crate::error::TreeError;
use crate::loader::NodeSpec;
use crate::model::Node;
use crate::model::NodeId;
use crate::model::OperationCatalog;

/// The node arena plus the catalog: everything behind the tree's mutex.
///
/// Nodes are keyed by id; `parent`/`children` are id references, so the
/// arena owns every node exactly once and upward traversal needs no
/// reference counting. `generation` increments whenever the tree is
/// replaced wholesale, letting in-flight load completions detect that
/// their target no longer exists.
#[derive(Debug)]
pub(crate) struct TreeState {
    pub nodes: HashMap<NodeId, Node>,
    pub root: NodeId,
    pub catalog: OperationCatalog,
    pub generation: u64,
    pub search_active: bool,
    next_epoch: u64,
}

impl TreeState {
    /// Creates a tree with the given catalog and a default root folder
    /// (`id = "root"`, all catalog codes available, eagerly loaded).
    pub fn new(catalog: OperationCatalog) -> Self {
        let root_id = NodeId::from("root");
        let mut root = Node::new(root_id.clone(), "Root", true, false);
        root.available_operations = catalog.codes().cloned().collect();
        root.collapsed = false;

        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            nodes,
            root: root_id,
            catalog,
            generation: 0,
            search_active: false,
            next_epoch: 0,
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Allocates a fresh load epoch.
    pub fn alloc_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Pre-order (parent before children) ids of the subtree rooted at
    /// `start`, including `start` itself.
    pub fn preorder_ids(&self, start: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start.clone()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                for child in node.children.iter().rev() {
                    stack.push(child.clone());
                }
                out.push(id);
            }
        }
        out
    }

    /// Pre-order ids of the whole tree.
    pub fn all_ids(&self) -> Vec<NodeId> {
        self.preorder_ids(&self.root.clone())
    }

    /// Attaches a detached node under `parent`, deriving its level.
    ///
    /// # Errors
    ///
    /// [`TreeError::UnknownNode`] if the parent does not exist,
    /// [`TreeError::NotAFolder`] if the parent cannot hold children,
    /// [`TreeError::DuplicateAttachment`] if the child already has a
    /// parent, [`TreeError::DuplicateId`] if the id is taken.
    pub fn attach(&mut self, parent_id: &NodeId, mut child: Node) -> Result<()> {
        if child.parent.is_some() {
            return Err(TreeError::DuplicateAttachment { id: child.id });
        }
        if self.nodes.contains_key(&child.id) {
            return Err(TreeError::DuplicateId { id: child.id });
        }
        let parent = self
            .nodes
            .get(parent_id)
            .ok_or_else(|| TreeError::UnknownNode {
                id: parent_id.clone(),
            })?;
        if !parent.is_folder {
            return Err(TreeError::NotAFolder {
                id: parent_id.clone(),
            });
        }

        child.level = parent.level + 1;
        child.parent = Some(parent_id.clone());
        let child_id = child.id.clone();
        self.nodes.insert(child_id.clone(), child);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(child_id);
        }
        Ok(())
    }

    /// Removes every descendant of `id` from the arena and clears its
    /// child list. The node itself is kept.
    pub fn remove_descendants(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        let mut stack = children;
        while let Some(child_id) = stack.pop() {
            if let Some(child) = self.nodes.remove(&child_id) {
                stack.extend(child.children);
            }
        }
    }

    /// Validates a batch of construction records against the arena and the
    /// catalog: unique ids, codes within the catalog, children only under
    /// folders. All-or-nothing: nothing is inserted before every record in
    /// the batch validates.
    pub fn validate_specs(&self, specs: &[NodeSpec]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&NodeSpec> = specs.iter().collect();
        while let Some(spec) = stack.pop() {
            if self.nodes.contains_key(&spec.id) || !seen.insert(spec.id.clone()) {
                return Err(TreeError::DuplicateId {
                    id: spec.id.clone(),
                });
            }
            if !spec.folder && !spec.children.is_empty() {
                return Err(TreeError::malformed(format!(
                    "non-folder node `{}` has children",
                    spec.id
                )));
            }
            for code in &spec.available_operations {
                if !self.catalog.contains(code) {
                    return Err(TreeError::malformed(format!(
                        "node `{}` references operation `{code}` outside the catalog",
                        spec.id
                    )));
                }
            }
            stack.extend(spec.children.iter());
        }
        Ok(())
    }

    /// Builds and attaches the subtree described by `spec` under `parent`.
    /// Callers must have run [`validate_specs`](Self::validate_specs) first.
    pub fn insert_spec(&mut self, parent_id: &NodeId, spec: NodeSpec) -> Result<()> {
        let mut node = Node::new(spec.id.clone(), spec.name, spec.folder, spec.lazy);
        node.available_operations = spec.available_operations;
        // Initial states outside the available set are dropped silently.
        node.operation_state = spec
            .initial_states
            .into_iter()
            .filter(|(code, _)| node.available_operations.contains(code))
            .collect();

        let node_id = node.id.clone();
        self.attach(parent_id, node)?;
        for child in spec.children {
            self.insert_spec(&node_id, child)?;
        }
        Ok(())
    }
}
