//! core::graph
//!
//! Repository graph representation and operations.
//!
//! # Architecture
//!
//! The repository graph is a DAG stored as an arena:
//! - Nodes are repositories participating in one coordinator session
//! - Edges point from child to parent and are stored as [`NodeId`]s
//! - Siblings may share a parent node; identity is the `NodeId`, never the
//!   contents of a configuration record
//!
//! The graph is generic over the live handle `H` bound to each node once
//! construction is complete, so this module stays free of I/O.
//!
//! # Invariants
//!
//! - Graph must be acyclic
//! - The input and output traversal orders are computed exactly once
//! - The input order lists every reachable node exactly once
//!
//! # Example
//!
//! ```
//! use strata::core::graph::{CfgOrigin, RepoGraph};
//! use strata::core::repo_cfg::RepositoryCfg;
//! use strata::core::types::RepoUri;
//!
//! let cfg = |r: &str| RepositoryCfg::new(RepoUri::new(r).unwrap(), None, Default::default());
//!
//! let mut graph: RepoGraph<()> = RepoGraph::new();
//! let base = graph.add_node(cfg("/base"), CfgOrigin::Existing, None, false);
//! let a = graph.add_node(cfg("/a"), CfgOrigin::Existing, None, false);
//! let b = graph.add_node(cfg("/b"), CfgOrigin::Existing, None, false);
//! graph.link(a, base);
//! graph.link(b, base);
//!
//! graph.compute_orders(&[a, b], &[]).unwrap();
//! assert_eq!(graph.input_order().unwrap(), &[a, base, b]);
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use thiserror::Error;

use super::repo_cfg::{ParentRef, RepositoryCfg};
use super::types::{RepoUri, Tag};

/// Errors from graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("lookup lists are already built")]
    OrdersAlreadyBuilt,

    #[error("lookup lists are not yet built")]
    OrdersNotBuilt,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// Stable identifier of a node inside one [`RepoGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a node's configuration record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgOrigin {
    /// Synthesized from a writable declaration; persisted when bound.
    New,
    /// Loaded from the repository root and used as-is.
    Existing,
    /// Loaded, then overridden by a read-only declaration for this session.
    Nested,
}

impl fmt::Display for CfgOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfgOrigin::New => write!(f, "new"),
            CfgOrigin::Existing => write!(f, "existing"),
            CfgOrigin::Nested => write!(f, "nested"),
        }
    }
}

/// One repository in the session.
#[derive(Debug)]
pub struct RepoNode<H> {
    id: NodeId,
    /// Configuration record in effect for this session.
    pub cfg: RepositoryCfg,
    /// How `cfg` was obtained.
    pub origin: CfgOrigin,
    /// Root the record was loaded from. `None` for nested records, which
    /// are not persisted anywhere.
    pub cfg_root: Option<RepoUri>,
    /// True for repositories described by legacy markers.
    pub legacy: bool,
    parents: Vec<NodeId>,
    tags: BTreeSet<Tag>,
    handle: Option<H>,
}

impl<H> RepoNode<H> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Direct parents in lineage order.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Visibility tags reaching this node.
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// The live handle, once bound.
    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_new(&self) -> bool {
        self.origin == CfgOrigin::New
    }

    /// How other records refer to this node in their parent lists: the
    /// embedded record for nested nodes, the root otherwise.
    pub fn parent_ref(&self) -> ParentRef {
        match self.origin {
            CfgOrigin::Nested => ParentRef::Nested(Box::new(self.cfg.clone())),
            CfgOrigin::New | CfgOrigin::Existing => ParentRef::Root(self.cfg.root.clone()),
        }
    }
}

/// The Repository Node Container.
#[derive(Debug)]
pub struct RepoGraph<H> {
    nodes: Vec<RepoNode<H>>,
    input_order: Option<Vec<NodeId>>,
    output_order: Option<Vec<NodeId>>,
}

impl<H> Default for RepoGraph<H> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            input_order: None,
            output_order: None,
        }
    }
}

impl<H> RepoGraph<H> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node.
    pub fn add_node(
        &mut self,
        cfg: RepositoryCfg,
        origin: CfgOrigin,
        cfg_root: Option<RepoUri>,
        legacy: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(RepoNode {
            id,
            cfg,
            origin,
            cfg_root,
            legacy,
            parents: Vec::new(),
            tags: BTreeSet::new(),
            handle: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&RepoNode<H>> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut RepoNode<H>> {
        self.nodes.get_mut(id.0)
    }

    /// Every node, in allocation order.
    pub fn nodes(&self) -> impl Iterator<Item = &RepoNode<H>> {
        self.nodes.iter()
    }

    /// Add a parent link. Linking the same pair twice is a no-op.
    pub fn link(&mut self, child: NodeId, parent: NodeId) {
        if let Some(node) = self.nodes.get_mut(child.0) {
            if !node.parents.contains(&parent) {
                node.parents.push(parent);
            }
        }
    }

    /// Direct parents of a node.
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    }

    /// All ancestors in depth-first (pre-order) lineage order, each once.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        self.collect_ancestors(id, &mut result, &mut seen);
        result
    }

    fn collect_ancestors(&self, id: NodeId, out: &mut Vec<NodeId>, seen: &mut HashSet<NodeId>) {
        for &parent in self.parents(id) {
            if seen.insert(parent) {
                out.push(parent);
                self.collect_ancestors(parent, out, seen);
            }
        }
    }

    /// Check if the graph contains cycles.
    ///
    /// Returns `Some(node)` if a cycle is reachable from that node.
    pub fn find_cycle(&self) -> Option<NodeId> {
        let mut visited = HashSet::new();
        let mut path = HashSet::new();

        for node in &self.nodes {
            if self.has_cycle_from(node.id, &mut visited, &mut path) {
                return Some(node.id);
            }
        }
        None
    }

    fn has_cycle_from(
        &self,
        id: NodeId,
        visited: &mut HashSet<NodeId>,
        path: &mut HashSet<NodeId>,
    ) -> bool {
        if path.contains(&id) {
            return true;
        }
        if visited.contains(&id) {
            return false;
        }

        visited.insert(id);
        path.insert(id);

        for &parent in self.parents(id) {
            if self.has_cycle_from(parent, visited, path) {
                return true;
            }
        }

        path.remove(&id);
        false
    }

    /// Push tags onto a node and every transitive parent.
    pub fn propagate_tags(&mut self, id: NodeId, tags: &BTreeSet<Tag>) {
        if tags.is_empty() {
            return;
        }
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(current.0) {
                node.tags.extend(tags.iter().cloned());
                stack.extend(node.parents.iter().rev().copied());
            }
        }
    }

    /// Compute the traversal orders.
    ///
    /// `readable_roots` are the readable outputs followed by the inputs, in
    /// declaration order. The input order is a depth-first walk from each of
    /// them, parents after children, skipping nodes already listed. The
    /// output order is `outputs` verbatim.
    ///
    /// # Errors
    ///
    /// [`GraphError::OrdersAlreadyBuilt`] on a second call.
    pub fn compute_orders(
        &mut self,
        readable_roots: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<(), GraphError> {
        if self.input_order.is_some() || self.output_order.is_some() {
            return Err(GraphError::OrdersAlreadyBuilt);
        }
        for &id in readable_roots.iter().chain(outputs) {
            if self.node(id).is_none() {
                return Err(GraphError::UnknownNode(id));
            }
        }

        let mut order = Vec::new();
        let mut added = HashSet::new();
        for &root in readable_roots {
            self.add_to_order(root, &mut order, &mut added);
        }

        self.input_order = Some(order);
        self.output_order = Some(outputs.to_vec());
        Ok(())
    }

    fn add_to_order(&self, id: NodeId, order: &mut Vec<NodeId>, added: &mut HashSet<NodeId>) {
        if !added.insert(id) {
            return;
        }
        order.push(id);
        for &parent in self.parents(id) {
            self.add_to_order(parent, order, added);
        }
    }

    /// Read search order.
    pub fn input_order(&self) -> Result<&[NodeId], GraphError> {
        self.input_order
            .as_deref()
            .ok_or(GraphError::OrdersNotBuilt)
    }

    /// Write order.
    pub fn output_order(&self) -> Result<&[NodeId], GraphError> {
        self.output_order
            .as_deref()
            .ok_or(GraphError::OrdersNotBuilt)
    }

    /// Attach the live handle to a node.
    pub fn bind(&mut self, id: NodeId, handle: H) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))?;
        node.handle = Some(handle);
        Ok(())
    }

    /// The live handle of a node, if bound.
    pub fn handle(&self, id: NodeId) -> Option<&H> {
        self.node(id).and_then(RepoNode::handle)
    }
}
