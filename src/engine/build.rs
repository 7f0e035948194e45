//! engine::build
//!
//! The Graph Builder: declarations in, fully bound repository graph out.
//!
//! # Architecture
//!
//! Construction runs in a fixed sequence and either completes or fails as
//! a whole:
//!
//! 1. Normalize declarations
//! 2. Resolve each declaration's configuration (`new`, `existing`, `nested`)
//! 3. Backfill persisted parents of readable, reopened outputs that the
//!    caller did not declare
//! 4. Establish (new) or verify (reopened) each output's parent list
//! 5. Adopt a default mapper for new outputs that name none
//! 6. Materialize every ancestor and link the DAG, sharing nodes for equal
//!    parent references
//! 7. Compute traversal orders and propagate tags
//! 8. Bind live repositories, ancestors before descendants
//!
//! # Implied Inputs
//!
//! When a reopened output persisted parent `P` at position `i` and `P` is
//! missing from the declared lineage, `P` is inserted as a read-only input
//! at position `i - k`, where `k` is the number of other readable outputs
//! (which precede the inputs in every lineage list), clamped to the input
//! list. Gaps are filled in persisted order, so several missing parents
//! keep their relative order. A persisted parent that is declared but in
//! the wrong position is never moved; verification rejects it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::ButlerError;
use super::repository::Repository;
use crate::core::declaration::{ButlerArgs, Declaration};
use crate::core::graph::{CfgOrigin, NodeId, RepoGraph};
use crate::core::repo_cfg::{ParentRef, RepositoryCfg};
use crate::core::types::{MapperName, RepoUri};
use crate::core::verify::verify_graph;
use crate::mapper::{MapperCatalog, MapperContext, Registry};
use crate::storage::{open_storage, Storage};

/// Collaborators the builder needs.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions<'a> {
    pub catalog: &'a MapperCatalog,
    /// Used when the inputs do not agree on a mapper.
    pub fallback_mapper: Option<&'a MapperName>,
}

/// Result of a successful build.
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: RepoGraph<Repository>,
    pub default_mapper: Option<MapperName>,
}

/// A declaration with its resolved configuration.
struct Pending {
    decl: Declaration,
    cfg: RepositoryCfg,
    origin: CfgOrigin,
    legacy: bool,
    storage: Arc<dyn Storage>,
}

impl Pending {
    fn parent_ref(&self) -> ParentRef {
        match self.origin {
            CfgOrigin::Nested => ParentRef::Nested(Box::new(self.cfg.clone())),
            CfgOrigin::New | CfgOrigin::Existing => ParentRef::Root(self.cfg.root.clone()),
        }
    }
}

/// Build and bind the repository graph for a set of declarations.
///
/// # Errors
///
/// - [`ButlerError::ConfigConflict`] for mixed conventions, mismatched
///   mapper settings on writable repositories, or a new output without a
///   mapper
/// - [`ButlerError::Lineage`] for missing repositories, lineage mismatches
///   and cycles
pub fn build_graph(args: ButlerArgs, opts: BuildOptions<'_>) -> Result<BuiltGraph, ButlerError> {
    let (input_decls, output_decls) = args.normalize()?;
    debug!(
        inputs = input_decls.len(),
        outputs = output_decls.len(),
        "building repository graph"
    );

    let mut outputs = output_decls
        .into_iter()
        .map(resolve_declaration)
        .collect::<Result<Vec<_>, _>>()?;
    let mut inputs = input_decls
        .into_iter()
        .map(resolve_declaration)
        .collect::<Result<Vec<_>, _>>()?;

    backfill_parents(&outputs, &mut inputs)?;
    establish_parents(&mut outputs, &inputs)?;

    let default_mapper = default_mapper(&inputs).or_else(|| opts.fallback_mapper.cloned());
    for output in outputs
        .iter_mut()
        .filter(|o| o.origin == CfgOrigin::New && o.cfg.mapper.is_none())
    {
        match &default_mapper {
            Some(mapper) => output.cfg.mapper = Some(mapper.clone()),
            None => {
                return Err(ButlerError::ConfigConflict(format!(
                    "no mapper given for new repository '{}' and the inputs share no default",
                    output.cfg.root
                )))
            }
        }
    }

    let mut assembly = Assembly::default();
    let output_nodes: Vec<(NodeId, Declaration)> = outputs
        .into_iter()
        .map(|p| {
            let decl = p.decl.clone();
            (assembly.add(p), decl)
        })
        .collect();
    let input_nodes: Vec<(NodeId, Declaration)> = inputs
        .into_iter()
        .map(|p| {
            let decl = p.decl.clone();
            (assembly.add(p), decl)
        })
        .collect();
    assembly.materialize_ancestors()?;

    let Assembly {
        mut graph,
        storages,
        ..
    } = assembly;

    if let Some(id) = graph.find_cycle() {
        let root = graph.node(id).map(|n| n.cfg.root.to_string()).unwrap_or_default();
        return Err(ButlerError::Lineage(format!(
            "repository lineage through '{}' forms a cycle",
            root
        )));
    }

    let readable_roots: Vec<NodeId> = output_nodes
        .iter()
        .filter(|(_, d)| d.mode.readable())
        .chain(&input_nodes)
        .map(|(id, _)| *id)
        .collect();
    let output_ids: Vec<NodeId> = output_nodes.iter().map(|(id, _)| *id).collect();
    graph.compute_orders(&readable_roots, &output_ids)?;

    for (id, decl) in output_nodes.iter().chain(&input_nodes) {
        graph.propagate_tags(*id, &decl.tags);
    }

    bind_repositories(&mut graph, &storages, opts.catalog, default_mapper.as_ref())?;
    verify_graph(&graph).into_result()?;

    debug!(nodes = graph.len(), "repository graph ready");
    Ok(BuiltGraph {
        graph,
        default_mapper,
    })
}

/// Look up or synthesize the configuration for one declaration.
fn resolve_declaration(decl: Declaration) -> Result<Pending, ButlerError> {
    let storage = open_storage(&decl.root)?;
    let Some(stored) = storage.get_cfg()? else {
        if !decl.mode.writable() {
            return Err(ButlerError::Lineage(format!(
                "no repository found at '{}'",
                decl.root
            )));
        }
        debug!(root = %decl.root, "creating repository");
        let cfg = RepositoryCfg::new(
            decl.root.clone(),
            decl.mapper.clone(),
            decl.mapper_args.clone().unwrap_or_default(),
        );
        return Ok(Pending {
            decl,
            cfg,
            origin: CfgOrigin::New,
            legacy: false,
            storage,
        });
    };

    if stored.legacy {
        warn!(root = %decl.root, "repository has no configuration record; using legacy markers");
    }
    let mut cfg = stored.cfg;
    if cfg.root != decl.root {
        debug!(recorded = %cfg.root, declared = %decl.root, "repository was moved");
        cfg.root = decl.root.clone();
    }

    let requested_mapper = decl.mapper.as_ref();
    let requested_args = decl.mapper_args.as_ref();
    let (cfg, origin) = if cfg.matches_args(requested_mapper, requested_args) {
        (cfg, CfgOrigin::Existing)
    } else if decl.mode.writable() {
        return Err(ButlerError::ConfigConflict(format!(
            "repository '{}' exists with mapper {} and different mapper arguments than requested",
            decl.root,
            cfg.mapper
                .as_ref()
                .map_or_else(|| "<none>".to_string(), |m| format!("'{}'", m)),
        )));
    } else {
        debug!(root = %decl.root, "opening read-only repository with a session override");
        (
            cfg.with_override(requested_mapper, requested_args),
            CfgOrigin::Nested,
        )
    };

    Ok(Pending {
        decl,
        cfg,
        origin,
        legacy: stored.legacy,
        storage,
    })
}

/// A read-only input standing in for an undeclared persisted parent.
fn implied_input(parent: &ParentRef) -> Result<Pending, ButlerError> {
    match parent {
        ParentRef::Root(uri) => resolve_declaration(Declaration::implied_input(uri.clone())),
        ParentRef::Nested(cfg) => Ok(Pending {
            decl: Declaration::implied_input(cfg.root.clone()),
            cfg: (**cfg).clone(),
            origin: CfgOrigin::Nested,
            legacy: false,
            storage: open_storage(&cfg.root)?,
        }),
    }
}

/// The lineage an output gets from this session's declarations: the other
/// readable outputs, then the inputs.
fn effective_parents(outputs: &[Pending], index: usize, inputs: &[Pending]) -> Vec<ParentRef> {
    let own = outputs[index].parent_ref();
    outputs
        .iter()
        .enumerate()
        .filter(|(i, o)| *i != index && o.decl.mode.readable())
        .map(|(_, o)| o)
        .chain(inputs)
        .map(Pending::parent_ref)
        .filter(|p| p != &own)
        .collect()
}

fn backfill_parents(outputs: &[Pending], inputs: &mut Vec<Pending>) -> Result<(), ButlerError> {
    for (index, output) in outputs.iter().enumerate() {
        if output.origin == CfgOrigin::New || !output.decl.mode.readable() {
            continue;
        }
        let readable_others = outputs
            .iter()
            .enumerate()
            .filter(|(i, o)| *i != index && o.decl.mode.readable())
            .count();

        let persisted = &output.cfg.parents;
        let mut pos = 0;
        while pos < persisted.len() {
            let effective = effective_parents(outputs, index, inputs);
            if effective.get(pos) == Some(&persisted[pos]) {
                pos += 1;
                continue;
            }
            if effective.contains(&persisted[pos]) {
                break;
            }
            let at = pos.saturating_sub(readable_others).min(inputs.len());
            debug!(
                output = %output.cfg.root,
                parent = %persisted[pos],
                index = at,
                "adding persisted parent as implied input"
            );
            inputs.insert(at, implied_input(&persisted[pos])?);
        }
    }
    Ok(())
}

fn establish_parents(outputs: &mut [Pending], inputs: &[Pending]) -> Result<(), ButlerError> {
    for index in 0..outputs.len() {
        let effective = effective_parents(outputs, index, inputs);
        let output = &mut outputs[index];
        match output.origin {
            CfgOrigin::New => output.cfg.parents = effective,
            CfgOrigin::Existing | CfgOrigin::Nested => {
                if output.cfg.parents != effective {
                    return Err(ButlerError::Lineage(format!(
                        "inputs [{}] do not match the persisted parents [{}] of '{}'",
                        join_refs(&effective),
                        join_refs(&output.cfg.parents),
                        output.cfg.root
                    )));
                }
            }
        }
    }
    Ok(())
}

fn join_refs(refs: &[ParentRef]) -> String {
    refs.iter()
        .map(ParentRef::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The mapper every input agrees on, if any.
fn default_mapper(inputs: &[Pending]) -> Option<MapperName> {
    let mappers: BTreeSet<Option<&MapperName>> =
        inputs.iter().map(|p| p.cfg.mapper.as_ref()).collect();
    match mappers.into_iter().collect::<Vec<_>>().as_slice() {
        [Some(mapper)] => Some((*mapper).clone()),
        _ => None,
    }
}

/// Node allocation with sharing by parent-reference identity.
#[derive(Default)]
struct Assembly {
    graph: RepoGraph<Repository>,
    storages: Vec<Arc<dyn Storage>>,
    ids: Vec<NodeId>,
    by_key: HashMap<String, NodeId>,
}

impl Assembly {
    fn add(&mut self, pending: Pending) -> NodeId {
        let key = pending.parent_ref().identity_key();
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let cfg_root = match pending.origin {
            CfgOrigin::Nested => None,
            CfgOrigin::New | CfgOrigin::Existing => Some(pending.decl.root.clone()),
        };
        let id = self
            .graph
            .add_node(pending.cfg, pending.origin, cfg_root, pending.legacy);
        self.storages.push(pending.storage);
        self.ids.push(id);
        self.by_key.insert(key, id);
        id
    }

    fn resolve_parent(&mut self, parent: &ParentRef, child: &RepoUri) -> Result<NodeId, ButlerError> {
        if let Some(&id) = self.by_key.get(&parent.identity_key()) {
            return Ok(id);
        }

        let pending = match parent {
            ParentRef::Root(uri) => {
                let storage = open_storage(uri)?;
                let stored = storage.get_cfg()?.ok_or_else(|| {
                    ButlerError::Lineage(format!(
                        "parent '{}' of '{}' cannot be located",
                        uri, child
                    ))
                })?;
                if stored.legacy {
                    warn!(root = %uri, "parent repository has no configuration record; using legacy markers");
                }
                let mut cfg = stored.cfg;
                cfg.root = uri.clone();
                Pending {
                    decl: Declaration::implied_input(uri.clone()),
                    cfg,
                    origin: CfgOrigin::Existing,
                    legacy: stored.legacy,
                    storage,
                }
            }
            ParentRef::Nested(_) => implied_input(parent)?,
        };
        Ok(self.add(pending))
    }

    /// Walk every node's parent list, allocating ancestors as needed.
    fn materialize_ancestors(&mut self) -> Result<(), ButlerError> {
        let mut next = 0;
        while next < self.ids.len() {
            let id = self.ids[next];
            let (parents, root) = match self.graph.node(id) {
                Some(node) => (node.cfg.parents.clone(), node.cfg.root.clone()),
                None => return Err(ButlerError::Invariant(format!("node {} vanished", id))),
            };
            for parent in &parents {
                let parent_id = self.resolve_parent(parent, &root)?;
                self.graph.link(id, parent_id);
            }
            next += 1;
        }
        Ok(())
    }
}

/// Ancestors before descendants, starting from the traversal orders.
fn binding_order(graph: &RepoGraph<Repository>) -> Result<Vec<NodeId>, ButlerError> {
    fn visit(
        graph: &RepoGraph<Repository>,
        id: NodeId,
        seen: &mut BTreeSet<NodeId>,
        out: &mut Vec<NodeId>,
    ) {
        if !seen.insert(id) {
            return;
        }
        for &parent in graph.parents(id) {
            visit(graph, parent, seen, out);
        }
        out.push(id);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for &id in graph.input_order()?.iter().chain(graph.output_order()?) {
        visit(graph, id, &mut seen, &mut out);
    }
    Ok(out)
}

fn mapper_of(
    graph: &RepoGraph<Repository>,
    id: NodeId,
    default: Option<&MapperName>,
) -> Option<MapperName> {
    graph
        .node(id)
        .and_then(|n| n.cfg.mapper.as_ref().or(default))
        .cloned()
}

/// Registry of the first same-mapper ancestor that has one.
fn parent_registry(
    graph: &RepoGraph<Repository>,
    id: NodeId,
    mapper: &MapperName,
    default: Option<&MapperName>,
) -> Result<Option<Arc<dyn Registry>>, ButlerError> {
    for ancestor in graph.ancestors(id) {
        if mapper_of(graph, ancestor, default).as_ref() != Some(mapper) {
            continue;
        }
        let node = graph
            .node(ancestor)
            .ok_or_else(|| ButlerError::Invariant(format!("unknown ancestor {}", ancestor)))?;
        match node.handle() {
            Some(repo) => {
                if let Some(registry) = repo.mapper().registry() {
                    return Ok(Some(registry));
                }
            }
            None => {
                return Err(ButlerError::Invariant(format!(
                    "parent '{}' shares mapper '{}' but is not bound yet",
                    node.cfg.root, mapper
                )))
            }
        }
    }
    Ok(None)
}

fn bind_repositories(
    graph: &mut RepoGraph<Repository>,
    storages: &[Arc<dyn Storage>],
    catalog: &MapperCatalog,
    default: Option<&MapperName>,
) -> Result<(), ButlerError> {
    for id in binding_order(graph)? {
        let mapper_name = mapper_of(graph, id, default).ok_or_else(|| {
            let root = graph.node(id).map(|n| n.cfg.root.to_string()).unwrap_or_default();
            ButlerError::ConfigConflict(format!(
                "repository '{}' names no mapper and there is no default",
                root
            ))
        })?;
        let registry = parent_registry(graph, id, &mapper_name, default)?;
        let storage = storages
            .get(id.index())
            .cloned()
            .ok_or_else(|| ButlerError::Invariant(format!("no storage for node {}", id)))?;
        let node = graph
            .node(id)
            .ok_or_else(|| ButlerError::Invariant(format!("unknown node {}", id)))?;

        let mapper = catalog.create(&MapperContext {
            name: &mapper_name,
            args: &node.cfg.mapper_args,
            storage: Arc::clone(&storage),
            parent_registry: registry,
        })?;
        if node.is_new() {
            storage.put_cfg(&node.cfg)?;
            debug!(root = %node.cfg.root, "persisted new repository cfg");
        }
        debug!(root = %node.cfg.root, mapper = %mapper_name, origin = %node.origin, "bound repository");
        graph.bind(id, Repository::new(id, mapper, storage))?;
    }
    Ok(())
}
