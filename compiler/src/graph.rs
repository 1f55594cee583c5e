// graph.rs — SSA dataflow graph store
//
// Owns every node of a kernel-bound program: arguments (named values) and
// instructions (operator invocations). Nodes live in an arena indexed by
// `NodeId`; adjacency is stored on both endpoints as id lists, so an edge
// from A to B appears in A.outlinks and in B.inlinks.
//
// Preconditions: none.
// Postconditions: `check_valid` succeeds iff edges alternate between
//   arguments and instructions, are mirrored on both endpoints, each
//   argument has at most one producer, the graph is acyclic, and every
//   descriptor reference resolves to a linked, typed argument.
// Failure modes: `GraphError` from mutations and from `check_valid`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::catalog::{Kernel, Operator, IO_COPY_OP};
use crate::id::{IdAllocator, NodeId};
use crate::op_desc::OpDesc;
use crate::types::Type;

// ── Node model ──────────────────────────────────────────────────────────────

/// A named value. `ty` is `None` until type inference has run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Argument {
    pub name: String,
    pub ty: Option<Type>,
}

/// An operator invocation with its candidate kernels. The kernel at the
/// front of `valid_kernels` is the picked one.
#[derive(Debug, Clone, Serialize)]
pub struct Instruction {
    pub op: Operator,
    pub valid_kernels: Vec<Kernel>,
    /// Set on io_copy instructions spliced in by the io-complement pass.
    pub inserted: bool,
}

impl Instruction {
    pub fn new(op: Operator, valid_kernels: Vec<Kernel>) -> Self {
        Instruction {
            op,
            valid_kernels,
            inserted: false,
        }
    }

    /// An instruction created by a graph rewrite rather than by the source.
    pub fn inserted(op: Operator, valid_kernels: Vec<Kernel>) -> Self {
        Instruction {
            op,
            valid_kernels,
            inserted: true,
        }
    }

    pub fn op_type(&self) -> &str {
        self.op.op_type()
    }

    pub fn desc(&self) -> &OpDesc {
        self.op.desc()
    }

    pub fn picked_kernel(&self) -> Option<&Kernel> {
        self.valid_kernels.first()
    }

    pub fn is_io_copy(&self) -> bool {
        self.op_type() == IO_COPY_OP
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Argument(Argument),
    Instruction(Instruction),
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub inlinks: Vec<NodeId>,
    pub outlinks: Vec<NodeId>,
}

impl Node {
    pub fn as_argument(&self) -> Option<&Argument> {
        match &self.kind {
            NodeKind::Argument(arg) => Some(arg),
            NodeKind::Instruction(_) => None,
        }
    }

    pub fn as_argument_mut(&mut self) -> Option<&mut Argument> {
        match &mut self.kind {
            NodeKind::Argument(arg) => Some(arg),
            NodeKind::Instruction(_) => None,
        }
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            NodeKind::Instruction(inst) => Some(inst),
            NodeKind::Argument(_) => None,
        }
    }

    pub fn as_instruction_mut(&mut self) -> Option<&mut Instruction> {
        match &mut self.kind {
            NodeKind::Instruction(inst) => Some(inst),
            NodeKind::Argument(_) => None,
        }
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, NodeKind::Argument(_))
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.kind, NodeKind::Instruction(_))
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("argument '{0}' already exists")]
    DuplicateArgument(String),
    #[error("no node {0}")]
    UnknownNode(NodeId),
    #[error("no argument named '{0}'")]
    UnknownArgument(String),
    #[error("no link {from} -> {to}")]
    MissingLink { from: NodeId, to: NodeId },
    #[error("link {from} -> {to} does not alternate between arguments and instructions")]
    InvalidLink { from: NodeId, to: NodeId },
    #[error("link {from} -> {to} is not mirrored on both endpoints")]
    AsymmetricLink { from: NodeId, to: NodeId },
    #[error("argument '{argument}' has {count} producers")]
    MultipleProducers { argument: String, count: usize },
    #[error("cycle through {}", format_path(.0))]
    Cycle(Vec<NodeId>),
    #[error("argument index entry '{0}' does not point at a matching argument node")]
    StaleIndex(String),
    #[error("instruction {node} names argument '{argument}' which does not exist")]
    UnboundArgument { node: NodeId, argument: String },
    #[error("instruction {node} names argument '{argument}' but is not linked to it")]
    UnlinkedArgument { node: NodeId, argument: String },
    #[error("instruction {node} is linked to argument '{argument}' which its descriptor does not name")]
    UndeclaredLink { node: NodeId, argument: String },
    #[error("input '{argument}' of instruction {node} has no inferred type")]
    UntypedInput { node: NodeId, argument: String },
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

// ── Graph store ─────────────────────────────────────────────────────────────

/// The dataflow graph. Node ids are arena indices and are never reused.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SsaGraph {
    nodes: Vec<Node>,
    #[serde(skip)]
    arguments: HashMap<String, NodeId>,
    #[serde(skip)]
    ids: IdAllocator,
}

impl SsaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.ids.alloc_node();
        debug_assert_eq!(id.index(), self.nodes.len());
        self.nodes.push(Node {
            id,
            kind,
            inlinks: Vec::new(),
            outlinks: Vec::new(),
        });
        id
    }

    /// Create an argument node. Names are unique within the graph.
    pub fn new_argument_node(
        &mut self,
        name: impl Into<String>,
        ty: Option<Type>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        if self.arguments.contains_key(&name) {
            return Err(GraphError::DuplicateArgument(name));
        }
        let id = self.push_node(NodeKind::Argument(Argument {
            name: name.clone(),
            ty,
        }));
        self.arguments.insert(name, id);
        Ok(id)
    }

    pub fn new_instruction_node(&mut self, inst: Instruction) -> NodeId {
        self.push_node(NodeKind::Instruction(inst))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Look up an argument node by name.
    pub fn argument(&self, name: &str) -> Option<NodeId> {
        self.arguments.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn arguments(&self) -> impl Iterator<Item = (NodeId, &Argument)> {
        self.nodes
            .iter()
            .filter_map(|n| n.as_argument().map(|a| (n.id, a)))
    }

    pub fn instructions(&self) -> impl Iterator<Item = (NodeId, &Instruction)> {
        self.nodes
            .iter()
            .filter_map(|n| n.as_instruction().map(|i| (n.id, i)))
    }

    /// Snapshot of current instruction ids, in creation order.
    pub fn instruction_ids(&self) -> Vec<NodeId> {
        self.instructions().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.nodes.len() - self.arguments.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.outlinks.len()).sum()
    }

    pub fn has_link(&self, from: NodeId, to: NodeId) -> bool {
        self.node(from).is_some_and(|n| n.outlinks.contains(&to))
    }

    /// The instruction that writes argument `arg`, if any.
    pub fn producer(&self, arg: NodeId) -> Option<NodeId> {
        self.node(arg).and_then(|n| n.inlinks.first().copied())
    }

    /// Add the edge `from -> to`. Adding an existing edge is a no-op.
    pub fn directed_link(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let from_node = self.node(from).ok_or(GraphError::UnknownNode(from))?;
        let to_node = self.node(to).ok_or(GraphError::UnknownNode(to))?;
        if from_node.is_argument() == to_node.is_argument() {
            return Err(GraphError::InvalidLink { from, to });
        }
        if from_node.outlinks.contains(&to) {
            return Ok(());
        }
        self.nodes[from.index()].outlinks.push(to);
        self.nodes[to.index()].inlinks.push(from);
        Ok(())
    }

    /// Remove the edge `from -> to` from both endpoints.
    pub fn remove_directed_link(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if self.node(to).is_none() || !self.has_link(from, to) {
            return Err(GraphError::MissingLink { from, to });
        }
        self.nodes[from.index()].outlinks.retain(|&n| n != to);
        self.nodes[to.index()].inlinks.retain(|&n| n != from);
        Ok(())
    }

    /// A name of the form `<base>/trans/<n>` not used by any argument. The
    /// counter never goes backwards, so names stay fresh for the whole
    /// compilation.
    pub fn fresh_argument_name(&mut self, base: &str) -> String {
        loop {
            let name = format!("{}/trans/{}", base, self.ids.alloc_trans());
            if !self.arguments.contains_key(&name) {
                return name;
            }
        }
    }

    /// Check the structural invariant of the graph.
    pub fn check_valid(&self) -> Result<(), GraphError> {
        self.check_links()?;
        self.check_index()?;
        self.check_producers()?;
        self.check_descriptors()?;
        if let Some(cycle) = find_cycle(self) {
            return Err(GraphError::Cycle(cycle));
        }
        Ok(())
    }

    fn check_links(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for &to in &node.outlinks {
                let target = self.node(to).ok_or(GraphError::UnknownNode(to))?;
                if target.is_argument() == node.is_argument() {
                    return Err(GraphError::InvalidLink { from: node.id, to });
                }
                if !target.inlinks.contains(&node.id) {
                    return Err(GraphError::AsymmetricLink { from: node.id, to });
                }
            }
            for &from in &node.inlinks {
                let source = self.node(from).ok_or(GraphError::UnknownNode(from))?;
                if !source.outlinks.contains(&node.id) {
                    return Err(GraphError::AsymmetricLink { from, to: node.id });
                }
            }
        }
        Ok(())
    }

    fn check_index(&self) -> Result<(), GraphError> {
        for (name, &id) in &self.arguments {
            let matches = self
                .node(id)
                .and_then(Node::as_argument)
                .is_some_and(|a| &a.name == name);
            if !matches {
                return Err(GraphError::StaleIndex(name.clone()));
            }
        }
        Ok(())
    }

    fn check_producers(&self) -> Result<(), GraphError> {
        for (id, arg) in self.arguments() {
            let count = self.nodes[id.index()].inlinks.len();
            if count > 1 {
                return Err(GraphError::MultipleProducers {
                    argument: arg.name.clone(),
                    count,
                });
            }
        }
        Ok(())
    }

    fn check_descriptors(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            let Some(inst) = node.as_instruction() else {
                continue;
            };
            let desc = inst.desc();
            for name in desc.input_arguments() {
                let arg_id = self.resolve_named(node.id, name, &node.inlinks)?;
                if self.nodes[arg_id.index()]
                    .as_argument()
                    .is_some_and(|a| a.ty.is_none())
                {
                    return Err(GraphError::UntypedInput {
                        node: node.id,
                        argument: name.to_string(),
                    });
                }
            }
            for name in desc.output_arguments() {
                self.resolve_named(node.id, name, &node.outlinks)?;
            }
            for &linked in &node.inlinks {
                let name = self.argument_name(linked);
                if !desc.input_arguments().any(|n| n == name) {
                    return Err(GraphError::UndeclaredLink {
                        node: node.id,
                        argument: name.to_string(),
                    });
                }
            }
            for &linked in &node.outlinks {
                let name = self.argument_name(linked);
                if !desc.output_arguments().any(|n| n == name) {
                    return Err(GraphError::UndeclaredLink {
                        node: node.id,
                        argument: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_named(&self, node: NodeId, name: &str, links: &[NodeId]) -> Result<NodeId, GraphError> {
        let arg_id = self.argument(name).ok_or_else(|| GraphError::UnboundArgument {
            node,
            argument: name.to_string(),
        })?;
        if !links.contains(&arg_id) {
            return Err(GraphError::UnlinkedArgument {
                node,
                argument: name.to_string(),
            });
        }
        Ok(arg_id)
    }

    fn argument_name(&self, id: NodeId) -> &str {
        self.node(id)
            .and_then(Node::as_argument)
            .map_or("", |a| a.name.as_str())
    }

    /// Serialize the graph as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ── Cycle detection ─────────────────────────────────────────────────────────

/// Return one cycle of the graph, if any, using DFS.
fn find_cycle(graph: &SsaGraph) -> Option<Vec<NodeId>> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut state = vec![0u8; graph.nodes.len()];
    let mut path = Vec::new();
    for node in &graph.nodes {
        if state[node.id.index()] == 0 {
            if let Some(cycle) = dfs_cycle(graph, node.id, &mut state, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs_cycle(
    graph: &SsaGraph,
    node: NodeId,
    state: &mut [u8],
    path: &mut Vec<NodeId>,
) -> Option<Vec<NodeId>> {
    state[node.index()] = 1;
    path.push(node);

    for &next in &graph.nodes[node.index()].outlinks {
        match state[next.index()] {
            0 => {
                if let Some(cycle) = dfs_cycle(graph, next, state, path) {
                    return Some(cycle);
                }
            }
            1 => {
                let pos = path.iter().position(|&n| n == next).unwrap_or(0);
                return Some(path[pos..].to_vec());
            }
            _ => {}
        }
    }

    path.pop();
    state[node.index()] = 2;
    None
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for SsaGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SsaGraph: {} arguments, {} instructions, {} edges",
            self.argument_count(),
            self.instruction_count(),
            self.edge_count()
        )?;
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Argument(arg) => {
                    let ty = arg.ty.map_or_else(|| "?".to_string(), |t| t.to_string());
                    writeln!(f, "  {} arg {}: {}", node.id, arg.name, ty)?;
                }
                NodeKind::Instruction(inst) => {
                    let desc = inst.desc();
                    let kernels: Vec<String> =
                        inst.valid_kernels.iter().map(Kernel::to_string).collect();
                    writeln!(
                        f,
                        "  {} inst {}({}) -> ({}) kernels=[{}]",
                        node.id,
                        inst.op_type(),
                        format_bindings(desc.inputs()),
                        format_bindings(desc.outputs()),
                        kernels.join(", ")
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn format_bindings(bindings: &[crate::op_desc::Binding]) -> String {
    bindings
        .iter()
        .map(|b| format!("{}: [{}]", b.formal, b.arguments.join(", ")))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ───────────────────────────────────────────────────────────────────
