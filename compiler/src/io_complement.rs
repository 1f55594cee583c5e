// io_complement.rs — Io-complement pass and io_copy kernel narrowing
//
// Finds every edge whose produced type does not satisfy the declared input
// type of the consuming instruction's picked kernel, and splices an `io_copy`
// instruction into it:
//
//   before:  var ──▶ inst
//   after:   var ──▶ io_copy ──▶ var/trans/<n> ──▶ inst
//
// Kernel narrowing (`pick_io_copy_kernel`) is a separate step that reduces
// every io_copy's candidate list to the one kernel matching its actual input
// type and output target.
//
// Preconditions: the graph passes `check_valid`, is fully typed and
//   kernel-bound; valid places are configured.
// Postconditions: on `Ok`, every input of a source instruction is either
//   type-compatible with the picked kernel's declaration or produced by an
//   io_copy, and the graph passes `check_valid`.
// Failure modes: `PassError`. The graph is checked before the scan and
//   surgery validates every precondition before the first mutation, so a
//   failed insertion leaves the graph untouched.
// Side effects: logs mismatches, insertions and the final graph in DOT form.

use crate::catalog::{CatalogError, Kernel, OpCatalog, IO_COPY_OP};
use crate::diag::{codes, Diagnostic};
use crate::graph::{GraphError, Instruction, SsaGraph};
use crate::id::NodeId;
use crate::op_desc::OpDesc;
use crate::types::{type_compatible_to, Place, Type};

/// Formal input parameter of an io_copy instruction.
pub const IO_COPY_INPUT: &str = "Input";
/// Formal output parameter of an io_copy instruction.
pub const IO_COPY_OUTPUT: &str = "Out";

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("valid places are empty")]
    EmptyValidPlaces,
    #[error("argument '{argument}' has no inferred type")]
    MissingType { argument: String },
    #[error("operator '{0}' is not in the catalog")]
    UnknownOperator(String),
    #[error("instruction {node} does not read argument '{argument}'")]
    NoInputArgname { node: NodeId, argument: String },
    #[error("instruction {node} has no picked kernel")]
    NoPickedKernel { node: NodeId },
    #[error("kernel {kernel} declares no type for '{formal}'")]
    NoDeclType { kernel: String, formal: String },
    #[error("instruction {node} reads '{argument}' through formals that no single conversion satisfies")]
    ConflictingFormals { node: NodeId, argument: String },
    #[error("node {0} is not an argument")]
    NotAnArgument(NodeId),
    #[error("node {0} is not an instruction")]
    NotAnInstruction(NodeId),
    #[error("no io_copy kernel is available for {node}")]
    NoCandidateKernels { node: NodeId },
    #[error("io_copy {node} has {inputs} inputs and {outputs} outputs, expected one of each")]
    NonUnaryConversion {
        node: NodeId,
        inputs: usize,
        outputs: usize,
    },
    #[error(transparent)]
    Catalog(CatalogError),
    #[error(transparent)]
    Graph(GraphError),
}

impl From<GraphError> for PassError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::UntypedInput { argument, .. } => PassError::MissingType { argument },
            other => PassError::Graph(other),
        }
    }
}

impl From<CatalogError> for PassError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::UnknownOperator(op) => PassError::UnknownOperator(op),
            other => PassError::Catalog(other),
        }
    }
}

impl PassError {
    /// The node the error is about, when there is one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            PassError::NoInputArgname { node, .. }
            | PassError::ConflictingFormals { node, .. }
            | PassError::NoPickedKernel { node }
            | PassError::NoCandidateKernels { node }
            | PassError::NonUnaryConversion { node, .. } => Some(*node),
            PassError::NotAnArgument(node) | PassError::NotAnInstruction(node) => Some(*node),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            PassError::EmptyValidPlaces => codes::E0200,
            _ => codes::E0201,
        };
        let mut diag = Diagnostic::error(code, self.to_string());
        if let Some(node) = self.node() {
            diag = diag.with_node(node);
        }
        match self {
            PassError::EmptyValidPlaces => {
                diag.with_hint("add `set valid_places = [...]` or pass --valid-places")
            }
            PassError::UnknownOperator(op) if op == IO_COPY_OP => {
                diag.with_hint("declare io_copy kernels in the source or an -I catalog")
            }
            _ => diag,
        }
    }
}

// ── Pass ────────────────────────────────────────────────────────────────────

/// Inserts io_copy instructions on type-mismatched edges.
#[derive(Debug, Clone, Default)]
pub struct IoComplementPass {
    valid_places: Vec<Place>,
}

impl IoComplementPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ordered places io_copy kernels are enumerated for.
    pub fn set_valid_places(&mut self, places: Vec<Place>) -> Result<(), PassError> {
        if places.is_empty() {
            return Err(PassError::EmptyValidPlaces);
        }
        self.valid_places = places;
        Ok(())
    }

    pub fn valid_places(&self) -> &[Place] {
        &self.valid_places
    }

    /// Scan every instruction present at entry and complement each input.
    /// Returns the number of io_copy instructions inserted.
    pub fn apply(&self, graph: &mut SsaGraph, catalog: &OpCatalog) -> Result<usize, PassError> {
        if self.valid_places.is_empty() {
            return Err(PassError::EmptyValidPlaces);
        }
        graph.check_valid()?;

        let mut inserted = 0;
        for inst_id in graph.instruction_ids() {
            let node = graph.node(inst_id).ok_or(GraphError::UnknownNode(inst_id))?;
            let Some(inst) = node.as_instruction() else {
                continue;
            };
            // Conversions spliced in by an earlier scan are settled by
            // narrowing. An io_copy written in the source is an ordinary
            // consumer.
            if inst.inserted {
                continue;
            }
            let inputs = node.inlinks.clone();
            for input in inputs {
                if self.complement_inputs(graph, catalog, inst_id, input)? {
                    inserted += 1;
                }
            }
        }

        graph.check_valid()?;
        log::info!(
            "io_complement: {} io_copy instruction(s) inserted\n{}",
            inserted,
            crate::dot::emit_dot(graph)
        );
        Ok(inserted)
    }

    /// Check one input edge of `inst` and insert an io_copy on mismatch.
    /// Returns whether an io_copy was inserted.
    pub fn complement_inputs(
        &self,
        graph: &mut SsaGraph,
        catalog: &OpCatalog,
        inst: NodeId,
        input: NodeId,
    ) -> Result<bool, PassError> {
        let inst_node = graph.node(inst).ok_or(GraphError::UnknownNode(inst))?;
        if !inst_node.inlinks.contains(&input) {
            return Ok(false);
        }
        let instruction = inst_node
            .as_instruction()
            .ok_or(PassError::NotAnInstruction(inst))?;
        let arg = graph
            .node(input)
            .ok_or(GraphError::UnknownNode(input))?
            .as_argument()
            .ok_or(PassError::NotAnArgument(input))?;

        if instruction.desc().input_argname(&arg.name).is_none() {
            return Err(PassError::NoInputArgname {
                node: inst,
                argument: arg.name.clone(),
            });
        }
        let kernel = instruction
            .picked_kernel()
            .ok_or(PassError::NoPickedKernel { node: inst })?;
        let declared_types = instruction
            .desc()
            .input_argnames(&arg.name)
            .map(|formal| {
                kernel
                    .input_decl_type(formal)
                    .map(|ty| (formal, *ty))
                    .ok_or_else(|| PassError::NoDeclType {
                        kernel: kernel.to_string(),
                        formal: formal.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let produced = arg.ty.ok_or_else(|| PassError::MissingType {
            argument: arg.name.clone(),
        })?;

        let Some(&(formal, declared)) = declared_types
            .iter()
            .find(|(_, ty)| !type_compatible_to(&produced, ty))
        else {
            return Ok(false);
        };
        // One link, one conversion: its output must suit every formal.
        let converted = declared.refine(&produced);
        if declared_types
            .iter()
            .any(|(_, ty)| !type_compatible_to(&converted, ty))
        {
            return Err(PassError::ConflictingFormals {
                node: inst,
                argument: arg.name.clone(),
            });
        }
        log::info!(
            "io_complement: {} reads '{}' as {} ({}), declared {}",
            inst,
            arg.name,
            formal,
            produced,
            declared
        );
        self.add_io_copy_inst(graph, catalog, &produced, &declared, input, inst)?;
        Ok(true)
    }

    /// Splice an io_copy between argument `var` and instruction `inst`.
    /// Returns the id of the new io_copy instruction.
    pub fn add_io_copy_inst(
        &self,
        graph: &mut SsaGraph,
        catalog: &OpCatalog,
        from: &Type,
        to: &Type,
        var: NodeId,
        inst: NodeId,
    ) -> Result<NodeId, PassError> {
        if self.valid_places.is_empty() {
            return Err(PassError::EmptyValidPlaces);
        }

        // ── Validate and prepare; nothing below mutates the graph ──
        let var_name = graph
            .node(var)
            .ok_or(GraphError::UnknownNode(var))?
            .as_argument()
            .ok_or(PassError::NotAnArgument(var))?
            .name
            .clone();
        if !graph.has_link(var, inst) {
            return Err(GraphError::MissingLink {
                from: var,
                to: inst,
            }
            .into());
        }
        let mut consumer_desc = graph
            .node(inst)
            .ok_or(GraphError::UnknownNode(inst))?
            .as_instruction()
            .ok_or(PassError::NotAnInstruction(inst))?
            .desc()
            .clone();
        if consumer_desc.input_argname(&var_name).is_none() {
            return Err(PassError::NoInputArgname {
                node: inst,
                argument: var_name,
            });
        }

        let mut io_copy = catalog.create(IO_COPY_OP)?;
        let candidates = io_copy.create_kernels(&self.valid_places);
        if candidates.is_empty() {
            return Err(PassError::NoCandidateKernels { node: inst });
        }
        graph.check_valid()?;

        let new_name = graph.fresh_argument_name(&var_name);
        let mut desc = OpDesc::new();
        desc.set_type(IO_COPY_OP);
        desc.set_input(IO_COPY_INPUT, vec![var_name.clone()]);
        desc.set_output(IO_COPY_OUTPUT, vec![new_name.clone()]);
        io_copy.attach(desc)?;

        consumer_desc.rename_input_argument(&var_name, &new_name);
        consumer_desc.flush().map_err(CatalogError::from)?;

        // ── Commit ──
        let new_arg = graph.new_argument_node(new_name.clone(), Some(to.refine(from)))?;
        let io_copy_id = graph.new_instruction_node(Instruction::inserted(io_copy, candidates));
        graph.remove_directed_link(var, inst)?;
        if let Some(consumer) = graph.node_mut(inst).and_then(|n| n.as_instruction_mut()) {
            consumer.op.attach(consumer_desc)?;
        }
        graph.directed_link(var, io_copy_id)?;
        graph.directed_link(io_copy_id, new_arg)?;
        graph.directed_link(new_arg, inst)?;
        graph.check_valid()?;

        log::debug!(
            "io_complement: inserted io_copy {} for '{}' -> {} ({} -> {})",
            io_copy_id,
            var_name,
            inst,
            from,
            to
        );
        Ok(io_copy_id)
    }
}

// ── Kernel narrowing ────────────────────────────────────────────────────────

/// Narrow every io_copy instruction to the first candidate kernel that
/// accepts its input type and writes its output target. Instructions with no
/// matching candidate keep their list and produce a `W0200` warning.
pub fn pick_io_copy_kernel(graph: &mut SsaGraph) -> Result<Vec<Diagnostic>, PassError> {
    let io_copies: Vec<NodeId> = graph
        .instructions()
        .filter(|(_, inst)| inst.is_io_copy())
        .map(|(id, _)| id)
        .collect();

    let mut diags = Vec::new();
    for id in io_copies {
        let node = graph.node(id).ok_or(GraphError::UnknownNode(id))?;
        let inst = node.as_instruction().ok_or(PassError::NotAnInstruction(id))?;
        if inst.valid_kernels.is_empty() {
            return Err(PassError::NoCandidateKernels { node: id });
        }
        if node.inlinks.len() != 1 || node.outlinks.len() != 1 {
            return Err(PassError::NonUnaryConversion {
                node: id,
                inputs: node.inlinks.len(),
                outputs: node.outlinks.len(),
            });
        }
        let actual_in = argument_type(graph, node.inlinks[0])?;
        let actual_out = argument_type(graph, node.outlinks[0])?;

        let found = inst
            .valid_kernels
            .iter()
            .position(|k| kernel_converts(k, &actual_in, &actual_out));

        match found {
            Some(index) => {
                let Some(inst) = graph.node_mut(id).and_then(|n| n.as_instruction_mut()) else {
                    continue;
                };
                let kernel = inst.valid_kernels.swap_remove(index);
                log::info!("io_copy_kernel_pick: {} -> {}", id, kernel);
                inst.valid_kernels = vec![kernel];
            }
            None => {
                log::warn!(
                    "io_copy_kernel_pick: no kernel of {} converts {} to {}",
                    id,
                    actual_in,
                    actual_out.target.name()
                );
                diags.push(
                    Diagnostic::warning(
                        codes::W0200,
                        format!(
                            "no io_copy kernel converts {} to target {}; candidates left unnarrowed",
                            actual_in,
                            actual_out.target.name()
                        ),
                    )
                    .with_node(id),
                );
            }
        }
    }
    Ok(diags)
}

fn kernel_converts(kernel: &Kernel, actual_in: &Type, actual_out: &Type) -> bool {
    let accepts = kernel
        .input_decl_type(IO_COPY_INPUT)
        .is_some_and(|t| type_compatible_to(actual_in, t));
    let writes = kernel
        .output_decl_type(IO_COPY_OUTPUT)
        .is_some_and(|t| t.target == actual_out.target);
    accepts && writes
}

fn argument_type(graph: &SsaGraph, id: NodeId) -> Result<Type, PassError> {
    let arg = graph
        .node(id)
        .ok_or(GraphError::UnknownNode(id))?
        .as_argument()
        .ok_or(PassError::NotAnArgument(id))?;
    arg.ty.ok_or_else(|| PassError::MissingType {
        argument: arg.name.clone(),
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
