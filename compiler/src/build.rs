// build.rs — SSA graph construction from a parsed `.mir` program
//
// Walks `arg` and `inst` statements in order and builds the kernel-bound
// SsaGraph the io-complement pass runs on. Each instruction gets an operator
// from the catalog, its candidate kernels for the valid places, and a picked
// kernel (the one at its `@ place`, or the first candidate).
//
// Preconditions: the catalog holds the program's kernels.
// Postconditions: every well-formed statement is in the graph; when no error
//   was reported the graph passes `check_valid`.
// Failure modes: diagnostics E0100–E0109. A faulty instruction is skipped as
//   a whole, so later statements still see a consistent graph.
// Side effects: none.

use std::collections::HashSet;

use crate::ast::{ArgStmt, BindingExpr, InstStmt, Program, Span, StatementKind};
use crate::catalog::{Kernel, OpCatalog};
use crate::diag::{codes, has_errors, DiagCode, Diagnostic};
use crate::graph::{Instruction, SsaGraph};
use crate::id::NodeId;
use crate::op_desc::OpDesc;
use crate::types::{Place, Type};

/// Result of graph construction.
#[derive(Debug)]
pub struct BuildResult {
    pub graph: SsaGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the SSA graph of `program`.
pub fn build_graph(program: &Program, catalog: &OpCatalog, places: &[Place]) -> BuildResult {
    let mut builder = GraphBuilder {
        catalog,
        places,
        graph: SsaGraph::new(),
        diagnostics: Vec::new(),
    };
    for stmt in &program.statements {
        match &stmt.kind {
            StatementKind::Arg(arg) => builder.add_argument(arg, stmt.span),
            StatementKind::Inst(inst) => builder.add_instruction(inst),
            StatementKind::Set(_) | StatementKind::Kernel(_) => {}
        }
    }
    builder.finish()
}

// ── Builder ─────────────────────────────────────────────────────────────────

struct GraphBuilder<'a> {
    catalog: &'a OpCatalog,
    places: &'a [Place],
    graph: SsaGraph,
    diagnostics: Vec<Diagnostic>,
}

/// Output argument of an instruction under construction.
enum OutputSlot {
    Existing { id: NodeId, ty: Option<Type> },
    New { name: String, ty: Option<Type> },
}

impl GraphBuilder<'_> {
    fn add_argument(&mut self, arg: &ArgStmt, span: Span) {
        let ty = match arg.ty.as_ref().map(|t| t.to_type()).transpose() {
            Ok(ty) => ty,
            Err(e) => {
                let span = arg.ty.as_ref().map_or(span, |t| t.span);
                self.error(codes::E0100, e.to_string(), span);
                return;
            }
        };
        if self.graph.new_argument_node(arg.name.name.clone(), ty).is_err() {
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0105,
                    format!("argument '{}' is declared twice", arg.name.name),
                )
                .with_span(arg.name.span),
            );
        }
    }

    fn add_instruction(&mut self, stmt: &InstStmt) {
        let errors_before = self.diagnostics.len();

        let mut op = match self.catalog.create(&stmt.op.name) {
            Ok(op) => op,
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::error(codes::E0101, e.to_string())
                        .with_span(stmt.op.span)
                        .with_hint("declare it with a `kernel` statement or load a catalog with -I"),
                );
                return;
            }
        };

        // ── Inputs ──
        let mut inputs: Vec<NodeId> = Vec::new();
        for binding in &stmt.inputs {
            for arg in &binding.arguments {
                match self.graph.argument(&arg.name) {
                    Some(id) if !inputs.contains(&id) => inputs.push(id),
                    Some(_) => {}
                    None => self.diagnostics.push(
                        Diagnostic::error(
                            codes::E0102,
                            format!("undefined argument '{}'", arg.name),
                        )
                        .with_span(arg.span)
                        .with_hint(format!("declare it with `arg {}: <place>`", arg.name)),
                    ),
                }
            }
        }

        // ── Descriptor ──
        let mut desc = OpDesc::new();
        desc.set_type(stmt.op.name.clone());
        for b in &stmt.inputs {
            desc.set_input(b.formal.name.clone(), names(b));
        }
        for b in &stmt.outputs {
            desc.set_output(b.formal.name.clone(), names(b));
        }
        if let Err(e) = op.attach(desc) {
            self.error(codes::E0108, e.to_string(), stmt.span);
        }

        // ── Kernels ──
        let mut kernels = op.create_kernels(self.places);
        if kernels.is_empty() {
            let places: Vec<String> = self.places.iter().map(Place::to_string).collect();
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0104,
                    format!("no '{}' kernel for the valid places", stmt.op.name),
                )
                .with_span(stmt.op.span)
                .with_hint(format!("valid places: [{}]", places.join(", "))),
            );
        } else if let Some(lit) = &stmt.place {
            match lit.to_place() {
                Ok(place) => match kernels.iter().position(|k| place.matches(&k.place)) {
                    Some(index) => {
                        let kernel = kernels.remove(index);
                        kernels.insert(0, kernel);
                    }
                    None => self.error(
                        codes::E0104,
                        format!("no '{}' kernel at {}", stmt.op.name, place),
                        lit.span,
                    ),
                },
                Err(e) => self.error(codes::E0100, e.to_string(), lit.span),
            }
        }

        // ── Outputs ──
        let mut outputs: Vec<OutputSlot> = Vec::new();
        let mut written: HashSet<&str> = HashSet::new();
        for binding in &stmt.outputs {
            let declared = kernels
                .first()
                .and_then(|k| output_type(k, &binding.formal.name, &inputs, &self.graph));
            for arg in &binding.arguments {
                if !written.insert(arg.name.as_str()) {
                    continue;
                }
                match self.graph.argument(&arg.name) {
                    Some(id) if inputs.contains(&id) => self.error(
                        codes::E0103,
                        format!("instruction reads and writes '{}'", arg.name),
                        arg.span,
                    ),
                    Some(id) if self.graph.producer(id).is_some() => self.error(
                        codes::E0103,
                        format!("argument '{}' already has a producer", arg.name),
                        arg.span,
                    ),
                    Some(id) => outputs.push(OutputSlot::Existing { id, ty: declared }),
                    None => outputs.push(OutputSlot::New {
                        name: arg.name.clone(),
                        ty: declared,
                    }),
                }
            }
        }

        if self.diagnostics.len() > errors_before {
            return;
        }

        // ── Commit ──
        let node = self.graph.new_instruction_node(Instruction::new(op, kernels));
        for input in inputs {
            if let Err(e) = self.graph.directed_link(input, node) {
                self.error(codes::E0109, e.to_string(), stmt.span);
            }
        }
        for slot in outputs {
            let id = match slot {
                OutputSlot::Existing { id, ty } => {
                    if let Some(arg) = self.graph.node_mut(id).and_then(|n| n.as_argument_mut()) {
                        if arg.ty.is_none() {
                            arg.ty = ty;
                        }
                    }
                    id
                }
                OutputSlot::New { name, ty } => match self.graph.new_argument_node(name, ty) {
                    Ok(id) => id,
                    Err(e) => {
                        self.error(codes::E0105, e.to_string(), stmt.span);
                        continue;
                    }
                },
            };
            if let Err(e) = self.graph.directed_link(node, id) {
                self.error(codes::E0109, e.to_string(), stmt.span);
            }
        }
    }

    fn error(&mut self, code: DiagCode, message: String, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(code, message).with_span(span));
    }

    fn finish(mut self) -> BuildResult {
        if !has_errors(&self.diagnostics) {
            if let Err(e) = self.graph.check_valid() {
                self.diagnostics.push(
                    Diagnostic::error(codes::E0109, e.to_string())
                        .with_hint("every input must be declared with a type or written by an earlier instruction"),
                );
            }
        }
        BuildResult {
            graph: self.graph,
            diagnostics: self.diagnostics,
        }
    }
}

fn names(binding: &BindingExpr) -> Vec<String> {
    binding.arguments.iter().map(|a| a.name.clone()).collect()
}

/// The type written to output `formal` by `kernel`. Declared `any`
/// components are taken from the first typed input.
fn output_type(kernel: &Kernel, formal: &str, inputs: &[NodeId], graph: &SsaGraph) -> Option<Type> {
    let declared = *kernel.output_decl_type(formal)?;
    let first_input = inputs
        .iter()
        .filter_map(|&id| graph.node(id)?.as_argument()?.ty)
        .next();
    Some(match first_input {
        Some(actual) => declared.refine(&actual),
        None => declared,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
