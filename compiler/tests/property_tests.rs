// Property-based tests for io-complement invariants.
//
// Generated programs mix `relu` and `add` instructions placed on host, cuda
// and opencl, reading arguments produced on any target. Properties:
// 1. The pass succeeds and leaves a structurally valid graph
// 2. Every input satisfies its picked kernel or is produced by io_copy
// 3. A second scan inserts nothing
// 4. Generated names are fresh; io_copy is always unary
// 5. Narrowing settles every io_copy on one kernel writing its output target
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use std::collections::HashSet;
use std::path::Path;

use mirc::catalog::OpCatalog;
use mirc::config::Overrides;
use mirc::graph::SsaGraph;
use mirc::io_complement::{pick_io_copy_kernel, IoComplementPass, IO_COPY_OUTPUT};
use mirc::pipeline::CompilationState;
use mirc::types::{type_compatible_to, Place};
use proptest::prelude::*;

// ── Program generator ───────────────────────────────────────────────────────

const TARGETS: [&str; 3] = ["host", "cuda", "opencl"];

const KERNELS: &str = concat!(
    "set valid_places = [cuda/float32/nchw, opencl/float32/nchw, host/float32/nchw]\n",
    "kernel io_copy host_to_cuda @ cuda/any/any (Input: host/any/any) -> (Out: cuda/any/any)\n",
    "kernel io_copy cuda_to_host @ cuda/any/any (Input: cuda/any/any) -> (Out: host/any/any)\n",
    "kernel io_copy opencl_to_cuda @ cuda/any/any (Input: opencl/any/any) -> (Out: cuda/any/any)\n",
    "kernel io_copy host_to_opencl @ opencl/any/any (Input: host/any/any) -> (Out: opencl/any/any)\n",
    "kernel io_copy opencl_to_host @ opencl/any/any (Input: opencl/any/any) -> (Out: host/any/any)\n",
    "kernel io_copy cuda_to_opencl @ opencl/any/any (Input: cuda/any/any) -> (Out: opencl/any/any)\n",
    "kernel relu @ host/float32/nchw (X: host/float32/nchw) -> (Out: host/float32/nchw)\n",
    "kernel relu @ cuda/float32/nchw (X: cuda/float32/nchw) -> (Out: cuda/float32/nchw)\n",
    "kernel relu @ opencl/float32/nchw (X: opencl/float32/nchw) -> (Out: opencl/float32/nchw)\n",
    "kernel add @ host/float32/nchw (X: host/float32/nchw, Y: host/float32/nchw) -> (Out: host/float32/nchw)\n",
    "kernel add @ cuda/float32/nchw (X: cuda/float32/nchw, Y: cuda/float32/nchw) -> (Out: cuda/float32/nchw)\n",
    "kernel add @ opencl/float32/nchw (X: opencl/float32/nchw, Y: opencl/float32/nchw) -> (Out: opencl/float32/nchw)\n",
);

#[derive(Debug, Clone)]
struct GenInst {
    binary: bool,
    target: usize,
    lhs: usize,
    rhs: usize,
}

/// Generate a `.mir` program: 1–3 typed arguments, then 1–8 instructions
/// whose inputs are picked from everything defined so far.
fn arb_program() -> impl Strategy<Value = String> {
    let args = prop::collection::vec(0..TARGETS.len(), 1..=3);
    let insts = prop::collection::vec(
        (prop::bool::ANY, 0..TARGETS.len(), 0usize..64, 0usize..64).prop_map(
            |(binary, target, lhs, rhs)| GenInst {
                binary,
                target,
                lhs,
                rhs,
            },
        ),
        1..=8,
    );
    (args, insts).prop_map(|(args, insts)| {
        let mut src = String::from(KERNELS);
        let mut defined: Vec<String> = Vec::new();
        for (i, t) in args.iter().enumerate() {
            src.push_str(&format!("arg a{}: {}/float32/nchw\n", i, TARGETS[*t]));
            defined.push(format!("a{}", i));
        }
        for (j, inst) in insts.iter().enumerate() {
            let lhs = &defined[inst.lhs % defined.len()];
            let place = format!("{}/float32/nchw", TARGETS[inst.target]);
            let line = if inst.binary {
                let rhs = &defined[inst.rhs % defined.len()];
                format!("inst add(X: {}, Y: {}) -> (Out: t{}) @ {}\n", lhs, rhs, j, place)
            } else {
                format!("inst relu(X: {}) -> (Out: t{}) @ {}\n", lhs, j, place)
            };
            src.push_str(&line);
            defined.push(format!("t{}", j));
        }
        src
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn build(source: &str) -> (SsaGraph, OpCatalog, Vec<Place>) {
    let (state, diags) = CompilationState::prepare(
        source,
        Path::new("<generated>"),
        OpCatalog::new(),
        &Overrides::default(),
    );
    assert!(diags.is_empty(), "prepare diagnostics: {:?}\n{}", diags, source);
    let state = state.unwrap();
    let built = mirc::build::build_graph(&state.program, &state.catalog, &state.settings.valid_places);
    assert!(built.diagnostics.is_empty(), "build diagnostics: {:?}\n{}", built.diagnostics, source);
    (built.graph, state.catalog, state.settings.valid_places)
}

/// Number of (consumer, argument) pairs whose type mismatches the consumer's
/// picked kernel.
fn count_mismatches(graph: &SsaGraph) -> usize {
    let mut count = 0;
    for (id, inst) in graph.instructions() {
        if inst.is_io_copy() {
            continue;
        }
        let Some(kernel) = inst.picked_kernel() else {
            continue;
        };
        for &input in &graph.node(id).unwrap().inlinks {
            let arg = graph.node(input).unwrap().as_argument().unwrap();
            let formal = inst.desc().input_argname(&arg.name).unwrap();
            let declared = kernel.input_decl_type(formal).unwrap();
            if !type_compatible_to(&arg.ty.unwrap(), declared) {
                count += 1;
            }
        }
    }
    count
}

fn is_satisfied(graph: &SsaGraph) -> bool {
    graph.instructions().filter(|(_, i)| !i.is_io_copy()).all(|(id, inst)| {
        let kernel = inst.picked_kernel().unwrap();
        graph.node(id).unwrap().inlinks.iter().all(|&input| {
            let arg = graph.node(input).unwrap().as_argument().unwrap();
            let formal = inst.desc().input_argname(&arg.name).unwrap();
            let declared = kernel.input_decl_type(formal).unwrap();
            let via_io_copy = graph
                .producer(input)
                .and_then(|p| graph.node(p)?.as_instruction())
                .is_some_and(|p| p.is_io_copy());
            type_compatible_to(&arg.ty.unwrap(), declared) || via_io_copy
        })
    })
}

fn io_copy_ids(graph: &SsaGraph) -> Vec<mirc::id::NodeId> {
    graph
        .instructions()
        .filter(|(_, i)| i.is_io_copy())
        .map(|(id, _)| id)
        .collect()
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn pass_inserts_one_io_copy_per_mismatch(source in arb_program()) {
        let (mut graph, catalog, places) = build(&source);
        let expected = count_mismatches(&graph);
        let mut pass = IoComplementPass::new();
        pass.set_valid_places(places).unwrap();

        let inserted = pass.apply(&mut graph, &catalog).unwrap();
        prop_assert_eq!(inserted, expected);
        prop_assert_eq!(io_copy_ids(&graph).len(), expected);
        prop_assert!(graph.check_valid().is_ok());
        prop_assert!(is_satisfied(&graph), "unsatisfied input in\n{}", graph);
    }

    #[test]
    fn second_scan_is_a_no_op(source in arb_program()) {
        let (mut graph, catalog, places) = build(&source);
        let mut pass = IoComplementPass::new();
        pass.set_valid_places(places).unwrap();
        pass.apply(&mut graph, &catalog).unwrap();
        let once = graph.to_string();

        prop_assert_eq!(pass.apply(&mut graph, &catalog).unwrap(), 0);
        prop_assert_eq!(graph.to_string(), once);
    }

    #[test]
    fn names_are_fresh_and_io_copy_is_unary(source in arb_program()) {
        let (mut graph, catalog, places) = build(&source);
        let before: HashSet<String> = graph.arguments().map(|(_, a)| a.name.clone()).collect();
        let mut pass = IoComplementPass::new();
        pass.set_valid_places(places).unwrap();
        pass.apply(&mut graph, &catalog).unwrap();

        let after: Vec<String> = graph.arguments().map(|(_, a)| a.name.clone()).collect();
        let created: Vec<&String> = after.iter().filter(|n| !before.contains(*n)).collect();
        prop_assert_eq!(created.len(), io_copy_ids(&graph).len());
        for name in &created {
            prop_assert!(name.contains("/trans/"), "unexpected name {}", name);
        }

        for id in io_copy_ids(&graph) {
            let node = graph.node(id).unwrap();
            prop_assert_eq!(node.inlinks.len(), 1);
            prop_assert_eq!(node.outlinks.len(), 1);
            let out = graph.node(node.outlinks[0]).unwrap().as_argument().unwrap();
            prop_assert!(!before.contains(&out.name));
        }
    }

    #[test]
    fn narrowing_settles_every_io_copy(source in arb_program()) {
        let (mut graph, catalog, places) = build(&source);
        let mut pass = IoComplementPass::new();
        pass.set_valid_places(places).unwrap();
        pass.apply(&mut graph, &catalog).unwrap();

        let warnings = pick_io_copy_kernel(&mut graph).unwrap();
        prop_assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        for id in io_copy_ids(&graph) {
            let node = graph.node(id).unwrap();
            let inst = node.as_instruction().unwrap();
            prop_assert_eq!(inst.valid_kernels.len(), 1);
            let out = graph.node(node.outlinks[0]).unwrap().as_argument().unwrap();
            let declared_out = inst.valid_kernels[0].output_decl_type(IO_COPY_OUTPUT).unwrap();
            prop_assert_eq!(declared_out.target, out.ty.unwrap().target);
        }
        prop_assert!(graph.check_valid().is_ok());
    }
}
