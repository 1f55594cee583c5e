// dot.rs — Graphviz DOT output for SSA graphs
//
// Transforms an SsaGraph into DOT format suitable for rendering with `dot`.
// Arguments are ellipses, instructions are boxes, io_copy instructions are
// highlighted.
//
// Preconditions: none.
// Postconditions: returns a DOT string listing every node and edge, in node
//   id order.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write};

use crate::graph::{Node, NodeKind, SsaGraph};

/// Emit the graph as a Graphviz DOT string.
pub fn emit_dot(graph: &SsaGraph) -> String {
    let mut buf = String::new();
    // Writing into a String cannot fail.
    let _ = write_dot(&mut buf, graph);
    buf
}

fn write_dot(buf: &mut String, graph: &SsaGraph) -> fmt::Result {
    writeln!(buf, "digraph mir {{")?;
    writeln!(buf, "    rankdir=TB;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;

    for node in graph.nodes() {
        writeln!(buf, "    n{} [{}];", node.id.0, node_attrs(node))?;
    }

    if graph.edge_count() > 0 {
        writeln!(buf)?;
    }
    for node in graph.nodes() {
        for to in &node.outlinks {
            writeln!(buf, "    n{} -> n{};", node.id.0, to.0)?;
        }
    }

    writeln!(buf, "}}")
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Escape a label for use inside a double-quoted DOT string.
fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_label(node: &Node) -> String {
    match &node.kind {
        NodeKind::Argument(arg) => match &arg.ty {
            Some(ty) => format!("{}\\n{}", escape(&arg.name), ty),
            None => escape(&arg.name),
        },
        NodeKind::Instruction(inst) => match inst.picked_kernel() {
            Some(kernel) => format!("{}\\n{}", escape(inst.op_type()), escape(&kernel.to_string())),
            None => escape(inst.op_type()),
        },
    }
}

fn node_attrs(node: &Node) -> String {
    let (shape, color) = match &node.kind {
        NodeKind::Argument(_) => ("ellipse", "white"),
        NodeKind::Instruction(inst) if inst.is_io_copy() => ("box", "orange"),
        NodeKind::Instruction(_) => ("box", "lightblue"),
    };
    format!(
        "shape={shape}, style=filled, fillcolor={color}, label=\"{}\"",
        node_label(node)
    )
}

// ── Tests ───────────────────────────────────────────────────────────────────
