// pass.rs — Pass registry: identifiers, descriptors, dependency resolution
//
// Declares the graph passes, their registered names and dependency edges,
// and the `MirPass` trait the pipeline drives them through. Graph
// construction happens before the runner and is not a pass.

use std::collections::HashSet;

use crate::catalog::OpCatalog;
use crate::diag::Diagnostic;
use crate::graph::SsaGraph;
use crate::io_complement::{pick_io_copy_kernel, IoComplementPass, PassError};
use crate::types::Place;

// ── Pass identifiers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    IoComplement,
    IoCopyKernelPick,
}

impl PassId {
    /// Registered name of the pass.
    pub fn name(self) -> &'static str {
        descriptor(self).name
    }

    /// Look a pass up by its registered name.
    pub fn from_name(name: &str) -> Option<PassId> {
        ALL_PASSES.iter().copied().find(|id| id.name() == name)
    }
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a graph pass.
pub struct PassDescriptor {
    /// Registered name, used on the command line and in logs.
    pub name: &'static str,
    /// Passes that must run first.
    pub inputs: &'static [PassId],
    /// What holds after the pass (documentation only).
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::IoComplement => PassDescriptor {
            name: "io_complement_pass",
            inputs: &[],
            invariants: "every input satisfies its picked kernel or is produced by io_copy",
        },
        PassId::IoCopyKernelPick => PassDescriptor {
            name: "io_copy_kernel_pick_pass",
            inputs: &[PassId::IoComplement],
            invariants: "every io_copy has one candidate kernel, or a W0200 warning",
        },
    }
}

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 2] = [PassId::IoComplement, PassId::IoCopyKernelPick];

// ── Dependency resolution ──────────────────────────────────────────────────

/// Execution order for the requested passes and everything they depend
/// on, each appearing once, in topological order.
pub fn schedule_passes(requested: &[PassId]) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for &id in requested {
        visit(id, &mut visited, &mut order);
    }
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Pass interface ─────────────────────────────────────────────────────────

/// A graph pass as seen by the pipeline: configure, then apply.
pub trait MirPass {
    fn name(&self) -> &'static str;

    fn set_valid_places(&mut self, places: Vec<Place>) -> Result<(), PassError>;

    /// Run the pass. Non-fatal findings are returned as diagnostics.
    fn apply(&mut self, graph: &mut SsaGraph, catalog: &OpCatalog)
        -> Result<Vec<Diagnostic>, PassError>;
}

impl MirPass for IoComplementPass {
    fn name(&self) -> &'static str {
        PassId::IoComplement.name()
    }

    fn set_valid_places(&mut self, places: Vec<Place>) -> Result<(), PassError> {
        IoComplementPass::set_valid_places(self, places)
    }

    fn apply(
        &mut self,
        graph: &mut SsaGraph,
        catalog: &OpCatalog,
    ) -> Result<Vec<Diagnostic>, PassError> {
        IoComplementPass::apply(self, graph, catalog)?;
        Ok(Vec::new())
    }
}

/// Narrows io_copy candidate kernels. Independent of the valid places.
#[derive(Debug, Clone, Default)]
pub struct IoCopyKernelPickPass;

impl MirPass for IoCopyKernelPickPass {
    fn name(&self) -> &'static str {
        PassId::IoCopyKernelPick.name()
    }

    fn set_valid_places(&mut self, _places: Vec<Place>) -> Result<(), PassError> {
        Ok(())
    }

    fn apply(
        &mut self,
        graph: &mut SsaGraph,
        _catalog: &OpCatalog,
    ) -> Result<Vec<Diagnostic>, PassError> {
        pick_io_copy_kernel(graph)
    }
}

/// Create a fresh, unconfigured instance of pass `id`.
pub fn create_pass(id: PassId) -> Box<dyn MirPass> {
    match id {
        PassId::IoComplement => Box::new(IoComplementPass::new()),
        PassId::IoCopyKernelPick => Box::new(IoCopyKernelPickPass),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_names() {
        assert_eq!(PassId::IoComplement.name(), "io_complement_pass");
        assert_eq!(PassId::IoCopyKernelPick.name(), "io_copy_kernel_pick_pass");
        assert_eq!(
            PassId::from_name("io_complement_pass"),
            Some(PassId::IoComplement)
        );
        assert_eq!(PassId::from_name("fuse_pass"), None);
    }

    #[test]
    fn pick_pulls_in_complement() {
        assert_eq!(
            schedule_passes(&[PassId::IoCopyKernelPick]),
            vec![PassId::IoComplement, PassId::IoCopyKernelPick]
        );
    }

    #[test]
    fn complement_alone_is_minimal() {
        assert_eq!(schedule_passes(&[PassId::IoComplement]), vec![PassId::IoComplement]);
    }

    #[test]
    fn schedule_dedups_and_orders() {
        assert_eq!(
            schedule_passes(&[PassId::IoCopyKernelPick, PassId::IoComplement]),
            vec![PassId::IoComplement, PassId::IoCopyKernelPick]
        );
        assert!(schedule_passes(&[]).is_empty());
    }

    #[test]
    fn created_passes_report_their_names() {
        for id in ALL_PASSES {
            assert_eq!(create_pass(id).name(), id.name());
        }
    }

    #[test]
    fn complement_pass_rejects_empty_places_through_trait() {
        let mut pass = create_pass(PassId::IoComplement);
        assert!(matches!(
            pass.set_valid_places(vec![]),
            Err(PassError::EmptyValidPlaces)
        ));
        let mut pick = create_pass(PassId::IoCopyKernelPick);
        assert!(pick.set_valid_places(vec![]).is_ok());
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = schedule_passes(&[*pass]);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
