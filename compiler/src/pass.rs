// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the optimizer's passes (parse is outside the runner), their
// dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute minimal pass subsets for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each pass (parse excluded, it runs before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Resolve,
    ArrayPartition,
    ScheduleDataflow,
    CheckLegality,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Module,    // ir::Module
    Options,   // pipeline::Options
    Partition, // layout::PartitionResult
    Schedule,  // dataflow::ScheduleStats
    Legality,  // legality::LegalityOutcome
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Postcondition evidence produced after a pass.
pub trait StageCert {
    /// True iff every obligation holds.
    fn all_pass(&self) -> bool;

    /// Named obligations, in declaration order.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the obligations that failed.
    fn failures(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[],
            outputs: &[ArtifactId::Module, ArtifactId::Options],
            invariants: "all names resolved, index counts match array ranks",
        },
        PassId::ArrayPartition => PassDescriptor {
            name: "array_partition",
            inputs: &[PassId::Resolve],
            outputs: &[ArtifactId::Partition],
            invariants: "layouts carry rank partition and rank address results",
        },
        PassId::ScheduleDataflow => PassDescriptor {
            name: "schedule_dataflow",
            inputs: &[PassId::Resolve],
            outputs: &[ArtifactId::Schedule],
            invariants: "levels write-once, producer above consumers",
        },
        PassId::CheckLegality => PassDescriptor {
            name: "check_legality",
            inputs: &[PassId::ScheduleDataflow],
            outputs: &[ArtifactId::Legality],
            invariants: "legal iff every region node is leveled",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [
    PassId::Resolve,
    PassId::ArrayPartition,
    PassId::ScheduleDataflow,
    PassId::CheckLegality,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

/// Union of `required_passes` over several terminals, in execution order.
pub fn required_passes_all(terminals: &[PassId]) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for &t in terminals {
        visit(t, &mut visited, &mut order);
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

// ── Tests ──────────────────────────────────────────────────────────────────
