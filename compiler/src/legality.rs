// legality.rs — Schedule region legality
//
// After level scheduling reaches its fixpoint, a region is legal iff every
// node it contains has a level. Legality is only evaluated when violations
// were enforced during scheduling; in permissive mode regions are left as
// they are.
//
// Preconditions: `dataflow::schedule_nodes` has run with the same options.
// Postconditions: with violations enforced, `region.legal` equals
//                 `is_region_legal(region)` for every region.
// Failure modes: none; illegal regions are reported, not rejected.
// Side effects: writes `ScheduleRegion::legal`.

use crate::dataflow::ScheduleOptions;
use crate::id::RegionId;
use crate::ir::{DataflowGraph, ScheduleRegion};

/// Result of a legality check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegalityOutcome {
    /// False when violations were ignored and legality was not evaluated.
    pub evaluated: bool,
    /// Regions that still contain unscheduled nodes.
    pub illegal: Vec<RegionId>,
}

/// True iff every node of `region` has a level. Empty regions are legal.
pub fn is_region_legal(graph: &DataflowGraph, region: &ScheduleRegion) -> bool {
    region.nodes.iter().all(|&id| graph.node(id).is_scheduled())
}

/// Recompute the `legal` flag of every region.
pub fn check_legality(graph: &mut DataflowGraph, options: ScheduleOptions) -> LegalityOutcome {
    if options.ignore_violations {
        tracing::debug!("violations ignored; legality not evaluated");
        return LegalityOutcome::default();
    }

    let verdicts: Vec<bool> = graph
        .regions
        .iter()
        .map(|r| is_region_legal(graph, r))
        .collect();

    let mut outcome = LegalityOutcome {
        evaluated: true,
        illegal: Vec::new(),
    };
    for (region, legal) in graph.regions.iter_mut().zip(verdicts) {
        region.legal = legal;
        tracing::debug!(region = %region.name, legal, "region legality");
        if !legal {
            outcome.illegal.push(region.id);
        }
    }
    outcome
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for schedule postconditions (L1-L3).
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// L1: every node of every region flagged legal has a level.
    pub l1_legal_regions_leveled: bool,
    /// L2: a leveled producer sits strictly above each leveled consumer of
    /// its output buffers.
    pub l2_levels_ordered: bool,
    /// L3: nodes without outputs are at level 0.
    pub l3_sinks_at_zero: bool,
}

impl crate::pass::StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.l1_legal_regions_leveled && self.l2_levels_ordered && self.l3_sinks_at_zero
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("L1_legal_regions_leveled", self.l1_legal_regions_leveled),
            ("L2_levels_ordered", self.l2_levels_ordered),
            ("L3_sinks_at_zero", self.l3_sinks_at_zero),
        ]
    }
}

/// Verify schedule postconditions.
pub fn verify_schedule(graph: &DataflowGraph) -> ScheduleCert {
    let l1 = graph
        .regions
        .iter()
        .filter(|r| r.legal)
        .all(|r| is_region_legal(graph, r));

    let l2 = graph.nodes.iter().all(|node| {
        let Some(level) = node.level() else {
            return true;
        };
        node.outputs.iter().all(|&b| {
            graph
                .buffer(b)
                .consumers
                .iter()
                .filter_map(|&c| graph.node(c).level())
                .all(|consumer| level > consumer)
        })
    });

    let l3 = graph
        .nodes
        .iter()
        .filter(|n| n.outputs.is_empty())
        .all(|n| n.level() == Some(0));

    ScheduleCert {
        l1_legal_regions_leveled: l1,
        l2_levels_ordered: l2,
        l3_sinks_at_zero: l3,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::dataflow::schedule_nodes;
    use crate::pass::StageCert;

    fn span() -> Span {
        Span::from(0..0)
    }

    /// Two regions: `ok` is a clean chain, `bad` has a fan-out buffer.
    fn two_regions() -> DataflowGraph {
        let mut g = DataflowGraph::new();
        let ok = g.add_region("ok", span());
        let b1 = g.intern_buffer("b1");
        g.add_node(ok, "A", vec![], vec![b1], span());
        g.add_node(ok, "B", vec![b1], vec![], span());

        let bad = g.add_region("bad", span());
        let f = g.intern_buffer("f");
        g.add_node(bad, "P", vec![], vec![f], span());
        g.add_node(bad, "C1", vec![f], vec![], span());
        g.add_node(bad, "C2", vec![f], vec![], span());
        g
    }

    #[test]
    fn strict_mode_marks_only_complete_regions() {
        let mut g = two_regions();
        let opts = ScheduleOptions::default();
        schedule_nodes(&mut g, opts);
        let outcome = check_legality(&mut g, opts);
        assert!(outcome.evaluated);
        assert_eq!(outcome.illegal, vec![RegionId(1)]);
        assert!(g.regions[0].legal);
        assert!(!g.regions[1].legal);
        assert!(verify_schedule(&g).all_pass());
    }

    #[test]
    fn permissive_mode_does_not_evaluate() {
        let mut g = two_regions();
        let opts = ScheduleOptions {
            ignore_violations: true,
        };
        schedule_nodes(&mut g, opts);
        let outcome = check_legality(&mut g, opts);
        assert!(!outcome.evaluated);
        assert!(g.regions.iter().all(|r| !r.legal));
        assert_eq!(g.node_by_name("P").and_then(|n| n.level()), Some(1));
    }

    #[test]
    fn empty_region_is_legal() {
        let mut g = DataflowGraph::new();
        g.add_region("empty", span());
        let outcome = check_legality(&mut g, ScheduleOptions::default());
        assert!(outcome.illegal.is_empty());
        assert!(g.regions[0].legal);
    }

    #[test]
    fn legality_is_recomputed_not_sticky() {
        let mut g = two_regions();
        g.regions[1].legal = true;
        let cert = verify_schedule(&g);
        assert!(!cert.l1_legal_regions_leveled);
        check_legality(&mut g, ScheduleOptions::default());
        assert!(!g.regions[1].legal);
    }
}
