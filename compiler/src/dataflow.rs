// dataflow.rs — ALAP level scheduling of dataflow nodes
//
// Assigns each node a level by fixpoint iteration over buffer
// producer/consumer relations. A node is ready once every consumer of each
// of its output buffers has a level; it then takes
//
//   level = max over outputs, over consumers (consumer.level + 1)
//
// and sinks (no outputs) take level 0. Unless violations are ignored, an
// output buffer with several producers or several consumers keeps its
// producer unscheduled.
//
// Preconditions: buffer producer/consumer lists mirror node ports.
// Postconditions: levels are write-once; every assigned level is strictly
//                 greater than the levels of the node's consumers.
// Failure modes: none; cycles and violations leave nodes unscheduled.
// Side effects: mutates node scheduling state in `graph`.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::id::{BufferId, NodeId};
use crate::ir::{DataflowGraph, DataflowNode};

// ── Public types ────────────────────────────────────────────────────────────

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleOptions {
    /// Schedule through multi-producer / multi-consumer buffers.
    pub ignore_violations: bool,
}

/// A buffer whose fan-in or fan-out kept its producer from being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    pub node: NodeId,
    pub buffer: BufferId,
}

/// Outcome of one scheduling run.
#[derive(Debug, Clone, Default)]
pub struct ScheduleStats {
    /// Scans performed, including the final scan that assigned nothing.
    pub rounds: u32,
    /// Number of nodes committed in each productive round.
    pub assigned_per_round: Vec<usize>,
    /// Nodes without a level after the fixpoint, in id order.
    pub unscheduled: Vec<NodeId>,
    /// Violations still blocking an unscheduled node at the fixpoint.
    pub violations: Vec<Violation>,
}

impl ScheduleStats {
    pub fn is_complete(&self) -> bool {
        self.unscheduled.is_empty()
    }
}

/// Result of evaluating one node against the current round's state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Ready(u32),
    /// Output buffers violating the one-producer/one-consumer rule.
    Blocked(Vec<BufferId>),
    /// Some consumer has no level yet.
    Waiting,
}

// ── Scheduling ──────────────────────────────────────────────────────────────

fn readiness(graph: &DataflowGraph, node: &DataflowNode, options: ScheduleOptions) -> Readiness {
    if !options.ignore_violations {
        let violating: Vec<BufferId> = node
            .outputs
            .iter()
            .copied()
            .filter(|&output| {
                let buffer = graph.buffer(output);
                buffer.consumers.len() > 1 || buffer.producers.len() > 1
            })
            .collect();
        if !violating.is_empty() {
            return Readiness::Blocked(violating);
        }
    }

    let mut level = 0u32;
    for &output in &node.outputs {
        for &consumer in &graph.buffer(output).consumers {
            match graph.node(consumer).level() {
                Some(l) => level = level.max(l.saturating_add(1)),
                None => return Readiness::Waiting,
            }
        }
    }
    Readiness::Ready(level)
}

/// Run ALAP level assignment to a fixpoint.
///
/// Each round evaluates every unscheduled node against the levels committed
/// by previous rounds, then commits all ready nodes at once. Already
/// scheduled nodes are never revisited, so the pass can be re-run safely.
pub fn schedule_nodes(graph: &mut DataflowGraph, options: ScheduleOptions) -> ScheduleStats {
    let mut stats = ScheduleStats::default();
    let mut blocked: BTreeSet<Violation> = BTreeSet::new();

    loop {
        stats.rounds += 1;
        let mut ready: Vec<(NodeId, u32)> = Vec::new();
        for node in graph.nodes.iter().filter(|n| !n.is_scheduled()) {
            match readiness(graph, node, options) {
                Readiness::Ready(level) => ready.push((node.id, level)),
                Readiness::Blocked(buffers) => {
                    for buffer in buffers {
                        blocked.insert(Violation {
                            node: node.id,
                            buffer,
                        });
                    }
                }
                Readiness::Waiting => {}
            }
        }

        tracing::trace!(round = stats.rounds, ready = ready.len(), "schedule round");
        if ready.is_empty() {
            break;
        }

        stats.assigned_per_round.push(ready.len());
        for (id, level) in ready {
            let node = graph.node_mut(id);
            let assigned = node.assign_level(level);
            debug_assert!(assigned, "node {:?} scheduled twice", id);
            tracing::debug!(node = %node.name, level, "node scheduled");
        }
    }

    stats.unscheduled = graph
        .nodes
        .iter()
        .filter(|n| !n.is_scheduled())
        .map(|n| n.id)
        .collect();
    stats.violations = blocked
        .into_iter()
        .filter(|v| !graph.node(v.node).is_scheduled())
        .collect();
    stats
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn span() -> Span {
        Span::from(0..0)
    }

    /// Build a single-region graph from `(name, inputs, outputs)` triples.
    fn graph(nodes: &[(&str, &[&str], &[&str])]) -> DataflowGraph {
        let mut g = DataflowGraph::new();
        let r = g.add_region("top", span());
        for (name, ins, outs) in nodes {
            let ins = ins.iter().map(|b| g.intern_buffer(b)).collect();
            let outs = outs.iter().map(|b| g.intern_buffer(b)).collect();
            g.add_node(r, *name, ins, outs, span());
        }
        g
    }

    fn level(g: &DataflowGraph, name: &str) -> Option<u32> {
        g.node_by_name(name).and_then(|n| n.level())
    }

    const STRICT: ScheduleOptions = ScheduleOptions {
        ignore_violations: false,
    };
    const PERMISSIVE: ScheduleOptions = ScheduleOptions {
        ignore_violations: true,
    };

    #[test]
    fn chain_levels_count_from_sink() {
        let mut g = graph(&[
            ("A", &[], &["buf1"]),
            ("B", &["buf1"], &["buf2"]),
            ("C", &["buf2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "C"), Some(0));
        assert_eq!(level(&g, "B"), Some(1));
        assert_eq!(level(&g, "A"), Some(2));
        assert!(stats.is_complete());
        assert_eq!(stats.assigned_per_round, vec![1, 1, 1]);
        assert_eq!(stats.rounds, 4);
    }

    #[test]
    fn sinks_schedule_in_first_round() {
        let mut g = graph(&[("X", &[], &[]), ("Y", &[], &[])]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "X"), Some(0));
        assert_eq!(level(&g, "Y"), Some(0));
        assert_eq!(stats.assigned_per_round, vec![2]);
    }

    #[test]
    fn fan_out_blocks_producer_when_strict() {
        let mut g = graph(&[
            ("A", &[], &["buf1"]),
            ("B", &["buf1"], &[]),
            ("D", &["buf1"], &["buf2"]),
            ("E", &["buf2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "A"), None);
        assert_eq!(level(&g, "B"), Some(0));
        assert_eq!(level(&g, "D"), Some(1));
        let a = g.node_by_name("A").map(|n| n.id);
        assert_eq!(stats.unscheduled.len(), 1);
        assert_eq!(Some(stats.unscheduled[0]), a);
        assert_eq!(stats.violations.len(), 1);
    }

    #[test]
    fn fan_out_takes_max_consumer_when_permissive() {
        let mut g = graph(&[
            ("A", &[], &["buf1"]),
            ("B", &["buf1"], &[]),
            ("D", &["buf1"], &["buf2"]),
            ("E", &["buf2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, PERMISSIVE);
        assert!(stats.is_complete());
        assert!(stats.violations.is_empty());
        assert_eq!(level(&g, "A"), Some(2));
    }

    #[test]
    fn fan_in_blocks_every_producer_when_strict() {
        let mut g = graph(&[("P", &[], &["m"]), ("Q", &[], &["m"]), ("C", &["m"], &[])]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "P"), None);
        assert_eq!(level(&g, "Q"), None);
        assert_eq!(level(&g, "C"), Some(0));
        assert_eq!(stats.violations.len(), 2);
    }

    #[test]
    fn violation_on_later_output_is_reported() {
        // A's first output waits on B, which is itself blocked by `f`.
        let mut g = graph(&[
            ("A", &[], &["b1", "b2"]),
            ("B", &["b1"], &["f"]),
            ("X", &["f"], &[]),
            ("Y", &["f"], &[]),
            ("C", &["b2"], &[]),
            ("D", &["b2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "A"), None);
        assert_eq!(level(&g, "B"), None);

        let named: Vec<(&str, &str)> = stats
            .violations
            .iter()
            .map(|v| {
                (
                    g.node(v.node).name.as_str(),
                    g.buffer(v.buffer).name.as_str(),
                )
            })
            .collect();
        assert!(named.contains(&("A", "b2")), "violations: {:?}", named);
        assert!(named.contains(&("B", "f")), "violations: {:?}", named);
        assert_eq!(named.len(), 2);
    }

    #[test]
    fn every_violating_output_is_reported() {
        let mut g = graph(&[
            ("A", &[], &["b1", "b2"]),
            ("C", &["b1"], &[]),
            ("D", &["b1"], &[]),
            ("E", &["b2"], &[]),
            ("F", &["b2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(stats.violations.len(), 2);
        assert!(stats.violations.iter().all(|v| g.node(v.node).name == "A"));
    }

    #[test]
    fn cycle_stays_unscheduled() {
        let mut g = graph(&[("A", &["b2"], &["b1"]), ("B", &["b1"], &["b2"])]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(stats.unscheduled.len(), 2);
        assert!(stats.violations.is_empty());
        assert_eq!(stats.rounds, 1);
    }

    #[test]
    fn output_without_consumer_is_level_zero() {
        let mut g = graph(&[("A", &[], &["dangling"])]);
        schedule_nodes(&mut g, STRICT);
        assert_eq!(level(&g, "A"), Some(0));
    }

    #[test]
    fn same_round_assignments_are_not_visible() {
        // Declared upstream-first: B may only see C's level one round later.
        let mut g = graph(&[
            ("A", &[], &["b1"]),
            ("B", &["b1"], &["b2"]),
            ("C", &["b2"], &[]),
        ]);
        let stats = schedule_nodes(&mut g, STRICT);
        assert_eq!(stats.assigned_per_round, vec![1, 1, 1]);

        // Declared sink-first: identical levels and rounds.
        let mut h = graph(&[
            ("C", &["b2"], &[]),
            ("B", &["b1"], &["b2"]),
            ("A", &[], &["b1"]),
        ]);
        let stats = schedule_nodes(&mut h, STRICT);
        assert_eq!(stats.assigned_per_round, vec![1, 1, 1]);
        assert_eq!(level(&h, "A"), Some(2));
    }

    #[test]
    fn rerun_does_not_change_levels() {
        let mut g = graph(&[("A", &[], &["b1"]), ("B", &["b1"], &[])]);
        schedule_nodes(&mut g, STRICT);
        let before: Vec<_> = g.nodes.iter().map(|n| n.level()).collect();
        let stats = schedule_nodes(&mut g, PERMISSIVE);
        let after: Vec<_> = g.nodes.iter().map(|n| n.level()).collect();
        assert_eq!(before, after);
        assert!(stats.assigned_per_round.is_empty());
    }
}
