// layout.rs — Array partition pass: layout rewriting and its driver
//
// For each top-level loop nest with a pipelined loop, collects accesses,
// selects per-dimension partitions (reads first, then writes) and installs
// the resulting layout on the array.
//
// Preconditions: `module` was produced by resolve without errors.
// Postconditions: every partitioned array carries a layout with `rank`
//                 partition and `rank` address expressions.
// Failure modes: none.
// Side effects: mutates `Array::ty` in place. An array partitioned by both
//               reads and writes keeps the layout applied last (writes);
//               the two decisions are not reconciled.

use std::collections::BTreeMap;

use crate::collect::{collect_accesses, find_pipeline_loop};
use crate::id::{ArrayId, LoopId};
use crate::ir::{AccessKind, Layout, MemRefType, Module};
use crate::partition::{partition_array, ArrayPartition, DimDecision, PartitionMode};

// ── Public types ────────────────────────────────────────────────────────────

/// A partition decision that was installed on an array.
#[derive(Debug, Clone)]
pub struct AppliedPartition {
    pub decision: ArrayPartition,
    /// Kind of the decision this one replaced during the same run, if any.
    pub replaced: Option<AccessKind>,
}

/// Outcome of the array partition pass.
#[derive(Debug, Default)]
pub struct PartitionResult {
    /// Applied decisions in application order.
    pub applied: Vec<AppliedPartition>,
    /// Pipelined loop chosen for each nest (`None` = nest skipped).
    pub pipeline_loops: Vec<Option<LoopId>>,
}

impl PartitionResult {
    /// The decision currently installed on `array` (the last one applied).
    pub fn final_decision(&self, array: ArrayId) -> Option<&ArrayPartition> {
        self.applied
            .iter()
            .rev()
            .map(|a| &a.decision)
            .find(|d| d.array == array)
    }
}

// ── Layout rewriting ────────────────────────────────────────────────────────

/// Replace the type of `array` with one carrying `layout` (same shape,
/// element type and memory space). Returns the previous layout.
pub fn rewrite_layout(module: &mut Module, array: ArrayId, layout: Layout) -> Option<Layout> {
    let arr = module.array_mut(array);
    let new_ty = MemRefType {
        shape: arr.ty.shape.clone(),
        element_type: arr.ty.element_type.clone(),
        layout: Some(layout),
        memory_space: arr.ty.memory_space,
    };
    std::mem::replace(&mut arr.ty, new_ty).layout
}

// ── Pass driver ─────────────────────────────────────────────────────────────

/// Run array partitioning over every loop nest of `module`.
pub fn run_array_partition(module: &mut Module) -> PartitionResult {
    let mut result = PartitionResult::default();
    let mut last_kind: BTreeMap<ArrayId, AccessKind> = BTreeMap::new();

    for nest_idx in 0..module.nests.len() {
        let decisions = {
            let nest = &module.nests[nest_idx];
            let Some(scope) = find_pipeline_loop(&nest.root) else {
                tracing::debug!(nest = nest_idx, "no pipelined loop; nest skipped");
                result.pipeline_loops.push(None);
                continue;
            };
            result.pipeline_loops.push(Some(scope.id));

            let maps = collect_accesses(scope);
            let mut decisions = Vec::new();
            for kind in [AccessKind::Read, AccessKind::Write] {
                for (&array, sites) in maps.get(kind) {
                    decisions.push(partition_array(array, &module.array(array).ty, kind, sites));
                }
            }
            decisions
        };

        for decision in decisions {
            let replaced = last_kind.insert(decision.array, decision.kind);
            if let Some(prev) = replaced {
                tracing::debug!(
                    array = %module.array(decision.array).name,
                    previous = %prev,
                    current = %decision.kind,
                    "layout decision overwritten"
                );
            }
            rewrite_layout(module, decision.array, decision.layout.clone());
            result.applied.push(AppliedPartition { decision, replaced });
        }
    }

    result
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Indices checked per dimension by the round-trip obligation.
const ROUND_TRIP_LIMIT: u64 = 4096;

/// Machine-checkable evidence for partition postconditions (P1-P3).
#[derive(Debug, Clone)]
pub struct PartitionCert {
    /// P1: every installed layout has `rank` partition expressions and
    /// references no dimension beyond its rank.
    pub p1_partition_arity: bool,
    /// P2: every installed layout has `rank` address expressions.
    pub p2_address_arity: bool,
    /// P3: (bank, offset) maps back to the original index in every dimension.
    pub p3_round_trip: bool,
}

impl crate::pass::StageCert for PartitionCert {
    fn all_pass(&self) -> bool {
        self.p1_partition_arity && self.p2_address_arity && self.p3_round_trip
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("P1_partition_arity", self.p1_partition_arity),
            ("P2_address_arity", self.p2_address_arity),
            ("P3_round_trip", self.p3_round_trip),
        ]
    }
}

/// Verify partition postconditions against the final module state.
pub fn verify_partition(module: &Module, result: &PartitionResult) -> PartitionCert {
    let mut p1 = true;
    let mut p2 = true;
    for array in &module.arrays {
        if let Some(layout) = &array.ty.layout {
            let rank = array.ty.rank();
            let in_range = layout
                .results()
                .all(|e| e.max_dim().map_or(true, |m| (m as usize) < rank));
            p1 &= layout.partition().len() == rank && in_range;
            p2 &= layout.address().len() == rank;
        }
    }

    let p3 = result.applied.iter().all(|applied| {
        let decision = &applied.decision;
        let shape = &module.array(decision.array).ty.shape;
        decision
            .dims
            .iter()
            .all(|dim| round_trips(&decision.layout, dim, shape[dim.dim]))
    });

    PartitionCert {
        p1_partition_arity: p1,
        p2_address_arity: p2,
        p3_round_trip: p3,
    }
}

fn round_trips(layout: &Layout, decision: &DimDecision, size: u64) -> bool {
    let d = decision.dim;
    let rank = layout.rank();
    if d >= rank {
        return false;
    }
    let mut index = vec![0i64; rank];
    for i in 0..size.min(ROUND_TRIP_LIMIT) as i64 {
        index[d] = i;
        let Some(tuple) = layout.apply(&index) else {
            return false;
        };
        let (Some(&bank), Some(&offset)) = (tuple.get(d), tuple.get(rank + d)) else {
            return false;
        };
        let ok = match decision.mode {
            PartitionMode::None => bank == 0 && offset == i,
            PartitionMode::Cyclic { factor } => {
                let f = factor as i64;
                (0..f).contains(&bank) && f * offset + bank == i
            }
            PartitionMode::Block { block_size, .. } => {
                let b = block_size as i64;
                (0..b).contains(&offset) && b * bank + offset == i
            }
        };
        if !ok {
            return false;
        }
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::id::LoopId;
    use crate::ir::{Access, Array, Loop, LoopItem, LoopNest};
    use crate::pass::StageCert;

    fn module_with(shape: Vec<u64>, pipeline: bool, accesses: Vec<(AccessKind, Expr)>) -> Module {
        let body = accesses
            .into_iter()
            .map(|(kind, index)| {
                LoopItem::Access(Access {
                    array: ArrayId(0),
                    indices: vec![index],
                    kind,
                })
            })
            .collect();
        Module {
            arrays: vec![Array {
                id: ArrayId(0),
                name: "A".into(),
                ty: MemRefType {
                    shape,
                    element_type: "f32".into(),
                    layout: None,
                    memory_space: 1,
                },
            }],
            nests: vec![LoopNest {
                root: Loop {
                    id: LoopId(0),
                    iv: 0,
                    lower: 0,
                    upper: 8,
                    step: 1,
                    pipeline,
                    body,
                },
                induction_vars: vec!["i".into()],
            }],
            dataflow: Default::default(),
        }
    }

    #[test]
    fn rewrite_preserves_type_and_returns_previous() {
        let mut m = module_with(vec![8], true, vec![]);
        let d0 = Expr::dim(0);
        let first = Layout::new(vec![Expr::constant(0)], vec![d0.clone()]);
        assert_eq!(rewrite_layout(&mut m, ArrayId(0), first.clone()), None);
        let second = Layout::new(vec![d0.clone().modulo(2)], vec![d0.floor_div(2)]);
        assert_eq!(
            rewrite_layout(&mut m, ArrayId(0), second.clone()),
            Some(first)
        );
        let ty = &m.array(ArrayId(0)).ty;
        assert_eq!(ty.shape, vec![8]);
        assert_eq!(ty.element_type, "f32");
        assert_eq!(ty.memory_space, 1);
        assert_eq!(ty.layout, Some(second));
    }

    #[test]
    fn nest_without_pipeline_is_untouched() {
        let i = Expr::dim(0);
        let mut m = module_with(
            vec![8],
            false,
            vec![(AccessKind::Read, i.clone()), (AccessKind::Read, i + 1)],
        );
        let result = run_array_partition(&mut m);
        assert!(result.applied.is_empty());
        assert_eq!(result.pipeline_loops, vec![None]);
        assert_eq!(m.array(ArrayId(0)).ty.layout, None);
    }

    #[test]
    fn writes_overwrite_reads() {
        let i = Expr::dim(0);
        let mut m = module_with(
            vec![8],
            true,
            vec![
                (AccessKind::Read, i.clone()),
                (AccessKind::Read, i.clone() + 1),
                (AccessKind::Read, i.clone() + 2),
                (AccessKind::Write, i.clone()),
            ],
        );
        let result = run_array_partition(&mut m);
        assert_eq!(result.applied.len(), 2);
        assert_eq!(result.applied[0].decision.kind, AccessKind::Read);
        assert_eq!(result.applied[0].replaced, None);
        assert_eq!(result.applied[1].replaced, Some(AccessKind::Read));
        let last = result.final_decision(ArrayId(0)).map(|d| d.kind);
        assert_eq!(last, Some(AccessKind::Write));
        let layout = m.array(ArrayId(0)).ty.layout.clone();
        assert_eq!(
            layout.map(|l| l.to_string()),
            Some("(d0) -> (0, d0)".to_string())
        );
    }

    #[test]
    fn cert_passes_for_cyclic_and_block() {
        let i = Expr::dim(0);
        let mut cyclic = module_with(
            vec![8],
            true,
            vec![(AccessKind::Read, i.clone()), (AccessKind::Read, i + 1)],
        );
        let result = run_array_partition(&mut cyclic);
        assert!(verify_partition(&cyclic, &result).all_pass());

        let mut block = module_with(
            vec![9],
            true,
            vec![
                (AccessKind::Write, Expr::constant(0)),
                (AccessKind::Write, Expr::constant(7)),
            ],
        );
        let result = run_array_partition(&mut block);
        assert_eq!(
            result.applied[0].decision.dims[0].mode,
            PartitionMode::Block {
                factor: 2,
                block_size: 5
            }
        );
        let cert = verify_partition(&block, &result);
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn cert_rejects_layout_over_foreign_dimension() {
        let mut m = module_with(vec![8], true, vec![]);
        let stray = Layout::new(vec![Expr::dim(1).modulo(2)], vec![Expr::dim(0)]);
        rewrite_layout(&mut m, ArrayId(0), stray);
        let cert = verify_partition(&m, &PartitionResult::default());
        assert!(!cert.p1_partition_arity);
        assert!(cert.p2_address_arity);
        assert!(!cert.all_pass());
    }
}
