// collect.rs — Memory access collection for pipelined loops
//
// Locates the pipelined loop of a nest and gathers every array access under
// it, grouped per array and split into reads and writes.
//
// Preconditions: nest is a perfect loop nest (imperfect nests are not
//                supported by partitioning).
// Postconditions: each map lists sites in program order, keyed by ArrayId.
// Failure modes: none; a nest without a pipelined loop yields `None`.
// Side effects: none.

use std::collections::BTreeMap;

use crate::expr::Expr;
use crate::id::ArrayId;
use crate::ir::{Access, AccessKind, Loop};

/// One access to an array, borrowed from the loop body.
#[derive(Debug, Clone, Copy)]
pub struct AccessSite<'a> {
    pub array: ArrayId,
    pub indices: &'a [Expr],
    pub kind: AccessKind,
}

impl<'a> From<&'a Access> for AccessSite<'a> {
    fn from(access: &'a Access) -> Self {
        AccessSite {
            array: access.array,
            indices: &access.indices,
            kind: access.kind,
        }
    }
}

/// Access sites per array, for one access kind.
pub type AccessMap<'a> = BTreeMap<ArrayId, Vec<AccessSite<'a>>>;

#[derive(Debug, Default)]
pub struct AccessMaps<'a> {
    pub reads: AccessMap<'a>,
    pub writes: AccessMap<'a>,
}

impl<'a> AccessMaps<'a> {
    pub fn get(&self, kind: AccessKind) -> &AccessMap<'a> {
        match kind {
            AccessKind::Read => &self.reads,
            AccessKind::Write => &self.writes,
        }
    }
}

/// The pipelined loop of a nest: the last loop carrying the `pipeline`
/// annotation in a pre-order walk from `root` (the innermost one for a
/// perfect nest).
pub fn find_pipeline_loop(root: &Loop) -> Option<&Loop> {
    let mut found = None;
    root.walk(&mut |lp| {
        if lp.pipeline {
            found = Some(lp);
        }
    });
    found
}

/// Collect every access under `scope`, including nested loops.
pub fn collect_accesses(scope: &Loop) -> AccessMaps<'_> {
    let mut maps = AccessMaps::default();
    scope.walk_accesses(&mut |access| {
        let map = match access.kind {
            AccessKind::Read => &mut maps.reads,
            AccessKind::Write => &mut maps.writes,
        };
        map.entry(access.array).or_default().push(access.into());
    });
    maps
}
