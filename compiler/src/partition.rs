// partition.rs — Per-dimension array partition strategy selection
//
// For every dimension of an array, looks at the distinct index expressions
// used by the accesses of one kind and picks a banking mode:
//
//   distance = max |constant difference between two indices| + 1
//   distance == 1      → None   (bank 0, address = d)
//   unique >= distance → Cyclic (factor = distance; bank = d mod f, addr = d floordiv f)
//   otherwise          → Block  (factor = unique; b = ceil(size / f);
//                                bank = d floordiv b, addr = d mod b)
//
// Preconditions: every site's index count equals the array rank.
// Postconditions: the produced layout has `rank` partition and `rank` address
//                 expressions over array dimensions.
// Failure modes: none; undecidable distances fall back to mode None.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::collect::AccessSite;
use crate::expr::{fold_difference, Expr};
use crate::id::ArrayId;
use crate::ir::{AccessKind, Layout, MemRefType};

// ── Public types ────────────────────────────────────────────────────────────

/// Banking mode chosen for one array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PartitionMode {
    None,
    Cyclic { factor: u64 },
    Block { factor: u64, block_size: u64 },
}

impl PartitionMode {
    /// Number of banks this dimension is split into.
    pub fn banks(&self) -> u64 {
        match self {
            PartitionMode::None => 1,
            PartitionMode::Cyclic { factor } | PartitionMode::Block { factor, .. } => *factor,
        }
    }
}

impl fmt::Display for PartitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionMode::None => write!(f, "none"),
            PartitionMode::Cyclic { factor } => write!(f, "cyclic(factor={})", factor),
            PartitionMode::Block { factor, block_size } => {
                write!(f, "block(factor={}, block={})", factor, block_size)
            }
        }
    }
}

/// Decision for one dimension, with the statistics that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimDecision {
    pub dim: usize,
    /// Number of structurally distinct index expressions.
    pub unique_indices: usize,
    /// Largest absolute constant difference between two distinct indices.
    pub max_distance: u64,
    #[serde(flatten)]
    pub mode: PartitionMode,
}

/// Partition decision for one array and one access kind.
#[derive(Debug, Clone)]
pub struct ArrayPartition {
    pub array: ArrayId,
    pub kind: AccessKind,
    pub dims: Vec<DimDecision>,
    pub layout: Layout,
}

// ── Selection ───────────────────────────────────────────────────────────────

/// Choose the banking mode for dimension `dim` of size `size` given the
/// indices observed there.
pub fn select_mode<'e>(
    indices: impl IntoIterator<Item = &'e Expr>,
    dim: usize,
    size: u64,
) -> DimDecision {
    let mut unique: Vec<&Expr> = Vec::new();
    for index in indices {
        if !unique.contains(&index) {
            unique.push(index);
        }
    }
    let count = unique.len();

    let mut max_distance: u64 = 0;
    for (i, a) in unique.iter().enumerate() {
        for b in &unique[i + 1..] {
            if let Some(diff) = fold_difference(b, a) {
                max_distance = max_distance.max(diff.unsigned_abs());
            }
        }
    }

    let distance = max_distance.saturating_add(1);
    let mode = if distance == 1 {
        PartitionMode::None
    } else if count as u64 >= distance {
        PartitionMode::Cyclic { factor: distance }
    } else {
        let factor = count as u64;
        PartitionMode::Block {
            factor,
            block_size: size.div_ceil(factor),
        }
    };

    DimDecision {
        dim,
        unique_indices: count,
        max_distance,
        mode,
    }
}

/// Partition-select and address expressions for one dimension.
pub fn dim_exprs(dim: usize, mode: PartitionMode) -> (Expr, Expr) {
    let d = Expr::dim(dim as u32);
    match mode {
        PartitionMode::None => (Expr::constant(0), d),
        PartitionMode::Cyclic { factor } => {
            let f = factor as i64;
            (d.clone().modulo(f), d.floor_div(f))
        }
        PartitionMode::Block { block_size, .. } => {
            let b = block_size as i64;
            (d.clone().floor_div(b), d.modulo(b))
        }
    }
}

/// Select a mode for every dimension of `ty` from `sites` and build the
/// resulting layout (`P ++ A`).
pub fn partition_array(
    array: ArrayId,
    ty: &MemRefType,
    kind: AccessKind,
    sites: &[AccessSite<'_>],
) -> ArrayPartition {
    let mut dims = Vec::with_capacity(ty.rank());
    let mut partition = Vec::with_capacity(ty.rank());
    let mut address = Vec::with_capacity(ty.rank());

    for (dim, &size) in ty.shape.iter().enumerate() {
        let decision = select_mode(sites.iter().filter_map(|s| s.indices.get(dim)), dim, size);
        let (p, a) = dim_exprs(dim, decision.mode);
        tracing::debug!(
            array = array.0,
            %kind,
            dim,
            unique = decision.unique_indices,
            max_distance = decision.max_distance,
            mode = %decision.mode,
            "partition decision"
        );
        partition.push(p);
        address.push(a);
        dims.push(decision);
    }

    ArrayPartition {
        array,
        kind,
        dims,
        layout: Layout::new(partition, address),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
