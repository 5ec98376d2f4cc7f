// ir.rs — In-memory IR consumed and mutated by the optimization passes
//
// Two independent parts:
//   * arrays + loop nests with memory accesses (array partitioning input),
//   * a dataflow graph of nodes, buffers and schedule regions (level
//     scheduling input).
//
// Arrays are owned by a single arena on `Module`; access sites refer to them
// by `ArrayId`, so replacing an array's type is visible to every site.
//
// Preconditions: built by `resolve` (or by the builder API in tests).
// Postconditions: buffer producer/consumer lists mirror node port lists.
// Failure modes: none (data-only module).
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::ast::Span;
use crate::expr::Expr;
use crate::id::*;

// ── Arrays ──────────────────────────────────────────────────────────────────

/// Layout map from a logical index tuple to `(bank..., offset...)`.
///
/// Holds `rank` partition-select expressions followed by `rank` address
/// expressions, all over array dimensions `d0..d{rank-1}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    partition: Vec<Expr>,
    address: Vec<Expr>,
}

impl Layout {
    pub fn new(partition: Vec<Expr>, address: Vec<Expr>) -> Self {
        debug_assert_eq!(partition.len(), address.len());
        Layout { partition, address }
    }

    pub fn rank(&self) -> usize {
        self.partition.len()
    }

    pub fn partition(&self) -> &[Expr] {
        &self.partition
    }

    pub fn address(&self) -> &[Expr] {
        &self.address
    }

    /// The `2·rank` result expressions: partition selectors, then addresses.
    pub fn results(&self) -> impl Iterator<Item = &Expr> {
        self.partition.iter().chain(self.address.iter())
    }

    /// Map a logical index to its `(bank..., offset...)` tuple.
    pub fn apply(&self, index: &[i64]) -> Option<Vec<i64>> {
        self.results().map(|e| e.eval(index)).collect()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = (0..self.rank()).map(|d| format!("d{}", d)).collect();
        let results: Vec<String> = self.results().map(|e| e.to_string()).collect();
        write!(f, "({}) -> ({})", dims.join(", "), results.join(", "))
    }
}

/// Type of an on-chip array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRefType {
    pub shape: Vec<u64>,
    pub element_type: String,
    /// `None` is the identity layout.
    pub layout: Option<Layout>,
    pub memory_space: u32,
}

impl MemRefType {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// An array with a mutable type. Owned by `Module::arrays`.
#[derive(Debug, Clone)]
pub struct Array {
    pub id: ArrayId,
    pub name: String,
    pub ty: MemRefType,
}

// ── Loop nests ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// A memory access inside a loop body. Index expressions range over the
/// induction variables of the enclosing nest.
#[derive(Debug, Clone)]
pub struct Access {
    pub array: ArrayId,
    pub indices: Vec<Expr>,
    pub kind: AccessKind,
}

#[derive(Debug, Clone)]
pub enum LoopItem {
    Loop(Loop),
    Access(Access),
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub id: LoopId,
    /// Position of this loop's induction variable in `LoopNest::induction_vars`.
    pub iv: u32,
    pub lower: i64,
    pub upper: i64,
    pub step: i64,
    pub pipeline: bool,
    pub body: Vec<LoopItem>,
}

impl Loop {
    /// Pre-order walk over this loop and every nested loop.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Loop)) {
        f(self);
        for item in &self.body {
            if let LoopItem::Loop(inner) = item {
                inner.walk(f);
            }
        }
    }

    /// Visit every access in the body, including nested loops, in program order.
    pub fn walk_accesses<'a>(&'a self, f: &mut impl FnMut(&'a Access)) {
        for item in &self.body {
            match item {
                LoopItem::Loop(inner) => inner.walk_accesses(f),
                LoopItem::Access(access) => f(access),
            }
        }
    }
}

/// A top-level loop nest plus the names of its induction variables
/// (indexed by `Expr::Dim`).
#[derive(Debug, Clone)]
pub struct LoopNest {
    pub root: Loop,
    pub induction_vars: Vec<String>,
}

// ── Dataflow graph ──────────────────────────────────────────────────────────

/// Scheduling state of a dataflow node. Transitions at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unscheduled,
    Scheduled(u32),
}

#[derive(Debug, Clone)]
pub struct DataflowNode {
    pub id: NodeId,
    pub name: String,
    pub region: RegionId,
    pub inputs: Vec<BufferId>,
    pub outputs: Vec<BufferId>,
    pub span: Span,
    state: NodeState,
}

impl DataflowNode {
    pub fn level(&self) -> Option<u32> {
        match self.state {
            NodeState::Unscheduled => None,
            NodeState::Scheduled(level) => Some(level),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.level().is_some()
    }

    /// Assign a level. Returns `false` (leaving the node untouched) if the
    /// node already has one.
    pub fn assign_level(&mut self, level: u32) -> bool {
        match self.state {
            NodeState::Unscheduled => {
                self.state = NodeState::Scheduled(level);
                true
            }
            NodeState::Scheduled(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    pub name: String,
    pub producers: Vec<NodeId>,
    pub consumers: Vec<NodeId>,
}

impl Buffer {
    /// Exactly one producer and exactly one consumer.
    pub fn is_well_formed(&self) -> bool {
        self.producers.len() == 1 && self.consumers.len() == 1
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRegion {
    pub id: RegionId,
    pub name: String,
    pub nodes: Vec<NodeId>,
    /// Set only by `legality::check_legality`.
    pub legal: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct DataflowGraph {
    pub nodes: Vec<DataflowNode>,
    pub buffers: Vec<Buffer>,
    pub regions: Vec<ScheduleRegion>,
    buffer_names: HashMap<String, BufferId>,
    ids: IdAllocator,
}

impl DataflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, name: impl Into<String>, span: Span) -> RegionId {
        let id = self.ids.alloc_region();
        self.regions.push(ScheduleRegion {
            id,
            name: name.into(),
            nodes: Vec::new(),
            legal: false,
            span,
        });
        id
    }

    /// Look up a buffer by name, creating it on first use.
    pub fn intern_buffer(&mut self, name: &str) -> BufferId {
        if let Some(&id) = self.buffer_names.get(name) {
            return id;
        }
        let id = self.ids.alloc_buffer();
        self.buffers.push(Buffer {
            id,
            name: name.to_string(),
            producers: Vec::new(),
            consumers: Vec::new(),
        });
        self.buffer_names.insert(name.to_string(), id);
        id
    }

    /// Add a node to `region`, registering it as consumer of `inputs` and
    /// producer of `outputs`.
    pub fn add_node(
        &mut self,
        region: RegionId,
        name: impl Into<String>,
        inputs: Vec<BufferId>,
        outputs: Vec<BufferId>,
        span: Span,
    ) -> NodeId {
        let id = self.ids.alloc_node();
        for &b in &inputs {
            let consumers = &mut self.buffers[b.index()].consumers;
            if !consumers.contains(&id) {
                consumers.push(id);
            }
        }
        for &b in &outputs {
            let producers = &mut self.buffers[b.index()].producers;
            if !producers.contains(&id) {
                producers.push(id);
            }
        }
        self.regions[region.index()].nodes.push(id);
        self.nodes.push(DataflowNode {
            id,
            name: name.into(),
            region,
            inputs,
            outputs,
            span,
            state: NodeState::Unscheduled,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &DataflowNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DataflowNode {
        &mut self.nodes[id.index()]
    }

    pub fn buffer(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.index()]
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<&Buffer> {
        self.buffer_names.get(name).map(|&id| self.buffer(id))
    }

    /// First node with the given name, in declaration order.
    pub fn node_by_name(&self, name: &str) -> Option<&DataflowNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn region_by_name(&self, name: &str) -> Option<&ScheduleRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub arrays: Vec<Array>,
    pub nests: Vec<LoopNest>,
    pub dataflow: DataflowGraph,
}

impl Module {
    pub fn array(&self, id: ArrayId) -> &Array {
        &self.arrays[id.index()]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut Array {
        &mut self.arrays[id.index()]
    }

    pub fn array_by_name(&self, name: &str) -> Option<&Array> {
        self.arrays.iter().find(|a| a.name == name)
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for array in &self.arrays {
            let shape: Vec<String> = array.ty.shape.iter().map(|s| s.to_string()).collect();
            write!(
                f,
                "array {}[{}] : {}",
                array.name,
                shape.join(", "),
                array.ty.element_type
            )?;
            if array.ty.memory_space != 0 {
                write!(f, " @ {}", array.ty.memory_space)?;
            }
            if let Some(layout) = &array.ty.layout {
                write!(f, " layout {}", layout)?;
            }
            writeln!(f)?;
        }
        for nest in &self.nests {
            self.fmt_loop(f, &nest.root, &nest.induction_vars, 0)?;
        }
        for region in &self.dataflow.regions {
            write!(f, "region {}", region.name)?;
            if region.legal {
                write!(f, " legal")?;
            }
            writeln!(f, " {{")?;
            for &id in &region.nodes {
                let node = self.dataflow.node(id);
                let names = |ids: &[BufferId]| -> String {
                    ids.iter()
                        .map(|&b| self.dataflow.buffer(b).name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(f, "  node {}({})", node.name, names(&node.inputs))?;
                if !node.outputs.is_empty() {
                    write!(f, " -> ({})", names(&node.outputs))?;
                }
                if let Some(level) = node.level() {
                    write!(f, " level {}", level)?;
                }
                writeln!(f)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

impl Module {
    fn fmt_loop(
        &self,
        f: &mut fmt::Formatter<'_>,
        lp: &Loop,
        names: &[String],
        depth: usize,
    ) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let var = names.get(lp.iv as usize).map(String::as_str).unwrap_or("?");
        write!(
            f,
            "{}loop {} = {} to {} step {}",
            indent, var, lp.lower, lp.upper, lp.step
        )?;
        if lp.pipeline {
            write!(f, " pipeline")?;
        }
        writeln!(f, " {{")?;
        for item in &lp.body {
            match item {
                LoopItem::Loop(inner) => self.fmt_loop(f, inner, names, depth + 1)?,
                LoopItem::Access(access) => {
                    let indices: Vec<String> = access
                        .indices
                        .iter()
                        .map(|e| e.named(names).to_string())
                        .collect();
                    writeln!(
                        f,
                        "{}  {} {}[{}]",
                        indent,
                        access.kind,
                        self.array(access.array).name,
                        indices.join(", ")
                    )?;
                }
            }
        }
        writeln!(f, "{}}}", indent)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
