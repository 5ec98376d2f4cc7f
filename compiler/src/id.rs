// id.rs — Stable identifiers for hlsopt IR entities
//
// IDs are dense indices into the arenas held by `ir::Module`. They are
// allocated in source order during resolve, so every downstream pass sees
// a deterministic numbering.

use serde::Serialize;

/// Identifier of an array (index into `Module::arrays`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArrayId(pub u32);

/// Identifier of a loop (unique across all nests of a module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LoopId(pub u32);

/// Identifier of a dataflow node (index into `DataflowGraph::nodes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Identifier of a buffer (index into `DataflowGraph::buffers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(pub u32);

/// Identifier of a schedule region (index into `DataflowGraph::regions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegionId(pub u32);

impl ArrayId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BufferId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (source) order, ensuring deterministic assignment.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_array: u32,
    next_loop: u32,
    next_node: u32,
    next_buffer: u32,
    next_region: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_array(&mut self) -> ArrayId {
        let id = ArrayId(self.next_array);
        self.next_array += 1;
        id
    }

    pub fn alloc_loop(&mut self) -> LoopId {
        let id = LoopId(self.next_loop);
        self.next_loop += 1;
        id
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn alloc_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        id
    }

    pub fn alloc_region(&mut self) -> RegionId {
        let id = RegionId(self.next_region);
        self.next_region += 1;
        id
    }
}
