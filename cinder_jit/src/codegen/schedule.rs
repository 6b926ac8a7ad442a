//! Basic-block schedule of a finished graph.
//!
//! The graph only orders nodes through their edges. Before code can be
//! emitted every node needs a block and a position in it:
//!
//! 1. Control nodes are grouped into blocks. A block starts at `Start`, a
//!    `Merge`/`Loop`, or a projection of a branching node (`IfTrue`,
//!    `IfValue`, `IfSuccess`, ...).
//! 2. Blocks are ordered in reverse postorder and the dominator tree is
//!    computed over that order.
//! 3. Nodes with a control input are fixed in the block of that input.
//!    Floating nodes go to the deepest block among their inputs' blocks.
//! 4. Each block is ordered topologically, its terminator last.

use smallvec::SmallVec;

use crate::error::ScheduleError;
use crate::ir::arena::{Arena, BitSet, Id, SecondaryMap};
use crate::ir::operators::{ControlOp, Operator};
use crate::ir::{Graph, Node, NodeId};

// =============================================================================
// Basic Block
// =============================================================================

#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Control node that opens the block.
    pub start: NodeId,
    pub predecessors: SmallVec<[BlockId; 2]>,
    pub successors: SmallVec<[BlockId; 2]>,
    /// Scheduled nodes, the block start first.
    pub nodes: Vec<NodeId>,
    /// Control node that leaves the block, if it is not a plain fallthrough.
    pub terminator: Option<NodeId>,
    /// Position in reverse postorder.
    pub rpo_number: u32,
    /// Depth in the dominator tree.
    pub dominator_depth: u32,
    pub immediate_dominator: Option<BlockId>,
}

impl BasicBlock {
    fn new(start: NodeId) -> Self {
        BasicBlock {
            start,
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
            nodes: Vec::new(),
            terminator: None,
            rpo_number: u32::MAX,
            dominator_depth: 0,
            immediate_dominator: None,
        }
    }

    #[inline]
    pub fn is_loop_header(&self, graph: &Graph) -> bool {
        matches!(graph.op(self.start), Operator::Control(ControlOp::Loop(_)))
    }
}

pub type BlockId = Id<BasicBlock>;

fn is_block_start(op: Operator) -> bool {
    matches!(
        op,
        Operator::Control(
            ControlOp::Start
                | ControlOp::Merge(_)
                | ControlOp::Loop(_)
                | ControlOp::IfTrue
                | ControlOp::IfFalse
                | ControlOp::IfValue(_)
                | ControlOp::IfDefault
                | ControlOp::IfSuccess
                | ControlOp::IfException
        )
    )
}

/// Inputs that constrain order within a block. Merge points take theirs
/// from predecessors.
fn ordering_inputs(node: &Node) -> &[NodeId] {
    if is_block_start(node.op) || node.op.is_phi() {
        &[]
    } else {
        &node.inputs
    }
}

// =============================================================================
// Schedule
// =============================================================================

#[derive(Debug, Clone)]
pub struct Schedule {
    blocks: Arena<BasicBlock>,
    rpo: Vec<BlockId>,
    block_of: SecondaryMap<Node, BlockId>,
    entry: BlockId,
}

impl Schedule {
    /// Schedule every node reachable from `End`.
    pub fn compute(graph: &Graph) -> Result<Self, ScheduleError> {
        let mut builder = ScheduleBuilder::new(graph);
        builder.collect_reachable();
        builder.build_blocks()?;
        builder.compute_rpo();
        builder.compute_dominators();
        builder.place_fixed()?;
        builder.place_floating()?;
        builder.order_blocks()?;

        let ScheduleBuilder {
            blocks,
            rpo,
            block_of,
            entry,
            ..
        } = builder;
        log::trace!("scheduled {} blocks", rpo.len());
        Ok(Schedule {
            blocks,
            rpo,
            block_of,
            entry,
        })
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Blocks in reverse postorder.
    #[inline]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn iter_rpo(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.rpo.iter().map(move |&id| (id, &self.blocks[id]))
    }

    /// Number of reachable blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.rpo.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rpo.is_empty()
    }

    /// Block `node` was placed in.
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.block_of.get(node).copied().filter(|id| id.is_valid())
    }

    /// Check whether `a` dominates `b`.
    pub fn dominates(&self, a: BlockId, mut b: BlockId) -> bool {
        loop {
            if a == b {
                return true;
            }
            match self.blocks[b].immediate_dominator {
                Some(idom) if idom != b => b = idom,
                _ => return false,
            }
        }
    }

    /// Total number of scheduled nodes.
    pub fn node_count(&self) -> usize {
        self.rpo.iter().map(|&id| self.blocks[id].nodes.len()).sum()
    }
}

// =============================================================================
// Builder
// =============================================================================

struct ScheduleBuilder<'g> {
    graph: &'g Graph,
    reachable: BitSet,
    blocks: Arena<BasicBlock>,
    rpo: Vec<BlockId>,
    block_of: SecondaryMap<Node, BlockId>,
    entry: BlockId,
}

impl<'g> ScheduleBuilder<'g> {
    fn new(graph: &'g Graph) -> Self {
        ScheduleBuilder {
            graph,
            reachable: BitSet::with_capacity(graph.len()),
            blocks: Arena::new(),
            rpo: Vec::new(),
            block_of: SecondaryMap::with_len(graph.len()),
            entry: BlockId::INVALID,
        }
    }

    fn collect_reachable(&mut self) {
        let mut stack = vec![self.graph.end, self.graph.start];
        while let Some(id) = stack.pop() {
            if !self.reachable.insert(id.as_usize()) {
                continue;
            }
            stack.extend(self.graph.node(id).inputs.iter().copied());
        }
    }

    fn reachable_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.reachable
            .iter()
            .map(|index| NodeId::new(index as u32))
            .filter(move |&id| id != self.graph.end)
    }

    /// Block a control-producing node belongs to.
    fn control_block(&mut self, node: NodeId) -> Result<BlockId, ScheduleError> {
        let mut path: SmallVec<[NodeId; 8]> = SmallVec::new();
        let mut current = node;
        let block = loop {
            let known = self.block_of[current];
            if known.is_valid() {
                break known;
            }
            let op = self.graph.op(current);
            if op.layout().controls == 0 || (op.is_terminator() && current != node) {
                return Err(ScheduleError::UnexpectedControl {
                    node: current,
                    op: op.mnemonic(),
                });
            }
            path.push(current);
            current = self.graph.control_input(current);
        };
        for id in path {
            self.block_of.set(id, block);
        }
        Ok(block)
    }

    fn build_blocks(&mut self) -> Result<(), ScheduleError> {
        let starts: Vec<NodeId> = self
            .reachable_nodes()
            .filter(|&id| is_block_start(self.graph.op(id)))
            .collect();
        for &start in &starts {
            let block = self.blocks.alloc(BasicBlock::new(start));
            self.block_of.set(start, block);
            if start == self.graph.start {
                self.entry = block;
            }
        }

        for &start in &starts {
            let block = self.block_of[start];
            let layout = self.graph.op(start).layout();
            let first = layout.first_control_index();
            for index in first..first + layout.controls as usize {
                let input = self.graph.node(start).input(index);
                let predecessor = self.control_block(input)?;
                self.blocks[predecessor].successors.push(block);
                self.blocks[block].predecessors.push(predecessor);
                // A control node feeding another block ends its own block.
                if !is_block_start(self.graph.op(input)) {
                    self.blocks[predecessor].terminator = Some(input);
                }
            }
        }

        // Returns, throws and tail calls end their blocks at `End`.
        let graph = self.graph;
        for &terminator in &graph.node(graph.end).inputs {
            let block = self.control_block(terminator)?;
            self.blocks[block].terminator = Some(terminator);
        }
        Ok(())
    }

    fn compute_rpo(&mut self) {
        let mut visited = BitSet::with_capacity(self.blocks.len());
        let mut postorder = Vec::with_capacity(self.blocks.len());
        // (block, next successor index)
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited.insert(self.entry.as_usize());
        while let Some((block, next)) = stack.pop() {
            if let Some(&successor) = self.blocks[block].successors.get(next) {
                stack.push((block, next + 1));
                if visited.insert(successor.as_usize()) {
                    stack.push((successor, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        for (number, &block) in postorder.iter().enumerate() {
            self.blocks[block].rpo_number = number as u32;
        }
        self.rpo = postorder;
    }

    /// Cooper-Harvey-Kennedy over reverse postorder.
    fn compute_dominators(&mut self) {
        let entry = self.entry;
        self.blocks[entry].immediate_dominator = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &predecessor in &self.blocks[block].predecessors {
                    if self.blocks[predecessor].immediate_dominator.is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => predecessor,
                        Some(current) => self.intersect(predecessor, current),
                    });
                }
                if new_idom.is_some() && self.blocks[block].immediate_dominator != new_idom {
                    self.blocks[block].immediate_dominator = new_idom;
                    changed = true;
                }
            }
        }

        for &block in self.rpo.iter().skip(1) {
            let depth = self.blocks[block]
                .immediate_dominator
                .map(|idom| self.blocks[idom].dominator_depth + 1)
                .unwrap_or(0);
            self.blocks[block].dominator_depth = depth;
        }
    }

    fn intersect(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            while self.blocks[a].rpo_number > self.blocks[b].rpo_number {
                match self.blocks[a].immediate_dominator {
                    Some(idom) => a = idom,
                    None => return b,
                }
            }
            while self.blocks[b].rpo_number > self.blocks[a].rpo_number {
                match self.blocks[b].immediate_dominator {
                    Some(idom) => b = idom,
                    None => return a,
                }
            }
        }
        a
    }

    /// Place every node that has a control input.
    fn place_fixed(&mut self) -> Result<(), ScheduleError> {
        let fixed: Vec<NodeId> = self
            .reachable_nodes()
            .filter(|&id| {
                let op = self.graph.op(id);
                op.layout().controls > 0 && !is_block_start(op)
            })
            .collect();
        for id in fixed {
            let op = self.graph.op(id);
            let block = if op.is_control() {
                self.control_block(id)?
            } else {
                self.control_block(self.graph.control_input(id))?
            };
            self.block_of.set(id, block);
        }
        Ok(())
    }

    /// Block a value of `input` becomes available in.
    ///
    /// Results of a call that ends its block are available on the success
    /// edge.
    fn value_block(&self, input: NodeId) -> BlockId {
        let block = self.block_of[input];
        if block.is_valid()
            && self.blocks[block].terminator == Some(input)
            && matches!(self.graph.op(input), Operator::Call(_))
        {
            let success = self.graph.uses(input).iter().copied().find(|&user| {
                self.graph.op(user) == Operator::Control(ControlOp::IfSuccess)
            });
            if let Some(success) = success {
                return self.block_of[success];
            }
        }
        block
    }

    /// Place floating nodes after their inputs, inputs first.
    fn place_floating(&mut self) -> Result<(), ScheduleError> {
        const VISITING: u8 = 1;
        const DONE: u8 = 2;
        let graph = self.graph;
        let mut state = vec![0u8; self.graph.len()];
        let roots: Vec<NodeId> = self
            .reachable_nodes()
            .filter(|&id| !self.block_of[id].is_valid())
            .collect();

        for root in roots {
            if state[root.as_usize()] == DONE {
                continue;
            }
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            state[root.as_usize()] = VISITING;
            while let Some((id, next)) = stack.pop() {
                let node = graph.node(id);
                if let Some(&input) = node.inputs.get(next) {
                    stack.push((id, next + 1));
                    if self.block_of[input].is_valid() {
                        continue;
                    }
                    match state[input.as_usize()] {
                        DONE => {}
                        VISITING => return Err(ScheduleError::Cycle { node: input }),
                        _ => {
                            state[input.as_usize()] = VISITING;
                            stack.push((input, 0));
                        }
                    }
                    continue;
                }

                // All inputs placed: take the deepest of their blocks.
                let mut block = self.entry;
                for &input in &node.inputs {
                    let candidate = self.value_block(input);
                    if !candidate.is_valid() {
                        return Err(ScheduleError::Unplaced { node: input });
                    }
                    if self.blocks[candidate].dominator_depth > self.blocks[block].dominator_depth {
                        block = candidate;
                    }
                }
                self.block_of.set(id, block);
                state[id.as_usize()] = DONE;
            }
        }
        Ok(())
    }

    /// Topologically order each block: start, phis, body, terminator.
    fn order_blocks(&mut self) -> Result<(), ScheduleError> {
        let mut members: Vec<Vec<NodeId>> = vec![Vec::new(); self.blocks.len()];
        for id in self.reachable_nodes() {
            let block = self.block_of[id];
            if !block.is_valid() {
                return Err(ScheduleError::Unplaced { node: id });
            }
            if self.blocks[block].rpo_number == u32::MAX {
                // Only reachable backwards from `End`; no code is emitted.
                continue;
            }
            members[block.as_usize()].push(id);
        }

        let mut emitted = BitSet::with_capacity(self.graph.len());
        let mut visiting = BitSet::with_capacity(self.graph.len());
        for (index, nodes) in members.into_iter().enumerate() {
            let block = BlockId::new(index as u32);
            let start = self.blocks[block].start;
            let terminator = self.blocks[block].terminator;

            let mut order = vec![start];
            emitted.insert(start.as_usize());
            for &id in &nodes {
                if self.graph.op(id).is_phi() && emitted.insert(id.as_usize()) {
                    order.push(id);
                }
            }
            for &id in &nodes {
                if Some(id) == terminator || emitted.contains(id.as_usize()) {
                    continue;
                }
                self.visit_in_block(block, id, &mut emitted, &mut visiting, &mut order)?;
            }
            if let Some(terminator) = terminator {
                self.visit_in_block(block, terminator, &mut emitted, &mut visiting, &mut order)?;
            }
            self.blocks[block].nodes = order;
        }
        Ok(())
    }

    fn visit_in_block(
        &self,
        block: BlockId,
        root: NodeId,
        emitted: &mut BitSet,
        visiting: &mut BitSet,
        order: &mut Vec<NodeId>,
    ) -> Result<(), ScheduleError> {
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        visiting.insert(root.as_usize());
        while let Some((id, next)) = stack.pop() {
            let inputs = ordering_inputs(self.graph.node(id));
            if let Some(&input) = inputs.get(next) {
                stack.push((id, next + 1));
                if self.block_of[input] != block || emitted.contains(input.as_usize()) {
                    continue;
                }
                if !visiting.insert(input.as_usize()) {
                    return Err(ScheduleError::Cycle { node: input });
                }
                stack.push((input, 0));
                continue;
            }
            visiting.remove(id.as_usize());
            if emitted.insert(id.as_usize()) {
                order.push(id);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
