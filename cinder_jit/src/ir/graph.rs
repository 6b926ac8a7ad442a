//! Arena-owned node graph.
//!
//! The graph provides:
//! - **Arena storage**: nodes live in one `Arena<Node>` and die together
//! - **Use lists**: every edge is mirrored in the def's use list
//! - **Edge-kind aware rewriting**: value, effect and control uses of a node
//!   can be redirected independently (`replace_with_value`)
//! - **Constant cache**: identical constants share one node
//! - **Verification**: structural checks before the graph is handed to a
//!   scheduler
//!
//! Input lists are edited in place during lowering (`replace_input`,
//! `insert_input`, `trim_input_count`, `change_op`). A node temporarily out
//! of sync with its operator's layout is allowed between edits; `verify`
//! reports any that remain.

use rustc_hash::FxHashMap;

use super::arena::{Arena, BitSet, SecondaryMap};
use super::node::{Inputs, Node, NodeId};
use super::operators::{CommentId, ControlOp, ExternalReference, Operator};
use super::types::Type;
use crate::calls::Builtin;
use crate::error::VerifyError;
use crate::heap::ObjectRef;

/// Kind of an input edge, derived from the user's input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Value,
    Context,
    FrameState,
    Effect,
    Control,
}

/// Structural copy of a node for before/after comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub op: Operator,
    pub inputs: Vec<NodeId>,
    pub ty: Type,
    pub dead: bool,
}

// =============================================================================
// Graph Structure
// =============================================================================

/// A graph for one compilation unit.
#[derive(Clone)]
pub struct Graph {
    nodes: Arena<Node>,

    /// For each node, the nodes that use it (one entry per edge).
    uses: SecondaryMap<Node, Vec<NodeId>>,

    /// Canonical node per constant operator.
    constants: FxHashMap<Operator, NodeId>,

    comments: Vec<String>,

    /// Control and effect entry.
    pub start: NodeId,

    /// Synthetic exit; every terminator is one of its inputs.
    pub end: NodeId,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(node_capacity: usize) -> Self {
        let mut nodes = Arena::with_capacity(node_capacity);
        let start = nodes.alloc(Node::new(Operator::Control(ControlOp::Start), &[]));
        let end = nodes.alloc(Node::new(Operator::Control(ControlOp::End(0)), &[]));
        Graph {
            nodes,
            uses: SecondaryMap::new(),
            constants: FxHashMap::default(),
            comments: Vec::new(),
            start,
            end,
        }
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn op(&self, id: NodeId) -> Operator {
        self.nodes[id].op
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> Type {
        self.nodes[id].ty
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph holds only `Start` and `End`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 2
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Ids of every node that has not been killed.
    pub fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.is_dead())
            .map(|(id, _)| id)
    }

    pub fn snapshot(&self, id: NodeId) -> NodeSnapshot {
        let node = &self.nodes[id];
        NodeSnapshot {
            op: node.op,
            inputs: node.inputs.to_vec(),
            ty: node.ty,
            dead: node.is_dead(),
        }
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Add a node. The input count must match the operator's layout.
    pub fn add_node(&mut self, op: Operator, inputs: &[NodeId]) -> NodeId {
        debug_assert_eq!(
            inputs.len(),
            op.layout().total(),
            "{} expects {} inputs",
            op,
            op.layout().total()
        );
        let id = self.nodes.alloc(Node::new(op, inputs));
        for &input in inputs {
            self.add_use(input, id);
        }
        id
    }

    pub fn add_node_with_type(&mut self, op: Operator, inputs: &[NodeId], ty: Type) -> NodeId {
        let id = self.add_node(op, inputs);
        self.nodes[id].ty = ty;
        id
    }

    pub fn set_type(&mut self, id: NodeId, ty: Type) {
        self.nodes[id].ty = ty;
    }

    pub(crate) fn flags_mut(&mut self, id: NodeId) -> &mut super::node::NodeFlags {
        &mut self.nodes[id].flags
    }

    // =========================================================================
    // Constants
    // =========================================================================

    /// Canonical node for a constant operator.
    pub fn constant(&mut self, op: Operator) -> NodeId {
        debug_assert!(op.is_constant(), "{} is not a constant", op);
        if let Some(&id) = self.constants.get(&op) {
            if !self.nodes[id].is_dead() {
                return id;
            }
        }
        let id = self.add_node(op, &[]);
        self.constants.insert(op, id);
        id
    }

    pub fn int32_constant(&mut self, value: i32) -> NodeId {
        let id = self.constant(Operator::Int32Constant(value));
        self.nodes[id].ty = Type::constant(value as f64);
        id
    }

    pub fn int64_constant(&mut self, value: i64) -> NodeId {
        self.constant(Operator::Int64Constant(value))
    }

    pub fn float64_constant(&mut self, value: f64) -> NodeId {
        self.constant(Operator::Float64Constant(value.to_bits()))
    }

    /// Tagged number constant, typed as its singleton.
    pub fn number_constant(&mut self, value: f64) -> NodeId {
        let id = self.constant(Operator::NumberConstant(value.to_bits()));
        self.nodes[id].ty = Type::constant(value);
        id
    }

    pub fn heap_constant(&mut self, object: ObjectRef) -> NodeId {
        self.constant(Operator::HeapConstant(object))
    }

    pub fn external_constant(&mut self, reference: ExternalReference) -> NodeId {
        self.constant(Operator::ExternalConstant(reference))
    }

    pub fn code_constant(&mut self, builtin: Builtin) -> NodeId {
        self.constant(Operator::CodeConstant(builtin))
    }

    /// Intern comment text for a `Comment` node.
    pub fn add_comment(&mut self, text: impl Into<String>) -> CommentId {
        self.comments.push(text.into());
        CommentId(self.comments.len() as u32 - 1)
    }

    pub fn comment_text(&self, id: CommentId) -> &str {
        self.comments
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    // =========================================================================
    // Use Lists
    // =========================================================================

    /// Users of `id`, one entry per edge.
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        self.uses.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn use_count(&self, id: NodeId) -> usize {
        self.uses(id).len()
    }

    /// `(user, input index)` for every edge pointing at `id`.
    pub fn use_edges(&self, id: NodeId) -> Vec<(NodeId, usize)> {
        let mut users = self.uses(id).to_vec();
        users.sort_unstable();
        users.dedup();
        let mut edges = Vec::with_capacity(users.len());
        for user in users {
            for (index, &input) in self.nodes[user].inputs.iter().enumerate() {
                if input == id {
                    edges.push((user, index));
                }
            }
        }
        edges
    }

    fn add_use(&mut self, def: NodeId, user: NodeId) {
        self.uses.entry(def).push(user);
    }

    fn remove_use(&mut self, def: NodeId, user: NodeId) {
        let uses = self.uses.entry(def);
        if let Some(pos) = uses.iter().position(|&u| u == user) {
            uses.swap_remove(pos);
        }
    }

    // =========================================================================
    // Input Accessors
    // =========================================================================

    /// Kind of input `index` of `user`.
    pub fn edge_kind(&self, user: NodeId, index: usize) -> EdgeKind {
        let layout = self.nodes[user].op.layout();
        if index < layout.values as usize {
            EdgeKind::Value
        } else if layout.context && index == layout.context_index() {
            EdgeKind::Context
        } else if layout.frame_state && index == layout.frame_state_index() {
            EdgeKind::FrameState
        } else if index < layout.first_control_index() {
            EdgeKind::Effect
        } else {
            EdgeKind::Control
        }
    }

    pub fn value_input(&self, id: NodeId, index: usize) -> NodeId {
        debug_assert!(index < self.nodes[id].op.layout().values as usize);
        self.nodes[id].inputs[index]
    }

    pub fn value_inputs(&self, id: NodeId) -> &[NodeId] {
        let node = &self.nodes[id];
        let count = (node.op.layout().values as usize).min(node.inputs.len());
        &node.inputs[..count]
    }

    pub fn context_input(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let layout = node.op.layout();
        layout
            .context
            .then(|| node.inputs[layout.context_index()])
    }

    pub fn frame_state_input(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let layout = node.op.layout();
        layout
            .frame_state
            .then(|| node.inputs[layout.frame_state_index()])
    }

    pub fn effect_input(&self, id: NodeId) -> NodeId {
        self.effect_input_at(id, 0)
    }

    pub fn effect_input_at(&self, id: NodeId, index: usize) -> NodeId {
        let node = &self.nodes[id];
        let layout = node.op.layout();
        debug_assert!(index < layout.effects as usize, "{} has no effect input {}", node.op, index);
        node.inputs[layout.first_effect_index() + index]
    }

    pub fn control_input(&self, id: NodeId) -> NodeId {
        self.control_input_at(id, 0)
    }

    pub fn control_input_at(&self, id: NodeId, index: usize) -> NodeId {
        let node = &self.nodes[id];
        let layout = node.op.layout();
        debug_assert!(index < layout.controls as usize, "{} has no control input {}", node.op, index);
        node.inputs[layout.first_control_index() + index]
    }

    // =========================================================================
    // Node Modification
    // =========================================================================

    pub fn replace_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        let old = self.nodes[node].inputs[index];
        if old == new_input {
            return;
        }
        self.remove_use(old, node);
        self.nodes[node].inputs[index] = new_input;
        self.add_use(new_input, node);
    }

    pub fn insert_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        self.nodes[node].inputs.insert(index, new_input);
        self.add_use(new_input, node);
    }

    pub fn remove_input(&mut self, node: NodeId, index: usize) {
        let old = self.nodes[node].inputs.remove(index);
        self.remove_use(old, node);
    }

    pub fn append_input(&mut self, node: NodeId, new_input: NodeId) {
        self.nodes[node].inputs.push(new_input);
        self.add_use(new_input, node);
    }

    /// Drop trailing inputs so that `count` remain.
    pub fn trim_input_count(&mut self, node: NodeId, count: usize) {
        while self.nodes[node].inputs.len() > count {
            if let Some(old) = self.nodes[node].inputs.pop() {
                self.remove_use(old, node);
            }
        }
    }

    /// Replace the operator, keeping the inputs.
    pub fn change_op(&mut self, node: NodeId, op: Operator) {
        self.nodes[node].op = op;
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        for (user, index) in self.use_edges(old) {
            self.nodes[user].inputs[index] = new;
            self.add_use(new, user);
        }
        self.uses.entry(old).clear();
    }

    /// Redirect the uses of `node` by edge kind.
    ///
    /// Value and context uses go to `value`, effect uses to `effect` and
    /// control uses to `control`. A missing `effect` or `control` defaults to
    /// the node's own effect or control input. Uses by an `IfSuccess`
    /// projection are forwarded past the projection.
    pub fn replace_with_value(
        &mut self,
        node: NodeId,
        value: NodeId,
        effect: Option<NodeId>,
        control: Option<NodeId>,
    ) {
        let layout = self.nodes[node].op.layout();
        let effect = effect.or_else(|| (layout.effects > 0).then(|| self.effect_input(node)));
        let control = control.or_else(|| (layout.controls > 0).then(|| self.control_input(node)));

        for (user, index) in self.use_edges(node) {
            if self.nodes[user].is_dead() {
                continue;
            }
            let replacement = match self.edge_kind(user, index) {
                EdgeKind::Control => {
                    let Some(control) = control else { continue };
                    if self.nodes[user].op == Operator::Control(ControlOp::IfSuccess) {
                        self.replace_all_uses(user, control);
                        self.kill(user);
                        continue;
                    }
                    control
                }
                EdgeKind::Effect => match effect {
                    Some(effect) => effect,
                    None => continue,
                },
                EdgeKind::Value | EdgeKind::Context | EdgeKind::FrameState => value,
            };
            self.replace_input(user, index, replacement);
        }
    }

    /// Move control uses of `node` to its control input.
    pub fn relax_controls(&mut self, node: NodeId) {
        self.replace_with_value(node, node, Some(node), None);
    }

    /// Disconnect `node` from its inputs and mark it dead.
    pub fn kill(&mut self, node: NodeId) {
        let inputs: Inputs = std::mem::take(&mut self.nodes[node].inputs);
        for input in inputs {
            self.remove_use(input, node);
        }
        self.nodes[node].mark_dead();
        let op = self.nodes[node].op;
        if op.is_constant() && self.constants.get(&op) == Some(&node) {
            self.constants.remove(&op);
        }
    }

    /// Connect a terminator (`Return`, `Throw`, `TailCall`) to `End`.
    pub fn merge_control_to_end(&mut self, terminator: NodeId) {
        let end = self.end;
        self.append_input(end, terminator);
        let count = self.nodes[end].inputs.len() as u32;
        self.nodes[end].op = Operator::Control(ControlOp::End(count));
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check the structural invariants a scheduler relies on.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let starts = self
            .iter()
            .filter(|(_, n)| !n.is_dead() && n.op == Operator::Control(ControlOp::Start))
            .count();
        if starts != 1 {
            return Err(VerifyError::StartCount { count: starts });
        }

        let mut control_used = BitSet::with_capacity(self.len());
        for (id, node) in self.iter() {
            if node.is_dead() {
                continue;
            }
            let expected = node.op.layout().total();
            if node.inputs.len() != expected {
                return Err(VerifyError::InputCount {
                    node: id,
                    op: node.op.mnemonic(),
                    expected,
                    actual: node.inputs.len(),
                });
            }
            for (index, &input) in node.inputs.iter().enumerate() {
                match self.get(input) {
                    None => {
                        return Err(VerifyError::InvalidInput {
                            node: id,
                            index,
                            input,
                        })
                    }
                    Some(def) if def.is_dead() => {
                        return Err(VerifyError::DeadInput { node: id, input })
                    }
                    Some(_) => {}
                }
                if self.edge_kind(id, index) == EdgeKind::Control {
                    control_used.insert(input.as_usize());
                }
            }
        }

        for (id, node) in self.iter() {
            if node.is_dead() || id == self.end || !node.op.is_control() {
                continue;
            }
            if !control_used.contains(id.as_usize()) {
                return Err(VerifyError::UnterminatedControl {
                    node: id,
                    op: node.op.mnemonic(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph ({} nodes):", self.nodes.len())?;
        for (id, node) in self.iter() {
            writeln!(f, "  {:?}: {:?}", id, node)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operators::{MachineOp, PretenureFlag};
    use crate::ir::types::MachineRepresentation;

    fn add(g: &mut Graph, a: NodeId, b: NodeId) -> NodeId {
        g.add_node(Operator::Machine(MachineOp::Int32Add), &[a, b])
    }

    fn ret(g: &mut Graph, value: NodeId, effect: NodeId, control: NodeId) -> NodeId {
        let pop = g.int32_constant(0);
        let r = g.add_node(
            Operator::Control(ControlOp::Return(1)),
            &[pop, value, effect, control],
        );
        g.merge_control_to_end(r);
        r
    }

    #[test]
    fn test_graph_creation() {
        let g = Graph::new();
        assert_eq!(g.len(), 2);
        assert!(g.is_empty());
        assert_eq!(g.op(g.start), Operator::Control(ControlOp::Start));
        assert_eq!(g.op(g.end), Operator::Control(ControlOp::End(0)));
    }

    #[test]
    fn test_constants_are_shared() {
        let mut g = Graph::new();
        let a = g.int32_constant(5);
        let b = g.int32_constant(5);
        let c = g.int32_constant(6);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(g.ty(a).is(Type::signed_small()));
    }

    #[test]
    fn test_use_lists_count_edges() {
        let mut g = Graph::new();
        let c = g.int32_constant(5);
        add(&mut g, c, c);
        add(&mut g, c, c);
        assert_eq!(g.use_count(c), 4);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut g = Graph::new();
        let c1 = g.int32_constant(5);
        let c2 = g.int32_constant(10);
        let sum = add(&mut g, c1, c1);

        g.replace_all_uses(c1, c2);

        assert_eq!(g.node(sum).inputs.as_slice(), &[c2, c2]);
        assert_eq!(g.use_count(c1), 0);
        assert_eq!(g.use_count(c2), 2);
    }

    #[test]
    fn test_insert_and_trim_inputs() {
        let mut g = Graph::new();
        let a = g.int32_constant(1);
        let b = g.int32_constant(2);
        let c = g.int32_constant(3);
        let sum = add(&mut g, a, b);

        g.insert_input(sum, 1, c);
        assert_eq!(g.node(sum).inputs.as_slice(), &[a, c, b]);
        g.trim_input_count(sum, 1);
        assert_eq!(g.node(sum).inputs.as_slice(), &[a]);
        assert_eq!(g.use_count(b), 0);
        assert_eq!(g.use_count(c), 0);
    }

    #[test]
    fn test_replace_with_value_by_edge_kind() {
        let mut g = Graph::new();
        let start = g.start;
        let size = g.int32_constant(16);
        let alloc = g.add_node(
            Operator::Allocate(PretenureFlag::NotTenured),
            &[size, start, start],
        );
        let value = g.int32_constant(1);
        let r = ret(&mut g, alloc, alloc, start);

        g.replace_with_value(alloc, value, None, None);

        // Value use goes to `value`, effect use to the allocation's effect.
        assert_eq!(g.node(r).input(1), value);
        assert_eq!(g.node(r).input(2), start);
    }

    #[test]
    fn test_relax_controls() {
        let mut g = Graph::new();
        let start = g.start;
        let target = g.heap_constant(ObjectRef::new(1));
        let context = g.heap_constant(ObjectRef::new(2));
        let frame = g.add_node(Operator::StateValues(0), &[]);
        let create = g.add_node(
            Operator::JSCreate,
            &[target, target, context, frame, start, start],
        );
        let r = ret(&mut g, create, create, create);

        g.relax_controls(create);

        assert_eq!(g.node(r).input(1), create);
        assert_eq!(g.node(r).input(2), create);
        assert_eq!(g.node(r).input(3), start);
    }

    #[test]
    fn test_kill_disconnects() {
        let mut g = Graph::new();
        let a = g.int32_constant(1);
        let sum = add(&mut g, a, a);
        g.kill(sum);
        assert!(g.node(sum).is_dead());
        assert_eq!(g.use_count(a), 0);
        assert!(g.node(sum).inputs.is_empty());
    }

    #[test]
    fn test_verify_accepts_terminated_graph() {
        let mut g = Graph::new();
        let start = g.start;
        let v = g.int32_constant(3);
        ret(&mut g, v, start, start);
        assert_eq!(g.verify(), Ok(()));
    }

    #[test]
    fn test_verify_rejects_dangling_control() {
        let mut g = Graph::new();
        let start = g.start;
        let cond = g.int32_constant(1);
        let branch = g.add_node(Operator::Control(ControlOp::Branch), &[cond, start]);
        let if_true = g.add_node(Operator::Control(ControlOp::IfTrue), &[branch]);
        g.add_node(Operator::Control(ControlOp::IfFalse), &[branch]);
        ret(&mut g, cond, start, if_true);

        assert!(matches!(
            g.verify(),
            Err(VerifyError::UnterminatedControl { op: "IfFalse", .. })
        ));
    }

    #[test]
    fn test_verify_rejects_layout_mismatch() {
        let mut g = Graph::new();
        let start = g.start;
        let v = g.int32_constant(3);
        let phi = g.add_node(Operator::Phi(MachineRepresentation::Word32, 1), &[v, start]);
        g.append_input(phi, v);
        ret(&mut g, phi, start, start);
        assert!(matches!(g.verify(), Err(VerifyError::InputCount { expected: 2, actual: 3, .. })));
    }

    #[test]
    fn test_snapshot_equality() {
        let mut g = Graph::new();
        let a = g.int32_constant(1);
        let sum = add(&mut g, a, a);
        let before = g.snapshot(sum);
        assert_eq!(before, g.snapshot(sum));
        let b = g.int32_constant(2);
        g.replace_input(sum, 0, b);
        assert_ne!(before, g.snapshot(sum));
    }
}
