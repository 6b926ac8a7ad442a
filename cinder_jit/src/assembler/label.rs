//! Labels and structured control flow.
//!
//! A label collects the paths that jump to it. Each jump records the
//! current control, effect and the value of every live variable. Binding
//! the label merges them:
//!
//! - one path: control, effect and variables carry over unchanged
//! - several paths: a `Merge`, an `EffectPhi` when the effects differ,
//!   and a `Phi` per variable whose values differ
//! - loop labels: a `Loop`, an `EffectPhi` and a `Phi` per declared
//!   variable, all of which grow an input for every later back edge
//!
//! Variables passed when the label is created must be bound on every path
//! that reaches it; a missing value is a contract violation.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::variable::Variable;
use super::{CodeAssembler, Position};
use crate::diagnostics::Violation;
use crate::ir::arena::Id;
use crate::ir::operators::{ControlOp, Operator};
use crate::ir::{Graph, NodeId};

/// Handle to an assembler label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) Id<LabelData>);

/// Block flavor of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    NonDeferred,
    /// Unlikely path; a hint for block placement.
    Deferred,
    /// Loop header that accepts back edges after it is bound.
    Loop,
}

#[derive(Debug, Clone)]
pub(crate) struct LabelData {
    pub(crate) name: String,
    pub(crate) kind: LabelKind,
    pub(crate) bound: bool,
    /// Paths merged so far, back edges included.
    pub(crate) merge_count: usize,
    /// Variables that must be bound on every incoming path.
    declared: SmallVec<[Variable; 4]>,
    controls: Vec<NodeId>,
    effects: Vec<NodeId>,
    /// Incoming values per variable, in merge order.
    variable_merges: FxHashMap<Variable, Vec<NodeId>>,
    variable_phis: FxHashMap<Variable, NodeId>,
    /// Value of each non-phi variable at bind time.
    bound_values: FxHashMap<Variable, NodeId>,
    /// `Merge` or `Loop` node, when one was created.
    merge: Option<NodeId>,
    effect_phi: Option<NodeId>,
    bound_effect: Option<NodeId>,
}

impl LabelData {
    fn new(name: String, kind: LabelKind, declared: &[Variable]) -> Self {
        LabelData {
            name,
            kind,
            bound: false,
            merge_count: 0,
            declared: SmallVec::from_slice(declared),
            controls: Vec::new(),
            effects: Vec::new(),
            variable_merges: FxHashMap::default(),
            variable_phis: FxHashMap::default(),
            bound_values: FxHashMap::default(),
            merge: None,
            effect_phi: None,
            bound_effect: None,
        }
    }
}

/// Append one incoming edge to a `Merge`/`Loop`, `Phi` or `EffectPhi`.
fn append_merge_input(graph: &mut Graph, node: NodeId, input: NodeId) {
    let op = graph.op(node);
    let count = match op {
        Operator::Control(ControlOp::Merge(n) | ControlOp::Loop(n))
        | Operator::Phi(_, n)
        | Operator::EffectPhi(n) => n,
        _ => return,
    };
    if op.is_merge() {
        graph.append_input(node, input);
    } else {
        // Phis keep their control input last.
        graph.insert_input(node, count as usize, input);
    }
    if let Some(op) = op.with_arity(count + 1) {
        graph.change_op(node, op);
    }
}

fn has_distinct(values: &[NodeId]) -> bool {
    values.windows(2).any(|pair| pair[0] != pair[1])
}

// =============================================================================
// Control Builder
// =============================================================================

/// Builder trait for labels and structured control flow.
pub trait ControlAssembler {
    fn new_label(&mut self) -> Label;
    fn new_deferred_label(&mut self) -> Label;
    /// Label that merges `variables` from every incoming path.
    fn new_label_with(&mut self, variables: &[Variable]) -> Label;
    /// Loop header carrying `variables` around the back edges.
    fn new_loop_label(&mut self, variables: &[Variable]) -> Label;

    fn bind(&mut self, label: Label);
    fn goto(&mut self, label: Label);
    fn goto_if(&mut self, condition: NodeId, label: Label);
    fn goto_if_not(&mut self, condition: NodeId, label: Label);
    fn branch(&mut self, condition: NodeId, if_true: Label, if_false: Label);
    /// Jump to the label paired with `index`'s value, or to `default`.
    fn switch(&mut self, index: NodeId, default: Label, cases: &[(i32, Label)]);
    /// Split after a throwing `call`: the exception path binds `exception`
    /// (if given) and jumps to `handler`; the current block continues on
    /// the success path.
    fn goto_if_exception(&mut self, call: NodeId, handler: Label, exception: Option<Variable>);
    fn return_if(&mut self, condition: NodeId, value: NodeId);

    fn is_label_bound(&self, label: Label) -> bool;
    fn merge_count(&self, label: Label) -> usize;
}

impl CodeAssembler {
    fn alloc_label(&mut self, kind: LabelKind, declared: &[Variable]) -> Label {
        let name = format!("L{}", self.labels.len());
        Label(self.labels.alloc(LabelData::new(name, kind, declared)))
    }

    /// Record the path at `position` as an incoming edge of `label`.
    fn merge_into(&mut self, label: Label, position: Position) {
        let values = self.variable_values();
        let checks = self.checks_enabled();
        let data = &mut self.labels[label.0];
        data.merge_count += 1;

        if !data.bound {
            data.controls.push(position.control);
            data.effects.push(position.effect);
            for (variable, value) in values {
                if let Some(value) = value {
                    data.variable_merges.entry(variable).or_default().push(value);
                }
            }
            return;
        }

        // Back edge into a bound label.
        let merge = data
            .merge
            .filter(|&merge| matches!(self.graph.op(merge), Operator::Control(ControlOp::Loop(_))));
        let Some(merge) = merge else {
            let label = data.name.clone();
            self.diagnostics.report(Violation::BoundLabelReentered { label });
            return;
        };
        append_merge_input(&mut self.graph, merge, position.control);
        if let Some(effect_phi) = data.effect_phi {
            append_merge_input(&mut self.graph, effect_phi, position.effect);
        }

        for (variable, value) in values {
            if let Some(&phi) = data.variable_phis.get(&variable) {
                match value {
                    Some(value) => append_merge_input(&mut self.graph, phi, value),
                    None => {
                        let found = self.graph.op(phi).layout().values as usize;
                        self.diagnostics.report(Violation::IncompleteMerge {
                            label: data.name.clone(),
                            variable: self.variables[variable.0].name.clone(),
                            expected: data.merge_count,
                            found,
                        });
                    }
                }
            } else if checks {
                if let (Some(&bound), Some(value)) = (data.bound_values.get(&variable), value) {
                    if bound != value {
                        self.diagnostics.report(Violation::UnmergedVariable {
                            label: data.name.clone(),
                            variable: self.variables[variable.0].name.clone(),
                        });
                    }
                }
            }
        }
    }

    /// Create the merge node, effect and phis for a label about to be bound.
    fn bind_merged(&mut self, label: Label) {
        let checks = self.checks_enabled();
        let data = &self.labels[label.0];
        let kind = data.kind;
        let count = data.merge_count;
        let controls = data.controls.clone();
        let effects = data.effects.clone();

        if count == 0 {
            // Nothing reaches this label: the code after it is dead.
            self.labels[label.0].bound = true;
            self.current = None;
            for (variable, _) in self.variable_values() {
                self.variables[variable.0].value = None;
            }
            return;
        }

        let merge = if kind == LabelKind::Loop {
            Some(self.add_node(Operator::Control(ControlOp::Loop(count as u32)), &controls))
        } else if count > 1 {
            Some(self.add_node(Operator::Control(ControlOp::Merge(count as u32)), &controls))
        } else {
            None
        };
        let control = merge.unwrap_or(controls[0]);

        let (effect, effect_phi) = match merge {
            Some(merge) if kind == LabelKind::Loop || has_distinct(&effects) => {
                let mut inputs = effects;
                inputs.push(merge);
                let phi = self.add_node(Operator::EffectPhi(count as u32), &inputs);
                (phi, Some(phi))
            }
            _ => (effects[0], None),
        };

        let mut phis = FxHashMap::default();
        let mut bound_values = FxHashMap::default();
        for (variable, _) in self.variable_values() {
            let data = &self.labels[label.0];
            let declared = data.declared.contains(&variable);
            let merged: &[NodeId] = data
                .variable_merges
                .get(&variable)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let needs_phi = (kind == LabelKind::Loop && declared) || has_distinct(merged);

            let value = if merged.len() != count {
                // A value that differs between paths needs a phi, and a phi
                // needs one input per path.
                if (declared || has_distinct(merged)) && checks {
                    self.report(Violation::IncompleteMerge {
                        label: data.name.clone(),
                        variable: self.variables[variable.0].name.clone(),
                        expected: count,
                        found: merged.len(),
                    });
                }
                None
            } else if needs_phi {
                let mut inputs = merged.to_vec();
                let representation = self.variables[variable.0].representation;
                // `merge` exists whenever values can differ or the label loops.
                inputs.push(merge.unwrap_or(control));
                let phi = self.add_node(Operator::Phi(representation, count as u32), &inputs);
                phis.insert(variable, phi);
                Some(phi)
            } else {
                let value = merged[count - 1];
                bound_values.insert(variable, value);
                Some(value)
            };
            self.variables[variable.0].value = value;
        }

        let data = &mut self.labels[label.0];
        data.bound = true;
        data.merge = merge;
        data.effect_phi = effect_phi;
        data.bound_effect = Some(effect);
        data.variable_phis = phis;
        data.bound_values = bound_values;
        log::trace!(
            "bound {} ({:?}) with {} incoming paths",
            data.name,
            kind,
            count
        );
        self.current = Some(Position { effect, control });
    }
}

impl ControlAssembler for CodeAssembler {
    fn new_label(&mut self) -> Label {
        self.alloc_label(LabelKind::NonDeferred, &[])
    }

    fn new_deferred_label(&mut self) -> Label {
        self.alloc_label(LabelKind::Deferred, &[])
    }

    fn new_label_with(&mut self, variables: &[Variable]) -> Label {
        self.alloc_label(LabelKind::NonDeferred, variables)
    }

    fn new_loop_label(&mut self, variables: &[Variable]) -> Label {
        self.alloc_label(LabelKind::Loop, variables)
    }

    fn bind(&mut self, label: Label) {
        if self.labels[label.0].bound {
            let label = self.labels[label.0].name.clone();
            self.report(Violation::LabelBoundTwice { label });
            return;
        }
        // An open block falls through into the label.
        if let Some(position) = self.current.take() {
            self.merge_into(label, position);
        }
        self.bind_merged(label);
    }

    fn goto(&mut self, label: Label) {
        let position = self.position("goto");
        self.current = None;
        self.merge_into(label, position);
    }

    fn goto_if(&mut self, condition: NodeId, label: Label) {
        let fallthrough = self.new_label();
        self.branch(condition, label, fallthrough);
        self.bind(fallthrough);
    }

    fn goto_if_not(&mut self, condition: NodeId, label: Label) {
        let fallthrough = self.new_label();
        self.branch(condition, fallthrough, label);
        self.bind(fallthrough);
    }

    fn branch(&mut self, condition: NodeId, if_true: Label, if_false: Label) {
        let position = self.position("branch");
        self.current = None;
        let branch = self.add_node(
            Operator::Control(ControlOp::Branch),
            &[condition, position.control],
        );
        let true_control = self.add_node(Operator::Control(ControlOp::IfTrue), &[branch]);
        let false_control = self.add_node(Operator::Control(ControlOp::IfFalse), &[branch]);
        self.merge_into(
            if_true,
            Position {
                effect: position.effect,
                control: true_control,
            },
        );
        self.merge_into(
            if_false,
            Position {
                effect: position.effect,
                control: false_control,
            },
        );
    }

    fn switch(&mut self, index: NodeId, default: Label, cases: &[(i32, Label)]) {
        let position = self.position("switch");
        self.current = None;
        let switch = self.add_node(
            Operator::Control(ControlOp::Switch(cases.len() as u32 + 1)),
            &[index, position.control],
        );
        for &(value, label) in cases {
            let control = self.add_node(Operator::Control(ControlOp::IfValue(value)), &[switch]);
            self.merge_into(
                label,
                Position {
                    effect: position.effect,
                    control,
                },
            );
        }
        let control = self.add_node(Operator::Control(ControlOp::IfDefault), &[switch]);
        self.merge_into(
            default,
            Position {
                effect: position.effect,
                control,
            },
        );
    }

    fn goto_if_exception(&mut self, call: NodeId, handler: Label, exception: Option<Variable>) {
        let position = self.position("goto_if_exception");
        debug_assert!(
            matches!(self.graph.op(call), Operator::Call(_)),
            "goto_if_exception expects a call"
        );
        let success = self.add_node(Operator::Control(ControlOp::IfSuccess), &[call]);
        let thrown = self.add_node(Operator::Control(ControlOp::IfException), &[call, call]);

        // The exception binding is only visible on the handler path.
        let previous = exception.and_then(|variable| self.try_variable_value(variable));
        if let Some(variable) = exception {
            self.bind_variable(variable, thrown);
        }
        self.merge_into(
            handler,
            Position {
                effect: thrown,
                control: thrown,
            },
        );
        if let Some(variable) = exception {
            self.variables[variable.0].value = previous;
        }

        self.current = Some(Position {
            effect: position.effect,
            control: success,
        });
    }

    fn return_if(&mut self, condition: NodeId, value: NodeId) {
        let if_return = self.new_label();
        let if_continue = self.new_label();
        self.branch(condition, if_return, if_continue);
        self.bind(if_return);
        self.return_value(value);
        self.bind(if_continue);
    }

    fn is_label_bound(&self, label: Label) -> bool {
        self.labels[label.0].bound
    }

    fn merge_count(&self, label: Label) -> usize {
        self.labels[label.0].merge_count
    }
}
