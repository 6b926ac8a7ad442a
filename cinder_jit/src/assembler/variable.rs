//! Assembler variables.
//!
//! A variable is a named, mutable binding to a node. Every live variable
//! is recorded at each jump to a label, and binding the label rebinds the
//! variable to the merged value: the common value if all paths agree, a
//! phi otherwise.

use super::CodeAssembler;
use crate::diagnostics::Violation;
use crate::ir::arena::Id;
use crate::ir::types::MachineRepresentation;
use crate::ir::NodeId;

/// Handle to an assembler variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub(crate) Id<VariableData>);

#[derive(Debug, Clone)]
pub(crate) struct VariableData {
    pub(crate) name: String,
    pub(crate) representation: MachineRepresentation,
    pub(crate) value: Option<NodeId>,
    /// Released variables no longer take part in merges.
    pub(crate) live: bool,
}

impl CodeAssembler {
    pub fn new_variable(&mut self, representation: MachineRepresentation) -> Variable {
        let name = format!("var{}", self.variables.len());
        self.new_named_variable(name, representation)
    }

    pub fn new_named_variable(
        &mut self,
        name: impl Into<String>,
        representation: MachineRepresentation,
    ) -> Variable {
        Variable(self.variables.alloc(VariableData {
            name: name.into(),
            representation,
            value: None,
            live: true,
        }))
    }

    pub fn new_variable_with_value(
        &mut self,
        representation: MachineRepresentation,
        value: NodeId,
    ) -> Variable {
        let variable = self.new_variable(representation);
        self.bind_variable(variable, value);
        variable
    }

    pub fn bind_variable(&mut self, variable: Variable, value: NodeId) {
        self.variables[variable.0].value = Some(value);
    }

    /// Current value of `variable`.
    ///
    /// Reading an unbound variable is a contract violation; with checks
    /// disabled it yields `NodeId::INVALID`.
    pub fn variable_value(&self, variable: Variable) -> NodeId {
        let data = &self.variables[variable.0];
        match data.value {
            Some(value) => value,
            None => {
                self.report(Violation::UnboundVariable {
                    variable: data.name.clone(),
                });
                NodeId::INVALID
            }
        }
    }

    pub fn try_variable_value(&self, variable: Variable) -> Option<NodeId> {
        self.variables[variable.0].value
    }

    pub fn is_variable_bound(&self, variable: Variable) -> bool {
        self.variables[variable.0].value.is_some()
    }

    pub fn variable_representation(&self, variable: Variable) -> MachineRepresentation {
        self.variables[variable.0].representation
    }

    pub fn variable_name(&self, variable: Variable) -> &str {
        &self.variables[variable.0].name
    }

    /// End the scope of `variable`; later merges ignore it.
    pub fn release_variable(&mut self, variable: Variable) {
        let data = &mut self.variables[variable.0];
        data.live = false;
        data.value = None;
    }

    /// Live variables with their current values.
    pub(crate) fn variable_values(&self) -> Vec<(Variable, Option<NodeId>)> {
        self.variables
            .iter()
            .filter(|(_, data)| data.live)
            .map(|(id, data)| (Variable(id), data.value))
            .collect()
    }
}
