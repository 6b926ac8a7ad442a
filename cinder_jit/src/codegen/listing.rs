//! Textual code generator.
//!
//! Renders a schedule as one instruction per line, blocks in reverse
//! postorder. Used for tests, debugging and snapshot comparisons; it
//! accepts exactly the operators a machine back end would.

use std::fmt::{self, Write as _};

use super::{CodeFlags, CodeGenerator, CodegenRequest, Schedule};
use crate::error::CodegenError;
use crate::ir::operators::{ControlOp, Operator};
use crate::ir::{Graph, NodeId};

/// Default instruction limit of a listing.
pub const DEFAULT_MAX_INSTRUCTIONS: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingBlock {
    /// Reverse-postorder number.
    pub label: u32,
    pub predecessors: Vec<u32>,
    pub loop_header: bool,
    pub lines: Vec<String>,
}

/// Generated listing for one code object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeListing {
    pub name: String,
    pub descriptor: String,
    pub flags: CodeFlags,
    pub blocks: Vec<ListingBlock>,
    pub instruction_count: usize,
}

impl CodeListing {
    /// Check whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.blocks
            .iter()
            .flat_map(|block| block.lines.iter())
            .any(|line| line.contains(needle))
    }
}

impl fmt::Display for CodeListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "code {:?} ({}, {} instructions)",
            self.name, self.descriptor, self.instruction_count
        )?;
        for block in &self.blocks {
            write!(f, "B{}:", block.label)?;
            if block.loop_header {
                f.write_str(" loop")?;
            }
            if !block.predecessors.is_empty() {
                f.write_str(" <-")?;
                for (i, predecessor) in block.predecessors.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}B{}", sep, predecessor)?;
                }
            }
            writeln!(f)?;
            for line in &block.lines {
                writeln!(f, "  {}", line)?;
            }
        }
        Ok(())
    }
}

/// [`CodeGenerator`] producing a [`CodeListing`].
#[derive(Debug, Clone)]
pub struct ListingGenerator {
    pub max_instructions: usize,
}

impl ListingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_instructions: usize) -> Self {
        ListingGenerator { max_instructions }
    }
}

impl Default for ListingGenerator {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_INSTRUCTIONS)
    }
}

fn value_name(id: NodeId) -> String {
    format!("v{}", id.index())
}

/// Value, context and frame-state inputs, comma separated.
fn value_operands(graph: &Graph, id: NodeId) -> String {
    let node = graph.node(id);
    let count = node.op.layout().first_effect_index();
    node.inputs[..count]
        .iter()
        .map(|&input| value_name(input))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Emitter<'a> {
    graph: &'a Graph,
    schedule: &'a Schedule,
    flags: CodeFlags,
    lines: Vec<String>,
    instructions: usize,
}

impl<'a> Emitter<'a> {
    fn label_of(&self, control: NodeId) -> String {
        self.schedule
            .block_of(control)
            .map(|block| format!("B{}", self.schedule.block(block).rpo_number))
            .unwrap_or_else(|| "B?".to_owned())
    }

    /// Block started by the `op` projection of `node`.
    fn projection_label(&self, node: NodeId, op: Operator) -> Option<String> {
        self.graph
            .uses(node)
            .iter()
            .copied()
            .find(|&user| self.graph.op(user) == op)
            .map(|user| self.label_of(user))
    }

    fn push(&mut self, line: String) {
        self.instructions += 1;
        self.lines.push(line);
    }

    fn emit_node(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let graph = self.graph;
        let op = graph.op(id);
        if op.is_js_create() {
            return Err(CodegenError::Unsupported { op: op.mnemonic() });
        }
        match op {
            Operator::Control(
                ControlOp::Start
                | ControlOp::Merge(_)
                | ControlOp::Loop(_)
                | ControlOp::IfTrue
                | ControlOp::IfFalse
                | ControlOp::IfValue(_)
                | ControlOp::IfDefault
                | ControlOp::IfSuccess
                | ControlOp::End(_),
            )
            | Operator::EffectPhi(_)
            | Operator::BeginRegion => {}
            Operator::Control(ControlOp::IfException) => {
                self.push(format!("{} = IfException", value_name(id)));
            }
            Operator::Control(ControlOp::Branch) => {
                let if_true = self.projection_label(id, Operator::Control(ControlOp::IfTrue));
                let if_false = self.projection_label(id, Operator::Control(ControlOp::IfFalse));
                self.push(format!(
                    "branch {} -> {}, {}",
                    value_operands(graph, id),
                    if_true.unwrap_or_default(),
                    if_false.unwrap_or_default()
                ));
            }
            Operator::Control(ControlOp::Switch(_)) => {
                let mut line = format!("switch {} [", value_operands(graph, id));
                let mut cases: Vec<(Option<i32>, String)> = graph
                    .uses(id)
                    .iter()
                    .filter_map(|&user| match graph.op(user) {
                        Operator::Control(ControlOp::IfValue(value)) => {
                            Some((Some(value), self.label_of(user)))
                        }
                        Operator::Control(ControlOp::IfDefault) => {
                            Some((None, self.label_of(user)))
                        }
                        _ => None,
                    })
                    .collect();
                cases.sort_by_key(|(value, _)| value.map_or(i64::MAX, i64::from));
                for (i, (value, label)) in cases.iter().enumerate() {
                    if i > 0 {
                        line.push_str(", ");
                    }
                    match value {
                        Some(value) => {
                            let _ = write!(line, "{} -> {}", value, label);
                        }
                        None => {
                            let _ = write!(line, "default -> {}", label);
                        }
                    }
                }
                line.push(']');
                self.push(line);
            }
            Operator::Control(ControlOp::Return(_)) => {
                self.push(format!("return {}", value_operands(graph, id)));
            }
            Operator::Control(ControlOp::Throw) => self.push("throw".to_owned()),
            Operator::Comment(comment) => {
                if self.flags.contains(CodeFlags::COMMENTS) {
                    self.lines.push(format!("; {}", graph.comment_text(comment)));
                }
            }
            _ => {
                let operands = value_operands(graph, id);
                let mut line = if op.outputs().values > 0 {
                    format!("{} = {}", value_name(id), op)
                } else {
                    op.to_string()
                };
                if !operands.is_empty() {
                    line.push(' ');
                    line.push_str(&operands);
                }
                self.push(line);
            }
        }
        Ok(())
    }

    /// Jump out of a block that does not end in a branch or a return.
    fn emit_fallthrough(&mut self, terminator: Option<NodeId>, successors: &[String]) {
        let call = terminator.filter(|&t| matches!(self.graph.op(t), Operator::Call(_)));
        if let Some(call) = call {
            let success = self.projection_label(call, Operator::Control(ControlOp::IfSuccess));
            let exception = self.projection_label(call, Operator::Control(ControlOp::IfException));
            if let (Some(success), Some(exception)) = (success, exception) {
                self.push(format!("goto {} (exception {})", success, exception));
                return;
            }
        }
        if let [successor] = successors {
            self.push(format!("goto {}", successor));
        }
    }
}

impl CodeGenerator for ListingGenerator {
    type Artifact = CodeListing;

    fn generate(&mut self, request: CodegenRequest<'_>) -> Result<CodeListing, CodegenError> {
        let CodegenRequest {
            graph,
            schedule,
            descriptor,
            flags,
            name,
        } = request;
        let mut emitter = Emitter {
            graph,
            schedule,
            flags,
            lines: Vec::new(),
            instructions: 0,
        };
        let mut blocks = Vec::with_capacity(schedule.len());

        for (_, block) in schedule.iter_rpo() {
            for &id in &block.nodes {
                emitter.emit_node(id)?;
            }
            let ends_explicitly = block.terminator.is_some_and(|t| {
                let op = graph.op(t);
                op.is_terminator()
                    || matches!(op, Operator::Control(ControlOp::Branch | ControlOp::Switch(_)))
            });
            if !ends_explicitly {
                let successors: Vec<String> = block
                    .successors
                    .iter()
                    .map(|&s| format!("B{}", schedule.block(s).rpo_number))
                    .collect();
                emitter.emit_fallthrough(block.terminator, &successors);
            }
            if emitter.instructions > self.max_instructions {
                return Err(CodegenError::TooLarge {
                    name: name.to_owned(),
                    limit: self.max_instructions,
                });
            }

            let mut predecessors: Vec<u32> = block
                .predecessors
                .iter()
                .map(|&p| schedule.block(p).rpo_number)
                .collect();
            predecessors.sort_unstable();
            blocks.push(ListingBlock {
                label: block.rpo_number,
                predecessors,
                loop_header: block.is_loop_header(graph),
                lines: std::mem::take(&mut emitter.lines),
            });
        }

        log::trace!("listing for {}: {} instructions", name, emitter.instructions);
        Ok(CodeListing {
            name: name.to_owned(),
            descriptor: descriptor.to_string(),
            flags,
            blocks,
            instruction_count: emitter.instructions,
        })
    }
}
