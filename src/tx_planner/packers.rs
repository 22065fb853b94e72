//! Message packers
//!
//! A message packer is a cursor that emits a variable amount of work per
//! call, bounded by the room left in the message it is handed. Each
//! `pack_message_to_capacity` call either appends at least one unit of work
//! or fails with `MessageCannotAccommodatePlan`; opening a fresh message is
//! the planner's job.
//!
//! Built-in packers:
//! - linear: one growing instruction over a byte range (`get_instruction(offset, length)`)
//! - instruction list: a fixed list of pre-built instructions
//! - realloc: an instruction list splitting a size increase into permitted steps

use std::sync::Arc;

use solana_sdk::instruction::Instruction;

use crate::tx_planner::capacity::CapacityOracle;
use crate::tx_planner::errors::PlanningError;
use crate::tx_planner::instructions::{message_packer_instruction_plan, InstructionPlan};
use crate::tx_planner::message::TransactionMessage;

/// Largest account data increase a single instruction may request
pub const REALLOC_LIMIT: usize = 10_240;

/// Stateful cursor packing work into messages
pub trait MessagePacker: Send + Sync {
    /// Whether all work has been emitted
    fn done(&self) -> bool;

    /// Append as much remaining work as fits in `message`
    fn pack_message_to_capacity(
        &mut self,
        message: &TransactionMessage,
        oracle: &dyn CapacityOracle,
    ) -> Result<TransactionMessage, PlanningError>;

    /// Snapshot the cursor so a packing attempt can be discarded
    fn boxed_clone(&self) -> Box<dyn MessagePacker>;
}

/// Creates a fresh packer for every traversal of the plan
pub trait MessagePackerFactory: Send + Sync {
    fn message_packer(&self) -> Box<dyn MessagePacker>;
}

impl<F> MessagePackerFactory for F
where
    F: Fn() -> Box<dyn MessagePacker> + Send + Sync,
{
    fn message_packer(&self) -> Box<dyn MessagePacker> {
        self()
    }
}

type InstructionAt = Arc<dyn Fn(usize, usize) -> Instruction + Send + Sync>;

/// Packs a byte range `[0, total_length)` into instructions built by
/// `get_instruction(offset, length)`
#[derive(Clone)]
pub struct LinearMessagePacker {
    get_instruction: InstructionAt,
    total_length: usize,
    offset: usize,
}

impl LinearMessagePacker {
    pub fn new(
        total_length: usize,
        get_instruction: impl Fn(usize, usize) -> Instruction + Send + Sync + 'static,
    ) -> Self {
        Self {
            get_instruction: Arc::new(get_instruction),
            total_length,
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl MessagePacker for LinearMessagePacker {
    fn done(&self) -> bool {
        self.offset >= self.total_length
    }

    fn pack_message_to_capacity(
        &mut self,
        message: &TransactionMessage,
        oracle: &dyn CapacityOracle,
    ) -> Result<TransactionMessage, PlanningError> {
        if self.done() {
            return Err(PlanningError::MessagePackerAlreadyComplete);
        }

        let limit = oracle.size_limit();
        let with_base = message.append_instruction((self.get_instruction)(self.offset, 0));
        let base_size = oracle.message_size(&with_base)?;

        // One byte of leeway: the data length prefix may grow once bytes are added.
        let free = limit.saturating_sub(base_size + 1);
        if free == 0 {
            let message_size = oracle.message_size(message)?;
            return Err(PlanningError::MessageCannotAccommodatePlan {
                bytes_required: base_size.saturating_sub(message_size) + 1,
                bytes_free: limit.saturating_sub(message_size + 1),
            });
        }

        let length = free.min(self.total_length - self.offset);
        let instruction = (self.get_instruction)(self.offset, length);
        self.offset += length;
        Ok(message.append_instruction(instruction))
    }

    fn boxed_clone(&self) -> Box<dyn MessagePacker> {
        Box::new(self.clone())
    }
}

/// Packs a fixed list of instructions, as many per message as fit
#[derive(Debug, Clone)]
pub struct InstructionListMessagePacker {
    instructions: Arc<[Instruction]>,
    index: usize,
}

impl InstructionListMessagePacker {
    pub fn new(instructions: impl Into<Arc<[Instruction]>>) -> Self {
        Self {
            instructions: instructions.into(),
            index: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.instructions.len() - self.index
    }
}

impl MessagePacker for InstructionListMessagePacker {
    fn done(&self) -> bool {
        self.index >= self.instructions.len()
    }

    fn pack_message_to_capacity(
        &mut self,
        message: &TransactionMessage,
        oracle: &dyn CapacityOracle,
    ) -> Result<TransactionMessage, PlanningError> {
        if self.done() {
            return Err(PlanningError::MessagePackerAlreadyComplete);
        }

        let mut packed = message.clone();
        let first = self.index;
        for (index, instruction) in self.instructions.iter().enumerate().skip(first) {
            let candidate = packed.append_instruction(instruction.clone());
            if !oracle.fits(&candidate)? {
                if index == first {
                    return Err(PlanningError::cannot_accommodate(
                        oracle.message_size(message)?,
                        oracle.message_size(&candidate)?,
                        oracle.size_limit(),
                    ));
                }
                self.index = index;
                return Ok(packed);
            }
            packed = candidate;
        }

        self.index = self.instructions.len();
        Ok(packed)
    }

    fn boxed_clone(&self) -> Box<dyn MessagePacker> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
struct LinearPackerFactory {
    total_length: usize,
    get_instruction: InstructionAt,
}

impl MessagePackerFactory for LinearPackerFactory {
    fn message_packer(&self) -> Box<dyn MessagePacker> {
        Box::new(LinearMessagePacker {
            get_instruction: Arc::clone(&self.get_instruction),
            total_length: self.total_length,
            offset: 0,
        })
    }
}

#[derive(Clone)]
struct InstructionListPackerFactory {
    instructions: Arc<[Instruction]>,
}

impl MessagePackerFactory for InstructionListPackerFactory {
    fn message_packer(&self) -> Box<dyn MessagePacker> {
        Box::new(InstructionListMessagePacker::new(Arc::clone(&self.instructions)))
    }
}

/// Plan writing `total_length` bytes through a single growable instruction
///
/// `get_instruction(offset, length)` must build the instruction covering
/// `length` bytes starting at `offset`.
pub fn linear_message_packer_instruction_plan(
    total_length: usize,
    get_instruction: impl Fn(usize, usize) -> Instruction + Send + Sync + 'static,
) -> InstructionPlan {
    message_packer_instruction_plan(LinearPackerFactory {
        total_length,
        get_instruction: Arc::new(get_instruction),
    })
}

/// Plan packing pre-built instructions, in order, into as few messages as fit
pub fn message_packer_instruction_plan_from_instructions(
    instructions: impl Into<Vec<Instruction>>,
) -> InstructionPlan {
    let instructions: Vec<Instruction> = instructions.into();
    message_packer_instruction_plan(InstructionListPackerFactory {
        instructions: instructions.into(),
    })
}

/// Plan growing an account by `total_size` bytes in `REALLOC_LIMIT` steps
///
/// `get_instruction(size)` builds one realloc instruction of `size` bytes.
pub fn realloc_message_packer_instruction_plan(
    total_size: usize,
    get_instruction: impl Fn(usize) -> Instruction,
) -> InstructionPlan {
    let full_steps = total_size / REALLOC_LIMIT;
    let remainder = total_size % REALLOC_LIMIT;
    let instructions: Vec<Instruction> = std::iter::repeat(REALLOC_LIMIT)
        .take(full_steps)
        .chain((remainder > 0).then_some(remainder))
        .map(get_instruction)
        .collect();
    message_packer_instruction_plan_from_instructions(instructions)
}
