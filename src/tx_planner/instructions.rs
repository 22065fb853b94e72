//! Instruction plans
//!
//! An `InstructionPlan` declares what must execute and how instructions
//! relate to each other, without deciding which transaction they land in:
//! - `Single`: one instruction
//! - `Sequential`: children in order; `divisible = false` keeps them together
//!   as one irreducible sub-plan
//! - `Parallel`: children in any order
//! - `MessagePacker`: a generator that emits as much work as fits in
//!   whatever room a message has left
//!
//! The builder functions accept bare instructions and wrap them into
//! `Single` nodes.

use std::fmt;
use std::sync::Arc;

use solana_sdk::instruction::Instruction;

use crate::tx_planner::packers::MessagePackerFactory;

/// Declarative tree of instructions to plan into transactions
#[derive(Clone)]
pub enum InstructionPlan {
    Single(Instruction),
    Sequential {
        divisible: bool,
        plans: Vec<InstructionPlan>,
    },
    Parallel {
        plans: Vec<InstructionPlan>,
    },
    MessagePacker(Arc<dyn MessagePackerFactory>),
}

impl InstructionPlan {
    /// Number of instructions known without running message packers
    pub fn instruction_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                plans.iter().map(Self::instruction_count).sum()
            }
            Self::MessagePacker(_) => 0,
        }
    }

    /// Static instructions in traversal order (message packers are skipped)
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = Vec::new();
        self.collect_instructions(&mut out);
        out
    }

    fn collect_instructions<'a>(&'a self, out: &mut Vec<&'a Instruction>) {
        match self {
            Self::Single(ix) => out.push(ix),
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                for plan in plans {
                    plan.collect_instructions(out);
                }
            }
            Self::MessagePacker(_) => {}
        }
    }

    pub fn is_message_packer(&self) -> bool {
        matches!(self, Self::MessagePacker(_))
    }

    /// True when the plan has no instructions and no message packers
    ///
    /// A packer may still emit nothing, so `false` does not guarantee a
    /// non-empty transaction plan.
    pub fn is_empty_hint(&self) -> bool {
        match self {
            Self::Single(_) | Self::MessagePacker(_) => false,
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                plans.iter().all(Self::is_empty_hint)
            }
        }
    }
}

impl From<Instruction> for InstructionPlan {
    fn from(instruction: Instruction) -> Self {
        Self::Single(instruction)
    }
}

impl fmt::Debug for InstructionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ix) => f
                .debug_struct("Single")
                .field("program_id", &ix.program_id)
                .field("accounts", &ix.accounts.len())
                .field("data_len", &ix.data.len())
                .finish(),
            Self::Sequential { divisible, plans } => f
                .debug_struct("Sequential")
                .field("divisible", divisible)
                .field("plans", plans)
                .finish(),
            Self::Parallel { plans } => f.debug_struct("Parallel").field("plans", plans).finish(),
            Self::MessagePacker(_) => f.write_str("MessagePacker"),
        }
    }
}

pub fn single_instruction_plan(instruction: Instruction) -> InstructionPlan {
    InstructionPlan::Single(instruction)
}

pub fn sequential_instruction_plan<P>(plans: impl IntoIterator<Item = P>) -> InstructionPlan
where
    P: Into<InstructionPlan>,
{
    InstructionPlan::Sequential {
        divisible: true,
        plans: plans.into_iter().map(Into::into).collect(),
    }
}

pub fn non_divisible_sequential_instruction_plan<P>(
    plans: impl IntoIterator<Item = P>,
) -> InstructionPlan
where
    P: Into<InstructionPlan>,
{
    InstructionPlan::Sequential {
        divisible: false,
        plans: plans.into_iter().map(Into::into).collect(),
    }
}

pub fn parallel_instruction_plan<P>(plans: impl IntoIterator<Item = P>) -> InstructionPlan
where
    P: Into<InstructionPlan>,
{
    InstructionPlan::Parallel {
        plans: plans.into_iter().map(Into::into).collect(),
    }
}

pub fn message_packer_instruction_plan(factory: impl MessagePackerFactory + 'static) -> InstructionPlan {
    InstructionPlan::MessagePacker(Arc::new(factory))
}
