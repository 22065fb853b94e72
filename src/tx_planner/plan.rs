//! Transaction plans
//!
//! A `TransactionPlan` mirrors the shape of an instruction plan, but its
//! leaves hold finished, size-valid messages instead of instructions.

use solana_sdk::instruction::Instruction;

use crate::tx_planner::message::TransactionMessage;

/// Tree of transaction messages with ordering constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPlan {
    Single(TransactionMessage),
    Sequential {
        divisible: bool,
        plans: Vec<TransactionPlan>,
    },
    Parallel {
        plans: Vec<TransactionPlan>,
    },
}

impl TransactionPlan {
    pub fn single(message: TransactionMessage) -> Self {
        Self::Single(message)
    }

    pub fn sequential(plans: impl IntoIterator<Item = TransactionPlan>) -> Self {
        Self::Sequential {
            divisible: true,
            plans: plans.into_iter().collect(),
        }
    }

    pub fn non_divisible_sequential(plans: impl IntoIterator<Item = TransactionPlan>) -> Self {
        Self::Sequential {
            divisible: false,
            plans: plans.into_iter().collect(),
        }
    }

    pub fn parallel(plans: impl IntoIterator<Item = TransactionPlan>) -> Self {
        Self::Parallel {
            plans: plans.into_iter().collect(),
        }
    }

    /// All messages in traversal order
    pub fn messages(&self) -> Vec<&TransactionMessage> {
        let mut out = Vec::new();
        self.collect_messages(&mut out);
        out
    }

    fn collect_messages<'a>(&'a self, out: &mut Vec<&'a TransactionMessage>) {
        match self {
            Self::Single(message) => out.push(message),
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                for plan in plans {
                    plan.collect_messages(out);
                }
            }
        }
    }

    pub fn transaction_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                plans.iter().map(Self::transaction_count).sum()
            }
        }
    }

    /// Every instruction across all messages, in traversal order
    pub fn instructions(&self) -> Vec<&Instruction> {
        self.messages()
            .into_iter()
            .flat_map(|message| message.instructions())
            .collect()
    }
}
