//! txplan - Solana instruction-to-transaction planner
//!
//! Packs trees of instructions with ordering constraints into the fewest
//! size-valid transactions, executes the resulting plan concurrently with
//! cooperative cancellation, and estimates compute unit limits by simulation.

pub mod config;
pub mod metrics;
pub mod test_utils;

// Planner / executor supercomponent
pub mod tx_planner;

// Re-export commonly used types
pub use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature};
pub use tx_planner::{
    InstructionPlan, PlanningError, TransactionMessage, TransactionPlan, TransactionPlanExecutor,
    TransactionPlanResult, TransactionPlanner,
};
