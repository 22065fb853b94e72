//! Transaction Planner Supercomponent
//!
//! Turns a tree of instructions with ordering constraints into the smallest
//! set of size-valid transactions, then executes those transactions while
//! honouring the same constraints.
//!
//! ## Architecture
//!
//! - **instructions**: Instruction plan tree and builder helpers
//! - **packers**: Message packers that split large payloads across messages
//! - **message**: Immutable transaction message builder and wire sizing
//! - **capacity**: Capacity oracle deciding whether a message fits
//! - **planner**: Instruction plan to transaction plan packing
//! - **plan**: Transaction plan tree
//! - **executor**: Concurrent transaction plan execution with cancellation
//! - **result**: Per-transaction execution statuses
//! - **simulate**: Compute unit estimation by simulation
//! - **document**: JSON instruction plan documents
//! - **errors**: Error taxonomy with retry classification
//!
//! ## Ordering
//!
//! - `Sequential` plans keep instruction order, in planning and execution
//! - `Sequential { divisible: false }` groups are never spread over
//!   unrelated transactions
//! - `Parallel` plans give no ordering guarantee
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use txplan::tx_planner::{
//!     parallel_instruction_plan, StaticMessageFactory, TransactionMessage, TransactionPlanner,
//! };
//! # use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
//!
//! # async fn example(a: Instruction, b: Instruction, payer: Pubkey) -> anyhow::Result<()> {
//! let planner = TransactionPlanner::new(StaticMessageFactory::new(
//!     TransactionMessage::v0().with_fee_payer(payer),
//! ));
//! let plan = planner.plan(&parallel_instruction_plan([a, b])).await?;
//! println!("{} transactions", plan.transaction_count());
//! # Ok(())
//! # }
//! ```

pub mod capacity;
pub mod document;
pub mod errors;
pub mod executor;
pub mod instructions;
pub mod message;
pub mod packers;
pub mod plan;
pub mod planner;
pub mod result;
pub mod simulate;

pub use capacity::{CapacityOracle, WireSizeOracle, TRANSACTION_SIZE_LIMIT};
pub use document::PlanDocument;
pub use errors::{
    ComputeBudgetError, ExecutionAborted, ExecutionCause, PlanningError, SharedError,
    TransactionPlanExecutionError,
};
pub use executor::{TransactionMessageExecutor, TransactionPlanExecutor};
pub use instructions::{
    message_packer_instruction_plan, non_divisible_sequential_instruction_plan,
    parallel_instruction_plan, sequential_instruction_plan, single_instruction_plan,
    InstructionPlan,
};
pub use message::{is_advance_nonce, Lifetime, TransactionMessage, TransactionVersion};
pub use packers::{
    linear_message_packer_instruction_plan, message_packer_instruction_plan_from_instructions,
    realloc_message_packer_instruction_plan, InstructionListMessagePacker, LinearMessagePacker,
    MessagePacker, MessagePackerFactory, REALLOC_LIMIT,
};
pub use plan::TransactionPlan;
pub use planner::{MessageFactory, StaticMessageFactory, TransactionPlanner};
pub use result::{
    SuccessfulTransaction, TransactionPlanResult, TransactionPlanSummary, TransactionStatus,
};
pub use simulate::{
    compute_unit_limit_instruction_index_and_units, fill_provisory_compute_unit_limit,
    set_compute_unit_limit, ComputeBudgetExecutor, ComputeUnitEstimator, RpcSimulator,
    SimulationOutcome, TransactionSimulator, MAX_COMPUTE_UNIT_LIMIT, PROVISORY_COMPUTE_UNIT_LIMIT,
};
