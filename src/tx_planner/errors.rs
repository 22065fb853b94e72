//! Error types for the transaction planner supercomponent
//!
//! Errors carry machine-readable fields so callers can make retry and
//! backoff decisions without parsing messages:
//! - `PlanningError`: instruction plan could not be turned into transactions
//! - `ComputeBudgetError`: compute unit estimation failed
//! - `TransactionPlanExecutionError`: one or more transactions failed or the
//!   run was aborted; carries the full result tree for inspection

use std::sync::Arc;

use thiserror::Error;

use crate::tx_planner::result::TransactionPlanResult;

/// Error returned by collaborators, shared between the result tree and the
/// aggregate execution error.
pub type SharedError = Arc<anyhow::Error>;

/// Errors raised while planning an instruction plan into transactions
#[derive(Error, Debug)]
pub enum PlanningError {
    /// A unit of work does not fit in the candidate message
    ///
    /// `bytes_required` is the size the addition would take up and
    /// `bytes_free` what was left in the message before the addition.
    #[error("Message cannot accommodate plan: {bytes_required} bytes required, {bytes_free} bytes free")]
    MessageCannotAccommodatePlan {
        bytes_required: usize,
        bytes_free: usize,
    },

    /// The instruction plan contains no instructions
    #[error("Instruction plan is empty")]
    EmptyInstructionPlan,

    /// A message packer was asked to pack after reporting `done()`
    #[error("Message packer is already complete")]
    MessagePackerAlreadyComplete,

    /// The message could not be compiled for size computation
    #[error("Message compilation failed: {0}")]
    MessageCompilation(String),

    /// `create_message` or `on_message_updated` failed
    #[error("Message hook failed: {0}")]
    MessageHook(#[source] anyhow::Error),

    /// The caller cancelled planning
    #[error("Planning aborted")]
    Aborted,

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlanningError {
    /// Build a capacity error from the message size before and after an addition
    pub fn cannot_accommodate(base_size: usize, updated_size: usize, size_limit: usize) -> Self {
        Self::MessageCannotAccommodatePlan {
            bytes_required: updated_size.saturating_sub(base_size),
            bytes_free: size_limit.saturating_sub(base_size),
        }
    }

    /// Returns `true` if planning again might succeed
    ///
    /// Only hook failures depend on external state (blockhash fetches, etc.).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MessageHook(_) => true,
            Self::MessageCannotAccommodatePlan { .. } => false,
            Self::EmptyInstructionPlan => false,
            Self::MessagePackerAlreadyComplete => false,
            Self::MessageCompilation(_) => false,
            Self::Aborted => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::MessageCannotAccommodatePlan { .. } => "capacity",
            Self::EmptyInstructionPlan => "empty_plan",
            Self::MessagePackerAlreadyComplete => "packer_complete",
            Self::MessageCompilation(_) => "compilation",
            Self::MessageHook(_) => "hook",
            Self::Aborted => "aborted",
            Self::Internal(_) => "internal",
        }
    }
}

/// Errors raised by the compute unit estimator
#[derive(Error, Debug)]
pub enum ComputeBudgetError {
    /// Simulation did not produce a consumed-units figure, or the simulator itself failed
    #[error("Failed to estimate compute unit limit: {reason}")]
    EstimationFailed { reason: String },

    /// The simulated transaction failed
    ///
    /// `units_consumed` is what the failing simulation reported.
    #[error("Transaction failed when simulating to estimate compute unit limit ({units_consumed} units consumed): {reason}")]
    SimulationFailed { units_consumed: u32, reason: String },

    /// The message could not be compiled into a transaction
    #[error(transparent)]
    Planning(#[from] PlanningError),
}

impl ComputeBudgetError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EstimationFailed { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::EstimationFailed { .. } => "estimation",
            Self::SimulationFailed { .. } => "simulation",
            Self::Planning(err) => err.category(),
        }
    }
}

/// Marker error recorded on a leaf whose execution was cut short by the caller's abort
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Transaction execution aborted")]
pub struct ExecutionAborted;

/// Root cause of a failed transaction plan execution
#[derive(Error, Debug, Clone)]
pub enum ExecutionCause {
    /// The first failing transaction in traversal order
    #[error("{0}")]
    Transaction(SharedError),

    /// The caller aborted and no transaction failed
    #[error("Execution aborted")]
    Aborted,
}

impl ExecutionCause {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::Aborted => "aborted",
        }
    }
}

/// Aggregate error returned by the executor when any transaction failed or
/// the caller aborted
///
/// The result tree is available through [`result`](Self::result) but kept out
/// of `Display` and `Debug` output.
#[derive(Error)]
#[error("Failed to execute transaction plan: {cause}")]
pub struct TransactionPlanExecutionError {
    #[source]
    cause: ExecutionCause,
    result: TransactionPlanResult,
}

impl TransactionPlanExecutionError {
    pub fn new(cause: ExecutionCause, result: TransactionPlanResult) -> Self {
        Self { cause, result }
    }

    pub fn cause(&self) -> &ExecutionCause {
        &self.cause
    }

    /// The complete result tree, including canceled transactions
    pub fn result(&self) -> &TransactionPlanResult {
        &self.result
    }

    pub fn into_result(self) -> TransactionPlanResult {
        self.result
    }

    pub fn category(&self) -> &'static str {
        self.cause.category()
    }
}

impl std::fmt::Debug for TransactionPlanExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = self.result.summarize();
        f.debug_struct("TransactionPlanExecutionError")
            .field("cause", &self.cause)
            .field(
                "result",
                &format!(
                    "successful={}, failed={}, canceled={}",
                    summary.successful, summary.failed, summary.canceled
                ),
            )
            .finish()
    }
}
