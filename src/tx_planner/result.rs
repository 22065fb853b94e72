//! Transaction plan results
//!
//! Mirrors a `TransactionPlan`, recording for every message whether it was
//! executed successfully, failed, or was canceled before it started. Created
//! fresh by each executor run and never mutated afterwards.

use serde::Serialize;
use solana_sdk::signature::Signature;

use crate::tx_planner::errors::SharedError;
use crate::tx_planner::message::TransactionMessage;

/// What the execution collaborator returns for a landed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessfulTransaction {
    pub signature: Signature,
    /// Free-form execution context (slot, confirmation status, ...)
    pub context: serde_json::Value,
}

impl SuccessfulTransaction {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone)]
pub enum TransactionStatus {
    Successful(SuccessfulTransaction),
    Failed(SharedError),
    Canceled,
}

impl TransactionStatus {
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

#[derive(Debug, Clone)]
pub enum TransactionPlanResult {
    Single {
        message: TransactionMessage,
        status: TransactionStatus,
    },
    Sequential {
        divisible: bool,
        plans: Vec<TransactionPlanResult>,
    },
    Parallel {
        plans: Vec<TransactionPlanResult>,
    },
}

/// Status totals of a result tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionPlanSummary {
    pub successful: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl TransactionPlanSummary {
    pub fn total(&self) -> usize {
        self.successful + self.failed + self.canceled
    }

    pub fn all_successful(&self) -> bool {
        self.failed == 0 && self.canceled == 0
    }
}

impl TransactionPlanResult {
    pub fn successful(message: TransactionMessage, transaction: SuccessfulTransaction) -> Self {
        Self::Single {
            message,
            status: TransactionStatus::Successful(transaction),
        }
    }

    pub fn failed(message: TransactionMessage, error: impl Into<SharedError>) -> Self {
        Self::Single {
            message,
            status: TransactionStatus::Failed(error.into()),
        }
    }

    pub fn canceled(message: TransactionMessage) -> Self {
        Self::Single {
            message,
            status: TransactionStatus::Canceled,
        }
    }

    pub fn sequential(plans: Vec<TransactionPlanResult>) -> Self {
        Self::Sequential {
            divisible: true,
            plans,
        }
    }

    pub fn non_divisible_sequential(plans: Vec<TransactionPlanResult>) -> Self {
        Self::Sequential {
            divisible: false,
            plans,
        }
    }

    pub fn parallel(plans: Vec<TransactionPlanResult>) -> Self {
        Self::Parallel { plans }
    }

    /// Every leaf in traversal order
    pub fn singles(&self) -> Vec<(&TransactionMessage, &TransactionStatus)> {
        let mut out = Vec::new();
        self.collect_singles(&mut out);
        out
    }

    fn collect_singles<'a>(&'a self, out: &mut Vec<(&'a TransactionMessage, &'a TransactionStatus)>) {
        match self {
            Self::Single { message, status } => out.push((message, status)),
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                for plan in plans {
                    plan.collect_singles(out);
                }
            }
        }
    }

    /// First failure in traversal order
    pub fn first_error(&self) -> Option<&SharedError> {
        match self {
            Self::Single {
                status: TransactionStatus::Failed(error),
                ..
            } => Some(error),
            Self::Single { .. } => None,
            Self::Sequential { plans, .. } | Self::Parallel { plans } => {
                plans.iter().find_map(Self::first_error)
            }
        }
    }

    pub fn summarize(&self) -> TransactionPlanSummary {
        self.singles()
            .into_iter()
            .fold(TransactionPlanSummary::default(), |mut summary, (_, status)| {
                match status {
                    TransactionStatus::Successful(_) => summary.successful += 1,
                    TransactionStatus::Failed(_) => summary.failed += 1,
                    TransactionStatus::Canceled => summary.canceled += 1,
                }
                summary
            })
    }

    /// Signatures of the successful transactions, in traversal order
    pub fn signatures(&self) -> Vec<Signature> {
        self.singles()
            .into_iter()
            .filter_map(|(_, status)| match status {
                TransactionStatus::Successful(tx) => Some(tx.signature),
                _ => None,
            })
            .collect()
    }
}
