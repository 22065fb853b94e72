//! Test Utilities Module
//!
//! Deterministic stand-ins for the planner's and executor's collaborators:
//! a synthetic size model, sized instructions, a scripted transaction
//! executor and a scripted simulator.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use tokio_util::sync::CancellationToken;

use crate::tx_planner::{
    CapacityOracle, PlanningError, SimulationOutcome, SuccessfulTransaction,
    TransactionMessage, TransactionMessageExecutor, TransactionSimulator,
};

/// Program id used by every test instruction
pub const TEST_PROGRAM: Pubkey = Pubkey::new_from_array([7u8; 32]);

/// Size model where a message costs a fixed overhead plus its instruction data
///
/// Makes capacity arithmetic in tests exact and independent of account keys.
#[derive(Debug, Clone, Copy)]
pub struct FixedOverheadOracle {
    pub overhead: usize,
    pub size_limit: usize,
}

impl FixedOverheadOracle {
    pub fn new(overhead: usize, size_limit: usize) -> Self {
        Self {
            overhead,
            size_limit,
        }
    }
}

impl CapacityOracle for FixedOverheadOracle {
    fn size_limit(&self) -> usize {
        self.size_limit
    }

    fn message_size(&self, message: &TransactionMessage) -> Result<usize, PlanningError> {
        Ok(self.overhead
            + message
                .instructions()
                .iter()
                .map(|ix| ix.data.len())
                .sum::<usize>())
    }
}

/// Instruction with `size` data bytes, all equal to `tag`
pub fn sized_instruction(tag: u8, size: usize) -> Instruction {
    Instruction::new_with_bytes(TEST_PROGRAM, &vec![tag; size], vec![])
}

/// First data byte of every instruction in `message`
pub fn message_tags(message: &TransactionMessage) -> Vec<u8> {
    message
        .instructions()
        .iter()
        .filter_map(|ix| ix.data.first().copied())
        .collect()
}

/// Scripted transaction executor
///
/// Messages containing an instruction tagged with one of `failing_tags`
/// fail; every other message succeeds with a deterministic signature.
/// Calls are recorded in the order they start.
#[derive(Default)]
pub struct MockExecutor {
    failing_tags: HashSet<u8>,
    delay: Option<Duration>,
    calls: Mutex<Vec<TransactionMessage>>,
    counter: AtomicU8,
}

impl MockExecutor {
    /// Executor that succeeds for every message
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail messages containing any of `tags`
    pub fn failing_on(tags: impl IntoIterator<Item = u8>) -> Self {
        Self {
            failing_tags: tags.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<TransactionMessage> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Tags of every executed message, flattened in call order
    pub fn executed_tags(&self) -> Vec<u8> {
        self.calls.lock().iter().flat_map(message_tags).collect()
    }
}

#[async_trait]
impl TransactionMessageExecutor for MockExecutor {
    async fn execute_transaction_message(
        &self,
        message: &TransactionMessage,
        _abort: &CancellationToken,
    ) -> Result<SuccessfulTransaction> {
        self.calls.lock().push(message.clone());
        let call = self.counter.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(tag) = message_tags(message)
            .into_iter()
            .find(|tag| self.failing_tags.contains(tag))
        {
            return Err(anyhow::anyhow!("Mock execution failed for tag {}", tag));
        }

        Ok(SuccessfulTransaction::new(Signature::from([call.wrapping_add(1); 64]))
            .with_context(serde_json::json!({ "call": call })))
    }
}

/// Scripted transaction simulator
pub struct MockSimulator {
    outcome: std::result::Result<SimulationOutcome, String>,
    calls: Mutex<Vec<(VersionedTransaction, bool)>>,
}

impl MockSimulator {
    /// Simulation succeeds consuming `units`
    pub fn consuming(units: u64) -> Self {
        Self::with_outcome(SimulationOutcome {
            units_consumed: Some(units),
            err: None,
        })
    }

    /// Simulated transaction fails after consuming `units`
    pub fn failing_transaction(units: u64, err: &str) -> Self {
        Self::with_outcome(SimulationOutcome {
            units_consumed: Some(units),
            err: Some(err.to_string()),
        })
    }

    /// Simulation succeeds but reports no consumed units
    pub fn without_units() -> Self {
        Self::with_outcome(SimulationOutcome::default())
    }

    /// The simulator itself fails (e.g. RPC unavailable)
    pub fn unavailable(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(outcome: SimulationOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulated transactions with their `replace_recent_blockhash` flag
    pub fn calls(&self) -> Vec<(VersionedTransaction, bool)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TransactionSimulator for MockSimulator {
    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        replace_recent_blockhash: bool,
    ) -> Result<SimulationOutcome> {
        self.calls
            .lock()
            .push((transaction.clone(), replace_recent_blockhash));
        self.outcome.clone().map_err(|reason| anyhow::anyhow!(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_overhead_oracle_sums_data() {
        let oracle = FixedOverheadOracle::new(20, 100);
        let message = TransactionMessage::v0()
            .append_instruction(sized_instruction(1, 30))
            .append_instruction(sized_instruction(2, 40));

        assert_eq!(oracle.message_size(&message).unwrap(), 90);
        assert_eq!(oracle.free_bytes(&message).unwrap(), 10);
        assert_eq!(message_tags(&message), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_mock_executor_scripted_failure() {
        let executor = MockExecutor::failing_on([2]);
        let abort = CancellationToken::new();
        let ok = TransactionMessage::v0().append_instruction(sized_instruction(1, 4));
        let bad = TransactionMessage::v0().append_instruction(sized_instruction(2, 4));

        assert!(executor.execute_transaction_message(&ok, &abort).await.is_ok());
        let err = executor
            .execute_transaction_message(&bad, &abort)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tag 2"));
        assert_eq!(executor.call_count(), 2);
        assert_eq!(executor.executed_tags(), vec![1, 2]);
    }
}
