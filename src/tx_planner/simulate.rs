//! Compute unit estimation by simulation
//!
//! Messages are planned with a provisory `SetComputeUnitLimit` instruction so
//! their size already accounts for it. Before execution the estimator
//! simulates the message against the maximum limit and rewrites the
//! provisory value with the units actually consumed.
//!
//! ## Provisory values
//! A limit of `PROVISORY_COMPUTE_UNIT_LIMIT` or `MAX_COMPUTE_UNIT_LIMIT` is
//! treated as a placeholder. Any other value was chosen by the caller and is
//! left untouched.

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig, compute_budget::ComputeBudgetInstruction,
    instruction::Instruction, transaction::VersionedTransaction,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::metrics;
use crate::tx_planner::errors::ComputeBudgetError;
use crate::tx_planner::executor::TransactionMessageExecutor;
use crate::tx_planner::message::TransactionMessage;
use crate::tx_planner::result::SuccessfulTransaction;

/// Highest compute unit limit a transaction may request
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// Placeholder limit written before estimation
pub const PROVISORY_COMPUTE_UNIT_LIMIT: u32 = 0;

/// Compute budget program discriminator of `SetComputeUnitLimit`
const SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR: u8 = 2;

fn set_compute_unit_limit_units(ix: &Instruction) -> Option<u32> {
    if ix.program_id != solana_sdk::compute_budget::id() {
        return None;
    }
    match ix.data.as_slice() {
        [SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR, units @ ..] => {
            let units: [u8; 4] = units.try_into().ok()?;
            Some(u32::from_le_bytes(units))
        }
        _ => None,
    }
}

/// Position and value of the message's `SetComputeUnitLimit` instruction
pub fn compute_unit_limit_instruction_index_and_units(
    message: &TransactionMessage,
) -> Option<(usize, u32)> {
    message
        .instructions()
        .iter()
        .enumerate()
        .find_map(|(idx, ix)| set_compute_unit_limit_units(ix).map(|units| (idx, units)))
}

/// Set the compute unit limit, updating the existing instruction in place or
/// inserting one after any advance_nonce_account
pub fn set_compute_unit_limit(message: &TransactionMessage, units: u32) -> TransactionMessage {
    let ix = ComputeBudgetInstruction::set_compute_unit_limit(units);
    match compute_unit_limit_instruction_index_and_units(message) {
        Some((idx, current)) if current == units => {
            debug!(idx, units, "Compute unit limit unchanged");
            message.clone()
        }
        Some((idx, _)) => message.replace_instruction(idx, ix),
        None => message.prepend_instruction(ix),
    }
}

/// Insert a provisory limit instruction unless the message already has one
pub fn fill_provisory_compute_unit_limit(message: &TransactionMessage) -> TransactionMessage {
    if compute_unit_limit_instruction_index_and_units(message).is_some() {
        return message.clone();
    }
    debug!("Inserting provisory compute unit limit");
    message.prepend_instruction(ComputeBudgetInstruction::set_compute_unit_limit(
        PROVISORY_COMPUTE_UNIT_LIMIT,
    ))
}

/// What a simulation reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub units_consumed: Option<u64>,
    /// Transaction error reported by the simulated execution
    pub err: Option<String>,
}

/// Simulates an unsigned transaction
#[async_trait]
pub trait TransactionSimulator: Send + Sync {
    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        replace_recent_blockhash: bool,
    ) -> anyhow::Result<SimulationOutcome>;
}

#[async_trait]
impl<S: TransactionSimulator + ?Sized> TransactionSimulator for Arc<S> {
    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        replace_recent_blockhash: bool,
    ) -> anyhow::Result<SimulationOutcome> {
        (**self)
            .simulate_transaction(transaction, replace_recent_blockhash)
            .await
    }
}

/// `simulateTransaction` over JSON-RPC
pub struct RpcSimulator {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcSimulator {
    pub fn new(client: Arc<RpcClient>) -> Self {
        let commitment = client.commitment();
        Self { client, commitment }
    }

    pub fn with_commitment(mut self, commitment: CommitmentConfig) -> Self {
        self.commitment = commitment;
        self
    }
}

#[async_trait]
impl TransactionSimulator for RpcSimulator {
    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        replace_recent_blockhash: bool,
    ) -> anyhow::Result<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await?;

        Ok(SimulationOutcome {
            units_consumed: response.value.units_consumed,
            err: response.value.err.map(|err| format!("{:?}", err)),
        })
    }
}

/// Estimates compute unit limits by simulating at the maximum limit
pub struct ComputeUnitEstimator<S> {
    simulator: S,
}

impl<S: TransactionSimulator> ComputeUnitEstimator<S> {
    pub fn new(simulator: S) -> Self {
        Self { simulator }
    }

    /// Units consumed by `message` when simulated with the maximum limit
    ///
    /// Blockhash messages are simulated with `replace_recent_blockhash` so a
    /// stale or placeholder hash does not fail the simulation; durable nonce
    /// messages keep theirs.
    pub async fn estimate(
        &self,
        message: &TransactionMessage,
        abort: &CancellationToken,
    ) -> Result<u32, ComputeBudgetError> {
        let transaction =
            set_compute_unit_limit(message, MAX_COMPUTE_UNIT_LIMIT).to_unsigned_transaction()?;
        let replace_recent_blockhash = !message.is_durable_nonce();

        let outcome = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                return Err(ComputeBudgetError::EstimationFailed {
                    reason: "estimation aborted".to_string(),
                });
            }
            outcome = self.simulator.simulate_transaction(&transaction, replace_recent_blockhash) => outcome,
        };

        let outcome = outcome.map_err(|e| {
            metrics().compute_unit_estimate_failures.inc();
            ComputeBudgetError::EstimationFailed {
                reason: e.to_string(),
            }
        })?;

        let Some(units_consumed) = outcome.units_consumed else {
            metrics().compute_unit_estimate_failures.inc();
            return Err(ComputeBudgetError::EstimationFailed {
                reason: "simulation did not report consumed units".to_string(),
            });
        };
        let units_consumed = u32::try_from(units_consumed).unwrap_or(u32::MAX);

        if let Some(reason) = outcome.err {
            metrics().compute_unit_estimate_failures.inc();
            warn!(units_consumed, reason = %reason, "Simulation failed during compute unit estimation");
            return Err(ComputeBudgetError::SimulationFailed {
                units_consumed,
                reason,
            });
        }

        metrics().compute_unit_estimates.inc();
        debug!(units_consumed, "Compute units estimated");
        Ok(units_consumed)
    }

    /// Replace a provisory limit with the estimated one
    ///
    /// Messages carrying a caller-chosen limit are returned unchanged without
    /// simulating. Messages without a limit instruction get one.
    pub async fn estimate_and_update_provisory_compute_unit_limit(
        &self,
        message: &TransactionMessage,
        abort: &CancellationToken,
    ) -> Result<TransactionMessage, ComputeBudgetError> {
        if let Some((_, units)) = compute_unit_limit_instruction_index_and_units(message) {
            if units != PROVISORY_COMPUTE_UNIT_LIMIT && units != MAX_COMPUTE_UNIT_LIMIT {
                debug!(units, "Keeping explicit compute unit limit");
                return Ok(message.clone());
            }
        }

        let units = self.estimate(message, abort).await?;
        Ok(set_compute_unit_limit(message, units))
    }
}

/// Executor that estimates the compute unit limit before delegating
pub struct ComputeBudgetExecutor<E, S> {
    inner: E,
    estimator: ComputeUnitEstimator<S>,
}

impl<E, S> ComputeBudgetExecutor<E, S>
where
    E: TransactionMessageExecutor,
    S: TransactionSimulator,
{
    pub fn new(inner: E, simulator: S) -> Self {
        Self {
            inner,
            estimator: ComputeUnitEstimator::new(simulator),
        }
    }
}

#[async_trait]
impl<E, S> TransactionMessageExecutor for ComputeBudgetExecutor<E, S>
where
    E: TransactionMessageExecutor,
    S: TransactionSimulator,
{
    async fn execute_transaction_message(
        &self,
        message: &TransactionMessage,
        abort: &CancellationToken,
    ) -> anyhow::Result<SuccessfulTransaction> {
        let message = self
            .estimator
            .estimate_and_update_provisory_compute_unit_limit(message, abort)
            .await?;
        self.inner.execute_transaction_message(&message, abort).await
    }
}
