//! Capacity oracle
//!
//! Answers whether a message fits the transaction size ceiling and how many
//! bytes are left. The planner and the message packers only ever reason about
//! size through this trait, so tests can swap in a synthetic size model.

use solana_sdk::packet::PACKET_DATA_SIZE;

use crate::tx_planner::errors::PlanningError;
use crate::tx_planner::message::TransactionMessage;

/// Maximum serialized transaction size accepted by the cluster
pub const TRANSACTION_SIZE_LIMIT: usize = PACKET_DATA_SIZE;

/// Size model used to decide whether work fits in a message
pub trait CapacityOracle: Send + Sync {
    /// The ceiling every planned message must stay under (inclusive)
    fn size_limit(&self) -> usize {
        TRANSACTION_SIZE_LIMIT
    }

    /// Size of the message once encoded
    fn message_size(&self, message: &TransactionMessage) -> Result<usize, PlanningError>;

    fn fits(&self, message: &TransactionMessage) -> Result<bool, PlanningError> {
        Ok(self.message_size(message)? <= self.size_limit())
    }

    fn free_bytes(&self, message: &TransactionMessage) -> Result<usize, PlanningError> {
        Ok(self.size_limit().saturating_sub(self.message_size(message)?))
    }

    /// Check that `updated` (derived from `base`) still fits
    ///
    /// Returns the updated message's size, or a capacity error carrying the
    /// exact deficit relative to `base`.
    fn ensure_fits(
        &self,
        base: &TransactionMessage,
        updated: &TransactionMessage,
    ) -> Result<usize, PlanningError> {
        let updated_size = self.message_size(updated)?;
        if updated_size > self.size_limit() {
            let base_size = self.message_size(base)?;
            return Err(PlanningError::cannot_accommodate(
                base_size,
                updated_size,
                self.size_limit(),
            ));
        }
        Ok(updated_size)
    }
}

/// Oracle measuring the real wire encoding of the compiled transaction
#[derive(Debug, Clone, Copy)]
pub struct WireSizeOracle {
    size_limit: usize,
}

impl WireSizeOracle {
    pub fn new() -> Self {
        Self {
            size_limit: TRANSACTION_SIZE_LIMIT,
        }
    }

    /// Use a lower ceiling, e.g. to leave room for instructions appended after planning
    ///
    /// Values above `TRANSACTION_SIZE_LIMIT` are clamped to it.
    pub fn with_size_limit(size_limit: usize) -> Self {
        Self {
            size_limit: size_limit.min(TRANSACTION_SIZE_LIMIT),
        }
    }
}

impl Default for WireSizeOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityOracle for WireSizeOracle {
    fn size_limit(&self) -> usize {
        self.size_limit
    }

    fn message_size(&self, message: &TransactionMessage) -> Result<usize, PlanningError> {
        message.encoded_size()
    }
}
