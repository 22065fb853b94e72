//! Transaction message builder
//!
//! `TransactionMessage` is the growable container that becomes a
//! transaction's payload. Every mutator returns a new message so candidates
//! can be tried against the capacity ceiling without disturbing the original.
//!
//! Instruction ordering follows the durable nonce rules:
//! 1. advance_nonce_account (if durable)
//! 2. Compute budget instructions
//! 3. Program instructions

use std::collections::HashSet;

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, Message as LegacyMessage, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    system_instruction, system_program,
    transaction::VersionedTransaction,
};

use crate::tx_planner::errors::PlanningError;

/// Account keys addressable by a compiled message (u8 indices)
const MAX_ACCOUNT_KEYS: usize = 256;

/// Wire format of the compiled transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionVersion {
    Legacy,
    #[default]
    V0,
}

/// Lifetime constraint of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Valid until the cluster passes `last_valid_block_height`
    Blockhash {
        blockhash: Hash,
        last_valid_block_height: u64,
    },
    /// Valid until the nonce account is advanced
    DurableNonce {
        nonce_account: Pubkey,
        nonce_authority: Pubkey,
        nonce: Hash,
    },
}

impl Lifetime {
    /// The hash written into the message's `recent_blockhash` field
    pub fn recent_blockhash(&self) -> Hash {
        match self {
            Self::Blockhash { blockhash, .. } => *blockhash,
            Self::DurableNonce { nonce, .. } => *nonce,
        }
    }
}

/// Ordered instruction list plus fee payer and lifetime metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionMessage {
    version: TransactionVersion,
    fee_payer: Option<Pubkey>,
    lifetime: Option<Lifetime>,
    instructions: Vec<Instruction>,
}

impl TransactionMessage {
    pub fn new(version: TransactionVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn legacy() -> Self {
        Self::new(TransactionVersion::Legacy)
    }

    pub fn v0() -> Self {
        Self::new(TransactionVersion::V0)
    }

    pub fn version(&self) -> TransactionVersion {
        self.version
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.fee_payer.as_ref()
    }

    pub fn lifetime(&self) -> Option<&Lifetime> {
        self.lifetime.as_ref()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_durable_nonce(&self) -> bool {
        matches!(self.lifetime, Some(Lifetime::DurableNonce { .. }))
    }

    pub fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    /// Use a recent blockhash as lifetime, dropping any advance_nonce instruction
    pub fn with_blockhash_lifetime(mut self, blockhash: Hash, last_valid_block_height: u64) -> Self {
        if self.is_durable_nonce() && self.instructions.first().is_some_and(is_advance_nonce) {
            self.instructions.remove(0);
        }
        self.lifetime = Some(Lifetime::Blockhash {
            blockhash,
            last_valid_block_height,
        });
        self
    }

    /// Use a durable nonce as lifetime
    ///
    /// The advance_nonce_account instruction is placed at index 0, replacing
    /// the one of a previous durable nonce lifetime.
    pub fn with_durable_nonce_lifetime(
        mut self,
        nonce_account: Pubkey,
        nonce_authority: Pubkey,
        nonce: Hash,
    ) -> Self {
        let advance = system_instruction::advance_nonce_account(&nonce_account, &nonce_authority);
        if self.instructions.first().is_some_and(is_advance_nonce) {
            self.instructions[0] = advance;
        } else {
            self.instructions.insert(0, advance);
        }
        self.lifetime = Some(Lifetime::DurableNonce {
            nonce_account,
            nonce_authority,
            nonce,
        });
        self
    }

    pub fn append_instruction(&self, instruction: Instruction) -> Self {
        let mut message = self.clone();
        message.instructions.push(instruction);
        message
    }

    pub fn append_instructions(&self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        let mut message = self.clone();
        message.instructions.extend(instructions);
        message
    }

    /// Insert at the front, keeping a leading advance_nonce_account in place
    pub fn prepend_instruction(&self, instruction: Instruction) -> Self {
        let mut message = self.clone();
        let index = usize::from(message.instructions.first().is_some_and(is_advance_nonce));
        message.instructions.insert(index, instruction);
        message
    }

    pub fn replace_instruction(&self, index: usize, instruction: Instruction) -> Self {
        let mut message = self.clone();
        if let Some(slot) = message.instructions.get_mut(index) {
            *slot = instruction;
        }
        message
    }

    /// The hash compiled into the message (zero hash without a lifetime)
    pub fn recent_blockhash(&self) -> Hash {
        self.lifetime
            .as_ref()
            .map(Lifetime::recent_blockhash)
            .unwrap_or_default()
    }

    /// Compile into a wire message
    ///
    /// A missing fee payer compiles with the zero pubkey, which occupies the
    /// same number of bytes as the real payer.
    pub fn compile(&self) -> Result<VersionedMessage, PlanningError> {
        let payer = self.fee_payer.unwrap_or_default();
        let blockhash = self.recent_blockhash();

        match self.version {
            TransactionVersion::Legacy => {
                let keys = self.unique_account_keys(&payer);
                if keys > MAX_ACCOUNT_KEYS {
                    return Err(PlanningError::MessageCompilation(format!(
                        "legacy message references {} accounts (max {})",
                        keys, MAX_ACCOUNT_KEYS
                    )));
                }
                Ok(VersionedMessage::Legacy(LegacyMessage::new_with_blockhash(
                    &self.instructions,
                    Some(&payer),
                    &blockhash,
                )))
            }
            TransactionVersion::V0 => {
                v0::Message::try_compile(&payer, &self.instructions, &[], blockhash)
                    .map(VersionedMessage::V0)
                    .map_err(|e| PlanningError::MessageCompilation(e.to_string()))
            }
        }
    }

    /// Compile into a transaction with one empty signature per required signer
    pub fn to_unsigned_transaction(&self) -> Result<VersionedTransaction, PlanningError> {
        let message = self.compile()?;
        let signers = usize::from(message.header().num_required_signatures);
        Ok(VersionedTransaction {
            signatures: vec![Signature::default(); signers],
            message,
        })
    }

    /// Exact byte length of the serialized transaction, signatures included
    pub fn encoded_size(&self) -> Result<usize, PlanningError> {
        let transaction = self.to_unsigned_transaction()?;
        let size = bincode::serialized_size(&transaction)
            .map_err(|e| PlanningError::MessageCompilation(e.to_string()))?;
        usize::try_from(size).map_err(|e| PlanningError::MessageCompilation(e.to_string()))
    }

    /// Validate instruction ordering against the message lifetime
    ///
    /// A durable nonce message must start with exactly one
    /// advance_nonce_account; a blockhash message must contain none.
    pub fn validate_instruction_order(&self) -> Result<(), PlanningError> {
        let advance_positions: Vec<usize> = self
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, ix)| is_advance_nonce(ix))
            .map(|(idx, _)| idx)
            .collect();

        if self.is_durable_nonce() {
            if advance_positions.first() != Some(&0) {
                return Err(PlanningError::Internal(
                    "durable nonce message must start with advance_nonce_account".to_string(),
                ));
            }
            if let Some(idx) = advance_positions.get(1) {
                return Err(PlanningError::Internal(format!(
                    "multiple advance_nonce_account instructions found (at position {})",
                    idx
                )));
            }
        } else if let Some(idx) = advance_positions.first() {
            return Err(PlanningError::Internal(format!(
                "non-durable message should not have advance_nonce_account (found at position {})",
                idx
            )));
        }

        Ok(())
    }

    fn unique_account_keys(&self, payer: &Pubkey) -> usize {
        let mut keys = HashSet::with_capacity(self.instructions.len() * 4 + 1);
        keys.insert(*payer);
        for ix in &self.instructions {
            keys.insert(ix.program_id);
            keys.extend(ix.accounts.iter().map(|meta| meta.pubkey));
        }
        keys.len()
    }
}

/// System program advance_nonce_account has discriminator 4 (u32 little-endian)
pub fn is_advance_nonce(ix: &Instruction) -> bool {
    ix.program_id == system_program::id() && ix.data.len() >= 4 && ix.data[..4] == [4, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::AccountMeta;

    fn program_ix(data_len: usize) -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &vec![7u8; data_len],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    #[test]
    fn test_append_is_immutable_update() {
        let base = TransactionMessage::v0().with_fee_payer(Pubkey::new_unique());
        let updated = base.append_instruction(program_ix(4));

        assert!(base.instructions().is_empty());
        assert_eq!(updated.instructions().len(), 1);
    }

    #[test]
    fn test_encoded_size_matches_bincode_transaction() {
        let message = TransactionMessage::legacy()
            .with_fee_payer(Pubkey::new_unique())
            .with_blockhash_lifetime(Hash::new_unique(), 100)
            .append_instruction(program_ix(10));

        let tx = message.to_unsigned_transaction().unwrap();
        let expected = bincode::serialize(&tx).unwrap().len();
        assert_eq!(message.encoded_size().unwrap(), expected);
    }

    #[test]
    fn test_encoded_size_grows_by_data_length() {
        let payer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let ix = |len: usize| {
            Instruction::new_with_bytes(program, &vec![1u8; len], vec![AccountMeta::new(account, false)])
        };
        let small = TransactionMessage::v0().with_fee_payer(payer).append_instruction(ix(10));
        let large = TransactionMessage::v0().with_fee_payer(payer).append_instruction(ix(20));

        assert_eq!(
            large.encoded_size().unwrap() - small.encoded_size().unwrap(),
            10
        );
    }

    #[test]
    fn test_v0_adds_version_prefix_and_lookup_tables() {
        let payer = Pubkey::new_unique();
        let ix = program_ix(8);
        let legacy = TransactionMessage::legacy().with_fee_payer(payer).append_instruction(ix.clone());
        let v0 = TransactionMessage::v0().with_fee_payer(payer).append_instruction(ix);

        // version prefix byte plus the empty lookup table vector
        assert_eq!(v0.encoded_size().unwrap(), legacy.encoded_size().unwrap() + 2);
    }

    #[test]
    fn test_durable_nonce_places_advance_first() {
        let nonce_account = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let message = TransactionMessage::v0()
            .with_fee_payer(authority)
            .append_instruction(program_ix(4))
            .with_durable_nonce_lifetime(nonce_account, authority, Hash::new_unique())
            .with_durable_nonce_lifetime(nonce_account, authority, Hash::new_unique());

        assert_eq!(message.instructions().len(), 2);
        assert!(is_advance_nonce(&message.instructions()[0]));
        assert!(message.validate_instruction_order().is_ok());
    }

    #[test]
    fn test_prepend_keeps_advance_nonce_first() {
        let authority = Pubkey::new_unique();
        let message = TransactionMessage::v0()
            .with_durable_nonce_lifetime(Pubkey::new_unique(), authority, Hash::new_unique())
            .prepend_instruction(program_ix(2));

        assert!(is_advance_nonce(&message.instructions()[0]));
        assert_eq!(message.instructions().len(), 2);
    }

    #[test]
    fn test_switching_to_blockhash_drops_advance_nonce() {
        let authority = Pubkey::new_unique();
        let message = TransactionMessage::v0()
            .with_durable_nonce_lifetime(Pubkey::new_unique(), authority, Hash::new_unique())
            .append_instruction(program_ix(2))
            .with_blockhash_lifetime(Hash::new_unique(), 10);

        assert_eq!(message.instructions().len(), 1);
        assert!(message.validate_instruction_order().is_ok());
    }

    #[test]
    fn test_validate_rejects_stray_advance_nonce() {
        let message = TransactionMessage::v0()
            .append_instruction(program_ix(2))
            .append_instruction(system_instruction::advance_nonce_account(
                &Pubkey::new_unique(),
                &Pubkey::new_unique(),
            ));

        let err = message.validate_instruction_order().unwrap_err();
        assert!(err.to_string().contains("should not have advance_nonce"));
    }
}
