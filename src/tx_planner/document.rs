//! JSON instruction plan documents
//!
//! Lets instruction plans be written by hand or produced by other tools:
//!
//! ```json
//! {
//!   "fee_payer": "…",
//!   "plan": {
//!     "kind": "sequential",
//!     "plans": [
//!       { "kind": "single", "program_id": "…", "data": "AQID" },
//!       { "kind": "packed", "instructions": [ … ] }
//!     ]
//!   }
//! }
//! ```
//!
//! Pubkeys and hashes are base58, instruction data is base64.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::tx_planner::instructions::InstructionPlan;
use crate::tx_planner::message::{TransactionMessage, TransactionVersion};
use crate::tx_planner::packers::message_packer_instruction_plan_from_instructions;

fn default_divisible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDocument {
    pub pubkey: String,
    #[serde(default)]
    pub is_signer: bool,
    #[serde(default)]
    pub is_writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDocument {
    pub program_id: String,
    #[serde(default)]
    pub accounts: Vec<AccountDocument>,
    /// Base64 encoded instruction data
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNode {
    Single(InstructionDocument),
    Sequential {
        #[serde(default = "default_divisible")]
        divisible: bool,
        plans: Vec<PlanNode>,
    },
    Parallel {
        plans: Vec<PlanNode>,
    },
    /// Instructions packed, in order, into as few messages as fit
    Packed {
        instructions: Vec<InstructionDocument>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub version: Option<TransactionVersion>,
    #[serde(default)]
    pub fee_payer: Option<String>,
    #[serde(default)]
    pub recent_blockhash: Option<String>,
    #[serde(default)]
    pub last_valid_block_height: u64,
    pub plan: PlanNode,
}

impl PlanDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse plan document")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan document {}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn instruction_plan(&self) -> Result<InstructionPlan> {
        self.plan.to_instruction_plan()
    }

    /// Message every planned transaction starts from
    ///
    /// `default_version` applies when the document does not name one.
    pub fn message_template(&self, default_version: TransactionVersion) -> Result<TransactionMessage> {
        let mut message = TransactionMessage::new(self.version.unwrap_or(default_version));
        if let Some(fee_payer) = &self.fee_payer {
            message = message.with_fee_payer(parse_pubkey(fee_payer)?);
        }
        if let Some(blockhash) = &self.recent_blockhash {
            let blockhash = Hash::from_str(blockhash)
                .map_err(|e| anyhow::anyhow!("Invalid blockhash {}: {}", blockhash, e))?;
            message = message.with_blockhash_lifetime(blockhash, self.last_valid_block_height);
        }
        Ok(message)
    }
}

impl PlanNode {
    pub fn to_instruction_plan(&self) -> Result<InstructionPlan> {
        Ok(match self {
            Self::Single(ix) => InstructionPlan::Single(ix.to_instruction()?),
            Self::Sequential { divisible, plans } => InstructionPlan::Sequential {
                divisible: *divisible,
                plans: plans
                    .iter()
                    .map(Self::to_instruction_plan)
                    .collect::<Result<_>>()?,
            },
            Self::Parallel { plans } => InstructionPlan::Parallel {
                plans: plans
                    .iter()
                    .map(Self::to_instruction_plan)
                    .collect::<Result<_>>()?,
            },
            Self::Packed { instructions } => {
                let instructions = instructions
                    .iter()
                    .map(InstructionDocument::to_instruction)
                    .collect::<Result<Vec<_>>>()?;
                message_packer_instruction_plan_from_instructions(instructions)
            }
        })
    }
}

impl InstructionDocument {
    pub fn to_instruction(&self) -> Result<Instruction> {
        let program_id = parse_pubkey(&self.program_id)?;
        let accounts = self
            .accounts
            .iter()
            .map(|account| {
                let pubkey = parse_pubkey(&account.pubkey)?;
                Ok(if account.is_writable {
                    AccountMeta::new(pubkey, account.is_signer)
                } else {
                    AccountMeta::new_readonly(pubkey, account.is_signer)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let data = BASE64
            .decode(&self.data)
            .with_context(|| format!("Invalid base64 data for program {}", self.program_id))?;

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

fn parse_pubkey(value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).map_err(|e| anyhow::anyhow!("Invalid pubkey {}: {}", value, e))
}
