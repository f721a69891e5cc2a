//! Library configuration.

use crate::error::{QuestError, Result};
use crate::quest::MAX_PARTICIPANTS_LIMIT;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Environment variable overriding [`QuestConfig::contract_address`].
pub const CONTRACT_ADDRESS_ENV: &str = "QUEST_CONTRACT_ADDRESS";

/// Placeholder address used until a deployment is configured.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Knobs shared by the ledger and the submission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    /// Address of the quest contract that receives submissions.
    pub contract_address: String,
    /// Verify proofs before any speculative ledger mutation.
    pub verify_proofs: bool,
    /// Refuse joins on closed or revealed quests.
    pub enforce_active: bool,
    /// Largest capacity a quest may be created with.
    pub max_participants_limit: u32,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            contract_address: ZERO_ADDRESS.to_string(),
            verify_proofs: true,
            enforce_active: true,
            max_participants_limit: MAX_PARTICIPANTS_LIMIT,
        }
    }
}

impl QuestConfig {
    /// Load from JSON; missing file -> defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|e| QuestError::Config(e.to_string()))?;
        let config: Self =
            serde_json::from_slice(&bytes).map_err(|e| QuestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist to JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| QuestError::Config(e.to_string()))?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| QuestError::Config(e.to_string()))?;
        fs::write(path, data).map_err(|e| QuestError::Config(e.to_string()))
    }

    /// Applies the contract address override from the environment.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(address) = std::env::var(CONTRACT_ADDRESS_ENV) {
            let address = address.trim();
            if !address.is_empty() {
                self.contract_address = address.to_string();
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks address shape and the capacity limit.
    pub fn validate(&self) -> Result<()> {
        let digits = self
            .contract_address
            .strip_prefix("0x")
            .ok_or_else(|| QuestError::Config("contract address must start with 0x".into()))?;
        if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(QuestError::Config(format!(
                "contract address {} is not 20 hex bytes",
                self.contract_address
            )));
        }
        if self.max_participants_limit == 0 || self.max_participants_limit > MAX_PARTICIPANTS_LIMIT {
            return Err(QuestError::Config(format!(
                "max_participants_limit must be within 1..={MAX_PARTICIPANTS_LIMIT}"
            )));
        }
        Ok(())
    }

    /// True while the address still points at the zero placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.contract_address.eq_ignore_ascii_case(ZERO_ADDRESS)
    }
}
