//! Plaintext inputs accepted by the encoder.
//!
//! Nothing in this module is encrypted; these are the values a participant
//! types into the join or completion form before they are sealed.

use crate::error::{QuestError, Result};
use crate::quest::QuestId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Difficulty tier of a quest and its contribution multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    /// Weight 1.
    Easy,
    /// Weight 1.5.
    Medium,
    /// Weight 2.
    Hard,
    /// Weight 3.
    Legendary,
}

impl Difficulty {
    /// All tiers in ascending weight order.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Legendary,
    ];

    /// Multiplier applied to contributions of this tier.
    pub fn weight(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.5,
            Difficulty::Hard => 2.0,
            Difficulty::Legendary => 3.0,
        }
    }

    /// Maps a raw multiplier back onto its tier.
    pub fn from_weight(weight: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.weight() == weight)
            .ok_or_else(|| QuestError::encoding(format!("unsupported difficulty weight {weight}")))
    }

    fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Legendary => "Legendary",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| QuestError::encoding(format!("unknown difficulty '{raw}'")))
    }
}

/// One participant's quest submission before encryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Contributed amount; must be finite and non-negative.
    pub amount: f64,
    /// Difficulty tier the participant is contributing at.
    pub difficulty: Difficulty,
    /// Hours spent on the quest; at least one.
    pub time_spent_hours: u32,
    /// Quest the contribution belongs to.
    pub quest_id: QuestId,
    /// Address-like identifier of the submitting party.
    pub participant: String,
}

impl Contribution {
    /// Checks the plaintext invariants enforced before encryption.
    pub fn validate(&self) -> Result<()> {
        validate_amount("amount", self.amount)?;
        validate_hours(self.time_spent_hours)?;
        if self.participant.trim().is_empty() {
            return Err(QuestError::encoding("participant must not be empty"));
        }
        Ok(())
    }
}

/// Reward pool parameters sealed when a quest is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestReward {
    /// Base reward shared by completing participants.
    pub base_reward: f64,
    /// Multiplier applied on top of the base reward.
    pub bonus_multiplier: f64,
    /// Flat bonus for completion.
    pub completion_bonus: f64,
}

impl QuestReward {
    /// Checks that every component is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        validate_amount("base_reward", self.base_reward)?;
        validate_amount("bonus_multiplier", self.bonus_multiplier)?;
        validate_amount("completion_bonus", self.completion_bonus)
    }
}

/// Plaintext score report submitted when a participant completes a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Raw score achieved.
    pub score: f64,
    /// Difficulty multiplier applied to the score.
    pub difficulty: Difficulty,
    /// Hours spent; the score is normalised by this value.
    pub time_spent_hours: u32,
}

impl CompletionReport {
    /// Checks the plaintext invariants enforced before scoring.
    pub fn validate(&self) -> Result<()> {
        validate_amount("score", self.score)?;
        validate_hours(self.time_spent_hours)
    }

    /// Plaintext value of `(score * difficulty) / time_spent`.
    pub fn plain_score(&self) -> f64 {
        self.score * self.difficulty.weight() / f64::from(self.time_spent_hours)
    }
}

pub(crate) fn validate_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(QuestError::encoding(format!("{field} must be finite")));
    }
    if value < 0.0 {
        return Err(QuestError::encoding(format!("{field} must be non-negative")));
    }
    Ok(())
}

fn validate_hours(hours: u32) -> Result<()> {
    if hours == 0 {
        return Err(QuestError::encoding("time spent must be at least one hour"));
    }
    Ok(())
}
