//! Option model: one candidate in a decision, with weighted pros and cons

use serde::{Deserialize, Serialize};

use super::id::uuid_id;

uuid_id!(
    /// A unique identifier for a decision option
    OptionId
);

/// Lowest weight a pro or con may carry
pub const MIN_WEIGHT: u8 = 1;
/// Highest weight a pro or con may carry
pub const MAX_WEIGHT: u8 = 5;

/// Whether a factor argues for or against its option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorKind {
    Pro,
    Con,
}

/// A weighted pro or con attached to an option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub kind: FactorKind,
    pub text: String,
    /// Clamped to `MIN_WEIGHT..=MAX_WEIGHT`
    pub weight: u8,
}

impl Factor {
    #[must_use]
    pub fn new(kind: FactorKind, text: impl Into<String>, weight: u8) -> Self {
        Self {
            kind,
            text: text.into(),
            weight: weight.clamp(MIN_WEIGHT, MAX_WEIGHT),
        }
    }

    /// Weight with the sign of the factor applied
    #[must_use]
    pub fn signed_weight(&self) -> i32 {
        let weight = i32::from(self.weight);
        match self.kind {
            FactorKind::Pro => weight,
            FactorKind::Con => -weight,
        }
    }
}

/// One of the choices being compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: OptionId,
    pub title: String,
    #[serde(default)]
    pub factors: Vec<Factor>,
}

impl DecisionOption {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(),
            title: title.into(),
            factors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_pro(mut self, text: impl Into<String>, weight: u8) -> Self {
        self.add_factor(Factor::new(FactorKind::Pro, text, weight));
        self
    }

    #[must_use]
    pub fn with_con(mut self, text: impl Into<String>, weight: u8) -> Self {
        self.add_factor(Factor::new(FactorKind::Con, text, weight));
        self
    }

    pub fn add_factor(&mut self, factor: Factor) {
        self.factors.push(factor);
    }

    /// Sum of the signed weights of every factor
    #[must_use]
    pub fn score(&self) -> i32 {
        self.factors.iter().map(Factor::signed_weight).sum()
    }

    pub fn pros(&self) -> impl Iterator<Item = &Factor> {
        self.factors.iter().filter(|f| f.kind == FactorKind::Pro)
    }

    pub fn cons(&self) -> impl Iterator<Item = &Factor> {
        self.factors.iter().filter(|f| f.kind == FactorKind::Con)
    }
}
