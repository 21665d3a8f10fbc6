//! Subscription tiers and feature gates.
//!
//! The room sync core never consults entitlements; the owning application
//! checks [`EntitlementProvider::can_host_room`] before it starts hosting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Plus,
    Pro,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Plus => write!(f, "plus"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Named feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    HostRoom,
    UnlimitedOptions,
}

/// Source of the current user's entitlements
pub trait EntitlementProvider {
    fn tier(&self) -> Tier;

    fn flag(&self, feature: Feature) -> bool;

    /// Maximum number of options per decision, `None` when unlimited
    fn option_limit(&self) -> Option<usize>;

    fn can_host_room(&self) -> bool {
        self.flag(Feature::HostRoom)
    }
}

/// Entitlements derived from a fixed tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticEntitlements {
    tier: Tier,
}

impl StaticEntitlements {
    #[must_use]
    pub const fn new(tier: Tier) -> Self {
        Self { tier }
    }
}

const FREE_OPTION_LIMIT: usize = 3;

impl EntitlementProvider for StaticEntitlements {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn flag(&self, feature: Feature) -> bool {
        match feature {
            Feature::HostRoom | Feature::UnlimitedOptions => self.tier >= Tier::Plus,
        }
    }

    fn option_limit(&self) -> Option<usize> {
        if self.flag(Feature::UnlimitedOptions) {
            None
        } else {
            Some(FREE_OPTION_LIMIT)
        }
    }
}
