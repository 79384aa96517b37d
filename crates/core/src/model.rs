//! Model metadata and quality/cost tiers.

use serde::{Deserialize, Serialize};

/// Quality/cost tier of a model.
///
/// Declaration order is the total order: `SReasoning` is the richest tier,
/// `CEmergency` the cheapest. Degradation always moves toward `CEmergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelTier {
    #[serde(rename = "S_REASONING")]
    SReasoning,
    #[serde(rename = "A_STANDARD")]
    AStandard,
    #[serde(rename = "B_ECONOMY")]
    BEconomy,
    #[serde(rename = "C_EMERGENCY")]
    CEmergency,
}

impl ModelTier {
    pub const ALL: [ModelTier; 4] = [
        ModelTier::SReasoning,
        ModelTier::AStandard,
        ModelTier::BEconomy,
        ModelTier::CEmergency,
    ];

    /// The cheaper of `self` and `other`. Never climbs back up.
    pub fn degrade_to(self, other: ModelTier) -> ModelTier {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::SReasoning => "S_REASONING",
            ModelTier::AStandard => "A_STANDARD",
            ModelTier::BEconomy => "B_ECONOMY",
            ModelTier::CEmergency => "C_EMERGENCY",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S" | "S_REASONING" => Ok(ModelTier::SReasoning),
            "A" | "A_STANDARD" => Ok(ModelTier::AStandard),
            "B" | "B_ECONOMY" => Ok(ModelTier::BEconomy),
            "C" | "C_EMERGENCY" => Ok(ModelTier::CEmergency),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Per-token prices as reported by the aggregator (decimal strings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
}

/// Classified metadata for one model exposed by the aggregator.
///
/// Derived once per catalog refresh and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub display_name: String,
    /// Id prefix before the first `/` (e.g. `deepseek` for `deepseek/deepseek-r1`).
    pub vendor_id: String,
    pub context_length: u64,
    pub pricing: Pricing,
    pub tier: ModelTier,
    pub is_free: bool,
    pub is_reasoning: bool,
}
