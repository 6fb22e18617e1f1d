use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Relation-type ranking handed through to the path finder untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceSchedule(Value);

impl PreferenceSchedule {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for PreferenceSchedule {
    /// Rank "1" is the most preferred group of relation types.
    fn default() -> Self {
        Self(json!({
            "1": [
                "controls-state-change-of",
                "controls-phosphorylation-of",
                "controls-transport-of",
                "controls-expression-of"
            ],
            "2": [
                "controls-production-of",
                "controls-transport-of-chemical",
                "consumption-controlled-by",
                "chemical-affects",
                "catalysis-precedes"
            ],
            "3": [
                "in-complex-with",
                "interacts-with",
                "used-to-produce",
                "reacts-with",
                "neighbor-of"
            ]
        }))
    }
}
