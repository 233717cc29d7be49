//! Binary classifier outcome labels.

use serde::{Deserialize, Serialize};

/// Predicted outcome of the black-box binary classifier.
///
/// `Unfavorable` individuals form the affected population the engine works
/// on; an action "flips" an individual when the modified instance predicts
/// `Favorable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Unfavorable,
    Favorable,
}

impl Outcome {
    pub fn is_favorable(self) -> bool {
        matches!(self, Outcome::Favorable)
    }
}

impl From<bool> for Outcome {
    fn from(favorable: bool) -> Self {
        if favorable {
            Outcome::Favorable
        } else {
            Outcome::Unfavorable
        }
    }
}
