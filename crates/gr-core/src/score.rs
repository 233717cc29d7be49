//! Candidate action scoring and selection.
//!
//! Coverage is the fraction of a reference instance set whose prediction
//! flips to favorable after the action; cost is the mean distance over
//! exactly the flipped subset and is undefined (not zero) when nothing
//! flips. Selection between candidates is deterministic: strictly higher
//! coverage wins, then strictly lower cost, and remaining ties keep the
//! earlier-proposed candidate.

use crate::distance::DistanceFn;
use crate::predict::{predict_checked, Predictor};
use gr_common::{Action, Error, Instance, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// An action with its coverage and cost over a reference instance set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub action: Action,
    /// Fraction of the reference set whose prediction flipped.
    pub coverage: f64,
    /// Mean distance over the flipped subset; `None` when coverage is 0.
    pub cost: Option<f64>,
}

/// Score one action against a set of instances.
///
/// The predictor is called once for the whole modified batch.
pub fn score_action(
    action: &Action,
    instances: &[Instance],
    predictor: &dyn Predictor,
    distance: &DistanceFn,
) -> Result<ScoredCandidate> {
    if instances.is_empty() {
        return Err(Error::Config(
            "coverage is undefined over an empty instance set".into(),
        ));
    }

    let modified = instances
        .par_iter()
        .map(|i| action.apply(i))
        .collect::<Result<Vec<_>>>()?;
    let outcomes = predict_checked(predictor, &modified)?;

    let flipped: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter_map(|(i, o)| o.is_favorable().then_some(i))
        .collect();
    let coverage = flipped.len() as f64 / instances.len() as f64;

    let cost = if flipped.is_empty() {
        None
    } else {
        let costs = flipped
            .par_iter()
            .map(|&i| distance.measure(&instances[i], &modified[i]))
            .collect::<Result<Vec<_>>>()?;
        Some(costs.iter().sum::<f64>() / flipped.len() as f64)
    };

    Ok(ScoredCandidate {
        action: action.clone(),
        coverage,
        cost,
    })
}

/// Whether `challenger` strictly beats `incumbent` under the selection rule.
///
/// Equal coverage and equal cost is NOT an improvement, which is what makes
/// the first-proposed candidate win overall ties.
pub(crate) fn improves(challenger: &ScoredCandidate, incumbent: &ScoredCandidate) -> bool {
    if challenger.coverage > incumbent.coverage {
        return true;
    }
    if challenger.coverage < incumbent.coverage {
        return false;
    }
    match (challenger.cost, incumbent.cost) {
        (Some(a), Some(b)) => a < b,
        // a defined cost beats an undefined one at equal coverage
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Index of the best candidate in proposal order, or `None` for an empty
/// pool. Candidates with coverage 0 can still be selected (as zero-coverage
/// placeholders) when nothing better exists.
pub fn select_best(candidates: &[ScoredCandidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        match best {
            None => best = Some(i),
            Some(b) => {
                if improves(candidate, &candidates[b]) {
                    best = Some(i);
                }
            }
        }
    }
    best
}
