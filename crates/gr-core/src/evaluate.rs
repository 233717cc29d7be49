//! Cumulative minimum-cost assignment over the final action portfolio.
//!
//! Each finalized action is applied to the *entire* affected population,
//! independently of which cluster it came from: an action derived elsewhere
//! may flip an individual more cheaply than their own cluster's. Costs of
//! non-flipping actions are `+inf` sentinels, so the per-individual minimum
//! across actions either lands on a flipping action or proves the
//! individual unflippable. Per-action reporting statistics are computed
//! from the raw per-action vectors BEFORE the cross-action minimum: "how
//! well this action alone performs on everyone" is a different number from
//! "how the portfolio performs when each person gets their best action".

use crate::distance::DistanceFn;
use crate::predict::{predict_checked, Predictor};
use crate::reduce::ActionEntry;
use gr_common::{Error, Instance, Result};
use gr_math::{argmin_finite, mean_finite};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The action chosen for one individual, with its realized cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignedAction {
    pub action_index: usize,
    pub cost: f64,
}

/// Raw statistics of one action evaluated alone over the full population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerActionStats {
    /// Fraction of the affected population this action flips by itself.
    pub effectiveness: f64,
    /// Mean cost over the individuals it flips; `None` when it flips nobody.
    pub cost: Option<f64>,
}

/// Full evaluation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Raw per-action statistics, index-aligned with the action set.
    pub per_action: Vec<PerActionStats>,
    /// Raw flip indicator per action per individual.
    pub per_action_flips: Vec<Vec<bool>>,
    /// Minimum-cost choice per individual; `None` marks unflippable.
    pub assignment: Vec<Option<AssignedAction>>,
    /// Assigned individuals / affected population.
    pub global_effectiveness: f64,
    /// Mean realized cost over assigned individuals; `None` when nobody
    /// was assigned (undefined, never reported as 0).
    pub global_avg_cost: Option<f64>,
    pub assigned_count: usize,
}

/// Evaluate the final action set over the whole affected population.
///
/// Placeholder entries (no action) contribute all-`+inf` cost vectors and
/// all-false flip vectors; they stay index-aligned so the assignment's
/// action indices match the reported action set.
pub fn evaluate(
    entries: &[ActionEntry],
    affected: &[Instance],
    predictor: &dyn Predictor,
    distance: &DistanceFn,
) -> Result<Evaluation> {
    if affected.is_empty() {
        return Err(Error::Config(
            "cannot evaluate over an empty affected population".into(),
        ));
    }
    if entries.is_empty() {
        return Err(Error::Config("cannot evaluate an empty action set".into()));
    }

    let n = affected.len();
    let mut per_action = Vec::with_capacity(entries.len());
    let mut per_action_flips = Vec::with_capacity(entries.len());
    let mut cost_columns: Vec<Vec<f64>> = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(action) = &entry.action else {
            per_action.push(PerActionStats {
                effectiveness: 0.0,
                cost: None,
            });
            per_action_flips.push(vec![false; n]);
            cost_columns.push(vec![f64::INFINITY; n]);
            continue;
        };

        let modified = affected
            .par_iter()
            .map(|i| action.apply(i))
            .collect::<Result<Vec<_>>>()?;
        let outcomes = predict_checked(predictor, &modified)?;

        let flips: Vec<bool> = outcomes.iter().map(|o| o.is_favorable()).collect();
        let costs: Vec<f64> = affected
            .par_iter()
            .zip(modified.par_iter())
            .zip(flips.par_iter())
            .map(|((original, modified), &flipped)| {
                if flipped {
                    distance.measure(original, modified)
                } else {
                    Ok(f64::INFINITY)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let flipped_count = flips.iter().filter(|&&f| f).count();
        per_action.push(PerActionStats {
            effectiveness: flipped_count as f64 / n as f64,
            cost: mean_finite(&costs),
        });
        per_action_flips.push(flips);
        cost_columns.push(costs);
    }

    // cross-action minimum per individual; action-index ties go low
    let mut assignment = Vec::with_capacity(n);
    let mut realized = Vec::new();
    for row in 0..n {
        let row_costs: Vec<f64> = cost_columns.iter().map(|col| col[row]).collect();
        match argmin_finite(&row_costs) {
            Some((action_index, cost)) => {
                assignment.push(Some(AssignedAction { action_index, cost }));
                realized.push(cost);
            }
            None => assignment.push(None),
        }
    }

    let assigned_count = realized.len();
    Ok(Evaluation {
        per_action,
        per_action_flips,
        assignment,
        global_effectiveness: assigned_count as f64 / n as f64,
        global_avg_cost: mean_finite(&realized),
        assigned_count,
    })
}
