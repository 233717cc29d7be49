//! Cluster/action reduction.
//!
//! When the initial partition is finer than the requested action count, the
//! reducer iteratively merges the pair of clusters whose combined selection
//! is least harmed under the configured policy, until exactly `target_k`
//! actions remain. A cluster with no viable candidate is retained as a
//! zero-coverage placeholder so downstream accounting over the full
//! affected population stays consistent.

use crate::cluster::Cluster;
use crate::distance::DistanceFn;
use crate::predict::Predictor;
use crate::score::{score_action, select_best, ScoredCandidate};
use gr_common::{Action, Edit, Error, FeatureSchema, Instance, Result};
use gr_config::SelectionPolicy;
use gr_math::weighted_mean;
use std::collections::HashMap;

/// Harm values within this tolerance count as ties and fall to the
/// policy's secondary criterion.
const HARM_TIE_TOL: f64 = 1e-12;

/// A cluster together with its candidate action pool, in proposal order.
#[derive(Debug, Clone)]
pub struct ClusterCandidates {
    pub cluster: Cluster,
    pub actions: Vec<Action>,
}

/// One entry of the final ActionSet, with cluster-local statistics.
///
/// `action` is `None` for a zero-coverage placeholder (a cluster whose
/// candidate pool was empty).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionEntry {
    pub action: Option<Action>,
    /// Coverage of the selected action over its own (merged) cluster.
    pub coverage: f64,
    /// Cost of the selected action over its own cluster's flipped subset.
    pub cost: Option<f64>,
    /// Size of the (merged) cluster the action was selected for.
    pub size: usize,
}

/// Reduction environment: everything needed to re-score merged selections.
pub struct Reducer<'a> {
    pub schema: &'a FeatureSchema,
    pub affected: &'a [Instance],
    pub predictor: &'a dyn Predictor,
    pub distance: &'a DistanceFn,
    pub policy: SelectionPolicy,
}

struct MergeState {
    gen: u64,
    members: Vec<usize>,
    pool: Vec<Action>,
    selected: Option<ScoredCandidate>,
}

#[derive(Clone)]
struct PairEval {
    selected: Option<ScoredCandidate>,
    harm: f64,
    tie_cost: f64,
    tie_coverage: f64,
}

impl<'a> Reducer<'a> {
    /// Reduce to exactly `target_k` action entries.
    pub fn reduce(
        &self,
        items: Vec<ClusterCandidates>,
        target_k: usize,
    ) -> Result<Vec<ActionEntry>> {
        if target_k == 0 {
            return Err(Error::Config("target action count must be at least 1".into()));
        }
        if target_k > items.len() {
            return Err(Error::FinalExceedsInitial {
                final_k: target_k,
                initial_k: items.len(),
            });
        }

        let mut next_gen: u64 = items.len() as u64;
        let mut states = Vec::with_capacity(items.len());
        for (gen, item) in items.into_iter().enumerate() {
            let rows = self.rows(&item.cluster.members);
            // initial (and pass-through) selection always uses the
            // coverage-first rule; the policy governs merge steps only
            let selected =
                self.select_from_pool(&item.actions, &rows, SelectionPolicy::MaxEffectiveness)?;
            states.push(MergeState {
                gen: gen as u64,
                members: item.cluster.members,
                pool: item.actions,
                selected,
            });
        }

        let mut cache: HashMap<(u64, u64), PairEval> = HashMap::new();
        while states.len() > target_k {
            let (i, j, eval) = self.best_pair(&states, &mut cache)?;
            let winner = eval.selected;
            let mut absorbed = states.remove(j);
            let state = &mut states[i];
            state.members.append(&mut absorbed.members);
            state.pool = match self.policy {
                SelectionPolicy::MeanAction => {
                    winner.iter().map(|c| c.action.clone()).collect()
                }
                _ => {
                    let mut pool = std::mem::take(&mut state.pool);
                    pool.append(&mut absorbed.pool);
                    pool
                }
            };
            state.selected = winner;
            state.gen = next_gen;
            next_gen += 1;
        }

        Ok(states
            .into_iter()
            .map(|s| {
                let size = s.members.len();
                match s.selected {
                    Some(c) => ActionEntry {
                        action: Some(c.action),
                        coverage: c.coverage,
                        cost: c.cost,
                        size,
                    },
                    None => ActionEntry {
                        action: None,
                        coverage: 0.0,
                        cost: None,
                        size,
                    },
                }
            })
            .collect())
    }

    fn rows(&self, members: &[usize]) -> Vec<Instance> {
        members.iter().map(|&i| self.affected[i].clone()).collect()
    }

    /// Score a pool over `rows` and pick per policy. `MinCost` prefers the
    /// cheapest flipping candidate; the other policies use the standard
    /// coverage-first rule. An all-zero-coverage pool still selects its
    /// first candidate as a placeholder carrier.
    fn select_from_pool(
        &self,
        pool: &[Action],
        rows: &[Instance],
        policy: SelectionPolicy,
    ) -> Result<Option<ScoredCandidate>> {
        if pool.is_empty() || rows.is_empty() {
            return Ok(None);
        }
        let scored = pool
            .iter()
            .map(|a| score_action(a, rows, self.predictor, self.distance))
            .collect::<Result<Vec<_>>>()?;

        let best = match policy {
            SelectionPolicy::MinCost => select_cheapest(&scored),
            _ => select_best(&scored),
        };
        Ok(best.map(|i| scored[i].clone()))
    }

    fn best_pair(
        &self,
        states: &[MergeState],
        cache: &mut HashMap<(u64, u64), PairEval>,
    ) -> Result<(usize, usize, PairEval)> {
        let mut best: Option<(usize, usize, PairEval)> = None;
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let key = (states[i].gen, states[j].gen);
                let eval = match cache.get(&key) {
                    Some(eval) => eval.clone(),
                    None => {
                        let eval = self.evaluate_pair(&states[i], &states[j])?;
                        cache.insert(key, eval.clone());
                        eval
                    }
                };
                let replace = match &best {
                    None => true,
                    Some((_, _, incumbent)) => pair_improves(&eval, incumbent, self.policy),
                };
                if replace {
                    best = Some((i, j, eval));
                }
            }
        }
        best.ok_or_else(|| Error::ClusterInvariant("no mergeable pair found".into()))
    }

    fn evaluate_pair(&self, a: &MergeState, b: &MergeState) -> Result<PairEval> {
        let mut merged_members = a.members.clone();
        merged_members.extend_from_slice(&b.members);
        let rows = self.rows(&merged_members);

        let selected = match self.policy {
            SelectionPolicy::MeanAction => {
                let synthesized = synthesize_selected(a, b)?;
                match synthesized {
                    Some(action) => Some(score_action(
                        &action,
                        &rows,
                        self.predictor,
                        self.distance,
                    )?),
                    None => None,
                }
            }
            policy => {
                let mut pool = a.pool.clone();
                pool.extend(b.pool.iter().cloned());
                self.select_from_pool(&pool, &rows, policy)?
            }
        };

        let n_a = a.members.len() as f64;
        let n_b = b.members.len() as f64;
        let (cov_a, cost_a) = stats(&a.selected);
        let (cov_b, cost_b) = stats(&b.selected);
        let (cov_after, cost_after) = stats(&selected);

        let (harm, tie_cost, tie_coverage) = match self.policy {
            SelectionPolicy::MinCost => {
                let mut before_pairs = Vec::new();
                if let Some(cost) = cost_a {
                    before_pairs.push((cost, cov_a * n_a));
                }
                if let Some(cost) = cost_b {
                    before_pairs.push((cost, cov_b * n_b));
                }
                let before = weighted_mean(&before_pairs);
                let harm = match (before, cost_after) {
                    (None, None) => 0.0,
                    (None, Some(_)) => 0.0,
                    (Some(b), Some(a)) => a - b,
                    (Some(_), None) => f64::INFINITY,
                };
                (harm, cost_after.unwrap_or(f64::INFINITY), cov_after)
            }
            _ => {
                let before = (cov_a * n_a + cov_b * n_b) / (n_a + n_b);
                let harm = before - cov_after;
                (harm, cost_after.unwrap_or(f64::INFINITY), cov_after)
            }
        };

        Ok(PairEval {
            selected,
            harm,
            tie_cost,
            tie_coverage,
        })
    }
}

fn stats(selected: &Option<ScoredCandidate>) -> (f64, Option<f64>) {
    match selected {
        Some(c) => (c.coverage, c.cost),
        None => (0.0, None),
    }
}

/// Strictly lower harm wins; harms within tolerance fall to the policy's
/// secondary criterion (cost for coverage-driven policies, coverage for
/// `MinCost`). Remaining ties keep the earlier pair.
fn pair_improves(challenger: &PairEval, incumbent: &PairEval, policy: SelectionPolicy) -> bool {
    if challenger.harm < incumbent.harm - HARM_TIE_TOL {
        return true;
    }
    if challenger.harm > incumbent.harm + HARM_TIE_TOL {
        return false;
    }
    match policy {
        SelectionPolicy::MinCost => challenger.tie_coverage > incumbent.tie_coverage,
        _ => challenger.tie_cost < incumbent.tie_cost,
    }
}

/// Cheapest flipping candidate; ties prefer higher coverage, then the
/// earlier proposal. Falls back to the coverage-first rule when nothing
/// flips (placeholder selection).
fn select_cheapest(scored: &[ScoredCandidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, candidate) in scored.iter().enumerate() {
        let Some(cost) = candidate.cost else { continue };
        match best {
            None => best = Some(i),
            Some(b) => {
                let incumbent = &scored[b];
                let b_cost = incumbent.cost.unwrap_or(f64::INFINITY);
                if cost < b_cost || (cost == b_cost && candidate.coverage > incumbent.coverage) {
                    best = Some(i);
                }
            }
        }
    }
    best.or_else(|| select_best(scored))
}

/// Synthesize the merged action for `MeanAction`: size-weighted numeric
/// average where both sides edit a feature, majority (larger-cluster)
/// categorical target, and single-sided edits carried through.
fn synthesize_selected(a: &MergeState, b: &MergeState) -> Result<Option<Action>> {
    match (&a.selected, &b.selected) {
        (None, None) => Ok(None),
        (Some(sa), None) => Ok(Some(sa.action.clone())),
        (None, Some(sb)) => Ok(Some(sb.action.clone())),
        (Some(sa), Some(sb)) => Ok(Some(synthesize(
            &sa.action,
            a.members.len() as f64,
            &sb.action,
            b.members.len() as f64,
        )?)),
    }
}

fn synthesize(a: &Action, wa: f64, b: &Action, wb: f64) -> Result<Action> {
    let mut edits: Vec<(gr_common::FeatureId, Edit)> = Vec::new();
    let mut features: Vec<gr_common::FeatureId> = a.touched().chain(b.touched()).collect();
    features.sort_unstable();
    features.dedup();

    for id in features {
        let edit = match (a.edit_for(id), b.edit_for(id)) {
            (Some(ea), Some(eb)) => merge_edits(*ea, wa, *eb, wb),
            (Some(ea), None) => *ea,
            (None, Some(eb)) => *eb,
            (None, None) => continue,
        };
        edits.push((id, edit));
    }
    Action::new(edits)
}

fn merge_edits(a: Edit, wa: f64, b: Edit, wb: f64) -> Edit {
    let avg = |x: f64, y: f64| (x * wa + y * wb) / (wa + wb);
    match (a, b) {
        (Edit::AddNum(x), Edit::AddNum(y)) => Edit::AddNum(avg(x, y)),
        (Edit::SetNum(x), Edit::SetNum(y)) => Edit::SetNum(avg(x, y)),
        (Edit::SetCat(x), Edit::SetCat(y)) => {
            // size-weighted majority: the larger cluster's target wins,
            // ties keep the left (earlier cluster) side
            if wb > wa {
                Edit::SetCat(y)
            } else {
                Edit::SetCat(x)
            }
        }
        // mixed edit kinds on one feature: keep the larger cluster's edit
        (ea, eb) => {
            if wb > wa {
                eb
            } else {
                ea
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::FnPredictor;
    use gr_common::{FeatureId, FeatureSchema, Value};

    fn schema() -> FeatureSchema {
        FeatureSchema::builder().numeric("income").build().unwrap()
    }

    fn instance(s: &FeatureSchema, income: f64) -> Instance {
        Instance::new(s, vec![Value::Num(income)]).unwrap()
    }

    fn add(delta: f64) -> Action {
        Action::new(vec![(FeatureId(0), Edit::AddNum(delta))]).unwrap()
    }

    fn predictor() -> FnPredictor<impl Fn(&Instance) -> bool> {
        FnPredictor(|i: &Instance| i.get(FeatureId(0)).unwrap().as_num().unwrap() > 1000.0)
    }

    fn setup(s: &FeatureSchema) -> (Vec<Instance>, DistanceFn) {
        let affected = vec![
            instance(s, 800.0),
            instance(s, 900.0),
            instance(s, 50.0),
            instance(s, 60.0),
        ];
        let d = DistanceFn::fit(s, &[instance(s, 0.0), instance(s, 1000.0)]).unwrap();
        (affected, d)
    }

    fn items(affected_len: usize, pools: Vec<Vec<Action>>) -> Vec<ClusterCandidates> {
        // contiguous equal split of `affected_len` rows over the pools
        let per = affected_len / pools.len();
        pools
            .into_iter()
            .enumerate()
            .map(|(id, actions)| ClusterCandidates {
                cluster: Cluster {
                    id,
                    members: (id * per..(id + 1) * per).collect(),
                },
                actions,
            })
            .collect()
    }

    #[test]
    fn pass_through_at_equal_counts() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        let reducer = Reducer {
            schema: &s,
            affected: &affected,
            predictor: &p,
            distance: &d,
            policy: SelectionPolicy::MaxEffectiveness,
        };
        let entries = reducer
            .reduce(items(4, vec![vec![add(300.0)], vec![add(900.0)]]), 2)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, Some(add(300.0)));
        assert_eq!(entries[1].action, Some(add(900.0)));
    }

    #[test]
    fn exceeding_target_rejected() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        let reducer = Reducer {
            schema: &s,
            affected: &affected,
            predictor: &p,
            distance: &d,
            policy: SelectionPolicy::MaxEffectiveness,
        };
        let err = reducer
            .reduce(items(4, vec![vec![add(300.0)]]), 3)
            .unwrap_err();
        assert!(matches!(err, Error::FinalExceedsInitial { .. }));
    }

    #[test]
    fn every_policy_returns_exactly_target_k() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        for policy in [
            SelectionPolicy::MaxEffectiveness,
            SelectionPolicy::MinCost,
            SelectionPolicy::MeanAction,
        ] {
            let reducer = Reducer {
                schema: &s,
                affected: &affected,
                predictor: &p,
                distance: &d,
                policy,
            };
            for target in 1..=4 {
                let pools = items(
                    4,
                    vec![
                        vec![add(300.0)],
                        vec![add(900.0)],
                        vec![add(1200.0)],
                        vec![add(50.0)],
                    ],
                );
                let entries = reducer.reduce(pools, target).unwrap();
                assert_eq!(entries.len(), target, "policy {policy} target {target}");
            }
        }
    }

    #[test]
    fn max_effectiveness_merge_selects_from_combined_pool() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        let reducer = Reducer {
            schema: &s,
            affected: &affected,
            predictor: &p,
            distance: &d,
            policy: SelectionPolicy::MaxEffectiveness,
        };
        // merged, both actions flip exactly rows 0 and 1; add(300) is cheaper
        let entries = reducer
            .reduce(items(4, vec![vec![add(900.0)], vec![add(300.0)]]), 1)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, Some(add(300.0)));
        assert_eq!(entries[0].size, 4);
        assert_eq!(entries[0].coverage, 0.5);
        assert!((entries[0].cost.unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn empty_pool_becomes_zero_coverage_placeholder() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        let reducer = Reducer {
            schema: &s,
            affected: &affected,
            predictor: &p,
            distance: &d,
            policy: SelectionPolicy::MaxEffectiveness,
        };
        let entries = reducer
            .reduce(items(4, vec![vec![add(900.0)], vec![]]), 2)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].action.is_some());
        assert_eq!(entries[1].action, None);
        assert_eq!(entries[1].coverage, 0.0);
        assert_eq!(entries[1].cost, None);
        assert_eq!(entries[1].size, 2);
    }

    #[test]
    fn mean_action_synthesizes_weighted_average() {
        let a = add(100.0);
        let b = add(500.0);
        let merged = synthesize(&a, 1.0, &b, 3.0).unwrap();
        assert_eq!(merged.edit_for(FeatureId(0)), Some(&Edit::AddNum(400.0)));
    }

    #[test]
    fn mean_action_majority_category() {
        let a = Action::new(vec![(FeatureId(1), Edit::SetCat(gr_common::CategoryId(0)))]).unwrap();
        let b = Action::new(vec![(FeatureId(1), Edit::SetCat(gr_common::CategoryId(1)))]).unwrap();
        let merged = synthesize(&a, 5.0, &b, 2.0).unwrap();
        assert_eq!(
            merged.edit_for(FeatureId(1)),
            Some(&Edit::SetCat(gr_common::CategoryId(0)))
        );
        let merged = synthesize(&a, 2.0, &b, 5.0).unwrap();
        assert_eq!(
            merged.edit_for(FeatureId(1)),
            Some(&Edit::SetCat(gr_common::CategoryId(1)))
        );
    }

    #[test]
    fn mean_action_carries_single_sided_edits() {
        let a = Action::new(vec![
            (FeatureId(0), Edit::AddNum(100.0)),
            (FeatureId(1), Edit::SetCat(gr_common::CategoryId(1))),
        ])
        .unwrap();
        let b = add(300.0);
        let merged = synthesize(&a, 1.0, &b, 1.0).unwrap();
        assert_eq!(merged.edit_for(FeatureId(0)), Some(&Edit::AddNum(200.0)));
        assert_eq!(
            merged.edit_for(FeatureId(1)),
            Some(&Edit::SetCat(gr_common::CategoryId(1)))
        );
    }

    #[test]
    fn min_cost_prefers_cheaper_flipping_candidate() {
        let s = schema();
        let (affected, d) = setup(&s);
        let p = predictor();
        let reducer = Reducer {
            schema: &s,
            affected: &affected,
            predictor: &p,
            distance: &d,
            policy: SelectionPolicy::MinCost,
        };
        // both flip rows 0 and 1 once merged; add(201) is cheaper than add(900)
        let entries = reducer
            .reduce(items(4, vec![vec![add(900.0)], vec![add(201.0)]]), 1)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, Some(add(201.0)));
    }
}
