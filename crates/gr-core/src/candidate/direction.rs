//! Global-direction candidate source.
//!
//! Derives one perturbation direction per cluster: the mean numeric
//! displacement from the cluster toward the unaffected population, plus the
//! unaffected pool's majority category where it differs from the cluster's.
//! The direction is emitted at a ladder of scales (ending slightly past 1.0
//! so mild extrapolation beyond the observed displacement is explored),
//! each rung a separate candidate ordered by increasing magnitude.

use crate::candidate::{CandidateSource, Proposals, ProposeRequest};
use gr_common::{Action, CategoryId, Edit, FeatureKind, FeatureSchema, Instance, Result, Value};

/// Candidate source proposing scaled global perturbation directions.
pub struct GlobalDirectionSource {
    unaffected: Vec<Instance>,
    steps: usize,
}

impl GlobalDirectionSource {
    pub fn new(unaffected: Vec<Instance>, steps: usize) -> Self {
        Self {
            unaffected,
            steps: steps.max(1),
        }
    }
}

fn mean_numeric(instances: &[Instance], rows: Option<&[usize]>, id: gr_common::FeatureId) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut take = |inst: &Instance| {
        if let Some(Value::Num(v)) = inst.get(id) {
            sum += v;
            count += 1;
        }
    };
    match rows {
        Some(rows) => rows.iter().for_each(|&r| take(&instances[r])),
        None => instances.iter().for_each(&mut take),
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn majority_category(
    schema: &FeatureSchema,
    instances: &[Instance],
    rows: Option<&[usize]>,
    id: gr_common::FeatureId,
) -> Result<Option<CategoryId>> {
    let domain_len = match &schema.feature(id)?.kind {
        FeatureKind::Categorical { domain } => domain.len(),
        FeatureKind::Numeric => return Ok(None),
    };
    let mut counts = vec![0usize; domain_len];
    let mut tally = |inst: &Instance| {
        if let Some(Value::Cat(c)) = inst.get(id) {
            counts[c.0 as usize] += 1;
        }
    };
    match rows {
        Some(rows) => rows.iter().for_each(|&r| tally(&instances[r])),
        None => instances.iter().for_each(&mut tally),
    }
    // ties resolve to the lowest category index
    let best = counts
        .iter()
        .enumerate()
        .max_by(|(ia, ca), (ib, cb)| ca.cmp(cb).then(ib.cmp(ia)))
        .map(|(i, _)| CategoryId(i as u32));
    Ok(best)
}

impl CandidateSource for GlobalDirectionSource {
    fn propose(&self, req: &ProposeRequest<'_>) -> Result<Proposals> {
        let mut proposals = Proposals::default();
        if self.unaffected.is_empty() {
            return Ok(proposals);
        }

        // numeric direction and categorical retargets over allowed features
        let mut numeric_deltas: Vec<(gr_common::FeatureId, f64)> = Vec::new();
        let mut categorical_edits: Vec<(gr_common::FeatureId, Edit)> = Vec::new();
        for &id in req.feat_to_vary {
            if req.schema.is_numeric(id)? {
                let from = mean_numeric(req.affected, Some(req.members), id);
                let to = mean_numeric(&self.unaffected, None, id);
                if let (Some(from), Some(to)) = (from, to) {
                    if to != from {
                        numeric_deltas.push((id, to - from));
                    }
                }
            } else {
                let cluster_major = majority_category(req.schema, req.affected, Some(req.members), id)?;
                let pool_major = majority_category(req.schema, &self.unaffected, None, id)?;
                if let (Some(a), Some(b)) = (cluster_major, pool_major) {
                    if a != b {
                        categorical_edits.push((id, Edit::SetCat(b)));
                    }
                }
            }
        }

        if numeric_deltas.is_empty() {
            if !categorical_edits.is_empty() {
                proposals.actions.push(Action::new(categorical_edits)?);
            }
            return Ok(proposals);
        }

        let steps = self.steps as f64;
        for j in 1..=self.steps {
            let scale = j as f64 * (1.0 + 1.0 / steps) / steps;
            let mut edits: Vec<(gr_common::FeatureId, Edit)> = numeric_deltas
                .iter()
                .map(|&(id, delta)| (id, Edit::AddNum(delta * scale)))
                .collect();
            edits.extend(categorical_edits.iter().cloned());
            proposals.actions.push(Action::new(edits)?);
        }
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_common::FeatureId;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .numeric("income")
            .categorical("city", ["A", "B"])
            .build()
            .unwrap()
    }

    fn instance(s: &FeatureSchema, income: f64, city: &str) -> Instance {
        let city_id = s.resolve("city").unwrap();
        let cat = s.category(city_id, city).unwrap();
        Instance::new(s, vec![Value::Num(income), Value::Cat(cat)]).unwrap()
    }

    #[test]
    fn emits_a_ladder_of_scaled_deltas() {
        let s = schema();
        let affected = vec![instance(&s, 500.0, "A"), instance(&s, 700.0, "A")];
        let unaffected = vec![instance(&s, 1600.0, "A")];
        let source = GlobalDirectionSource::new(unaffected, 4);
        let feat_to_vary = vec![FeatureId(0)];
        let req = ProposeRequest {
            schema: &s,
            affected: &affected,
            members: &[0, 1],
            feat_to_vary: &feat_to_vary,
        };
        let proposals = source.propose(&req).unwrap();
        assert_eq!(proposals.actions.len(), 4);
        // direction is 1600 - 600 = 1000; the last rung overshoots to 1.25x
        let deltas: Vec<f64> = proposals
            .actions
            .iter()
            .map(|a| match a.edit_for(FeatureId(0)) {
                Some(Edit::AddNum(d)) => *d,
                other => panic!("unexpected edit {other:?}"),
            })
            .collect();
        assert!(deltas.windows(2).all(|w| w[0] < w[1]));
        assert!((deltas[3] - 1250.0).abs() < 1e-9);
    }

    #[test]
    fn majority_category_retarget() {
        let s = schema();
        let affected = vec![instance(&s, 500.0, "A")];
        let unaffected = vec![
            instance(&s, 500.0, "B"),
            instance(&s, 500.0, "B"),
            instance(&s, 500.0, "A"),
        ];
        let source = GlobalDirectionSource::new(unaffected, 3);
        let feat_to_vary = vec![FeatureId(1)];
        let req = ProposeRequest {
            schema: &s,
            affected: &affected,
            members: &[0],
            feat_to_vary: &feat_to_vary,
        };
        let proposals = source.propose(&req).unwrap();
        assert_eq!(proposals.actions.len(), 1);
        assert_eq!(
            proposals.actions[0].edit_for(FeatureId(1)),
            Some(&Edit::SetCat(CategoryId(1)))
        );
    }

    #[test]
    fn no_direction_yields_no_candidates() {
        let s = schema();
        let affected = vec![instance(&s, 500.0, "A")];
        let unaffected = vec![instance(&s, 500.0, "A")];
        let source = GlobalDirectionSource::new(unaffected, 3);
        let feat_to_vary = vec![FeatureId(0), FeatureId(1)];
        let req = ProposeRequest {
            schema: &s,
            affected: &affected,
            members: &[0],
            feat_to_vary: &feat_to_vary,
        };
        let proposals = source.propose(&req).unwrap();
        assert!(proposals.actions.is_empty());
        assert!(proposals.failures.is_empty());
    }
}
