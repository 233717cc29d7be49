//! Nearest-unaffected-neighbor candidate source.
//!
//! For each cluster member, find its nearest neighbors among the unaffected
//! population (in the one-hot encoded space the clusterer uses) and turn the
//! feature differences into an action: numeric features become additive
//! deltas, categorical features become replacements. Features outside
//! `feat_to_vary` and features that already match contribute no edit.

use crate::candidate::{CandidateSource, ProposalFailure, Proposals, ProposeRequest};
use crate::cluster::encode;
use gr_common::{Action, Edit, FeatureSchema, Instance, Result, Value};

/// Candidate source backed by the unaffected population.
pub struct NearestNeighborSource {
    unaffected: Vec<Instance>,
    encoded: Vec<Vec<f64>>,
    neighbors_per_member: usize,
}

impl NearestNeighborSource {
    /// Pre-encode the unaffected pool once.
    pub fn fit(
        schema: &FeatureSchema,
        unaffected: Vec<Instance>,
        neighbors_per_member: usize,
    ) -> Result<Self> {
        let encoded = unaffected
            .iter()
            .map(|i| encode(schema, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            unaffected,
            encoded,
            neighbors_per_member: neighbors_per_member.max(1),
        })
    }

    /// Indices of the nearest unaffected rows, closest first; distance ties
    /// resolve to the lower row index.
    fn nearest(&self, point: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.encoded.len()).collect();
        order.sort_by(|&a, &b| {
            let da: f64 = squared(point, &self.encoded[a]);
            let db: f64 = squared(point, &self.encoded[b]);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        order.truncate(self.neighbors_per_member.min(order.len()));
        order
    }
}

fn squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Difference between a member and a neighbor, restricted to allowed
/// features; `None` when they agree on every allowed feature.
fn diff_action(
    member: &Instance,
    neighbor: &Instance,
    req: &ProposeRequest<'_>,
) -> Result<Option<Action>> {
    let mut edits = Vec::new();
    for &id in req.feat_to_vary {
        match (member.get(id), neighbor.get(id)) {
            (Some(Value::Num(a)), Some(Value::Num(b))) => {
                if a != b {
                    edits.push((id, Edit::AddNum(b - a)));
                }
            }
            (Some(Value::Cat(a)), Some(Value::Cat(b))) => {
                if a != b {
                    edits.push((id, Edit::SetCat(*b)));
                }
            }
            _ => {
                return Err(gr_common::Error::FeatureKindMismatch {
                    feature: req.schema.name(id)?.to_string(),
                    message: "member and neighbor disagree on value kind".into(),
                })
            }
        }
    }
    if edits.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Action::new(edits)?))
    }
}

impl CandidateSource for NearestNeighborSource {
    fn propose(&self, req: &ProposeRequest<'_>) -> Result<Proposals> {
        let mut proposals = Proposals::default();

        if self.unaffected.is_empty() {
            for &member in req.members {
                proposals.failures.push(ProposalFailure {
                    member,
                    reason: "no unaffected instances available".into(),
                });
            }
            return Ok(proposals);
        }

        for &member in req.members {
            let row = &req.affected[member];
            let point = encode(req.schema, row)?;
            let mut found = false;
            for neighbor_idx in self.nearest(&point) {
                if let Some(action) = diff_action(row, &self.unaffected[neighbor_idx], req)? {
                    proposals.actions.push(action);
                    found = true;
                }
            }
            if !found {
                proposals.failures.push(ProposalFailure {
                    member,
                    reason: "nearest unaffected neighbors identical on allowed features".into(),
                });
            }
        }
        Ok(proposals)
    }
}
