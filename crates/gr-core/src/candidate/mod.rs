//! Candidate action sources.
//!
//! Candidate generation is an external capability: the engine only fixes the
//! calling contract. A source proposes zero or more candidate actions for a
//! cluster, touching only the features the caller allows, and records
//! per-instance failures instead of propagating them; a member for which no
//! candidate can be derived is skipped, never a crash.

mod direction;
mod local;
mod nearest;

pub use direction::GlobalDirectionSource;
pub use local::LocalSearchSource;
pub use nearest::NearestNeighborSource;

use gr_common::{Action, Error, FeatureId, FeatureSchema, Instance, Result};

/// A per-instance candidate generation failure, recorded rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProposalFailure {
    /// Index of the affected individual the failure applies to.
    pub member: usize,
    pub reason: String,
}

/// The outcome of proposing candidates for one cluster.
#[derive(Debug, Clone, Default)]
pub struct Proposals {
    /// Candidate actions in proposal order (the order is load-bearing:
    /// scoring ties are broken by first-proposed).
    pub actions: Vec<Action>,
    pub failures: Vec<ProposalFailure>,
}

impl Proposals {
    /// Enforce the source contract: every action is schema-valid and
    /// touches only allowed features.
    pub fn validate(&self, schema: &FeatureSchema, feat_to_vary: &[FeatureId]) -> Result<()> {
        for action in &self.actions {
            action.validate(schema)?;
            for id in action.touched() {
                if !feat_to_vary.contains(&id) {
                    return Err(Error::CandidateSource(format!(
                        "proposed action edits feature '{}' outside feat_to_vary",
                        schema.name(id)?
                    )));
                }
            }
        }
        Ok(())
    }

    /// Drop duplicate actions, keeping the first proposal of each, and cap
    /// the pool size. First-occurrence order is preserved so the
    /// first-proposed tie-break stays meaningful.
    pub fn dedupe_and_truncate(&mut self, max: usize) {
        let mut kept: Vec<Action> = Vec::new();
        for action in self.actions.drain(..) {
            if kept.len() >= max {
                break;
            }
            if !kept.contains(&action) {
                kept.push(action);
            }
        }
        self.actions = kept;
    }
}

/// Inputs for one propose call.
#[derive(Debug, Clone, Copy)]
pub struct ProposeRequest<'a> {
    pub schema: &'a FeatureSchema,
    /// The full affected population; `members` index into it.
    pub affected: &'a [Instance],
    pub members: &'a [usize],
    pub feat_to_vary: &'a [FeatureId],
}

/// A strategy that produces candidate actions for a cluster.
///
/// Variants: local counterfactual search, nearest-unaffected-neighbor
/// lookup, and global perturbation directions. The engine is agnostic to
/// which variant supplied a candidate.
pub trait CandidateSource {
    fn propose(&self, req: &ProposeRequest<'_>) -> Result<Proposals>;
}
