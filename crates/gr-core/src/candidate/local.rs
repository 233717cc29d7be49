//! Local-search candidate adapter.
//!
//! The actual search (DiCE-style sampling or any other per-instance
//! counterfactual routine) lives outside the engine; this adapter wraps a
//! caller-supplied generator and folds its per-instance outcomes into the
//! source contract: a generator error or empty result becomes a recorded
//! failure for that member, never an aborted cluster.

use crate::candidate::{CandidateSource, ProposalFailure, Proposals, ProposeRequest};
use gr_common::{Action, FeatureId, Instance, Result};

/// Per-instance generator outcome.
pub type LocalSearchResult = std::result::Result<Option<Action>, String>;

/// Adapter turning a per-instance counterfactual generator into a
/// [`CandidateSource`].
pub struct LocalSearchSource<F>
where
    F: Fn(&Instance, &[FeatureId]) -> LocalSearchResult,
{
    generate: F,
}

impl<F> LocalSearchSource<F>
where
    F: Fn(&Instance, &[FeatureId]) -> LocalSearchResult,
{
    pub fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<F> CandidateSource for LocalSearchSource<F>
where
    F: Fn(&Instance, &[FeatureId]) -> LocalSearchResult,
{
    fn propose(&self, req: &ProposeRequest<'_>) -> Result<Proposals> {
        let mut proposals = Proposals::default();
        for &member in req.members {
            match (self.generate)(&req.affected[member], req.feat_to_vary) {
                Ok(Some(action)) => proposals.actions.push(action),
                Ok(None) => proposals.failures.push(ProposalFailure {
                    member,
                    reason: "no local counterfactual found".into(),
                }),
                Err(reason) => proposals.failures.push(ProposalFailure { member, reason }),
            }
        }
        Ok(proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_common::{Edit, FeatureSchema, Value};

    #[test]
    fn generator_errors_are_recorded_not_propagated() {
        let schema = FeatureSchema::builder().numeric("x").build().unwrap();
        let affected = vec![
            Instance::new(&schema, vec![Value::Num(1.0)]).unwrap(),
            Instance::new(&schema, vec![Value::Num(2.0)]).unwrap(),
            Instance::new(&schema, vec![Value::Num(3.0)]).unwrap(),
        ];
        let source = LocalSearchSource::new(|inst: &Instance, feats: &[FeatureId]| {
            let x = inst.get(FeatureId(0)).unwrap().as_num().unwrap();
            if x < 1.5 {
                Err("search diverged".to_string())
            } else if x < 2.5 {
                Ok(None)
            } else {
                Ok(Some(Action::new(vec![(feats[0], Edit::AddNum(1.0))]).unwrap()))
            }
        });
        let feat_to_vary = vec![FeatureId(0)];
        let req = ProposeRequest {
            schema: &schema,
            affected: &affected,
            members: &[0, 1, 2],
            feat_to_vary: &feat_to_vary,
        };
        let proposals = source.propose(&req).unwrap();
        assert_eq!(proposals.actions.len(), 1);
        assert_eq!(proposals.failures.len(), 2);
        assert_eq!(proposals.failures[0].member, 0);
        assert_eq!(proposals.failures[0].reason, "search diverged");
        assert_eq!(proposals.failures[1].member, 1);
    }
}
