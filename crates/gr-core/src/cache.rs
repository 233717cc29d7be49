//! Memoizing wrapper around the engine.
//!
//! Caching is layered outside the engine, not woven into it: the wrapper
//! fingerprints (caller-supplied dataset/model identities, schema, affected
//! population, allowed features, parameters) and replays the stored report
//! on a hit. The predictor and candidate source cannot be hashed, which is
//! why the caller names them through [`CacheKey`]; identical keys with
//! different collaborators are the caller's bug.

use crate::engine::{run, Report, RunContext};
use gr_common::{FeatureId, FeatureSchema, Instance, Result};
use gr_config::EngineParams;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Caller-supplied identities for the unhashable collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub dataset: String,
    pub model: String,
}

/// In-process memoization of whole engine runs.
#[derive(Default)]
pub struct CachedEngine {
    entries: HashMap<String, Report>,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    dataset: &'a str,
    model: &'a str,
    schema: &'a FeatureSchema,
    affected: &'a [Instance],
    feat_to_vary: &'a [FeatureId],
    params: &'a EngineParams,
}

fn fingerprint(key: &CacheKey, ctx: &RunContext<'_>) -> Result<String> {
    let bytes = serde_json::to_vec(&Fingerprint {
        dataset: &key.dataset,
        model: &key.model,
        schema: ctx.schema,
        affected: ctx.affected,
        feat_to_vary: ctx.feat_to_vary,
        params: ctx.params,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

impl CachedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the engine, replaying a stored report when the fingerprint of
    /// the request matches a previous run.
    pub fn run(&mut self, key: &CacheKey, ctx: &RunContext<'_>) -> Result<Report> {
        let fp = fingerprint(key, ctx)?;
        if let Some(hit) = self.entries.get(&fp) {
            debug!(fingerprint = %fp, "engine cache hit");
            return Ok(hit.clone());
        }
        debug!(fingerprint = %fp, "engine cache miss");
        let report = run(ctx)?;
        self.entries.insert(fp, report.clone());
        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::LocalSearchSource;
    use crate::distance::DistanceFn;
    use crate::predict::FnPredictor;
    use gr_common::{Action, Edit, Value};
    use std::cell::Cell;

    #[test]
    fn identical_requests_replay_without_rerunning() {
        let schema = FeatureSchema::builder().numeric("income").build().unwrap();
        let affected = vec![
            Instance::new(&schema, vec![Value::Num(800.0)]).unwrap(),
            Instance::new(&schema, vec![Value::Num(300.0)]).unwrap(),
        ];
        let d = DistanceFn::fit(&schema, &affected).unwrap();
        let calls = Cell::new(0usize);
        let p = FnPredictor(|i: &Instance| {
            calls.set(calls.get() + 1);
            i.get(FeatureId(0)).unwrap().as_num().unwrap() > 1000.0
        });
        let source = LocalSearchSource::new(|_: &Instance, feats: &[FeatureId]| {
            Ok(Some(
                Action::new(vec![(feats[0], Edit::AddNum(1000.0))]).unwrap(),
            ))
        });
        let params = EngineParams {
            initial_clusters: 2,
            final_clusters: 1,
            ..EngineParams::default()
        };
        let feat_to_vary = vec![FeatureId(0)];
        let ctx = RunContext {
            schema: &schema,
            affected: &affected,
            feat_to_vary: &feat_to_vary,
            predictor: &p,
            source: &source,
            distance: &d,
            params: &params,
        };
        let key = CacheKey {
            dataset: "toy".into(),
            model: "threshold".into(),
        };

        let mut cached = CachedEngine::new();
        let first = cached.run(&key, &ctx).unwrap();
        let calls_after_first = calls.get();
        let second = cached.run(&key, &ctx).unwrap();
        assert_eq!(calls.get(), calls_after_first, "second run must be a replay");
        assert_eq!(first.run_id, second.run_id);
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn different_parameters_miss() {
        let schema = FeatureSchema::builder().numeric("income").build().unwrap();
        let affected = vec![
            Instance::new(&schema, vec![Value::Num(800.0)]).unwrap(),
            Instance::new(&schema, vec![Value::Num(300.0)]).unwrap(),
        ];
        let d = DistanceFn::fit(&schema, &affected).unwrap();
        let p = FnPredictor(|i: &Instance| {
            i.get(FeatureId(0)).unwrap().as_num().unwrap() > 1000.0
        });
        let source = LocalSearchSource::new(|_: &Instance, feats: &[FeatureId]| {
            Ok(Some(
                Action::new(vec![(feats[0], Edit::AddNum(1000.0))]).unwrap(),
            ))
        });
        let feat_to_vary = vec![FeatureId(0)];
        let key = CacheKey {
            dataset: "toy".into(),
            model: "threshold".into(),
        };
        let mut cached = CachedEngine::new();
        for final_clusters in [1, 2] {
            let params = EngineParams {
                initial_clusters: 2,
                final_clusters,
                ..EngineParams::default()
            };
            let ctx = RunContext {
                schema: &schema,
                affected: &affected,
                feat_to_vary: &feat_to_vary,
                predictor: &p,
                source: &source,
                distance: &d,
                params: &params,
            };
            cached.run(&key, &ctx).unwrap();
        }
        assert_eq!(cached.len(), 2);
    }
}
