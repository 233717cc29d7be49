//! Engine entry point: the full cluster → propose → score → reduce →
//! assign pipeline over one request-scoped context.
//!
//! All state for a run lives in the [`RunContext`] handed in by the caller;
//! nothing ambient is held between invocations. The engine returns either a
//! complete [`Report`] or exactly one typed error, never a partial report.

use crate::candidate::{CandidateSource, ProposeRequest};
use crate::cluster::cluster_affected;
use crate::distance::DistanceFn;
use crate::evaluate::{evaluate, AssignedAction};
use crate::predict::Predictor;
use crate::reduce::{ClusterCandidates, Reducer};
use chrono::{DateTime, Utc};
use gr_common::{Action, Error, FeatureId, FeatureSchema, Instance, Result};
use gr_config::EngineParams;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Request-scoped inputs for one engine run.
pub struct RunContext<'a> {
    pub schema: &'a FeatureSchema,
    /// Individuals currently receiving the unfavorable outcome.
    pub affected: &'a [Instance],
    /// Features candidate actions are allowed to touch.
    pub feat_to_vary: &'a [FeatureId],
    pub predictor: &'a dyn Predictor,
    pub source: &'a dyn CandidateSource,
    /// Distance function fitted against a reference dataset.
    pub distance: &'a DistanceFn,
    pub params: &'a EngineParams,
}

/// A recorded per-instance candidate generation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub cluster_id: usize,
    pub member: usize,
    pub reason: String,
}

/// One final action with cluster-local and whole-population statistics.
///
/// `cluster_coverage`/`cluster_cost` are the values the action was selected
/// on (its own merged cluster); `effectiveness`/`cost` are the raw
/// whole-population numbers used for ranking in UIs. They are different
/// measurements and both are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAction {
    /// `None` marks a zero-coverage placeholder for a cluster with no
    /// viable candidate.
    pub action: Option<Action>,
    /// Sparse human-readable rendering, e.g. `income += 500, city = B`.
    pub description: Option<String>,
    pub cluster_size: usize,
    pub cluster_coverage: f64,
    pub cluster_cost: Option<f64>,
    /// Fraction of the whole affected population this action flips alone.
    pub effectiveness: f64,
    /// Mean cost over the individuals it flips; `None` when it flips nobody.
    pub cost: Option<f64>,
}

/// Complete result of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub params: EngineParams,
    /// The final action set, exactly `final_clusters` entries.
    pub actions: Vec<ReportAction>,
    /// Raw flip indicator per action per individual.
    pub per_action_flips: Vec<Vec<bool>>,
    /// Minimum-cost choice per individual; `None` marks unflippable.
    pub assignment: Vec<Option<AssignedAction>>,
    pub global_effectiveness: f64,
    /// `None` when no individual could be assigned any action.
    pub global_avg_cost: Option<f64>,
    pub assigned_count: usize,
    pub affected_count: usize,
    pub proposal_failures: Vec<FailureRecord>,
}

impl Report {
    /// Human-readable summary for console output.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Actions (K={}):\n", self.actions.len()));
        for (i, action) in self.actions.iter().enumerate() {
            let description = action
                .description
                .as_deref()
                .unwrap_or("(no viable action)");
            let cost = action
                .cost
                .map(|c| format!("{c:.3}"))
                .unwrap_or_else(|| "-".into());
            out.push_str(&format!(
                "  {}. {description}  [eff {:.1}%, cost {cost}, cluster size {}]\n",
                i + 1,
                action.effectiveness * 100.0,
                action.cluster_size,
            ));
        }
        out.push_str(&format!(
            "Global effectiveness: {:.1}% ({}/{} assigned)\n",
            self.global_effectiveness * 100.0,
            self.assigned_count,
            self.affected_count,
        ));
        match self.global_avg_cost {
            Some(cost) => out.push_str(&format!("Global avg cost: {cost:.3}\n")),
            None => out.push_str("Global avg cost: - (nobody assigned)\n"),
        }
        if !self.proposal_failures.is_empty() {
            out.push_str(&format!(
                "Candidate generation failures: {}\n",
                self.proposal_failures.len()
            ));
        }
        out
    }
}

fn validate_context(ctx: &RunContext<'_>) -> Result<()> {
    ctx.params.validate()?;
    if ctx.affected.is_empty() {
        return Err(Error::Config("affected population is empty".into()));
    }
    if ctx.feat_to_vary.is_empty() {
        return Err(Error::Config("feat_to_vary is empty".into()));
    }
    for &id in ctx.feat_to_vary {
        ctx.schema.feature(id)?;
    }
    if ctx.distance.arity() != ctx.schema.len() {
        return Err(Error::Config(format!(
            "distance function fitted for {} features but schema has {}",
            ctx.distance.arity(),
            ctx.schema.len()
        )));
    }
    Ok(())
}

/// Run the whole pipeline for one affected population.
pub fn run(ctx: &RunContext<'_>) -> Result<Report> {
    validate_context(ctx)?;
    let params = ctx.params;
    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        affected = ctx.affected.len(),
        initial_clusters = params.initial_clusters,
        final_clusters = params.final_clusters,
        policy = %params.policy,
        "engine run started"
    );

    let clusters = cluster_affected(
        ctx.schema,
        ctx.affected,
        params.initial_clusters,
        params.seed,
        params.kmeans_max_iter,
        params.kmeans_tol,
    )?;
    info!(clusters = clusters.len(), "affected population partitioned");

    let mut proposal_failures = Vec::new();
    let mut items = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let req = ProposeRequest {
            schema: ctx.schema,
            affected: ctx.affected,
            members: &cluster.members,
            feat_to_vary: ctx.feat_to_vary,
        };
        let mut proposals = ctx.source.propose(&req)?;
        proposals.validate(ctx.schema, ctx.feat_to_vary)?;
        proposals.dedupe_and_truncate(params.max_candidates_per_cluster);
        debug!(
            cluster = cluster.id,
            members = cluster.members.len(),
            candidates = proposals.actions.len(),
            failures = proposals.failures.len(),
            "candidates proposed"
        );
        for failure in proposals.failures {
            proposal_failures.push(FailureRecord {
                cluster_id: cluster.id,
                member: failure.member,
                reason: failure.reason,
            });
        }
        items.push(ClusterCandidates {
            cluster,
            actions: proposals.actions,
        });
    }

    let reducer = Reducer {
        schema: ctx.schema,
        affected: ctx.affected,
        predictor: ctx.predictor,
        distance: ctx.distance,
        policy: params.policy,
    };
    let entries = reducer.reduce(items, params.final_clusters)?;
    info!(actions = entries.len(), "action set reduced");

    let evaluation = evaluate(&entries, ctx.affected, ctx.predictor, ctx.distance)?;
    info!(
        assigned = evaluation.assigned_count,
        affected = ctx.affected.len(),
        global_effectiveness = evaluation.global_effectiveness,
        "cumulative assignment evaluated"
    );

    let mut actions = Vec::with_capacity(entries.len());
    for (entry, stats) in entries.iter().zip(&evaluation.per_action) {
        let description = match &entry.action {
            Some(action) => Some(action.describe(ctx.schema)?),
            None => None,
        };
        actions.push(ReportAction {
            action: entry.action.clone(),
            description,
            cluster_size: entry.size,
            cluster_coverage: entry.coverage,
            cluster_cost: entry.cost,
            effectiveness: stats.effectiveness,
            cost: stats.cost,
        });
    }

    Ok(Report {
        run_id,
        created_at: Utc::now(),
        params: params.clone(),
        actions,
        per_action_flips: evaluation.per_action_flips,
        assignment: evaluation.assignment,
        global_effectiveness: evaluation.global_effectiveness,
        global_avg_cost: evaluation.global_avg_cost,
        assigned_count: evaluation.assigned_count,
        affected_count: ctx.affected.len(),
        proposal_failures,
    })
}
