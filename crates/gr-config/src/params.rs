//! Engine run parameters.

use clap::ValueEnum;
use gr_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the reducer chooses which clusters/actions to merge and how the
/// merged action is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Preserve combined coverage; among ties prefer lower combined cost.
    #[default]
    #[serde(rename = "max-eff")]
    #[value(name = "max-eff")]
    MaxEffectiveness,

    /// Minimize the coverage-weighted average cost of the merged selection.
    #[serde(rename = "low-cost")]
    #[value(name = "low-cost")]
    MinCost,

    /// Synthesize a merged action: size-weighted numeric average, majority
    /// categorical target.
    #[serde(rename = "mean-act")]
    #[value(name = "mean-act")]
    MeanAction,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::MaxEffectiveness => write!(f, "max-eff"),
            SelectionPolicy::MinCost => write!(f, "low-cost"),
            SelectionPolicy::MeanAction => write!(f, "mean-act"),
        }
    }
}

/// Parameters for one engine run.
///
/// Construct via [`Default`] and adjust, then call [`EngineParams::validate`]
/// before handing to the engine (the engine validates again at its boundary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Number of clusters the affected population is initially split into.
    pub initial_clusters: usize,

    /// Number of actions after reduction (the ActionSet size K).
    pub final_clusters: usize,

    /// Cluster/action selection policy for the reducer.
    pub policy: SelectionPolicy,

    /// Seed for clustering reproducibility.
    pub seed: u64,

    /// Cap on candidate actions kept per cluster before scoring.
    pub max_candidates_per_cluster: usize,

    /// Lloyd iteration cap for k-means.
    pub kmeans_max_iter: usize,

    /// Centroid-shift convergence tolerance for k-means.
    pub kmeans_tol: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            initial_clusters: 50,
            final_clusters: 3,
            policy: SelectionPolicy::default(),
            seed: 13,
            max_candidates_per_cluster: 100,
            kmeans_max_iter: 300,
            kmeans_tol: 1e-4,
        }
    }
}

impl EngineParams {
    /// Semantic validation of size relationships and k-means knobs.
    pub fn validate(&self) -> Result<()> {
        if self.initial_clusters == 0 {
            return Err(Error::Config("initial_clusters must be at least 1".into()));
        }
        if self.final_clusters == 0 {
            return Err(Error::Config("final_clusters must be at least 1".into()));
        }
        if self.final_clusters > self.initial_clusters {
            return Err(Error::FinalExceedsInitial {
                final_k: self.final_clusters,
                initial_k: self.initial_clusters,
            });
        }
        if self.max_candidates_per_cluster == 0 {
            return Err(Error::Config(
                "max_candidates_per_cluster must be at least 1".into(),
            ));
        }
        if self.kmeans_max_iter == 0 {
            return Err(Error::Config("kmeans_max_iter must be at least 1".into()));
        }
        if !self.kmeans_tol.is_finite() || self.kmeans_tol <= 0.0 {
            return Err(Error::Config(format!(
                "kmeans_tol must be a positive finite number, got {}",
                self.kmeans_tol
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineParams::default().validate().expect("defaults valid");
    }

    #[test]
    fn final_exceeding_initial_rejected() {
        let params = EngineParams {
            initial_clusters: 3,
            final_clusters: 5,
            ..EngineParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::FinalExceedsInitial {
                final_k: 5,
                initial_k: 3
            }
        ));
    }

    #[test]
    fn equal_final_and_initial_allowed() {
        let params = EngineParams {
            initial_clusters: 4,
            final_clusters: 4,
            ..EngineParams::default()
        };
        params.validate().expect("pass-through configuration");
    }

    #[test]
    fn policy_serde_names_are_stable() {
        let json = serde_json::to_string(&SelectionPolicy::MinCost).unwrap();
        assert_eq!(json, r#""low-cost""#);
        let policy: SelectionPolicy = serde_json::from_str(r#""mean-act""#).unwrap();
        assert_eq!(policy, SelectionPolicy::MeanAction);
    }

    #[test]
    fn zero_sizes_rejected() {
        let params = EngineParams {
            initial_clusters: 0,
            ..EngineParams::default()
        };
        assert!(params.validate().is_err());

        let params = EngineParams {
            kmeans_tol: 0.0,
            ..EngineParams::default()
        };
        assert!(params.validate().is_err());
    }
}
