//! Partitioning of the affected population.
//!
//! Categorical features are encoded as indicator vectors and numeric
//! features pass through unchanged; the encoded points are clustered with
//! Lloyd's algorithm. Initialization is k-means++-style but fully
//! deterministic: the first centroid is drawn from a seeded RNG and each
//! subsequent centroid is the point farthest from the chosen set, so an
//! identical (input, k, seed) triple always yields the identical partition.

use gr_common::{Error, FeatureKind, FeatureSchema, Instance, Result, Value};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;

/// A named, ordered group of affected individuals.
///
/// Members are indices into the affected population slice the clusterer was
/// given; clusters are disjoint and cover the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Width of the indicator encoding for one feature.
fn feature_width(kind: &FeatureKind) -> usize {
    match kind {
        FeatureKind::Numeric => 1,
        FeatureKind::Categorical { domain } => domain.len(),
    }
}

/// Encode an instance: numeric passthrough, categorical one-hot.
pub(crate) fn encode(schema: &FeatureSchema, instance: &Instance) -> Result<Vec<f64>> {
    let width: usize = schema
        .ids()
        .map(|id| schema.feature(id).map(|d| feature_width(&d.kind)))
        .collect::<Result<Vec<_>>>()?
        .iter()
        .sum();
    let mut out = Vec::with_capacity(width);
    for id in schema.ids() {
        let def = schema.feature(id)?;
        match (&def.kind, instance.get(id)) {
            (FeatureKind::Numeric, Some(Value::Num(v))) => out.push(*v),
            (FeatureKind::Categorical { domain }, Some(Value::Cat(c))) => {
                for i in 0..domain.len() {
                    out.push(if i == c.0 as usize { 1.0 } else { 0.0 });
                }
            }
            _ => {
                return Err(Error::FeatureKindMismatch {
                    feature: def.name.clone(),
                    message: "instance value kind does not match schema".into(),
                })
            }
        }
    }
    Ok(out)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Count distinct encoded points via their bit patterns.
fn distinct_points(points: &[Vec<f64>]) -> usize {
    let mut seen: BTreeSet<Vec<u64>> = BTreeSet::new();
    for p in points {
        seen.insert(p.iter().map(|v| v.to_bits()).collect());
    }
    seen.len()
}

/// Deterministic k-means++-style seeding: seeded first pick, then
/// farthest-point selection.
fn seed_centroids(points: &[Vec<f64>], k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let first = rng.random_range(0..points.len());
    let mut centroids = vec![points[first].clone()];

    while centroids.len() < k {
        let mut best_idx = 0;
        let mut best_dist = 0.0;
        for (i, p) in points.iter().enumerate() {
            let nearest = centroids
                .iter()
                .map(|c| squared_distance(p, c))
                .fold(f64::INFINITY, f64::min);
            if nearest > best_dist {
                best_dist = nearest;
                best_idx = i;
            }
        }
        centroids.push(points[best_idx].clone());
    }
    centroids
}

/// Assign each point to its nearest centroid; ties go to the lowest index.
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c_idx, c) in centroids.iter().enumerate() {
                let d = squared_distance(p, c);
                if d < best_dist {
                    best_dist = d;
                    best = c_idx;
                }
            }
            best
        })
        .collect()
}

/// Recompute centroids as member means; empty clusters keep their previous
/// centroid.
fn update(points: &[Vec<f64>], labels: &[usize], centroids: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = centroids[0].len();
    let mut sums = vec![vec![0.0; width]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];
    for (p, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (slot, v) in sums[label].iter_mut().zip(p) {
            *slot += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(centroids)
        .map(|((sum, count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|v| v / count as f64).collect()
            }
        })
        .collect()
}

fn converged(old: &[Vec<f64>], new: &[Vec<f64>], tol: f64) -> bool {
    old.iter()
        .zip(new)
        .all(|(a, b)| squared_distance(a, b) <= tol * tol)
}

/// Partition `instances` into exactly `k` disjoint, non-empty clusters.
///
/// Fails with [`Error::DegenerateClusters`] when `k` exceeds the number of
/// distinct encoded points; this is a configuration/size mismatch the
/// caller must resolve (reduce `initial_clusters` or dedupe the input).
pub fn cluster_affected(
    schema: &FeatureSchema,
    instances: &[Instance],
    k: usize,
    seed: u64,
    max_iter: usize,
    tol: f64,
) -> Result<Vec<Cluster>> {
    if k == 0 {
        return Err(Error::Config("cluster count must be at least 1".into()));
    }
    if instances.is_empty() {
        return Err(Error::Config("cannot cluster an empty population".into()));
    }

    let points = instances
        .iter()
        .map(|i| encode(schema, i))
        .collect::<Result<Vec<_>>>()?;

    let distinct = distinct_points(&points);
    if distinct < k {
        return Err(Error::DegenerateClusters {
            requested: k,
            distinct,
        });
    }

    let mut centroids = seed_centroids(&points, k, seed);
    let mut labels = assign(&points, &centroids);
    for _ in 0..max_iter {
        let new_centroids = update(&points, &labels, &centroids);
        let new_labels = assign(&points, &new_centroids);
        let done = converged(&centroids, &new_centroids, tol);
        centroids = new_centroids;
        labels = new_labels;
        if done {
            break;
        }
    }

    let mut clusters: Vec<Cluster> = (0..k)
        .map(|id| Cluster {
            id,
            members: Vec::new(),
        })
        .collect();
    for (row, &label) in labels.iter().enumerate() {
        clusters[label].members.push(row);
    }

    if let Some(empty) = clusters.iter().find(|c| c.is_empty()) {
        return Err(Error::ClusterInvariant(format!(
            "cluster {} ended empty with {distinct} distinct points for k={k}",
            empty.id
        )));
    }

    Ok(clusters)
}
