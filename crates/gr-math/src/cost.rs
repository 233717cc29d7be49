//! Statistics over cost vectors that use `+inf` as an "ineligible" sentinel.
//!
//! The assignment procedure marks an individual's cost under an action as
//! `+inf` when the action does not flip them. Aggregations must exclude
//! those sentinels rather than fold them in: an undefined cost is never
//! treated as zero. NaN entries are treated as undefined as well.

/// Mean over the finite entries of `values`.
///
/// Returns `None` when no entry is finite; an undefined mean must be
/// excluded from downstream comparisons, never reported as 0.
pub fn mean_finite(values: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Index and value of the smallest finite entry; ties go to the lowest index.
///
/// Returns `None` when every entry is non-finite.
pub fn argmin_finite(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if *v >= b => {}
            _ => best = Some((i, *v)),
        }
    }
    best
}

/// Weighted mean over `(value, weight)` pairs, skipping non-finite values
/// and non-positive weights.
///
/// Returns `None` when no pair contributes.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for (value, weight) in pairs {
        if value.is_finite() && *weight > 0.0 && weight.is_finite() {
            num += value * weight;
            den += weight;
        }
    }
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Count of finite entries.
pub fn count_finite(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_finite()).count()
}
