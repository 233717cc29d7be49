//! Mixed-type distance between an original and a modified feature vector.
//!
//! Cost semantics: the sum of per-feature contributions, where a numeric
//! feature contributes its absolute difference normalized by the feature's
//! observed range in a reference dataset, and a categorical feature
//! contributes 1 when the category changed. The function is fitted once
//! (learning the ranges) and then read-only; `distance(x, x) == 0` always
//! holds, while symmetry is not part of the contract.

use gr_common::{Error, FeatureId, FeatureKind, FeatureSchema, Instance, Result, Value};
use rayon::prelude::*;

/// Per-feature normalization learned at fit time.
#[derive(Debug, Clone, PartialEq)]
enum FeatureScale {
    /// Observed max − min over the reference dataset.
    Numeric { range: f64 },
    Categorical,
}

/// A fitted mixed-type distance function.
#[derive(Debug, Clone)]
pub struct DistanceFn {
    scales: Vec<FeatureScale>,
}

impl DistanceFn {
    /// Learn per-numeric-feature ranges from a reference dataset.
    ///
    /// The reference must be non-empty and every instance must match the
    /// schema arity; violations are configuration errors.
    pub fn fit(schema: &FeatureSchema, reference: &[Instance]) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::Config(
                "cannot fit distance function on an empty reference dataset".into(),
            ));
        }
        for instance in reference {
            if instance.len() != schema.len() {
                return Err(Error::ArityMismatch {
                    expected: schema.len(),
                    actual: instance.len(),
                });
            }
        }

        let mut scales = Vec::with_capacity(schema.len());
        for id in schema.ids() {
            match &schema.feature(id)?.kind {
                FeatureKind::Numeric => {
                    let mut min = f64::INFINITY;
                    let mut max = f64::NEG_INFINITY;
                    for instance in reference {
                        if let Some(Value::Num(v)) = instance.get(id) {
                            min = min.min(*v);
                            max = max.max(*v);
                        }
                    }
                    scales.push(FeatureScale::Numeric { range: max - min });
                }
                FeatureKind::Categorical { .. } => scales.push(FeatureScale::Categorical),
            }
        }
        Ok(Self { scales })
    }

    /// Number of features the function was fitted against.
    pub fn arity(&self) -> usize {
        self.scales.len()
    }

    /// Distance between one original/modified pair.
    pub fn measure(&self, original: &Instance, modified: &Instance) -> Result<f64> {
        if original.len() != self.scales.len() || modified.len() != self.scales.len() {
            return Err(Error::ArityMismatch {
                expected: self.scales.len(),
                actual: original.len().max(modified.len()),
            });
        }

        let mut total = 0.0;
        for (i, scale) in self.scales.iter().enumerate() {
            let id = FeatureId(i);
            match (scale, original.get(id), modified.get(id)) {
                (FeatureScale::Numeric { range }, Some(Value::Num(a)), Some(Value::Num(b))) => {
                    if *range > 0.0 {
                        total += (b - a).abs() / range;
                    }
                    // zero observed range contributes nothing
                }
                (FeatureScale::Categorical, Some(Value::Cat(a)), Some(Value::Cat(b))) => {
                    if a != b {
                        total += 1.0;
                    }
                }
                _ => {
                    return Err(Error::FeatureKindMismatch {
                        feature: format!("feature {id}"),
                        message: "instance value kind does not match fitted schema".into(),
                    })
                }
            }
        }
        Ok(total)
    }

    /// Distances for a batch of original/modified pairs.
    pub fn measure_pairs(&self, originals: &[Instance], modified: &[Instance]) -> Result<Vec<f64>> {
        if originals.len() != modified.len() {
            return Err(Error::Config(format!(
                "distance batch length mismatch: {} originals vs {} modified",
                originals.len(),
                modified.len()
            )));
        }
        originals
            .par_iter()
            .zip(modified.par_iter())
            .map(|(a, b)| self.measure(a, b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_common::{Action, CategoryId, Edit};

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .numeric("age")
            .numeric("income")
            .categorical("city", ["A", "B"])
            .build()
            .unwrap()
    }

    fn instance(s: &FeatureSchema, age: f64, income: f64, city: &str) -> Instance {
        let city_id = s.resolve("city").unwrap();
        let cat = s.category(city_id, city).unwrap();
        Instance::new(s, vec![Value::Num(age), Value::Num(income), Value::Cat(cat)]).unwrap()
    }

    fn fitted(s: &FeatureSchema) -> DistanceFn {
        let reference = vec![
            instance(s, 20.0, 500.0, "A"),
            instance(s, 60.0, 1500.0, "B"),
        ];
        DistanceFn::fit(s, &reference).unwrap()
    }

    #[test]
    fn identity_distance_is_zero() {
        let s = schema();
        let d = fitted(&s);
        let x = instance(&s, 30.0, 800.0, "A");
        assert_eq!(d.measure(&x, &x).unwrap(), 0.0);
    }

    #[test]
    fn numeric_contribution_is_range_normalized() {
        let s = schema();
        let d = fitted(&s);
        // age range 40, income range 1000
        let a = instance(&s, 20.0, 500.0, "A");
        let b = instance(&s, 40.0, 1000.0, "A");
        let dist = d.measure(&a, &b).unwrap();
        assert!((dist - (20.0 / 40.0 + 500.0 / 1000.0)).abs() < 1e-12);
    }

    #[test]
    fn categorical_change_contributes_one() {
        let s = schema();
        let d = fitted(&s);
        let a = instance(&s, 20.0, 500.0, "A");
        let b = instance(&s, 20.0, 500.0, "B");
        assert_eq!(d.measure(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn zero_range_contributes_nothing() {
        let s = schema();
        let reference = vec![
            instance(&s, 30.0, 500.0, "A"),
            instance(&s, 30.0, 1500.0, "B"),
        ];
        let d = DistanceFn::fit(&s, &reference).unwrap();
        let a = instance(&s, 30.0, 500.0, "A");
        let b = instance(&s, 95.0, 500.0, "A");
        assert_eq!(d.measure(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn empty_reference_rejected() {
        let s = schema();
        let err = DistanceFn::fit(&s, &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn arity_mismatch_rejected() {
        let s = schema();
        let d = fitted(&s);
        let narrow = FeatureSchema::builder().numeric("age").build().unwrap();
        let x = Instance::new(&narrow, vec![Value::Num(1.0)]).unwrap();
        let y = instance(&s, 20.0, 500.0, "A");
        assert!(matches!(
            d.measure(&x, &y).unwrap_err(),
            Error::ArityMismatch { .. }
        ));
    }

    #[test]
    fn applying_a_noop_edit_costs_zero() {
        let s = schema();
        let d = fitted(&s);
        let x = instance(&s, 30.0, 800.0, "A");
        let a = Action::new(vec![
            (s.resolve("income").unwrap(), Edit::SetNum(800.0)),
            (s.resolve("city").unwrap(), Edit::SetCat(CategoryId(0))),
        ])
        .unwrap();
        let y = a.apply(&x).unwrap();
        assert_eq!(d.measure(&x, &y).unwrap(), 0.0);
    }

    #[test]
    fn batch_matches_scalar() {
        let s = schema();
        let d = fitted(&s);
        let xs = vec![instance(&s, 20.0, 500.0, "A"), instance(&s, 60.0, 1500.0, "B")];
        let ys = vec![instance(&s, 40.0, 500.0, "B"), instance(&s, 60.0, 500.0, "B")];
        let batch = d.measure_pairs(&xs, &ys).unwrap();
        for (i, (x, y)) in xs.iter().zip(&ys).enumerate() {
            assert_eq!(batch[i], d.measure(x, y).unwrap());
        }
    }
}
