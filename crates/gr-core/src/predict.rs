//! Predictor collaborator seam.
//!
//! The classifier is an opaque external service: pure, deterministic for
//! identical input, and invoked in batches (one call for N rows) so that
//! expensive model inference is amortized. Predictor failures are fatal for
//! the invocation that triggered them; no partial results are kept.

use gr_common::{Error, Instance, Outcome, Result};

/// Black-box binary classifier over instances.
pub trait Predictor {
    /// Predict outcomes for a batch of instances, one outcome per row,
    /// in input order.
    fn predict(&self, instances: &[Instance]) -> Result<Vec<Outcome>>;
}

/// Adapt a per-instance closure into a batch [`Predictor`].
///
/// Useful for tests and for callers whose model exposes a row-wise API;
/// production predictors should implement the trait directly on their
/// batching client.
pub struct FnPredictor<F>(pub F);

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&Instance) -> bool,
{
    fn predict(&self, instances: &[Instance]) -> Result<Vec<Outcome>> {
        Ok(instances.iter().map(|i| Outcome::from((self.0)(i))).collect())
    }
}

/// Invoke the predictor and verify the response shape.
///
/// A predictor that returns the wrong number of outcomes is a broken
/// collaborator; the whole evaluation aborts.
pub fn predict_checked(predictor: &dyn Predictor, instances: &[Instance]) -> Result<Vec<Outcome>> {
    let outcomes = predictor.predict(instances)?;
    if outcomes.len() != instances.len() {
        return Err(Error::Predictor(format!(
            "predictor returned {} outcomes for {} instances",
            outcomes.len(),
            instances.len()
        )));
    }
    Ok(outcomes)
}
