//! Describing the set of adversarial fractions evaluated side by side

/// Numeric type used to represent an adversarial fraction.
pub type Fraction = f64;

/// An ordered, validated set of adversarial fractions. Every probability
/// computed by a [`ReachMargin`](crate::chain::ReachMargin) is a vector with
/// one component per fraction in this set, in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    fractions: Vec<Fraction>,
    /// Probability that the adversary advances, per scenario.
    pr_up: Vec<f64>,
    /// Probability that the honest chain advances, per scenario.
    pr_down: Vec<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("cannot evaluate an empty set of adversarial fractions")]
    Empty,
    #[error("adversarial fraction {0} is not in the range 0.0..1.0")]
    BadFraction(Fraction),
}

impl ScenarioSet {
    /// Validates `fractions` and derives the per-scenario transition
    /// probabilities.
    pub fn new<I>(fractions: I) -> Result<Self, ScenarioError>
    where
        I: IntoIterator<Item = Fraction>,
    {
        use ScenarioError::*;

        let fractions: Vec<_> = fractions.into_iter().collect();
        if fractions.is_empty() {
            return Err(Empty);
        }

        if let Some(&bad) =
            fractions.iter().find(|&f| f.is_nan() || !(0.0..1.0).contains(f))
        {
            return Err(BadFraction(bad));
        }

        let pr_up = fractions.clone();
        let pr_down = fractions.iter().map(|f| 1.0 - f).collect();

        Ok(ScenarioSet { fractions, pr_up, pr_down })
    }

    #[inline]
    pub fn fractions(&self) -> &[Fraction] {
        &self.fractions
    }

    #[inline]
    pub fn pr_up(&self) -> &[f64] {
        &self.pr_up
    }

    #[inline]
    pub fn pr_down(&self) -> &[f64] {
        &self.pr_down
    }

    /// Number of scenarios, i.e. the width of every probability vector.
    #[inline]
    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    /// Always false, since empty sets are rejected by [`ScenarioSet::new`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }
}

/// Ratio of adversarial to honest progress, `f / (1 - f)`.
#[inline]
pub fn beta(fraction: Fraction) -> f64 {
    fraction / (1.0 - fraction)
}

/// Stationary probability of the event "reach == `rho`" for a birth-death
/// process which moves up with probability `fraction`.
pub fn stationary_rho(rho: usize, fraction: Fraction) -> f64 {
    let beta = beta(fraction);

    (1.0 - beta) * beta.powi(rho as i32)
}

/// Stationary probability of the event "reach >= `rho`".
pub fn stationary_rho_tail(rho: usize, fraction: Fraction) -> f64 {
    beta(fraction).powi(rho as i32)
}

/// Returns the values `min, min + step, min + 2 * step, ...` which do not
/// exceed `max`.
///
/// # Example
/// ```
/// use reach_margin::scenario::fraction_range;
///
/// let fractions: Vec<_> = fraction_range(0.1, 0.3, 0.1).collect();
/// assert_eq!(fractions.len(), 3);
/// ```
///
/// ## Panics
/// Panics if `step` is not strictly positive.
pub fn fraction_range(
    min: Fraction,
    max: Fraction,
    step: Fraction,
) -> impl Iterator<Item = Fraction> {
    assert!(step > 0.0, "fraction step {} must be positive", step);

    // Stepping by index keeps rounding error from accumulating, and the
    // slack admits a `max` that lands exactly on a step.
    let slack = step * 1e-9;
    (0..)
        .map(move |i| min + i as Fraction * step)
        .take_while(move |&f| f <= max + slack)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn scenario_set_derives_transition_probabilities() {
        let set = ScenarioSet::new([0.1, 0.25]).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.pr_up(), &[0.1, 0.25]);
        assert_relative_eq!(set.pr_down()[0], 0.9);
        assert_relative_eq!(set.pr_down()[1], 0.75);
    }

    #[test]
    fn scenario_set_rejects_bad_input() {
        assert!(matches!(
            ScenarioSet::new(Vec::new()),
            Err(ScenarioError::Empty)
        ));
        assert!(matches!(
            ScenarioSet::new([0.2, 1.0]),
            Err(ScenarioError::BadFraction(f)) if f == 1.0
        ));
        assert!(matches!(
            ScenarioSet::new([-0.1]),
            Err(ScenarioError::BadFraction(_))
        ));
        assert!(matches!(
            ScenarioSet::new([f64::NAN]),
            Err(ScenarioError::BadFraction(_))
        ));
    }

    #[test]
    fn geometric_identity() {
        for fraction in [0.0, 0.01, 0.1, 0.25, 0.4, 0.49] {
            for support in [0, 1, 5, 40] {
                let body: f64 = (0..=support)
                    .map(|rho| stationary_rho(rho, fraction))
                    .sum();
                let tail = stationary_rho_tail(support + 1, fraction);

                assert_relative_eq!(body + tail, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn fraction_range_includes_endpoint() {
        let values: Vec<_> = fraction_range(0.01, 0.491, 0.05).collect();

        assert_eq!(values.len(), 10);
        assert_relative_eq!(values[9], 0.46, epsilon = 1e-12);

        let values: Vec<_> = fraction_range(0.0, 0.5, 0.1).collect();
        assert_eq!(values.len(), 6);
    }

    #[test]
    #[should_panic]
    fn fraction_range_zero_step() {
        let _ = fraction_range(0.0, 0.5, 0.0);
    }
}
