use tracing::debug;

use crate::{
    grid::{CapacityError, GenerationStore, GridShape, DEFAULT_MAX_VALUES},
    scenario::{Fraction, ScenarioError, ScenarioSet},
};

use super::{ReachMargin, MAX_REACH_SUPPORT};

/// Builds a [ReachMargin].
#[derive(Debug, Default, Clone)]
pub struct ReachMarginBuilder {
    pub horizon: Option<usize>,
    pub reach_support: Option<usize>,
    pub fractions: Vec<Fraction>,
    pub max_values: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no time horizon was given")]
    NoHorizonGiven,
    #[error(transparent)]
    ScenarioError(#[from] ScenarioError),
    #[error("state space does not fit the configured capacity")]
    CapacityError(#[from] CapacityError),
}

impl ReachMarginBuilder {
    /// Creates a new [ReachMarginBuilder].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the last time slot the chain can be evolved to.
    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = Some(horizon);

        self
    }

    /// Sets the support `0..=reach_support` of the initial reach
    /// distribution (default 0, i.e. all mass at reach 0). Values above
    /// [MAX_REACH_SUPPORT] are clamped to it.
    pub fn reach_support(mut self, reach_support: usize) -> Self {
        self.reach_support = Some(reach_support);

        self
    }

    /// Add an adversarial fraction to evaluate.
    pub fn fraction(mut self, fraction: Fraction) -> Self {
        self.fractions.push(fraction);

        self
    }

    /// Call [ReachMarginBuilder::fraction] once for each element of
    /// `fractions`.
    pub fn fractions<I>(mut self, fractions: I) -> Self
    where
        I: IntoIterator<Item = Fraction>,
    {
        self.fractions.extend(fractions);

        self
    }

    /// Limits the number of values held by one generation buffer (default
    /// [DEFAULT_MAX_VALUES]).
    pub fn max_values(mut self, max_values: usize) -> Self {
        self.max_values = Some(max_values);

        self
    }

    /// Creates a [ReachMargin] from the specified parameters, seeded with
    /// its initial distribution.
    pub fn build(self) -> Result<ReachMargin, BuildError> {
        let ReachMarginBuilder {
            horizon,
            reach_support,
            fractions,
            max_values,
        } = self;

        let horizon = horizon.ok_or(BuildError::NoHorizonGiven)?;
        let reach_support = match reach_support {
            Some(r) if r > MAX_REACH_SUPPORT => {
                debug!(
                    requested = r,
                    max = MAX_REACH_SUPPORT,
                    "clamping reach support"
                );
                MAX_REACH_SUPPORT
            }
            Some(r) => r,
            None => 0,
        };

        let scenarios = ScenarioSet::new(fractions)?;
        let shape = GridShape::new(
            horizon,
            reach_support,
            scenarios.len(),
            max_values.unwrap_or(DEFAULT_MAX_VALUES),
        )?;

        debug!(
            horizon,
            reach_support,
            scenarios = scenarios.len(),
            values = shape.len(),
            "allocating reach/margin chain"
        );

        Ok(ReachMargin::from_parts(scenarios, GenerationStore::new(shape)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_build() {
        ReachMarginBuilder::new()
            .horizon(10)
            .fraction(0.1)
            .build()
            .expect("valid chain build");
    }

    #[test]
    fn reach_support_is_clamped() {
        let chain = ReachMarginBuilder::new()
            .horizon(2)
            .reach_support(MAX_REACH_SUPPORT + 50)
            .fractions([0.1, 0.2])
            .build()
            .unwrap();

        assert_eq!(chain.reach_support(), MAX_REACH_SUPPORT);
        assert_eq!(chain.horizon(), 2);
        assert_eq!(chain.scenarios().len(), 2);
    }

    #[test]
    fn build_errors() {
        assert!(matches!(
            ReachMarginBuilder::new().fraction(0.1).build(),
            Err(BuildError::NoHorizonGiven)
        ));
        assert!(matches!(
            ReachMarginBuilder::new().horizon(3).build(),
            Err(BuildError::ScenarioError(ScenarioError::Empty))
        ));
        assert!(matches!(
            ReachMarginBuilder::new().horizon(3).fraction(1.5).build(),
            Err(BuildError::ScenarioError(ScenarioError::BadFraction(_)))
        ));
        assert!(matches!(
            ReachMarginBuilder::new()
                .horizon(100)
                .reach_support(10)
                .fraction(0.1)
                .max_values(1000)
                .build(),
            Err(BuildError::CapacityError(CapacityError::Exceeded { .. }))
        ));
    }
}
