//! Exact evolution of the reach/margin Markov chain.
//!
//! The chain tracks, for every scenario in a [`ScenarioSet`], the joint
//! distribution of the adversary's reach and relative margin. Each
//! [`ReachMargin::step`] advances time by one slot: with probability `f`
//! the adversary moves (reach and margin both increase), otherwise the
//! honest chain moves (both decrease, reflected at reach 0 and held at
//! margin 0 while reach is positive).

use std::fmt::Display;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::trace;

use crate::{
    grid::{Cells, Coord, GenerationStore},
    scenario::{stationary_rho, stationary_rho_tail, ScenarioSet},
};

pub mod builder;

pub use builder::{BuildError, ReachMarginBuilder};

/// Largest supported initial reach support. Larger requests are clamped.
pub const MAX_REACH_SUPPORT: usize = 100;

/// Distribution of `(reach, margin)` over time for a set of adversarial
/// fractions evaluated in parallel.
///
/// # Example
/// ```
/// use reach_margin::chain::ReachMargin;
///
/// let mut chain = ReachMargin::new(1, 0, [0.1]).unwrap();
/// chain.step().unwrap();
///
/// assert!((chain.forkable_probability()[0] - 0.1).abs() < 1e-12);
/// assert!((chain.total_probability()[0] - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct ReachMargin {
    scenarios: ScenarioSet,
    store: GenerationStore,
    time: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvolveError {
    #[error("chain has already been evolved to its horizon {0}")]
    HorizonReached(usize),
    #[error("cannot evolve to time {requested} beyond the horizon {horizon}")]
    BeyondHorizon { requested: usize, horizon: usize },
    #[error("cannot evolve back from time {current} to time {requested}")]
    Rewind { requested: usize, current: usize },
}

impl ReachMargin {
    /// Creates a chain which can be evolved up to time `horizon`, with
    /// initial reach supported on `0..=reach_support`.
    pub fn new<I>(
        horizon: usize,
        reach_support: usize,
        fractions: I,
    ) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = f64>,
    {
        ReachMarginBuilder::new()
            .horizon(horizon)
            .reach_support(reach_support)
            .fractions(fractions)
            .build()
    }

    pub fn builder() -> ReachMarginBuilder {
        ReachMarginBuilder::new()
    }

    pub(crate) fn from_parts(
        scenarios: ScenarioSet,
        store: GenerationStore,
    ) -> Self {
        let mut chain = ReachMargin { scenarios, store, time: 0 };
        chain.seed();

        chain
    }

    /// Current time slot.
    #[inline]
    pub fn time(&self) -> usize {
        self.time
    }

    /// Last time slot this chain can be evolved to.
    #[inline]
    pub fn horizon(&self) -> usize {
        self.store.shape().horizon()
    }

    /// Support `0..=R` of the initial reach distribution, after clamping.
    #[inline]
    pub fn reach_support(&self) -> usize {
        self.store.shape().reach_support()
    }

    #[inline]
    pub fn scenarios(&self) -> &ScenarioSet {
        &self.scenarios
    }

    /// Bytes used by the two generation buffers.
    #[inline]
    pub fn memory_bytes(&self) -> usize {
        self.store.memory_bytes()
    }

    /// Probability vector of the current generation at `(reach, margin)`.
    /// Coordinates outside the valid region at the current time yield the
    /// zero vector.
    #[inline]
    pub fn cell(&self, reach: i64, margin: i64) -> &[f64] {
        self.store.current(self.time as i64).get(reach, margin)
    }

    /// Places the initial distribution in generation 0.
    fn seed(&mut self) {
        let reach_support = self.reach_support();

        if reach_support == 0 {
            self.store.current_cell_mut(Coord::new(0, 0, 0)).fill(1.0);
            return;
        }

        for rho in 0..=reach_support {
            // The margin of an empty string equals the reach of the prefix.
            let coord = Coord::new(0, rho as i64, rho as i64);
            let cell = self.store.current_cell_mut(coord);

            for (value, &f) in cell.iter_mut().zip(self.scenarios.fractions()) {
                *value = stationary_rho(rho, f);
            }
        }
    }

    /// Advances the chain by one time slot, recomputing every cell of the
    /// new generation from the previous one.
    pub fn step(&mut self) -> Result<(), EvolveError> {
        let horizon = self.horizon();
        if self.time == horizon {
            return Err(EvolveError::HorizonReached(horizon));
        }

        self.time += 1;
        self.store.swap();

        let time = self.time as i64;
        let max_reach = (self.reach_support() + self.time) as i64;
        let shape = *self.store.shape();
        let up = self.scenarios.pr_up();
        let down = self.scenarios.pr_down();
        let (current, previous) = self.store.split(time);

        let fill = |(row, cells): (usize, &mut [f64])| {
            let margin = shape.margin_of_row(row);
            if margin < -time {
                return;
            }

            // Valid reaches at this margin are margin.max(0)..=max_reach
            for reach in margin.max(0)..=max_reach {
                let at = reach as usize * shape.width();
                let cell = &mut cells[at..at + shape.width()];

                Transition::at(reach, margin)
                    .apply(cell, &previous, reach, margin, up, down);
            }
        };

        #[cfg(feature = "rayon")]
        current.par_chunks_mut(shape.row_len()).enumerate().for_each(fill);
        #[cfg(not(feature = "rayon"))]
        current.chunks_mut(shape.row_len()).enumerate().for_each(fill);

        trace!(time = self.time, "evolved reach/margin chain");

        Ok(())
    }

    /// Calls [`ReachMargin::step`] until the chain reaches time `time`.
    pub fn evolve_to(&mut self, time: usize) -> Result<(), EvolveError> {
        let horizon = self.horizon();
        if time > horizon {
            return Err(EvolveError::BeyondHorizon { requested: time, horizon });
        }
        if time < self.time {
            return Err(EvolveError::Rewind {
                requested: time,
                current: self.time,
            });
        }

        while self.time < time {
            self.step()?;
        }

        Ok(())
    }

    /// Total probability, per scenario, of all states with margin at least
    /// `min_margin`, plus the mass of initial reaches beyond the support.
    ///
    /// ## Panics
    /// Panics if `min_margin` is not in `-t..=R + t` for the current time
    /// `t`.
    pub fn probability(&self, min_margin: i64) -> Vec<f64> {
        let time = self.time as i64;
        let reach_support = self.reach_support();
        let max_reach = reach_support as i64 + time;
        assert!(
            (-time..=max_reach).contains(&min_margin),
            "minimum margin {} is outside {}..={}",
            min_margin,
            -time,
            max_reach
        );

        let cells = self.store.current(time);
        let mut probs = vec![0.0; self.scenarios.len()];
        for reach in 0..=max_reach {
            for margin in min_margin..=reach {
                for (p, &v) in probs.iter_mut().zip(cells.get(reach, margin)) {
                    *p += v;
                }
            }
        }

        if reach_support != 0 {
            for (p, &f) in probs.iter_mut().zip(self.scenarios.fractions()) {
                *p += stationary_rho_tail(reach_support + 1, f);
            }
        }

        probs
    }

    /// Upper bound, per scenario, on the probability that the adversarial
    /// prefix is still forkable (margin >= 0).
    #[inline]
    pub fn forkable_probability(&self) -> Vec<f64> {
        self.probability(0)
    }

    /// Mass of all reachable states. Equals 1.0 for every scenario.
    #[inline]
    pub fn total_probability(&self) -> Vec<f64> {
        self.probability(-(self.time as i64))
    }
}

/// Shape of the recurrence at a given `(reach, margin)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Positive reach, margin above 0 or below -1.
    Interior,
    /// Positive reach, margin 0.
    MarginZero,
    /// Positive reach, margin -1.
    MarginMinusOne,
    /// Reach 0, margin 0.
    Origin,
    /// Reach 0, margin -1.
    FloorMinusOne,
    /// Reach 0, margin below -1.
    FloorBelow,
}

/// Offsets `(reach, margin)` into the previous generation.
type Source = (i64, i64);

const DIAGONALLY_DOWN: Source = (-1, -1);
const DIAGONALLY_UP: Source = (1, 1);
const RIGHT: Source = (1, 0);
const UP: Source = (0, 1);

impl Transition {
    fn at(reach: i64, margin: i64) -> Self {
        use Transition::*;

        match (reach, margin) {
            (0, 0) => Origin,
            (0, -1) => FloorMinusOne,
            (0, _) => FloorBelow,
            (_, 0) => MarginZero,
            (_, -1) => MarginMinusOne,
            _ => Interior,
        }
    }

    /// Cells of the previous generation weighted by the up probability and
    /// by the down probability, respectively.
    fn sources(self) -> (&'static [Source], &'static [Source]) {
        use Transition::*;

        match self {
            Interior => (&[DIAGONALLY_DOWN], &[DIAGONALLY_UP]),
            MarginZero => (&[DIAGONALLY_DOWN], &[DIAGONALLY_UP, RIGHT]),
            MarginMinusOne => (&[DIAGONALLY_DOWN], &[]),
            Origin => (&[], &[DIAGONALLY_UP, RIGHT]),
            FloorMinusOne => (&[], &[UP]),
            FloorBelow => (&[], &[DIAGONALLY_UP, UP]),
        }
    }

    /// Writes `up * sum(up sources) + down * sum(down sources)` into `cell`,
    /// element-wise over scenarios.
    fn apply(
        self,
        cell: &mut [f64],
        previous: &Cells<'_>,
        reach: i64,
        margin: i64,
        up: &[f64],
        down: &[f64],
    ) {
        cell.fill(0.0);

        let (up_sources, down_sources) = self.sources();
        for (weights, sources) in [(up, up_sources), (down, down_sources)] {
            for &(dr, dm) in sources {
                let source = previous.get(reach + dr, margin + dm);

                for ((value, &w), &p) in
                    cell.iter_mut().zip(weights).zip(source)
                {
                    *value += w * p;
                }
            }
        }
    }
}

impl Display for ReachMargin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let below = -(self.time as i64);
        let above = (self.reach_support() + self.time) as i64;

        writeln!(f, "=== Matrix at t: {} ===", self.time)?;
        for margin in (below..=above).rev() {
            for reach in 0..=above {
                let cell = self.cell(reach, margin);

                write!(f, "[")?;
                for (i, value) in cell.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:8}", value)?;
                }
                write!(f, "]")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use super::*;

    const FRACTIONS: [f64; 5] = [0.05, 0.15, 0.25, 0.35, 0.45];

    #[test]
    fn zero_reach_single_step() {
        let mut chain = ReachMargin::new(1, 0, [0.1]).unwrap();
        chain.step().unwrap();

        assert_eq!(chain.time(), 1);
        assert_relative_eq!(chain.total_probability()[0], 1.0);
        assert_relative_eq!(chain.forkable_probability()[0], 0.1);
        assert_relative_eq!(chain.cell(1, 1)[0], 0.1);
        assert_relative_eq!(chain.cell(0, -1)[0], 0.9);
    }

    #[test]
    fn zero_reach_two_steps() {
        let mut chain = ReachMargin::new(2, 0, [0.1]).unwrap();
        chain.evolve_to(2).unwrap();

        assert_relative_eq!(chain.cell(2, 2)[0], 0.01, epsilon = 1e-15);
        assert_relative_eq!(chain.cell(1, 0)[0], 0.09, epsilon = 1e-15);
        assert_relative_eq!(chain.cell(0, 0)[0], 0.09, epsilon = 1e-15);
        assert_relative_eq!(chain.cell(0, -2)[0], 0.81, epsilon = 1e-15);
        assert_relative_eq!(
            chain.forkable_probability()[0],
            0.19,
            epsilon = 1e-15
        );
    }

    #[test]
    fn initial_distribution_is_stationary() {
        let chain = ReachMargin::new(4, 3, [0.2, 0.4]).unwrap();

        for rho in 0..=3 {
            for (s, &f) in [0.2, 0.4].iter().enumerate() {
                assert_relative_eq!(
                    chain.cell(rho as i64, rho as i64)[s],
                    stationary_rho(rho, f)
                );
            }
        }
        assert_eq!(chain.cell(1, 0), &[0.0, 0.0]);

        for total in chain.total_probability() {
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
        assert_eq!(chain.forkable_probability(), chain.total_probability());
    }

    #[test]
    fn mass_is_conserved_and_bounded() {
        for reach_support in [0, 1, 6] {
            let mut chain =
                ReachMargin::new(40, reach_support, FRACTIONS).unwrap();

            while chain.step().is_ok() {
                let total = chain.total_probability();
                let forkable = chain.forkable_probability();

                for s in 0..FRACTIONS.len() {
                    assert_relative_eq!(total[s], 1.0, epsilon = 1e-9);
                    assert!(forkable[s] <= total[s] + 1e-12);
                    assert!(forkable[s] >= 0.0);
                }
            }
            assert_eq!(chain.time(), 40);
        }
    }

    #[test]
    fn forkable_grows_with_adversarial_fraction() {
        for reach_support in [0, 4] {
            let mut chain =
                ReachMargin::new(25, reach_support, FRACTIONS).unwrap();

            while chain.step().is_ok() {
                let forkable = chain.forkable_probability();

                for pair in forkable.windows(2) {
                    assert!(pair[0] <= pair[1] + 1e-12, "{:?}", forkable);
                }
            }
        }
    }

    #[test]
    fn scenarios_are_independent() {
        let mut joint = ReachMargin::new(20, 5, [0.1, 0.3]).unwrap();
        let mut first = ReachMargin::new(20, 5, [0.1]).unwrap();
        let mut second = ReachMargin::new(20, 5, [0.3]).unwrap();

        for _ in 0..20 {
            joint.step().unwrap();
            first.step().unwrap();
            second.step().unwrap();

            let forkable = joint.forkable_probability();
            assert_relative_eq!(forkable[0], first.forkable_probability()[0]);
            assert_relative_eq!(forkable[1], second.forkable_probability()[0]);
        }
    }

    #[test]
    fn out_of_range_cells_are_zero() {
        let mut chain = ReachMargin::new(5, 2, [0.2, 0.3]).unwrap();

        loop {
            let t = chain.time() as i64;
            for (reach, margin) in
                [(-1, 0), (3 + t, 0), (0, -t - 1), (1, 2), (2 + t, 3 + t)]
            {
                assert_eq!(chain.cell(reach, margin), &[0.0, 0.0]);
            }

            if chain.step().is_err() {
                break;
            }
        }
    }

    #[test]
    fn cannot_step_past_horizon() {
        let mut chain = ReachMargin::new(2, 0, [0.1]).unwrap();

        assert_eq!(
            chain.evolve_to(3),
            Err(EvolveError::BeyondHorizon { requested: 3, horizon: 2 })
        );
        chain.evolve_to(2).unwrap();
        assert_eq!(chain.step(), Err(EvolveError::HorizonReached(2)));
        assert_eq!(
            chain.evolve_to(1),
            Err(EvolveError::Rewind { requested: 1, current: 2 })
        );
    }

    #[test]
    #[should_panic]
    fn probability_below_band() {
        let mut chain = ReachMargin::new(3, 1, [0.1]).unwrap();
        chain.step().unwrap();

        chain.probability(-2);
    }

    #[test]
    #[should_panic]
    fn probability_above_band() {
        let chain = ReachMargin::new(3, 1, [0.1]).unwrap();

        chain.probability(2);
    }

    #[test]
    fn display_prints_current_generation() {
        let mut chain = ReachMargin::new(1, 0, [0.5]).unwrap();
        chain.step().unwrap();

        let text = chain.to_string();
        assert!(text.starts_with("=== Matrix at t: 1 ==="));
        // Margins 1, 0 and -1
        assert_eq!(text.lines().count(), 4);
    }

    proptest! {
        #[test]
        fn total_stays_one(
            fraction in 0.0f64..0.49,
            reach_support in 0usize..8,
            horizon in 1usize..16,
        ) {
            let mut chain =
                ReachMargin::new(horizon, reach_support, [fraction]).unwrap();

            for _ in 0..horizon {
                chain.step().unwrap();

                let total = chain.total_probability()[0];
                let forkable = chain.forkable_probability()[0];
                prop_assert!((total - 1.0).abs() < 1e-9);
                prop_assert!(forkable <= total + 1e-12);
            }
        }
    }
}
