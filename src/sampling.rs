//! Monte Carlo estimation of the forkable bound.
//!
//! Walks the reach/margin chain forward one sampled move at a time, which
//! gives an independent check on the exact distribution computed by
//! [`ReachMargin`](crate::chain::ReachMargin).

use rand::Rng;

use crate::scenario::{beta, Fraction};

/// Which chain produces the block in a time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// The adversary advances.
    Up,
    /// The honest chain advances.
    Down,
}

/// A `(reach, margin)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub reach: i64,
    pub margin: i64,
}

/// Returns the state following `state` after `step`.
pub fn advance(state: State, step: Move) -> State {
    let State { reach, margin } = state;

    match step {
        Move::Up => State { reach: reach + 1, margin: margin + 1 },
        // A zero margin is held while the adversary still has reach.
        Move::Down if margin == 0 && reach > 0 => {
            State { reach: reach - 1, margin: 0 }
        }
        Move::Down => State { reach: (reach - 1).max(0), margin: margin - 1 },
    }
}

/// Estimates the probability that a chain seeded like a
/// [`ReachMargin`](crate::chain::ReachMargin) with the given `horizon`,
/// `reach_support` and a single `fraction` is forkable at `horizon`. Initial
/// reaches beyond `reach_support` are counted as forkable.
///
/// ## Panics
/// Panics if `trials` is 0, or if `reach_support > 0` and `fraction` is not
/// in `0.0..0.5` (the stationary reach distribution does not exist).
pub fn estimate_forkable<R: Rng>(
    horizon: usize,
    reach_support: usize,
    fraction: Fraction,
    trials: usize,
    rng: &mut R,
) -> f64 {
    assert!(trials > 0, "cannot estimate from 0 trials");
    assert!(
        (0.0..1.0).contains(&fraction),
        "adversarial fraction {} is not in the range 0.0..1.0",
        fraction
    );
    assert!(
        reach_support == 0 || fraction < 0.5,
        "no stationary reach distribution for fraction {}",
        fraction
    );

    let beta = beta(fraction);
    let mut forkable = 0usize;

    for _ in 0..trials {
        let Some(rho) = initial_reach(reach_support, beta, rng) else {
            forkable += 1;
            continue;
        };

        let mut state = State { reach: rho, margin: rho };
        for _ in 0..horizon {
            let step =
                if rng.gen_bool(fraction) { Move::Up } else { Move::Down };
            state = advance(state, step);
        }

        if state.margin >= 0 {
            forkable += 1;
        }
    }

    forkable as f64 / trials as f64
}

/// Samples the initial reach from the geometric stationary distribution,
/// returning `None` if it exceeds `reach_support`.
fn initial_reach<R: Rng>(
    reach_support: usize,
    beta: f64,
    rng: &mut R,
) -> Option<i64> {
    if reach_support == 0 {
        return Some(0);
    }

    // Pr[rho >= k] = beta^k
    let mut rho = 0;
    while rng.gen_bool(beta) {
        rho += 1;
        if rho > reach_support {
            return None;
        }
    }

    Some(rho as i64)
}
