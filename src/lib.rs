/*!
Exact bounds on the forkability of adversarial blockchain prefixes.

A [`ReachMargin`] evolves the joint distribution of an adversary's *reach*
and *relative margin* for several adversarial fractions at once. After `N`
steps, [`ReachMargin::forkable_probability`] bounds the probability that
the adversary can still fork the honest chain.

```
use reach_margin::prelude::*;

let mut chain = ReachMargin::new(50, 10, [0.1, 0.3]).unwrap();
chain.evolve_to(50).unwrap();

let forkable = chain.forkable_probability();
assert!(forkable[0] < forkable[1]);
```
*/

pub mod chain;
pub mod grid;
pub mod prelude;
pub mod results;
pub mod sampling;
pub mod scenario;

pub use chain::{
    BuildError, EvolveError, ReachMargin, ReachMarginBuilder,
    MAX_REACH_SUPPORT,
};
pub use results::{ForkabilityTable, Format, Scale, TableBuilder};
pub use scenario::Fraction;
