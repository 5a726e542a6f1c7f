/*!
Re-export of common values and datatypes

Must be imported manually.

```
use reach_margin::prelude::*;
```
*/

use crate::{chain, grid, results, sampling, scenario};

pub use chain::{
    BuildError, EvolveError, ReachMargin, ReachMarginBuilder,
    MAX_REACH_SUPPORT,
};

pub use grid::{CapacityError, Coord, GridShape, DEFAULT_MAX_VALUES};

pub use results::{
    ForkabilityTable, Format, Row, Scale, TableBuilder, TableError,
};

pub use sampling::{advance, estimate_forkable, Move, State};

pub use scenario::{
    fraction_range, stationary_rho, stationary_rho_tail, Fraction,
    ScenarioError, ScenarioSet,
};
