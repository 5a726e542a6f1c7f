//! Dense storage for the reach/margin state space.
//!
//! A generation holds one probability vector per valid `(reach, margin)`
//! pair. At time `t` a coordinate is valid iff `0 <= reach <= R + t` and
//! `-t <= margin <= reach`, so the valid region is a triangle which gains
//! one row of reach and one band of margin per step. Buffers are sized once
//! for the final time `N` and laid out margin-major:
//!
//! ```text
//! offset = ((margin + N) * reach_axis + reach) * width + scenario
//! ```

/// Default upper bound on the number of `f64` values in one generation
/// buffer (1 GiB).
pub const DEFAULT_MAX_VALUES: usize = 1 << 27;

/// A `(time, reach, margin)` triple. Components are signed so that
/// neighbours of boundary cells can be expressed before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub time: i64,
    pub reach: i64,
    pub margin: i64,
}

impl Coord {
    #[inline]
    pub fn new(time: i64, reach: i64, margin: i64) -> Self {
        Coord { time, reach, margin }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("generation size overflows usize")]
    Overflow,
    #[error("generation needs {required} values but the limit is {limit}")]
    Exceeded { required: usize, limit: usize },
}

/// Maps coordinates to offsets within a generation buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    horizon: usize,
    reach_support: usize,
    width: usize,
    len: usize,
}

impl GridShape {
    /// Creates the shape for a chain evolved up to time `horizon`, with
    /// initial reach in `0..=reach_support` and `width` scenarios. Fails if
    /// one buffer would hold more than `max_values` values.
    pub fn new(
        horizon: usize,
        reach_support: usize,
        width: usize,
        max_values: usize,
    ) -> Result<Self, CapacityError> {
        let reach_axis = reach_support
            .checked_add(horizon)
            .and_then(|x| x.checked_add(1))
            .ok_or(CapacityError::Overflow)?;
        let margin_axis = horizon
            .checked_add(reach_axis)
            .ok_or(CapacityError::Overflow)?;
        let len = reach_axis
            .checked_mul(margin_axis)
            .and_then(|x| x.checked_mul(width))
            .ok_or(CapacityError::Overflow)?;

        // Margins and reaches are handled as i64 coordinates.
        if i64::try_from(margin_axis).is_err() {
            return Err(CapacityError::Overflow);
        }

        if len > max_values {
            return Err(CapacityError::Exceeded {
                required: len,
                limit: max_values,
            });
        }

        Ok(GridShape { horizon, reach_support, width, len })
    }

    #[inline]
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    #[inline]
    pub fn reach_support(&self) -> usize {
        self.reach_support
    }

    /// Number of scenarios stored per cell.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of reach values, `0..=R + N`.
    #[inline]
    pub fn reach_axis(&self) -> usize {
        self.reach_support + self.horizon + 1
    }

    /// Number of margin values, `-N..=R + N`.
    #[inline]
    pub fn margin_axis(&self) -> usize {
        self.reach_support + 2 * self.horizon + 1
    }

    /// Length of a single margin row: every reach value times the width.
    #[inline]
    pub fn row_len(&self) -> usize {
        self.reach_axis() * self.width
    }

    /// Total number of values in one generation buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Margin stored in the row with index `row`.
    #[inline]
    pub fn margin_of_row(&self, row: usize) -> i64 {
        row as i64 - self.horizon as i64
    }

    /// Returns true iff `coord` lies inside the valid triangle for its time.
    pub fn is_valid(&self, coord: Coord) -> bool {
        let Coord { time, reach, margin } = coord;

        let good_time = (0..=self.horizon as i64).contains(&time);
        let max_reach = self.reach_support as i64 + time;
        let good_reach = (0..=max_reach).contains(&reach);
        let good_margin = (-time..=reach).contains(&margin);

        good_time && good_reach && good_margin
    }

    /// Offset of the first value of the cell at `coord`, or `None` if the
    /// coordinate is not valid.
    #[inline]
    pub fn offset(&self, coord: Coord) -> Option<usize> {
        if !self.is_valid(coord) {
            return None;
        }

        let row = (coord.margin + self.horizon as i64) as usize;
        Some((row * self.reach_axis() + coord.reach as usize) * self.width)
    }
}

/// A read-only view of one generation. Lookups outside the valid region
/// return the zero vector.
#[derive(Debug, Clone, Copy)]
pub struct Cells<'a> {
    shape: &'a GridShape,
    time: i64,
    values: &'a [f64],
    zero: &'a [f64],
}

impl<'a> Cells<'a> {
    #[inline]
    pub fn time(&self) -> i64 {
        self.time
    }

    /// The probability vector at `(reach, margin)` for this view's time.
    #[inline]
    pub fn get(&self, reach: i64, margin: i64) -> &'a [f64] {
        match self.shape.offset(Coord::new(self.time, reach, margin)) {
            Some(at) => &self.values[at..at + self.shape.width],
            None => self.zero,
        }
    }
}

/// Two generation buffers under a single owner. One of them is current and
/// the other holds the previous generation; [`GenerationStore::swap`] only
/// relabels them.
#[derive(Debug, Clone)]
pub struct GenerationStore {
    shape: GridShape,
    buffers: [Vec<f64>; 2],
    current: usize,
    /// Returned for every out-of-range lookup. Never borrowed mutably.
    zero: Box<[f64]>,
}

impl GenerationStore {
    /// Allocates both buffers, zeroed.
    pub fn new(shape: GridShape) -> Self {
        GenerationStore {
            shape,
            buffers: [vec![0.0; shape.len()], vec![0.0; shape.len()]],
            current: 0,
            zero: vec![0.0; shape.width()].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn shape(&self) -> &GridShape {
        &self.shape
    }

    /// Makes the previous generation current, and vice versa.
    #[inline]
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// View of the current generation, interpreted at time `time`.
    #[inline]
    pub fn current(&self, time: i64) -> Cells<'_> {
        Cells {
            shape: &self.shape,
            time,
            values: &self.buffers[self.current],
            zero: &self.zero,
        }
    }

    /// Mutable access to the cell at `coord` in the current generation.
    ///
    /// ## Panics
    /// Panics if `coord` is not valid.
    pub fn current_cell_mut(&mut self, coord: Coord) -> &mut [f64] {
        let at = self
            .shape
            .offset(coord)
            .unwrap_or_else(|| panic!("{:?} is outside the grid", coord));
        let width = self.shape.width;

        &mut self.buffers[self.current][at..at + width]
    }

    /// Splits the store into the current buffer, to be written, and a view
    /// of the previous generation at time `time - 1`.
    pub fn split(&mut self, time: i64) -> (&mut [f64], Cells<'_>) {
        let GenerationStore { shape, buffers, current, zero } = self;
        let [first, second] = buffers;
        let (current, previous) = match current {
            0 => (first, &*second),
            _ => (second, &*first),
        };

        let previous = Cells {
            shape: &*shape,
            time: time - 1,
            values: previous,
            zero: &**zero,
        };
        (current.as_mut_slice(), previous)
    }

    /// Bytes held by both generation buffers.
    pub fn memory_bytes(&self) -> usize {
        2 * self.shape.len() * std::mem::size_of::<f64>()
    }
}
