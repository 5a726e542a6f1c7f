/*!
Tables of forkable probabilities over a sweep of time horizons

# Working with [`TableBuilder`]

## Examples

Creating a [`ForkabilityTable`] for two adversarial fractions:

```
use reach_margin::prelude::*;

let table = TableBuilder::new([0.1, 0.2])
    .horizons([5, 10, 15]) // Record Pr[forkable] at these times
    .reach_support(4)      // Seed with initial reach up to 4
    .scale(Scale::Log10)   // Report log10 of each probability
    .format(Format::CSV)   // Output results as CSV
    .build()
    .unwrap();

assert_eq!(table.rows().len(), 3);
println!("{}", table);
```
*/

use std::{collections::BTreeSet, fmt::Display, time::Instant};

use tracing::debug;

use crate::{
    chain::{BuildError, EvolveError, ReachMargin},
    scenario::Fraction,
};

/// Floating point precision of table values.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ForkabilityTable`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    fractions: Vec<Fraction>,
    horizons: BTreeSet<usize>,
    reach_support: usize,
    scale: Scale,
    format: Format,
}

/// Describes the appearance of a [`ForkabilityTable`] as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Tab-separated, without extra whitespace.
    TSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

/// Scale on which probabilities are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scale {
    #[default]
    Linear,
    /// Base-10 logarithm of each probability.
    Log10,
}

impl Scale {
    #[inline]
    fn apply(self, probability: f64) -> f64 {
        match self {
            Scale::Linear => probability,
            Scale::Log10 => probability.log10(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("no time horizons were given")]
    NoHorizons,
    #[error(transparent)]
    BuildError(#[from] BuildError),
    #[error(transparent)]
    EvolveError(#[from] EvolveError),
}

impl TableBuilder {
    /// Create a new [`TableBuilder`] which evaluates the given adversarial
    /// fractions side by side.
    pub fn new<I>(fractions: I) -> Self
    where
        I: IntoIterator<Item = Fraction>,
    {
        Self {
            fractions: fractions.into_iter().collect(),
            horizons: BTreeSet::new(),
            reach_support: 0,
            scale: Scale::default(),
            format: Format::default(),
        }
    }

    /// Record a row at each of the given time horizons. The chain is evolved
    /// up to the largest one.
    pub fn horizons<I>(mut self, horizons: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.horizons.extend(horizons);

        self
    }

    /// Support of the initial reach distribution (clamped by
    /// [`ReachMargin`]).
    pub fn reach_support(mut self, reach_support: usize) -> Self {
        self.reach_support = reach_support;

        self
    }

    /// Specify the [`Scale`] of the reported probabilities.
    pub fn scale(mut self, scale: Scale) -> Self {
        self.scale = scale;

        self
    }

    /// Specify the [`Format`] of the table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Evolve a single chain through every requested horizon and create the
    /// [`ForkabilityTable`].
    pub fn build(self) -> Result<ForkabilityTable, TableError> {
        let TableBuilder { fractions, horizons, reach_support, scale, format } =
            self;

        let horizon = *horizons.last().ok_or(TableError::NoHorizons)?;
        let mut chain = ReachMargin::new(horizon, reach_support, fractions)?;

        let mut rows = Vec::with_capacity(horizons.len());
        for time in horizons {
            let start = Instant::now();
            chain.evolve_to(time)?;
            debug!(time, elapsed = ?start.elapsed(), "evolved to checkpoint");

            let values = chain
                .forkable_probability()
                .into_iter()
                .map(|p| scale.apply(p))
                .collect();
            rows.push(Row { horizon: time, values });
        }

        Ok(ForkabilityTable {
            fractions: chain.scenarios().fractions().to_vec(),
            reach_support: chain.reach_support(),
            memory_bytes: chain.memory_bytes(),
            format,
            scale,
            rows,
        })
    }
}

/// Forkable probabilities of every scenario at one time horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub horizon: usize,
    /// One value per adversarial fraction, on the table's [`Scale`].
    pub values: Vec<f64>,
}

/// Forkable probabilities over a sweep of time horizons. The table is given
/// by the struct's [`Display`] implementation, as specified by its
/// [`Format`].
#[derive(Debug, Clone)]
pub struct ForkabilityTable {
    fractions: Vec<Fraction>,
    reach_support: usize,
    memory_bytes: usize,
    format: Format,
    scale: Scale,
    rows: Vec<Row>,
}

impl ForkabilityTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn fractions(&self) -> &[Fraction] {
        &self.fractions
    }

    /// Reach support actually used, after clamping.
    pub fn reach_support(&self) -> usize {
        self.reach_support
    }

    /// Bytes used by the chain which produced this table.
    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    /// Rows in ascending order of horizon.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    fn titles(&self) -> Vec<String> {
        std::iter::once("N".to_string())
            .chain(self.fractions.iter().map(|f| format!("{:.3}", f)))
            .collect()
    }

    fn cells(&self, row: &Row) -> Vec<String> {
        let values = row.values.iter().map(|v| match self.scale {
            Scale::Linear => format!("{:.1$e}", v, FLOAT_PRECISION_DIGITS),
            Scale::Log10 => format!("{:.1$}", v, FLOAT_PRECISION_DIGITS),
        });

        std::iter::once(row.horizon.to_string()).chain(values).collect()
    }
}

impl Display for ForkabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let titles = self.titles();
        let rows: Vec<_> =
            self.rows.iter().map(|row| self.cells(row)).collect();

        match self.format {
            Format::CSV | Format::TSV => {
                let separator = match self.format {
                    Format::CSV => ",",
                    _ => "\t",
                };

                write!(f, "{}", titles.join(separator))?;
                for row in rows.iter() {
                    writeln!(f)?;
                    write!(f, "{}", row.join(separator))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val,
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn rows_follow_horizons() {
        let table =
            TableBuilder::new([0.1]).horizons([2, 1, 2]).build().unwrap();

        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].horizon, 1);
        assert_eq!(rows[1].horizon, 2);
        assert_relative_eq!(rows[0].values[0], 0.1, epsilon = 1e-15);
        assert_relative_eq!(rows[1].values[0], 0.19, epsilon = 1e-15);
    }

    #[test]
    fn log10_scale() {
        let table = TableBuilder::new([0.1, 0.2])
            .horizons([1])
            .scale(Scale::Log10)
            .build()
            .unwrap();

        assert_relative_eq!(table.rows()[0].values[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(
            table.rows()[0].values[1],
            0.2f64.log10(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn missing_horizons() {
        assert!(matches!(
            TableBuilder::new([0.1]).build(),
            Err(TableError::NoHorizons)
        ));
        assert!(matches!(
            TableBuilder::new(Vec::new()).horizons([1]).build(),
            Err(TableError::BuildError(_))
        ));
    }

    #[test]
    fn csv_and_tsv_output() {
        let mut table = TableBuilder::new([0.1, 0.2])
            .horizons([1, 2])
            .reach_support(3)
            .format(Format::CSV)
            .build()
            .unwrap();

        let text = table.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "N,0.100,0.200");
        assert!(lines[1].starts_with("1,"));
        assert_eq!(lines[2].split(',').count(), 3);

        table.set_format(Format::TSV);
        assert!(table.to_string().starts_with("N\t0.100\t0.200\n1\t"));
    }

    #[test]
    fn pretty_print_output() {
        let table = TableBuilder::new([0.25])
            .horizons([3])
            .format(Format::PrettyPrint)
            .build()
            .unwrap();

        let text = table.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("N") && lines[0].contains("0.250"));
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(lines[0].len(), lines[1].len());
    }
}
