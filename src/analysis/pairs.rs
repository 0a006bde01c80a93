use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::MatchMode;
use crate::data::{FacilityRecord, FuelType};

/// Options controlling which records feed the pair matrix and how their
/// capacity is counted.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOptions {
    pub mode: MatchMode,
    /// Divide each facility's capacity by its number of fuel types.
    pub shared: bool,
    /// Ignore facilities listing more fuel types than this.
    pub max_fuel_types: Option<usize>,
    /// Fill the diagonal with single-fuel facilities.
    pub include_self_pairs: bool,
}

impl Default for PairOptions {
    fn default() -> Self {
        Self {
            mode: MatchMode::Exclusive,
            shared: false,
            max_fuel_types: Some(2),
            include_self_pairs: true,
        }
    }
}

/// Mean capacity of one fuel pair, or an explicit marker that no facility
/// matched. `NoData` is never the same as a mean of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairStat {
    NoData,
    Mean { mean_kw: f64, count: usize },
}

impl PairStat {
    pub fn mean_kw(&self) -> Option<f64> {
        match self {
            Self::NoData => None,
            Self::Mean { mean_kw, .. } => Some(*mean_kw),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::NoData => 0,
            Self::Mean { count, .. } => *count,
        }
    }
}

impl fmt::Display for PairStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("NA"),
            Self::Mean { mean_kw, .. } => write!(f, "{mean_kw:.4}"),
        }
    }
}

/// Symmetric matrix of [`PairStat`] indexed by fuel label.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelPairMatrix {
    labels: Vec<FuelType>,
    cells: Vec<PairStat>,
}

impl FuelPairMatrix {
    pub fn labels(&self) -> &[FuelType] {
        &self.labels
    }

    fn index(&self, label: &FuelType) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Statistic for the unordered pair `(a, b)`; `None` for unknown labels.
    pub fn get(&self, a: &FuelType, b: &FuelType) -> Option<&PairStat> {
        let i = self.index(a)?;
        let j = self.index(b)?;
        self.cells.get(i * self.labels.len() + j)
    }

    /// Every unordered pair once, as `(a, b, stat)` with `a <= b` in label
    /// order.
    pub fn pairs(&self) -> impl Iterator<Item = (&FuelType, &FuelType, &PairStat)> {
        let n = self.labels.len();
        (0..n).flat_map(move |i| {
            (i..n).map(move |j| (&self.labels[i], &self.labels[j], &self.cells[i * n + j]))
        })
    }
}

/// Distinct fuel types among the records a pair matrix would consider,
/// sorted.
pub fn fuel_labels<'a>(
    records: impl IntoIterator<Item = &'a FacilityRecord>,
    max_fuel_types: Option<usize>,
) -> Vec<FuelType> {
    let labels: BTreeSet<&FuelType> = records
        .into_iter()
        .filter(|r| max_fuel_types.is_none_or(|max| r.fuel_types.len() <= max))
        .flat_map(|r| r.fuel_types.iter())
        .collect();
    labels.into_iter().cloned().collect()
}

/// Mean nameplate capacity for every unordered pair of `labels`.
///
/// In exclusive mode a facility counts towards the pair equal to its fuel
/// set (the diagonal holds single-fuel facilities). In inclusive mode it
/// counts towards every pair drawn from its fuel set, so exclusive counts
/// never exceed inclusive counts. Pairs nobody matches are
/// [`PairStat::NoData`].
pub fn aggregate_pairs<'a>(
    records: impl IntoIterator<Item = &'a FacilityRecord>,
    labels: &[FuelType],
    options: &PairOptions,
) -> FuelPairMatrix {
    let n = labels.len();
    let index: BTreeMap<&FuelType, usize> =
        labels.iter().enumerate().map(|(i, l)| (l, i)).collect();
    let mut sums = vec![(0.0_f64, 0_usize); n * n];

    for record in records {
        if options.max_fuel_types.is_some_and(|max| record.fuel_types.len() > max) {
            continue;
        }
        let capacity = if options.shared {
            record.nameplate_capacity_kw / record.fuel_types.len() as f64
        } else {
            record.nameplate_capacity_kw
        };
        let fuels: BTreeSet<&FuelType> = record.fuel_types.iter().collect();

        let cells: Vec<(usize, usize)> = match options.mode {
            MatchMode::Exclusive => match fuels.iter().collect::<Vec<_>>().as_slice() {
                [a] => pair_cell(&index, a, a).into_iter().collect(),
                [a, b] => pair_cell(&index, a, b).into_iter().collect(),
                _ => Vec::new(),
            },
            MatchMode::Inclusive => fuels
                .iter()
                .enumerate()
                .flat_map(|(i, a)| fuels.iter().skip(i).map(move |b| (*a, *b)))
                .filter_map(|(a, b)| pair_cell(&index, a, b))
                .collect(),
        };

        for (i, j) in cells {
            if i == j && !options.include_self_pairs {
                continue;
            }
            let cell = &mut sums[i * n + j];
            cell.0 += capacity;
            cell.1 += 1;
        }
    }

    let mut cells = vec![PairStat::NoData; n * n];
    for i in 0..n {
        for j in i..n {
            let (sum, count) = sums[i * n + j];
            let stat = if count == 0 {
                PairStat::NoData
            } else {
                PairStat::Mean {
                    mean_kw: sum / count as f64,
                    count,
                }
            };
            cells[i * n + j] = stat;
            cells[j * n + i] = stat;
        }
    }

    FuelPairMatrix {
        labels: labels.to_vec(),
        cells,
    }
}

/// Upper-triangle cell for an unordered pair, `None` if either label is not
/// tracked.
fn pair_cell(
    index: &BTreeMap<&FuelType, usize>,
    a: &FuelType,
    b: &FuelType,
) -> Option<(usize, usize)> {
    let i = *index.get(a)?;
    let j = *index.get(b)?;
    Some((i.min(j), i.max(j)))
}
