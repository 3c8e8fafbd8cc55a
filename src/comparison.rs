//! Period-over-period comparison of bucketed series.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{aggregation::Bucket, period::DateRange};

/// Which earlier period the current one is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// No comparison.
    #[default]
    None,
    /// The range of equal length that ends the day before the current one.
    PreviousPeriod,
    /// The same days, one calendar year earlier.
    SamePeriodLastYear,
}

impl ComparisonMode {
    /// The range to compare `current` against, if any.
    ///
    /// There is none when the earlier range falls outside the calendar.
    pub fn prior_range(self, current: DateRange) -> Option<DateRange> {
        match self {
            ComparisonMode::None => None,
            ComparisonMode::PreviousPeriod => current.preceding(),
            ComparisonMode::SamePeriodLastYear => current.one_year_earlier(),
        }
    }
}

/// One aligned pair of bucket sums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    /// The label of the current bucket, or of the prior bucket when the
    /// current series is shorter.
    pub label: String,
    /// The current period's sum.
    pub current: Decimal,
    /// The prior period's sum.
    pub prior: Decimal,
    /// `current - prior`.
    pub delta: Decimal,
    /// `delta / |prior| * 100`, or `None` when `prior` is zero.
    pub percent_change: Option<Decimal>,
}

/// The change from `prior` to `current` in percent of `|prior|`.
///
/// Returns `None` when `prior` is zero.
pub fn percent_change(current: Decimal, prior: Decimal) -> Option<Decimal> {
    if prior.is_zero() {
        return None;
    }

    (current - prior)
        .checked_div(prior.abs())
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

/// Pair the buckets of `current` and `prior` by position.
///
/// The n-th bucket of one series is compared with the n-th of the other, since
/// the two periods usually cover different calendar buckets. A series that
/// runs out counts as zero for the remaining positions.
pub fn compare(current: &[Bucket], prior: &[Bucket]) -> Vec<ComparisonRow> {
    let len = current.len().max(prior.len());

    (0..len)
        .map(|index| {
            let current_bucket = current.get(index);
            let prior_bucket = prior.get(index);

            let label = current_bucket
                .or(prior_bucket)
                .map(|bucket| bucket.key.to_string())
                .unwrap_or_default();
            let current = current_bucket.map_or(Decimal::ZERO, |bucket| bucket.sum);
            let prior = prior_bucket.map_or(Decimal::ZERO, |bucket| bucket.sum);

            ComparisonRow {
                label,
                current,
                prior,
                delta: current - prior,
                percent_change: percent_change(current, prior),
            }
        })
        .collect()
}
