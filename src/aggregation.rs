//! Movement aggregation for charts, tables and KPIs.
//!
//! Provides functions to bucket movements by month, quarter or year, compute
//! signed income/expense breakdowns, derive summary KPIs and smooth series with
//! a moving average. All arithmetic is exact; rounding is left to the views.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use time::{Date, Month};

use crate::{
    movement::{Movement, MovementKind},
    period::{DateRange, quarter_of},
};

/// The number of buckets averaged by the trend line, including the current one.
pub const MOVING_AVERAGE_WINDOW: usize = 3;

/// The size of the time buckets movements are grouped into.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Calendar months, labelled `YYYY-MM`.
    #[default]
    Month,
    /// Calendar quarters, labelled `YYYY-Q1` to `YYYY-Q4`.
    Quarter,
    /// Calendar years, labelled `YYYY`.
    Year,
}

impl GroupBy {
    /// The bucket `date` falls in.
    pub fn bucket_key(self, date: Date) -> BucketKey {
        let period = match self {
            GroupBy::Month => u8::from(date.month()),
            GroupBy::Quarter => quarter_of(date.month()),
            GroupBy::Year => 1,
        };

        BucketKey {
            year: date.year(),
            period,
            group_by: self,
        }
    }

    fn periods_per_year(self) -> u8 {
        match self {
            GroupBy::Month => 12,
            GroupBy::Quarter => 4,
            GroupBy::Year => 1,
        }
    }
}

/// Identifies a time bucket. Keys order chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// The calendar year.
    pub year: i32,
    /// The month (1 to 12), quarter (1 to 4) or 1 for yearly buckets.
    pub period: u8,
    /// The bucket size.
    pub group_by: GroupBy,
}

impl BucketKey {
    /// The bucket immediately after this one.
    pub fn next(self) -> Self {
        if self.period >= self.group_by.periods_per_year() {
            Self {
                year: self.year + 1,
                period: 1,
                ..self
            }
        } else {
            Self {
                period: self.period + 1,
                ..self
            }
        }
    }

    /// The first day covered by the bucket.
    pub fn first_day(self) -> Date {
        let month = match self.group_by {
            GroupBy::Month => self.period,
            GroupBy::Quarter => (self.period - 1) * 3 + 1,
            GroupBy::Year => 1,
        };
        let month = Month::try_from(month).unwrap_or(Month::January);

        Date::from_calendar_date(self.year, month, 1).unwrap_or(Date::MIN)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group_by {
            GroupBy::Month => write!(f, "{:04}-{:02}", self.year, self.period),
            GroupBy::Quarter => write!(f, "{:04}-Q{}", self.year, self.period),
            GroupBy::Year => write!(f, "{:04}", self.year),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The sums for one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Which bucket these sums belong to.
    pub key: BucketKey,
    /// The signed sum of every movement in the bucket.
    pub sum: Decimal,
    /// The signed sum of the income movements.
    pub income: Decimal,
    /// The signed sum of the expense movements.
    pub expense: Decimal,
    /// The number of movements in the bucket.
    pub count: usize,
}

impl Bucket {
    fn empty(key: BucketKey) -> Self {
        Self {
            key,
            sum: Decimal::ZERO,
            income: Decimal::ZERO,
            expense: Decimal::ZERO,
            count: 0,
        }
    }

    fn add(&mut self, movement: &Movement) {
        self.sum += movement.amount;
        self.count += 1;

        match movement.kind {
            MovementKind::Income => self.income += movement.amount,
            MovementKind::Expense => self.expense += movement.amount,
        }
    }
}

/// Sums movements into buckets of size `group_by`.
///
/// # Returns
/// One bucket per key that has at least one movement, sorted by key.
pub fn aggregate(movements: &[Movement], group_by: GroupBy) -> Vec<Bucket> {
    let mut buckets: BTreeMap<BucketKey, Bucket> = BTreeMap::new();

    for movement in movements {
        let key = group_by.bucket_key(movement.date);
        buckets
            .entry(key)
            .or_insert_with(|| Bucket::empty(key))
            .add(movement);
    }

    buckets.into_values().collect()
}

/// Sums movements into every bucket that overlaps `range`, including empty ones.
///
/// Movements outside `range` are ignored. Because the output has no gaps, the
/// n-th bucket always covers the same offset from the start of the range,
/// which is what positional comparisons need.
pub fn aggregate_over(movements: &[Movement], group_by: GroupBy, range: DateRange) -> Vec<Bucket> {
    let mut buckets: BTreeMap<BucketKey, Bucket> = bucket_keys_in(group_by, range)
        .into_iter()
        .map(|key| (key, Bucket::empty(key)))
        .collect();

    for movement in movements.iter().filter(|m| range.contains(m.date)) {
        let key = group_by.bucket_key(movement.date);
        if let Some(bucket) = buckets.get_mut(&key) {
            bucket.add(movement);
        }
    }

    buckets.into_values().collect()
}

/// Every bucket key from the one containing `range.start` to the one
/// containing `range.end`.
pub fn bucket_keys_in(group_by: GroupBy, range: DateRange) -> Vec<BucketKey> {
    let last = group_by.bucket_key(range.end);
    let mut key = group_by.bucket_key(range.start);
    let mut keys = Vec::new();

    while key <= last {
        keys.push(key);
        key = key.next();
    }

    keys
}

/// A category and its signed total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotal {
    /// The category label.
    pub category: String,
    /// The signed sum of the category's movements.
    pub total: Decimal,
}

/// Sums movements per category, in the order each category first appears.
pub fn category_totals(movements: &[Movement]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    let mut index_by_category: HashMap<&str, usize> = HashMap::new();

    for movement in movements {
        match index_by_category.get(movement.category.as_str()) {
            Some(&index) => totals[index].total += movement.amount,
            None => {
                index_by_category.insert(&movement.category, totals.len());
                totals.push(CategoryTotal {
                    category: movement.category.clone(),
                    total: movement.amount,
                });
            }
        }
    }

    totals
}

/// Summary values over a whole filtered set of movements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kpis {
    /// The signed sum of all movements.
    pub total: Decimal,
    /// The signed sum of the income movements.
    pub income: Decimal,
    /// The signed sum of the expense movements.
    pub expense: Decimal,
    /// The number of movements.
    pub count: usize,
    /// `total / count`, or zero when there are no movements.
    pub average: Decimal,
    /// The category with the largest absolute total.
    ///
    /// When two categories tie, the one that appears first in the input wins.
    pub top_category: Option<CategoryTotal>,
}

impl Kpis {
    /// Compute the KPIs for `movements`.
    pub fn from_movements(movements: &[Movement]) -> Self {
        let mut total = Decimal::ZERO;
        let mut income = Decimal::ZERO;
        let mut expense = Decimal::ZERO;

        for movement in movements {
            total += movement.amount;
            match movement.kind {
                MovementKind::Income => income += movement.amount,
                MovementKind::Expense => expense += movement.amount,
            }
        }

        let count = movements.len();
        let average = if count == 0 {
            Decimal::ZERO
        } else {
            total / Decimal::from(count)
        };

        let top_category = category_totals(movements)
            .into_iter()
            .fold(None, |top: Option<CategoryTotal>, candidate| match top {
                Some(top) if top.total.abs() >= candidate.total.abs() => Some(top),
                _ => Some(candidate),
            });

        Self {
            total,
            income,
            expense,
            count,
            average,
            top_category,
        }
    }
}

/// The mean of each bucket's sum and the sums of the `window - 1` buckets
/// before it.
///
/// Positions before the first bucket reuse the first bucket's sum rather than
/// counting as zero.
pub fn moving_average(buckets: &[Bucket], window: usize) -> Vec<Decimal> {
    let window = window.max(1);
    let divisor = Decimal::from(window);

    (0..buckets.len())
        .map(|index| {
            let total: Decimal = (0..window)
                .map(|offset| buckets[index.saturating_sub(offset)].sum)
                .sum();

            total / divisor
        })
        .collect()
}

/// Per-category sums for each bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySeries {
    /// The buckets on the x-axis, sorted.
    pub keys: Vec<BucketKey>,
    /// Each category (sorted by label) with one entry per key, `None` where
    /// the category has no movements in that bucket.
    pub series: Vec<(String, Vec<Option<Decimal>>)>,
}

/// Groups movements by category and sums them per bucket.
pub fn category_series(movements: &[Movement], group_by: GroupBy) -> CategorySeries {
    let keys: Vec<BucketKey> = aggregate(movements, group_by)
        .into_iter()
        .map(|bucket| bucket.key)
        .collect();

    let mut totals: BTreeMap<&str, HashMap<BucketKey, Decimal>> = BTreeMap::new();
    for movement in movements {
        *totals
            .entry(movement.category.as_str())
            .or_default()
            .entry(group_by.bucket_key(movement.date))
            .or_insert(Decimal::ZERO) += movement.amount;
    }

    let series = totals
        .into_iter()
        .map(|(category, by_key)| {
            let values = keys.iter().map(|key| by_key.get(key).copied()).collect();
            (category.to_owned(), values)
        })
        .collect();

    CategorySeries { keys, series }
}

/// Monthly sums for one calendar year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearTotals {
    /// The calendar year.
    pub year: i32,
    /// The signed sum for January through December.
    pub months: [Decimal; 12],
}

/// Sums movements per month for each year present, so that the same month
/// can be compared side by side across years.
///
/// # Returns
/// One entry per year with movements, sorted by year.
pub fn monthly_totals_by_year(movements: &[Movement]) -> Vec<YearTotals> {
    let mut years: BTreeMap<i32, [Decimal; 12]> = BTreeMap::new();

    for movement in movements {
        let month_index = usize::from(u8::from(movement.date.month())) - 1;
        years
            .entry(movement.date.year())
            .or_insert([Decimal::ZERO; 12])[month_index] += movement.amount;
    }

    years
        .into_iter()
        .map(|(year, months)| YearTotals { year, months })
        .collect()
}
