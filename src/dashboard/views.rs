//! View models for the dashboard API.
//!
//! Every function here is pure: it takes the fetched movements and a filter
//! selection and returns a value ready to be serialized. Sums stay exact until
//! they are wrapped in [Money], which rounds them for display.

use std::collections::BTreeSet;

use serde::Serialize;
use time::{Date, Month};

use crate::{
    aggregation::{
        BucketKey, CategoryTotal, GroupBy, Kpis, MOVING_AVERAGE_WINDOW, aggregate, aggregate_over,
        category_series, monthly_totals_by_year, moving_average,
    },
    category::labels_sorted,
    comparison::{ComparisonMode, ComparisonRow, compare},
    filter::{
        DateFilter, FilterSelection, SortOrder, apply_filters, matches_search, sort_by_date,
    },
    money::Money,
    movement::{Movement, MovementKind},
    period::DateRange,
    store::MovementQuery,
};

/// Whether the views were built from store data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    /// The movements came from the store.
    Ok,
    /// The store has no credentials, so the views are empty.
    NotConfigured,
}

impl DataStatus {
    /// The status for a fetch that was or was not `configured`.
    pub fn from_configured(configured: bool) -> Self {
        if configured {
            DataStatus::Ok
        } else {
            DataStatus::NotConfigured
        }
    }
}

/// The movements to fetch so that `selection` and its comparison period can
/// both be built from one response.
pub fn fetch_query(selection: &FilterSelection) -> MovementQuery {
    let (start, end) = selection.dates.bounds();

    let start = match comparison_ranges(selection) {
        Some((_, prior)) => Some(prior.start),
        None => start,
    };

    MovementQuery { start, end }
}

/// The current and prior ranges if the selection asks for a comparison.
///
/// Comparisons need a closed date range, so a selection with an open bound or
/// a month/year filter has none.
fn comparison_ranges(selection: &FilterSelection) -> Option<(DateRange, DateRange)> {
    let current = selection.dates.closed_range()?;
    let prior = selection.comparison.prior_range(current)?;

    Some((current, prior))
}

/// Headline figures for the filtered movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KpiView {
    /// The sum of every amount.
    pub total: Money,
    /// The sum of income amounts.
    pub income: Money,
    /// The sum of expense amounts, negative or zero under the amount sign
    /// convention.
    pub expense: Money,
    /// The number of movements.
    pub count: usize,
    /// The mean amount.
    pub average: Money,
    /// The category with the largest absolute total.
    pub top_category: Option<CategoryTotalView>,
}

/// A category and its total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotalView {
    /// The category label.
    pub category: String,
    /// The sum of the category's amounts.
    pub total: Money,
}

impl From<CategoryTotal> for CategoryTotalView {
    fn from(total: CategoryTotal) -> Self {
        Self {
            category: total.category,
            total: total.total.into(),
        }
    }
}

impl From<Kpis> for KpiView {
    fn from(kpis: Kpis) -> Self {
        Self {
            total: kpis.total.into(),
            income: kpis.income.into(),
            expense: kpis.expense.into(),
            count: kpis.count,
            average: kpis.average.into(),
            top_category: kpis.top_category.map(CategoryTotalView::from),
        }
    }
}

/// One bucket of the dashboard series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketRow {
    /// The bucket label, e.g. "2024-01".
    pub key: BucketKey,
    /// The sum of the bucket.
    pub total: Money,
    /// The sum of the bucket's income.
    pub income: Money,
    /// The sum of the bucket's expenses.
    pub expense: Money,
    /// The number of movements in the bucket.
    pub count: usize,
    /// The moving average of the bucket totals ending at this bucket.
    pub moving_average: Money,
}

/// One aligned pair of current and prior bucket totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRowView {
    /// The bucket label.
    pub label: String,
    /// The current total.
    pub current: Money,
    /// The prior total.
    pub prior: Money,
    /// `current - prior`.
    pub delta: Money,
    /// The change in percent, absent when the prior total is zero.
    pub percent_change: Option<Money>,
}

impl From<ComparisonRow> for ComparisonRowView {
    fn from(row: ComparisonRow) -> Self {
        Self {
            label: row.label,
            current: row.current.into(),
            prior: row.prior.into(),
            delta: row.delta.into(),
            percent_change: row.percent_change.map(Money::from),
        }
    }
}

/// The current period compared with a prior one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonView {
    /// How the prior period was chosen.
    pub mode: ComparisonMode,
    /// The period being looked at.
    pub current_range: DateRange,
    /// The period it is compared against.
    pub prior_range: DateRange,
    /// The bucket totals of both periods, paired by position.
    pub rows: Vec<ComparisonRowView>,
}

/// Everything the overview page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    /// Whether the store is configured.
    pub status: DataStatus,
    /// The selection the view was built for.
    pub selection: FilterSelection,
    /// Headline figures.
    pub kpis: KpiView,
    /// The series of bucket totals.
    pub buckets: Vec<BucketRow>,
    /// The comparison with a prior period, if one was asked for.
    pub comparison: Option<ComparisonView>,
    /// Every category in the fetched movements, for the category picker.
    pub categories: Vec<String>,
    /// The number of malformed store rows left out.
    pub skipped: usize,
}

/// Build the overview for `selection` from `movements`.
///
/// `movements` should cover the range returned by [fetch_query], so that the
/// comparison period is included.
pub fn dashboard_view(
    movements: &[Movement],
    selection: &FilterSelection,
    skipped: usize,
    status: DataStatus,
) -> DashboardView {
    let filtered = apply_filters(movements, selection);

    let buckets = aggregate(&filtered, selection.group_by);
    let averages = moving_average(&buckets, MOVING_AVERAGE_WINDOW);
    let bucket_rows = buckets
        .iter()
        .zip(averages)
        .map(|(bucket, average)| BucketRow {
            key: bucket.key,
            total: bucket.sum.into(),
            income: bucket.income.into(),
            expense: bucket.expense.into(),
            count: bucket.count,
            moving_average: average.into(),
        })
        .collect();

    let comparison = comparison_ranges(selection).map(|(current_range, prior_range)| {
        let prior_selection = FilterSelection {
            dates: DateFilter::Range {
                start: Some(prior_range.start),
                end: Some(prior_range.end),
            },
            ..selection.clone()
        };
        let prior = apply_filters(movements, &prior_selection);

        let rows = compare(
            &aggregate_over(&filtered, selection.group_by, current_range),
            &aggregate_over(&prior, selection.group_by, prior_range),
        );

        ComparisonView {
            mode: selection.comparison,
            current_range,
            prior_range,
            rows: rows.into_iter().map(ComparisonRowView::from).collect(),
        }
    });

    DashboardView {
        status,
        selection: selection.clone(),
        kpis: Kpis::from_movements(&filtered).into(),
        buckets: bucket_rows,
        comparison,
        categories: labels_sorted(
            movements
                .iter()
                .filter(|movement| selection.dates.matches(movement.date))
                .map(|movement| movement.category.as_str()),
        ),
        skipped,
    }
}

/// A bucket total and its moving average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    /// The bucket label.
    pub key: BucketKey,
    /// The sum of the bucket.
    pub total: Money,
    /// The moving average ending at this bucket.
    pub moving_average: Money,
}

/// One category's totals per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTrend {
    /// The category label.
    pub category: String,
    /// The totals, aligned with [TrendsView::keys]. `null` where the category
    /// has no movements.
    pub values: Vec<Option<Money>>,
}

/// Totals over time, overall and per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendsView {
    /// Whether the store is configured.
    pub status: DataStatus,
    /// The bucket size.
    pub group_by: GroupBy,
    /// The number of buckets averaged.
    pub window: usize,
    /// The overall series.
    pub points: Vec<TrendPoint>,
    /// The bucket labels shared by the per-category series.
    pub keys: Vec<BucketKey>,
    /// The per-category series, sorted by category.
    pub categories: Vec<CategoryTrend>,
}

/// Build the trends for `selection` from `movements`.
pub fn trends_view(
    movements: &[Movement],
    selection: &FilterSelection,
    status: DataStatus,
) -> TrendsView {
    let filtered = apply_filters(movements, selection);

    let buckets = aggregate(&filtered, selection.group_by);
    let averages = moving_average(&buckets, MOVING_AVERAGE_WINDOW);
    let points = buckets
        .iter()
        .zip(averages)
        .map(|(bucket, average)| TrendPoint {
            key: bucket.key,
            total: bucket.sum.into(),
            moving_average: average.into(),
        })
        .collect();

    let series = category_series(&filtered, selection.group_by);
    let categories = series
        .series
        .into_iter()
        .map(|(category, values)| CategoryTrend {
            category,
            values: values
                .into_iter()
                .map(|value| value.map(Money::from))
                .collect(),
        })
        .collect();

    TrendsView {
        status,
        group_by: selection.group_by,
        window: MOVING_AVERAGE_WINDOW,
        points,
        keys: series.keys,
        categories,
    }
}

/// The monthly totals of one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearRow {
    /// The calendar year.
    pub year: i32,
    /// January to December.
    pub months: Vec<Money>,
    /// The sum of the year.
    pub total: Money,
}

/// Monthly totals side by side for every year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearComparisonView {
    /// Whether the store is configured.
    pub status: DataStatus,
    /// One row per year, oldest first.
    pub years: Vec<YearRow>,
}

/// The selection used for the year-over-year view.
///
/// A date range would cut the years short, so only the category filter and
/// any selected years are kept.
pub fn year_comparison_selection(selection: &FilterSelection) -> FilterSelection {
    let dates = match &selection.dates {
        DateFilter::Periods { years, .. } => DateFilter::Periods {
            months: BTreeSet::new(),
            years: years.clone(),
        },
        DateFilter::Range { .. } => DateFilter::Range {
            start: None,
            end: None,
        },
    };

    FilterSelection {
        dates,
        ..selection.clone()
    }
}

/// The movements to fetch for the year-over-year view of `selection`.
pub fn year_comparison_query(selection: &FilterSelection) -> MovementQuery {
    match &selection.dates {
        DateFilter::Periods { years, .. } => MovementQuery {
            start: years
                .first()
                .and_then(|year| Date::from_calendar_date(*year, Month::January, 1).ok()),
            end: years
                .last()
                .and_then(|year| Date::from_calendar_date(*year, Month::December, 31).ok()),
        },
        DateFilter::Range { .. } => MovementQuery::default(),
    }
}

/// Build the year-over-year view for `selection` from `movements`.
pub fn year_comparison_view(
    movements: &[Movement],
    selection: &FilterSelection,
    status: DataStatus,
) -> YearComparisonView {
    let filtered = apply_filters(movements, &year_comparison_selection(selection));

    let years = monthly_totals_by_year(&filtered)
        .into_iter()
        .map(|totals| YearRow {
            year: totals.year,
            months: totals.months.iter().copied().map(Money::from).collect(),
            total: totals.months.iter().sum::<rust_decimal::Decimal>().into(),
        })
        .collect();

    YearComparisonView { status, years }
}

/// A movement as shown in the detail listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementRow {
    /// The day of the movement.
    pub date: Date,
    /// The category label.
    pub category: String,
    /// The signed amount.
    pub amount: Money,
    /// Income or expense.
    pub kind: MovementKind,
    /// The bank.
    pub bank: Option<String>,
    /// Who paid or was paid.
    pub payer: Option<String>,
    /// Free text notes.
    pub description: Option<String>,
    /// The number of installments.
    pub installments: u32,
}

impl From<Movement> for MovementRow {
    fn from(movement: Movement) -> Self {
        Self {
            date: movement.date,
            category: movement.category,
            amount: movement.amount.into(),
            kind: movement.kind,
            bank: movement.bank,
            payer: movement.payer,
            description: movement.description,
            installments: movement.installments,
        }
    }
}

/// The detail listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementsView {
    /// Whether the store is configured.
    pub status: DataStatus,
    /// The number of movements listed.
    pub count: usize,
    /// The movements, ordered by date.
    pub movements: Vec<MovementRow>,
}

/// Build the detail listing: the movements matching `selection` and
/// `search`, ordered by date.
pub fn movements_view(
    movements: &[Movement],
    selection: &FilterSelection,
    search: &str,
    order: SortOrder,
    status: DataStatus,
) -> MovementsView {
    let mut listed: Vec<Movement> = apply_filters(movements, selection)
        .into_iter()
        .filter(|movement| matches_search(movement, search))
        .collect();
    sort_by_date(&mut listed, order);

    MovementsView {
        status,
        count: listed.len(),
        movements: listed.into_iter().map(MovementRow::from).collect(),
    }
}
