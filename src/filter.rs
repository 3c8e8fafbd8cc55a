//! Narrows a list of movements down to a filter selection.
//!
//! Two date filtering schemes are supported: a continuous inclusive range and
//! discrete sets of months and years. An empty set in any selection means
//! "no restriction", so a fresh selection matches everything.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    aggregation::GroupBy, comparison::ComparisonMode, movement::Movement, period::DateRange,
};

/// How the movements are restricted by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DateFilter {
    /// Movements between `start` and `end`, both inclusive. A missing bound is
    /// open.
    Range {
        /// The earliest date to include.
        #[serde(default)]
        start: Option<Date>,
        /// The latest date to include.
        #[serde(default)]
        end: Option<Date>,
    },
    /// Movements in any of the selected months of any of the selected years.
    Periods {
        /// Month numbers, 1 to 12.
        #[serde(default)]
        months: BTreeSet<u8>,
        /// Calendar years.
        #[serde(default)]
        years: BTreeSet<i32>,
    },
}

impl DateFilter {
    /// Whether `date` passes this filter.
    pub fn matches(&self, date: Date) -> bool {
        match self {
            DateFilter::Range { start, end } => {
                start.is_none_or(|start| date >= start) && end.is_none_or(|end| date <= end)
            }
            DateFilter::Periods { months, years } => {
                (months.is_empty() || months.contains(&u8::from(date.month())))
                    && (years.is_empty() || years.contains(&date.year()))
            }
        }
    }

    /// The closed range to push down to the store, if this is a range filter
    /// with both bounds set.
    pub fn closed_range(&self) -> Option<DateRange> {
        match self {
            DateFilter::Range {
                start: Some(start),
                end: Some(end),
            } => Some(DateRange {
                start: *start,
                end: *end,
            }),
            _ => None,
        }
    }

    /// The bounds to push down to the store. Either end may be open.
    pub fn bounds(&self) -> (Option<Date>, Option<Date>) {
        match self {
            DateFilter::Range { start, end } => (*start, *end),
            DateFilter::Periods { .. } => (None, None),
        }
    }
}

/// Everything the user has chosen to narrow and shape the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    /// The categories to include. Empty means all categories.
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// The date restriction.
    pub dates: DateFilter,
    /// The bucket size for series.
    #[serde(default)]
    pub group_by: GroupBy,
    /// The prior period to compare against.
    #[serde(default)]
    pub comparison: ComparisonMode,
}

impl FilterSelection {
    /// The selection used when nothing has been chosen yet: the current year up
    /// to `today`, grouped by month, with no comparison.
    pub fn default_for(today: Date) -> Self {
        let year = crate::period::year_to_date(today);

        Self {
            categories: BTreeSet::new(),
            dates: DateFilter::Range {
                start: Some(year.start),
                end: Some(year.end),
            },
            group_by: GroupBy::default(),
            comparison: ComparisonMode::default(),
        }
    }

    /// Whether `movement` passes the category and date filters.
    pub fn matches(&self, movement: &Movement) -> bool {
        let category_match =
            self.categories.is_empty() || self.categories.contains(&movement.category);

        category_match && self.dates.matches(movement.date)
    }

    /// Check that the selection is coherent.
    ///
    /// # Errors
    /// Returns [crate::Error::InvalidFilter] for an inverted date range or a
    /// month number outside 1 to 12.
    pub fn validate(&self) -> Result<(), crate::Error> {
        match &self.dates {
            DateFilter::Range {
                start: Some(start),
                end: Some(end),
            } => DateRange::new(*start, *end).map(|_| ()),
            DateFilter::Periods { months, .. } => match months.iter().find(|m| !(1..=12).contains(*m)) {
                Some(month) => Err(crate::Error::InvalidFilter(format!(
                    "{month} is not a month number between 1 and 12"
                ))),
                None => Ok(()),
            },
            DateFilter::Range { .. } => Ok(()),
        }
    }
}

/// The order of the detail listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

/// Keep the movements that match `selection`, in their original order.
pub fn apply_filters(movements: &[Movement], selection: &FilterSelection) -> Vec<Movement> {
    movements
        .iter()
        .filter(|movement| selection.matches(movement))
        .cloned()
        .collect()
}

/// Whether any text field of `movement`, or its amount, contains `term`
/// ignoring case. A blank term matches everything.
pub fn matches_search(movement: &Movement, term: &str) -> bool {
    let term = term.trim().to_lowercase();

    if term.is_empty() {
        return true;
    }

    let contains = |field: &str| field.to_lowercase().contains(&term);

    contains(&movement.category)
        || movement.bank.as_deref().is_some_and(contains)
        || movement.payer.as_deref().is_some_and(contains)
        || movement.description.as_deref().is_some_and(contains)
        || movement.amount.normalize().to_string().contains(&term)
}

/// Sort `movements` by date, keeping the relative order of same-day entries.
pub fn sort_by_date(movements: &mut [Movement], order: SortOrder) {
    match order {
        SortOrder::Asc => movements.sort_by_key(|movement| movement.date),
        SortOrder::Desc => movements.sort_by(|a, b| b.date.cmp(&a.date)),
    }
}
