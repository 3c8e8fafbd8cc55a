//! Inclusive date ranges and the calendar arithmetic behind bucketing and
//! period comparisons.

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::Error;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// The first day in the range.
    pub start: Date,
    /// The last day in the range.
    pub end: Date,
}

impl DateRange {
    /// Create a new range.
    ///
    /// # Errors
    /// Returns [Error::InvalidFilter] if `start` is after `end`.
    pub fn new(start: Date, end: Date) -> Result<Self, Error> {
        if start > end {
            return Err(Error::InvalidFilter(format!(
                "the start date {start} is after the end date {end}"
            )));
        }

        Ok(Self { start, end })
    }

    /// The number of days in the range, counting both ends.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).whole_days() + 1
    }

    /// Whether `date` falls inside the range.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// The range of equal length that ends the day before this one starts.
    ///
    /// Returns `None` if that range would start before [Date::MIN].
    pub fn preceding(&self) -> Option<Self> {
        let end = self.start.checked_sub(Duration::days(1))?;
        let start = end.checked_sub(Duration::days(self.len_days() - 1))?;

        Some(Self { start, end })
    }

    /// The same days of the year, one calendar year earlier.
    ///
    /// February 29 becomes February 28. Returns `None` if the earlier year is
    /// out of range.
    pub fn one_year_earlier(&self) -> Option<Self> {
        Some(Self {
            start: same_day_previous_year(self.start)?,
            end: same_day_previous_year(self.end)?,
        })
    }
}

/// January 1 of the year `today` falls in, up to `today`.
pub fn year_to_date(today: Date) -> DateRange {
    DateRange {
        start: Date::from_calendar_date(today.year(), Month::January, 1)
            .unwrap_or(Date::MIN),
        end: today,
    }
}

/// The quarter (1 to 4) that `month` belongs to.
pub fn quarter_of(month: Month) -> u8 {
    (u8::from(month) - 1) / 3 + 1
}

fn same_day_previous_year(date: Date) -> Option<Date> {
    let year = date.year() - 1;
    let day = date.day().min(time::util::days_in_year_month(year, date.month()));

    Date::from_calendar_date(year, date.month(), day).ok()
}

#[cfg(test)]
mod tests {
    use time::{Date, Duration, Month, macros::date};

    use super::{DateRange, quarter_of, year_to_date};

    #[test]
    fn rejects_inverted_ranges() {
        assert!(DateRange::new(date!(2024 - 02 - 01), date!(2024 - 01 - 01)).is_err());
        assert!(DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 01)).is_ok());
    }

    #[test]
    fn counts_both_ends() {
        let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).unwrap();

        assert_eq!(range.len_days(), 31);
        assert!(range.contains(date!(2024 - 01 - 01)));
        assert!(range.contains(date!(2024 - 01 - 31)));
        assert!(!range.contains(date!(2024 - 02 - 01)));
    }

    #[test]
    fn preceding_range_has_equal_length_and_ends_the_day_before() {
        let range = DateRange::new(date!(2024 - 03 - 01), date!(2024 - 03 - 31)).unwrap();

        let preceding = range.preceding().unwrap();

        assert_eq!(preceding.end, date!(2024 - 02 - 29));
        assert_eq!(preceding.start, date!(2024 - 01 - 30));
        assert_eq!(preceding.len_days(), range.len_days());
    }

    #[test]
    fn one_year_earlier_clamps_leap_day() {
        let range = DateRange::new(date!(2024 - 02 - 01), date!(2024 - 02 - 29)).unwrap();

        let earlier = range.one_year_earlier().unwrap();

        assert_eq!(earlier.start, date!(2023 - 02 - 01));
        assert_eq!(earlier.end, date!(2023 - 02 - 28));
    }

    #[test]
    fn no_earlier_range_before_the_first_representable_date() {
        let range = DateRange::new(Date::MIN, Date::MIN + Duration::days(4)).unwrap();

        assert_eq!(range.preceding(), None);
        assert_eq!(range.one_year_earlier(), None);
    }

    #[test]
    fn year_to_date_starts_in_january() {
        let range = year_to_date(date!(2026 - 10 - 16));

        assert_eq!(range.start, date!(2026 - 01 - 01));
        assert_eq!(range.end, date!(2026 - 10 - 16));
    }

    #[test]
    fn computes_quarters() {
        assert_eq!(quarter_of(Month::January), 1);
        assert_eq!(quarter_of(Month::March), 1);
        assert_eq!(quarter_of(Month::April), 2);
        assert_eq!(quarter_of(Month::September), 3);
        assert_eq!(quarter_of(Month::December), 4);
    }
}
