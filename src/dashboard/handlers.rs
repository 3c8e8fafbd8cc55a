//! Dashboard HTTP handlers.
//!
//! Each view handler takes the current filter selection, applies any
//! per-request overrides from the query string, fetches the movements the
//! view needs and returns the view model as JSON.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, State},
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    aggregation::GroupBy,
    comparison::ComparisonMode,
    dashboard::views::{
        DashboardView, DataStatus, MovementsView, TrendsView, YearComparisonView,
        dashboard_view, fetch_query, movements_view, trends_view, year_comparison_query,
        year_comparison_view,
    },
    filter::{DateFilter, FilterSelection, SortOrder},
    filter_state::FilterContext,
    loader::{LoadState, MovementLoader},
    movement::parse_date,
    store::{Fetched, MovementQuery, MovementStore},
};

/// The state needed by the dashboard handlers.
#[derive(Debug)]
pub struct DashboardState<S> {
    /// Fetches the movements.
    pub loader: Arc<MovementLoader<S>>,
    /// The current filter selection.
    pub filters: FilterContext,
}

impl<S> Clone for DashboardState<S> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<S> FromRef<AppState<S>> for DashboardState<S> {
    fn from_ref(state: &AppState<S>) -> Self {
        Self {
            loader: state.loader.clone(),
            filters: state.filters.clone(),
        }
    }
}

/// Query parameters that override the stored selection for one request.
#[derive(Debug, Default, Deserialize)]
pub struct SelectionOverrides {
    /// Categories to include, may be repeated.
    #[serde(default)]
    pub rubrica: Vec<String>,
    /// The first day to include, `YYYY-MM-DD`.
    pub start: Option<String>,
    /// The last day to include, `YYYY-MM-DD`.
    pub end: Option<String>,
    /// The bucket size.
    pub group_by: Option<GroupBy>,
    /// The prior period to compare against.
    pub comparison: Option<ComparisonMode>,
}

impl SelectionOverrides {
    /// Apply the overrides on top of `selection`.
    ///
    /// Setting either date replaces the date filter with a range, leaving the
    /// other end open if it is not given.
    ///
    /// # Errors
    /// Returns [Error::InvalidDate] for a malformed date and
    /// [Error::InvalidFilter] if the resulting selection is invalid.
    pub fn apply(self, mut selection: FilterSelection) -> Result<FilterSelection, Error> {
        if !self.rubrica.is_empty() {
            selection.categories = self
                .rubrica
                .into_iter()
                .filter(|category| !category.trim().is_empty())
                .collect();
        }

        let start = parse_optional_date(self.start.as_deref())?;
        let end = parse_optional_date(self.end.as_deref())?;
        if start.is_some() || end.is_some() {
            selection.dates = DateFilter::Range { start, end };
        }

        if let Some(group_by) = self.group_by {
            selection.group_by = group_by;
        }
        if let Some(comparison) = self.comparison {
            selection.comparison = comparison;
        }

        selection.validate()?;
        Ok(selection)
    }
}

fn parse_optional_date(text: Option<&str>) -> Result<Option<time::Date>, Error> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_date(text).map(Some),
    }
}

async fn load<S: MovementStore>(
    loader: &MovementLoader<S>,
    query: MovementQuery,
) -> Result<Fetched, Error> {
    Ok(loader.refresh(query).await?.into_fetched())
}

/// Get the overview: KPIs, the bucketed series and an optional comparison.
pub async fn get_dashboard<S: MovementStore>(
    State(state): State<DashboardState<S>>,
    Query(overrides): Query<SelectionOverrides>,
) -> Result<Json<DashboardView>, Error> {
    let selection = overrides.apply(state.filters.current())?;
    let fetched = load(&state.loader, fetch_query(&selection)).await?;

    Ok(Json(dashboard_view(
        &fetched.movements,
        &selection,
        fetched.skipped,
        DataStatus::from_configured(fetched.configured),
    )))
}

/// Get the totals over time with their moving average, overall and per
/// category.
pub async fn get_trends<S: MovementStore>(
    State(state): State<DashboardState<S>>,
    Query(overrides): Query<SelectionOverrides>,
) -> Result<Json<TrendsView>, Error> {
    let selection = overrides.apply(state.filters.current())?;
    let (start, end) = selection.dates.bounds();
    let fetched = load(&state.loader, MovementQuery { start, end }).await?;

    Ok(Json(trends_view(
        &fetched.movements,
        &selection,
        DataStatus::from_configured(fetched.configured),
    )))
}

/// Get the monthly totals of every year side by side.
pub async fn get_year_comparison<S: MovementStore>(
    State(state): State<DashboardState<S>>,
    Query(overrides): Query<SelectionOverrides>,
) -> Result<Json<YearComparisonView>, Error> {
    let selection = overrides.apply(state.filters.current())?;
    let fetched = load(&state.loader, year_comparison_query(&selection)).await?;

    Ok(Json(year_comparison_view(
        &fetched.movements,
        &selection,
        DataStatus::from_configured(fetched.configured),
    )))
}

/// Query parameters for the detail listing.
///
/// The selection overrides are read from the same query string.
#[derive(Debug, Default, Deserialize)]
pub struct MovementsQuery {
    /// Free text to look for in the text fields and the amount.
    #[serde(default)]
    pub search: String,
    /// The date order.
    #[serde(default)]
    pub order: SortOrder,
}

/// Get the detail listing of the filtered movements.
pub async fn get_movements<S: MovementStore>(
    State(state): State<DashboardState<S>>,
    Query(query): Query<MovementsQuery>,
    Query(overrides): Query<SelectionOverrides>,
) -> Result<Json<MovementsView>, Error> {
    let selection = overrides.apply(state.filters.current())?;
    let (start, end) = selection.dates.bounds();
    let fetched = load(&state.loader, MovementQuery { start, end }).await?;

    Ok(Json(movements_view(
        &fetched.movements,
        &selection,
        &query.search,
        query.order,
        DataStatus::from_configured(fetched.configured),
    )))
}

/// The category labels for the category picker.
#[derive(Debug, Serialize)]
pub struct CategoriesView {
    /// The sorted, distinct labels.
    pub categories: Vec<String>,
}

/// Get every category label.
pub async fn get_categories<S: MovementStore>(
    State(state): State<DashboardState<S>>,
) -> Result<Json<CategoriesView>, Error> {
    let categories = state.loader.list_categories().await?;

    Ok(Json(CategoriesView { categories }))
}

/// Get the state left by the latest fetch.
pub async fn get_load_status<S: MovementStore>(
    State(state): State<DashboardState<S>>,
) -> Json<LoadState> {
    Json(state.loader.state())
}

/// Get the stored filter selection.
pub async fn get_filters(State(filters): State<FilterContext>) -> Json<FilterSelection> {
    Json(filters.current())
}

/// Replace the stored filter selection.
pub async fn put_filters(
    State(filters): State<FilterContext>,
    Json(selection): Json<FilterSelection>,
) -> Result<Json<FilterSelection>, Error> {
    let selection = filters.replace(selection)?;

    Ok(Json(selection))
}
