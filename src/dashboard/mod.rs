//! Dashboard module
//!
//! Serves the overview, trends, year-over-year and detail views as JSON.
//! Every view is built from the stored filter selection, optionally
//! overridden by query parameters.

mod handlers;
mod views;

pub use handlers::{
    DashboardState, get_categories, get_dashboard, get_filters, get_load_status, get_movements,
    get_trends, get_year_comparison, put_filters,
};
pub use views::{
    DashboardView, DataStatus, MovementsView, TrendsView, YearComparisonView, dashboard_view,
    movements_view, trends_view, year_comparison_view,
};
