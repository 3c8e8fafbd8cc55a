//! The API endpoints URIs.

/// The root route which redirects to the dashboard.
pub const ROOT: &str = "/";
/// The overview: KPIs, the bucketed series and an optional comparison.
pub const DASHBOARD: &str = "/api/dashboard";
/// Totals over time with their moving average, overall and per category.
pub const TRENDS: &str = "/api/trends";
/// Monthly totals of every year side by side.
pub const YEARLY_COMPARISON: &str = "/api/comparisons/yearly";
/// The detail listing of the filtered movements.
pub const MOVEMENTS: &str = "/api/movements";
/// Every category label, for the category picker.
pub const CATEGORIES: &str = "/api/categories";
/// The stored filter selection.
pub const FILTERS: &str = "/api/filters";
/// The state left by the latest fetch from the store.
pub const STATUS: &str = "/api/status";
