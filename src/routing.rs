//! Application router configuration.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde_json::json;

use crate::{
    AppState,
    dashboard::{
        get_categories, get_dashboard, get_filters, get_load_status, get_movements, get_trends,
        get_year_comparison, put_filters,
    },
    endpoints,
    logging::logging_middleware,
    store::MovementStore,
};

/// Return a router with all the app's routes.
pub fn build_router<S>(state: AppState<S>) -> Router
where
    S: MovementStore + 'static,
{
    Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::DASHBOARD, get(get_dashboard::<S>))
        .route(endpoints::TRENDS, get(get_trends::<S>))
        .route(endpoints::YEARLY_COMPARISON, get(get_year_comparison::<S>))
        .route(endpoints::MOVEMENTS, get(get_movements::<S>))
        .route(endpoints::CATEGORIES, get(get_categories::<S>))
        .route(endpoints::STATUS, get(get_load_status::<S>))
        .route(endpoints::FILTERS, get(get_filters).put(put_filters))
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// The root path '/' redirects to the dashboard.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD)
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "the requested resource could not be found" })),
    )
        .into_response()
}
