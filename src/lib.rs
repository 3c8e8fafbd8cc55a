//! Finboard is a backend for a household finance dashboard.
//!
//! Financial movements are fetched from a Supabase table, filtered, grouped
//! into time buckets and compared across periods in memory. The results are
//! served as JSON view models for a chart front end.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

pub mod aggregation;
mod app_state;
pub mod category;
pub mod comparison;
mod config;
mod dashboard;
mod endpoints;
mod error;
pub mod filter;
pub mod filter_state;
pub mod loader;
mod logging;
pub mod money;
pub mod movement;
pub mod period;
mod routing;
pub mod store;
mod timezone;

pub use app_state::AppState;
pub use config::{DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT, StoreConfig};
pub use dashboard::{
    DashboardView, DataStatus, MovementsView, TrendsView, YearComparisonView, dashboard_view,
    movements_view, trends_view, year_comparison_view,
};
pub use error::Error;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;
pub use timezone::local_today;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
