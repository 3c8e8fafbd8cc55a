//! Implements a struct that holds the state of the REST server.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    filter_state::FilterContext,
    loader::MovementLoader,
    store::{MovementStore, RetryPolicy},
};

/// The state of the REST server.
#[derive(Debug)]
pub struct AppState<S> {
    /// Fetches movements and keeps the latest load state.
    pub loader: Arc<MovementLoader<S>>,

    /// The current filter selection.
    pub filters: FilterContext,
}

impl<S: MovementStore> AppState<S> {
    /// Create a new [AppState] around a long-lived `store`.
    ///
    /// Transient store failures are retried following `retry`.
    pub fn new(store: S, retry: RetryPolicy, filters: FilterContext) -> Self {
        Self {
            loader: Arc::new(MovementLoader::new(Arc::new(store), retry)),
            filters,
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<S> FromRef<AppState<S>> for FilterContext {
    fn from_ref(state: &AppState<S>) -> Self {
        state.filters.clone()
    }
}
