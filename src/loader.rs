//! Loads movements from the store while discarding out-of-date responses.
//!
//! Filter changes can start fetches faster than the store answers them. Every
//! fetch takes a ticket from a [RequestSequencer], and only the response to
//! the most recent ticket may replace the [LoadState]. Responses to older
//! tickets are still handed back to their caller, but never overwrite a newer
//! state.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use crate::{
    Error,
    store::{Fetched, MovementQuery, MovementStore, RetryPolicy, with_retry},
};

/// Identifies one fetch. Later fetches get larger tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Hands out tickets and remembers which one is current.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    /// Start a new request, making every earlier ticket stale.
    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `ticket` belongs to the most recent request.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// What the most recent fetch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadState {
    /// Nothing has been fetched yet.
    #[default]
    Idle,
    /// The movements were fetched.
    Loaded {
        /// The number of valid movements.
        count: usize,
        /// The number of malformed rows left out.
        skipped: usize,
    },
    /// The store has no credentials.
    NotConfigured,
    /// The fetch failed. The next refresh replaces this state.
    Failed {
        /// What went wrong.
        message: String,
    },
}

impl From<&Fetched> for LoadState {
    fn from(fetched: &Fetched) -> Self {
        if !fetched.configured {
            return LoadState::NotConfigured;
        }

        LoadState::Loaded {
            count: fetched.movements.len(),
            skipped: fetched.skipped,
        }
    }
}

/// The outcome of [MovementLoader::refresh].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The fetch was the latest and its result is now the [LoadState].
    Applied(Fetched),
    /// A newer fetch started while this one was running, so the
    /// [LoadState] was left alone.
    Stale(Fetched),
}

impl Refresh {
    /// The fetched movements, whether or not they were applied.
    pub fn into_fetched(self) -> Fetched {
        match self {
            Refresh::Applied(fetched) | Refresh::Stale(fetched) => fetched,
        }
    }
}

/// Fetches movements with retry and keeps the latest [LoadState].
#[derive(Debug)]
pub struct MovementLoader<S> {
    store: Arc<S>,
    retry: RetryPolicy,
    sequencer: RequestSequencer,
    state: RwLock<LoadState>,
}

impl<S: MovementStore> MovementLoader<S> {
    /// Create a loader in the [LoadState::Idle] state.
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            sequencer: RequestSequencer::default(),
            state: RwLock::new(LoadState::Idle),
        }
    }

    /// A copy of the state left by the latest fetch.
    pub fn state(&self) -> LoadState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The sorted, distinct category labels, retrying transient failures.
    ///
    /// # Errors
    /// Returns the store error if every attempt failed.
    pub async fn list_categories(&self) -> Result<Vec<String>, Error> {
        with_retry(self.retry, || self.store.list_categories()).await
    }

    /// Fetch the movements selected by `query`, retrying transient failures.
    ///
    /// # Errors
    /// Returns the store error if every attempt failed. If this fetch is
    /// still the latest, the state becomes [LoadState::Failed].
    pub async fn refresh(&self, query: MovementQuery) -> Result<Refresh, Error> {
        let ticket = self.sequencer.begin();
        let result = with_retry(self.retry, || self.store.fetch_movements(query)).await;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if !self.sequencer.is_current(ticket) {
            tracing::debug!("discarding the response to stale request {ticket:?}");
            return result.map(Refresh::Stale);
        }

        match result {
            Ok(fetched) => {
                *state = LoadState::from(&fetched);
                Ok(Refresh::Applied(fetched))
            }
            Err(error) => {
                tracing::error!("could not load movements: {error}");
                *state = LoadState::Failed {
                    message: error.to_string(),
                };
                Err(error)
            }
        }
    }
}
