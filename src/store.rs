//! Access to the remote movement store.
//!
//! The store is a hosted Postgres exposed through a PostgREST HTTP interface.
//! [SupabaseStore] is built once at startup and keeps a single pooled HTTP
//! client for its whole life. Date bounds are pushed down to the store as
//! query predicates instead of being applied after the fetch.

use std::{future::Future, time::Duration};

use serde::Deserialize;
use time::Date;

use crate::{
    Error,
    category::{labels_sorted, list_categories},
    config::StoreConfig,
    movement::{Ingested, Movement, SignConvention, StoreRow, ingest_rows},
    period::DateRange,
};

/// Defines which movements to fetch from a [MovementStore].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementQuery {
    /// Include movements on or after this date.
    pub start: Option<Date>,
    /// Include movements on or before this date.
    pub end: Option<Date>,
}

impl From<DateRange> for MovementQuery {
    fn from(range: DateRange) -> Self {
        Self {
            start: Some(range.start),
            end: Some(range.end),
        }
    }
}

impl MovementQuery {
    fn matches(&self, date: Date) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// The result of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    /// The valid movements, newest first.
    pub movements: Vec<Movement>,
    /// The number of rows left out because they were malformed.
    pub skipped: usize,
    /// `false` when the store has no credentials and nothing was fetched.
    pub configured: bool,
}

impl Fetched {
    /// The result of fetching from a store without credentials.
    pub fn not_configured() -> Self {
        Self {
            movements: Vec::new(),
            skipped: 0,
            configured: false,
        }
    }

    fn from_ingested(ingested: Ingested) -> Self {
        Self {
            movements: ingested.movements,
            skipped: ingested.skipped,
            configured: true,
        }
    }
}

/// Handles the retrieval of movements.
pub trait MovementStore: Send + Sync {
    /// Retrieve the movements selected by `query`.
    ///
    /// A store without credentials returns [Fetched::not_configured] rather
    /// than an error.
    fn fetch_movements(
        &self,
        query: MovementQuery,
    ) -> impl Future<Output = Result<Fetched, Error>> + Send;

    /// Retrieve the sorted, distinct category labels across all movements.
    fn list_categories(&self) -> impl Future<Output = Result<Vec<String>, Error>> + Send {
        async move {
            let fetched = self.fetch_movements(MovementQuery::default()).await?;
            Ok(list_categories(&fetched.movements))
        }
    }
}

/// The name of the table holding the movements.
pub const MOVEMENTS_TABLE: &str = "dmovimentacoes";

/// A [MovementStore] backed by a Supabase project's REST interface.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    config: StoreConfig,
    convention: SignConvention,
}

impl SupabaseStore {
    /// Create the store and its HTTP client.
    ///
    /// # Errors
    /// Returns [Error::StoreRequest] if the HTTP client cannot be built.
    pub fn new(config: StoreConfig, convention: SignConvention) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| Error::StoreRequest {
                message: format!("could not build the HTTP client: {error}"),
                transient: false,
            })?;

        if !config.is_configured() {
            tracing::warn!(
                "Supabase credentials are not set, every fetch will return no movements"
            );
        }

        Ok(Self {
            client,
            config,
            convention,
        })
    }

    fn table_url(&self, params: &[(&str, String)]) -> Result<String, Error> {
        let query = serde_urlencoded::to_string(params).map_err(|error| Error::StoreRequest {
            message: format!("could not encode the query string: {error}"),
            transient: false,
        })?;

        Ok(format!(
            "{}/rest/v1/{}?{query}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        tracing::debug!("fetching {url}");

        let response = self
            .client
            .get(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StoreStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// Fetch every row matching `params`, one page of
    /// [StoreConfig::page_size] rows at a time.
    ///
    /// PostgREST caps the rows in a single response, so the table is read
    /// with `limit`/`offset` until a short page comes back. `params` must
    /// order the rows so that pages do not overlap.
    async fn get_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, Error> {
        let page_size = self.config.page_size.max(1);
        let mut rows = Vec::new();

        loop {
            let mut page_params = params.to_vec();
            page_params.push(("limit", page_size.to_string()));
            page_params.push(("offset", rows.len().to_string()));

            let page: Vec<T> = self.get_json(&self.table_url(&page_params)?).await?;
            let page_len = page.len();
            rows.extend(page);

            if page_len < page_size {
                return Ok(rows);
            }
        }
    }
}

/// The PostgREST query parameters for `query`.
pub fn movement_query_params(query: &MovementQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_owned())];

    if let Some(start) = query.start {
        params.push(("data", format!("gte.{start}")));
    }
    if let Some(end) = query.end {
        params.push(("data", format!("lte.{end}")));
    }

    params.push(("order", MOVEMENT_ORDER.to_owned()));
    params
}

// Every column takes part so that rows sharing a date keep their place
// between pages.
const MOVEMENT_ORDER: &str =
    "data.desc,rubrica.asc,valor.asc,banco.asc,pagador.asc,descricao.asc,parcelas.asc";

#[derive(Deserialize)]
struct CategoryRow {
    rubrica: Option<String>,
}

impl MovementStore for SupabaseStore {
    async fn fetch_movements(&self, query: MovementQuery) -> Result<Fetched, Error> {
        if !self.config.is_configured() {
            return Ok(Fetched::not_configured());
        }

        let rows: Vec<StoreRow> = self.get_all_pages(&movement_query_params(&query)).await?;
        let row_count = rows.len();
        let fetched = Fetched::from_ingested(ingest_rows(rows, self.convention));

        if fetched.skipped > 0 {
            tracing::warn!(
                "skipped {} of {row_count} movement rows because they were malformed",
                fetched.skipped
            );
        }

        Ok(fetched)
    }

    async fn list_categories(&self) -> Result<Vec<String>, Error> {
        if !self.config.is_configured() {
            return Ok(Vec::new());
        }

        let rows: Vec<CategoryRow> = self
            .get_all_pages(&[
                ("select", "rubrica".to_owned()),
                ("order", "rubrica.asc".to_owned()),
            ])
            .await?;

        Ok(labels_sorted(rows.iter().filter_map(|row| row.rubrica.as_deref())))
    }
}

/// A [MovementStore] that serves a fixed list of movements from memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    movements: Vec<Movement>,
}

impl InMemoryStore {
    /// Create a store holding `movements`.
    pub fn new(movements: Vec<Movement>) -> Self {
        Self { movements }
    }
}

impl MovementStore for InMemoryStore {
    async fn fetch_movements(&self, query: MovementQuery) -> Result<Fetched, Error> {
        let mut movements: Vec<Movement> = self
            .movements
            .iter()
            .filter(|movement| query.matches(movement.date))
            .cloned()
            .collect();
        movements.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(Fetched {
            movements,
            skipped: 0,
            configured: true,
        })
    }
}

/// How often and how patiently to retry transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of attempts, including the first.
    pub max_attempts: u32,
    /// The wait before the first retry. Each retry doubles it.
    pub initial_backoff: Duration,
    /// The longest wait between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// The wait before retry number `retry` (starting at zero).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }
}

/// Run `operation`, retrying with exponential backoff while it fails with a
/// transient error and attempts remain.
///
/// # Errors
/// Returns the last error if every attempt fails, or the first non-transient
/// error.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff(attempt - 1);
                tracing::warn!(
                    "attempt {attempt} of {max_attempts} failed: {error}, retrying in {backoff:?}"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Json, Router,
        extract::{RawQuery, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use time::macros::date;

    use super::{
        InMemoryStore, MovementQuery, MovementStore, RetryPolicy, SupabaseStore,
        movement_query_params, with_retry,
    };
    use crate::{
        Error,
        config::StoreConfig,
        movement::{Movement, MovementKind, SignConvention},
    };

    #[derive(Clone, Default)]
    struct FakePostgrest {
        queries: Arc<Mutex<Vec<String>>>,
        api_keys: Arc<Mutex<Vec<String>>>,
        failures_left: Arc<AtomicUsize>,
        failure_status: u16,
        /// Rows served instead of the default three when not empty.
        rows: Arc<Vec<Value>>,
        /// The most rows a single response may hold, like PostgREST's
        /// `max_rows`. Zero means no cap.
        max_rows: usize,
    }

    fn default_rows() -> Vec<Value> {
        vec![
            json!({ "data": "2024-02-01", "rubrica": "201-ALUGUEL", "valor": -1000, "banco": "X" }),
            json!({ "data": "2024-01-20", "rubrica": "101-SALARIO", "valor": "3000.00", "parcelas": 1 }),
            json!({ "data": "invalid", "rubrica": "101-SALARIO", "valor": 1 }),
        ]
    }

    fn page(rows: Vec<Value>, query: &str, max_rows: usize) -> Vec<Value> {
        let params: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.parse::<usize>().unwrap())
        };
        let offset = param("offset").unwrap_or(0);
        let mut limit = param("limit").unwrap_or(usize::MAX);
        if max_rows > 0 {
            limit = limit.min(max_rows);
        }

        rows.into_iter().skip(offset).take(limit).collect()
    }

    async fn fake_table(
        State(fake): State<FakePostgrest>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> Response {
        let query = query.unwrap_or_default();
        fake.queries.lock().unwrap().push(query.clone());
        if let Some(key) = headers.get("apikey") {
            fake.api_keys
                .lock()
                .unwrap()
                .push(key.to_str().unwrap().to_owned());
        }

        if fake.failures_left.load(Ordering::SeqCst) > 0 {
            fake.failures_left.fetch_sub(1, Ordering::SeqCst);
            let status = StatusCode::from_u16(fake.failure_status).unwrap();
            return (status, "upstream unavailable").into_response();
        }

        if query.starts_with("select=rubrica") {
            let categories = vec![
                json!({ "rubrica": "201-ALUGUEL" }),
                json!({ "rubrica": "101-SALARIO" }),
                json!({ "rubrica": " 201-ALUGUEL" }),
                json!({ "rubrica": "101-SALARIO " }),
                json!({ "rubrica": null }),
            ];
            return Json(page(categories, &query, fake.max_rows)).into_response();
        }

        let rows = if fake.rows.is_empty() {
            default_rows()
        } else {
            fake.rows.to_vec()
        };

        Json(page(rows, &query, fake.max_rows)).into_response()
    }

    async fn spawn_fake(fake: FakePostgrest) -> String {
        let app = Router::new()
            .route("/rest/v1/dmovimentacoes", get(fake_table))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{address}")
    }

    fn config(base_url: String) -> StoreConfig {
        StoreConfig {
            base_url,
            api_key: "secret-key".to_owned(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn pushes_date_bounds_into_the_query() {
        let query = MovementQuery {
            start: Some(date!(2024 - 01 - 01)),
            end: Some(date!(2024 - 03 - 31)),
        };

        let params = movement_query_params(&query);

        assert_eq!(
            serde_urlencoded::to_string(&params).unwrap(),
            "select=*&data=gte.2024-01-01&data=lte.2024-03-31\
             &order=data.desc%2Crubrica.asc%2Cvalor.asc%2Cbanco.asc%2Cpagador.asc\
             %2Cdescricao.asc%2Cparcelas.asc"
        );
    }

    #[test]
    fn omits_missing_bounds() {
        let params = movement_query_params(&MovementQuery::default());

        assert_eq!(
            serde_urlencoded::to_string(&params).unwrap(),
            "select=*&order=data.desc%2Crubrica.asc%2Cvalor.asc%2Cbanco.asc%2Cpagador.asc\
             %2Cdescricao.asc%2Cparcelas.asc"
        );
    }

    #[tokio::test]
    async fn fetches_and_ingests_rows() {
        let fake = FakePostgrest::default();
        let base_url = spawn_fake(fake.clone()).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();

        let fetched = store
            .fetch_movements(MovementQuery {
                start: Some(date!(2024 - 01 - 01)),
                end: None,
            })
            .await
            .unwrap();

        assert!(fetched.configured);
        assert_eq!(fetched.movements.len(), 2);
        assert_eq!(fetched.skipped, 1);
        assert_eq!(fetched.movements[0].amount, dec!(-1000));
        assert_eq!(fetched.movements[0].kind, MovementKind::Expense);
        assert_eq!(fetched.movements[1].amount, dec!(3000));
        assert_eq!(
            fake.queries.lock().unwrap().as_slice(),
            [
                "select=*&data=gte.2024-01-01\
                 &order=data.desc%2Crubrica.asc%2Cvalor.asc%2Cbanco.asc%2Cpagador.asc\
                 %2Cdescricao.asc%2Cparcelas.asc&limit=1000&offset=0"
            ]
        );
        assert_eq!(fake.api_keys.lock().unwrap().as_slice(), ["secret-key"]);
    }

    #[tokio::test]
    async fn lists_categories_from_the_category_column() {
        let base_url = spawn_fake(FakePostgrest::default()).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();

        let categories = store.list_categories().await.unwrap();

        assert_eq!(categories, vec!["101-SALARIO", "201-ALUGUEL"]);
    }

    #[tokio::test]
    async fn reads_every_page_of_a_large_table() {
        let rows = (0..2500)
            .map(|index| {
                json!({
                    "data": "2024-01-01",
                    "rubrica": format!("{:03}-RUBRICA", index % 7),
                    "valor": index,
                })
            })
            .collect();
        let fake = FakePostgrest {
            rows: Arc::new(rows),
            max_rows: 1000,
            ..FakePostgrest::default()
        };
        let base_url = spawn_fake(fake.clone()).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();

        let fetched = store
            .fetch_movements(MovementQuery::default())
            .await
            .unwrap();

        assert_eq!(fetched.movements.len(), 2500);
        assert_eq!(fetched.skipped, 0);
        assert_eq!(
            fetched.movements.iter().map(|movement| movement.amount).sum::<Decimal>(),
            Decimal::from(2499 * 2500 / 2)
        );
        let queries = fake.queries.lock().unwrap();
        assert_eq!(queries.len(), 3);
        assert!(queries[0].ends_with("&limit=1000&offset=0"));
        assert!(queries[1].ends_with("&limit=1000&offset=1000"));
        assert!(queries[2].ends_with("&limit=1000&offset=2000"));
    }

    #[tokio::test]
    async fn small_pages_are_followed_to_the_end() {
        let fake = FakePostgrest::default();
        let base_url = spawn_fake(fake.clone()).await;
        let store = SupabaseStore::new(
            StoreConfig {
                page_size: 2,
                ..config(base_url)
            },
            SignConvention::AmountSign,
        )
        .unwrap();

        let fetched = store
            .fetch_movements(MovementQuery::default())
            .await
            .unwrap();

        assert_eq!(fetched.movements.len(), 2);
        assert_eq!(fetched.skipped, 1);
        assert_eq!(fake.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_credentials_return_no_movements() {
        let store = SupabaseStore::new(
            StoreConfig {
                api_key: String::new(),
                ..StoreConfig::default()
            },
            SignConvention::AmountSign,
        )
        .unwrap();

        let fetched = store
            .fetch_movements(MovementQuery::default())
            .await
            .unwrap();

        assert!(!fetched.configured);
        assert!(fetched.movements.is_empty());
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn surfaces_error_statuses() {
        let fake = FakePostgrest {
            failures_left: Arc::new(AtomicUsize::new(1)),
            failure_status: 503,
            ..FakePostgrest::default()
        };
        let base_url = spawn_fake(fake).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();

        let result = store.fetch_movements(MovementQuery::default()).await;

        match result {
            Err(error @ Error::StoreStatus { status: 503, .. }) => assert!(error.is_transient()),
            other => panic!("expected a 503 store status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let fake = FakePostgrest {
            failures_left: Arc::new(AtomicUsize::new(2)),
            failure_status: 502,
            ..FakePostgrest::default()
        };
        let base_url = spawn_fake(fake.clone()).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };

        let fetched = with_retry(policy, || store.fetch_movements(MovementQuery::default()))
            .await
            .unwrap();

        assert_eq!(fetched.movements.len(), 2);
        assert_eq!(fake.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let fake = FakePostgrest {
            failures_left: Arc::new(AtomicUsize::new(5)),
            failure_status: 401,
            ..FakePostgrest::default()
        };
        let base_url = spawn_fake(fake.clone()).await;
        let store = SupabaseStore::new(config(base_url), SignConvention::AmountSign).unwrap();

        let result = with_retry(RetryPolicy::default(), || {
            store.fetch_movements(MovementQuery::default())
        })
        .await;

        assert!(matches!(result, Err(Error::StoreStatus { status: 401, .. })));
        assert_eq!(fake.queries.lock().unwrap().len(), 1);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(300));
        assert_eq!(policy.backoff(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn in_memory_store_applies_bounds_and_lists_categories() {
        let convention = SignConvention::AmountSign;
        let store = InMemoryStore::new(vec![
            Movement::new(date!(2024 - 01 - 01), "b", dec!(1), convention),
            Movement::new(date!(2024 - 02 - 01), "a", dec!(2), convention),
            Movement::new(date!(2024 - 03 - 01), "b", dec!(3), convention),
        ]);

        let fetched = store
            .fetch_movements(MovementQuery {
                start: Some(date!(2024 - 02 - 01)),
                end: Some(date!(2024 - 03 - 01)),
            })
            .await
            .unwrap();

        assert_eq!(fetched.movements.len(), 2);
        assert_eq!(fetched.movements[0].date, date!(2024 - 03 - 01));
        assert_eq!(store.list_categories().await.unwrap(), vec!["a", "b"]);
    }
}
