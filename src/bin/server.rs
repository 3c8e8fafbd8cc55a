use std::{
    fs::OpenOptions, net::SocketAddr, path::PathBuf, process::ExitCode, sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use finboard::{
    AppState, DEFAULT_PAGE_SIZE, StoreConfig, build_router,
    filter_state::{FilterContext, FilterPersistence},
    graceful_shutdown, local_today,
    movement::SignConvention,
    store::{RetryPolicy, SupabaseStore},
};

/// The JSON API server for the finboard dashboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The Supabase project URL.
    #[arg(long, env = "SUPABASE_URL", default_value = "")]
    supabase_url: String,

    /// The Supabase anonymous API key.
    #[arg(long, env = "SUPABASE_KEY", default_value = "", hide_env_values = true)]
    supabase_key: String,

    /// File path to the JSON file holding the saved filter selection.
    #[arg(long, default_value = "finboard-filters.json")]
    filter_state: PathBuf,

    /// The local timezone as a canonical timezone name, used to work out
    /// today's date.
    #[arg(long, env = "FINBOARD_TIMEZONE", default_value = "America/Sao_Paulo")]
    timezone: String,

    /// How to tell income from expenses: "amount-sign" or "category-prefix".
    #[arg(long, default_value = "amount-sign")]
    sign_convention: SignConvention,

    /// How many times to try a store request before giving up.
    #[arg(long, default_value_t = 3)]
    retry_attempts: u32,

    /// How long to wait for the store, in seconds.
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,

    /// How many rows to fetch per store request. Keep it at or below the
    /// project's `max_rows` setting.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let today = match local_today(&args.timezone) {
        Ok(today) => today,
        Err(error) => {
            tracing::error!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let store_config = StoreConfig {
        timeout: Duration::from_secs(args.request_timeout),
        page_size: args.page_size,
        ..StoreConfig::new(args.supabase_url, args.supabase_key)
    };
    tracing::debug!("store config: {store_config:?}");

    let store = match SupabaseStore::new(store_config, args.sign_convention) {
        Ok(store) => store,
        Err(error) => {
            tracing::error!("could not create the store client: {error}");
            return ExitCode::FAILURE;
        }
    };

    let retry = RetryPolicy {
        max_attempts: args.retry_attempts,
        ..RetryPolicy::default()
    };
    let filters = FilterContext::load(FilterPersistence::new(args.filter_state), today);
    let state = AppState::new(store, retry, filters);

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    tracing::info!("HTTP server listening on {}", addr);
    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("the server stopped with an error: {error}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are turned into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
