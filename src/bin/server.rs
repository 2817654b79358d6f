use std::{
    fs::OpenOptions,
    net::SocketAddr,
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use fiscal_ledger::{
    AppState, build_router, graceful_shutdown, logging_middleware, reconcile_all_running_totals,
};

/// The JSON API server for the fiscal ledger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The canonical name of the local timezone, e.g. "Europe/Paris".
    ///
    /// Used to decide what "today" is when backfilling recurring transactions
    /// and when a request does not name a fiscal year.
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,

    /// How often to check the running revenue totals against the stored
    /// transactions, in minutes. Zero disables the check.
    #[arg(long, default_value_t = 60)]
    reconcile_interval_minutes: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logging() {
        eprintln!("Could not set up logging: {error}");
        return ExitCode::FAILURE;
    }

    let connection = match Connection::open(&args.db_path) {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("Could not open the database at {}: {error}", args.db_path);
            return ExitCode::FAILURE;
        }
    };

    let state = match AppState::new(connection, &args.timezone) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!("Could not create the application state: {error}");
            return ExitCode::FAILURE;
        }
    };

    if args.reconcile_interval_minutes > 0 {
        tokio::spawn(reconcile_periodically(
            state.db_connection.clone(),
            Duration::from_secs(args.reconcile_interval_minutes * 60),
        ));
    }

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state).layer(middleware::from_fn(logging_middleware)));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    tracing::info!("HTTP server listening on {}", addr);

    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("The server stopped unexpectedly: {error}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn setup_logging() -> std::io::Result<()> {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")?;

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(stdout_log.with_filter(stdout_filter))
        .with(debug_log.with_filter(filter::LevelFilter::DEBUG))
        .init();

    Ok(())
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

/// Recompute every stored running total once per `period`, logging any drift.
async fn reconcile_periodically(db_connection: Arc<Mutex<Connection>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        let Ok(connection) = db_connection.lock() else {
            tracing::error!("Could not acquire the database lock for reconciliation");
            continue;
        };

        match reconcile_all_running_totals(&connection) {
            Ok(reconciliations) => {
                let drifted = reconciliations
                    .iter()
                    .filter(|reconciliation| !reconciliation.drift().is_zero())
                    .count();
                tracing::info!(
                    "Reconciled {} running totals, {drifted} had drifted",
                    reconciliations.len()
                );
            }
            Err(error) => tracing::error!("Could not reconcile running totals: {error}"),
        }
    }
}
