use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use fanride::api::{
    create_admin_router, create_afl_router, create_health_router, create_matches_router,
    create_readmodels_router, create_ws_router, AdminAppState, AflAppState, HealthAppState,
    MatchesAppState, ReadModelsAppState, WsAppState,
};
use fanride::config;
use fanride::config::new_runtime_config;
use fanride::eventstore::EventStore;
use fanride::hub::Hub;
use fanride::ingestion::{HttpFeedFetcher, IngestionWorker};
use fanride::projector::Projector;
use fanride::readmodel::{ReadModelQuery, ReadModelService};
use fanride::store::memory::InMemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fanride=info".into()),
        )
        .init();

    info!("FanRide starting...");

    // Load configuration
    let fanride_config = config::load_config(&config::config_path()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        config::FanRideConfig::default()
    });
    fanride_config.validate().expect("invalid configuration at startup");

    let containers = fanride_config.cosmos.containers.clone();

    // In-memory document store standing in for the Cosmos DB account until a
    // real adapter is wired in.
    let store = InMemoryStore::new();
    info!("document store initialized");

    let hub = Arc::new(Hub::new());
    info!("hub initialized");

    let read_models = ReadModelService::new(
        store.clone(),
        containers.rm_match_state.clone(),
        containers.rm_tes_history.clone(),
        containers.rm_leaderboard.clone(),
    );

    // Initialize runtime config (loaded from env vars, defaults otherwise).
    // `FANRIDE_POLL_INTERVAL_SECONDS` takes precedence if set; otherwise seed
    // from the TOML `aflFeed.pollIntervalSeconds` so that key isn't dead.
    let runtime_config = new_runtime_config();
    if std::env::var("FANRIDE_POLL_INTERVAL_SECONDS").is_err() {
        runtime_config.write().expect("RuntimeConfig lock poisoned").poll_interval_seconds =
            fanride_config.afl_feed.poll_interval_seconds;
    }
    info!("runtime config initialized");

    // Start the projector (background task)
    let projector = Arc::new(Projector::new(
        store.clone(),
        containers.es.clone(),
        containers.leases.clone(),
        containers.rm_match_state.clone(),
        containers.rm_tes_history.clone(),
        containers.rm_leaderboard.clone(),
        Arc::clone(&hub),
        Arc::clone(&runtime_config),
    ));
    let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let projector_mode = fanride_config.change_feed.parsed_mode();
    let projector_cancel = cancel_rx.clone();
    tokio::spawn(async move {
        projector.run(projector_mode, projector_cancel).await;
    });
    info!("projector started");

    // Start the AFL ingestion worker, if configured (background task)
    if fanride_config.afl_feed.enabled {
        let fetcher = HttpFeedFetcher::new(
            fanride_config.afl_feed.endpoint.clone(),
            fanride_config.afl_feed.api_key_header.clone(),
            fanride_config.afl_feed.resolved_api_key(),
        );
        let worker = IngestionWorker::new(
            store.clone(),
            containers.es.clone(),
            fetcher,
            Arc::clone(&hub),
            fanride_config.afl_feed.stream_id.clone(),
        );
        let ingestion_runtime_config = Arc::clone(&runtime_config);
        let ingestion_cancel = cancel_rx.clone();
        tokio::spawn(async move {
            worker.run(ingestion_runtime_config, ingestion_cancel).await;
        });
        info!("AFL ingestion worker started");
    } else {
        info!("AFL feed ingestion disabled (aflFeed.enabled = false)");
    }

    // Admin token (for PUT /api/admin/config)
    let admin_token = std::env::var("FANRIDE_ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        tracing::warn!("FANRIDE_ADMIN_TOKEN not set - admin config PUT is unrestricted");
    }

    let health_router = create_health_router(HealthAppState {
        store: store.clone(),
        leases_container: containers.leases.clone(),
        projector_lease_name: fanride::projector::PROJECTOR_NAME.to_string(),
    });

    let matches_router = create_matches_router(MatchesAppState {
        store: store.clone(),
        events_container: containers.es.clone(),
        event_store: EventStore::new(store.clone(), containers.es.clone()),
        hub: Arc::clone(&hub),
        runtime_config: Arc::clone(&runtime_config),
    });

    let afl_router = create_afl_router(AflAppState {
        store: store.clone(),
        events_container: containers.es.clone(),
        event_store: EventStore::new(store.clone(), containers.es.clone()),
        hub: Arc::clone(&hub),
        runtime_config: Arc::clone(&runtime_config),
    });

    let readmodels_router = create_readmodels_router(ReadModelsAppState {
        read_models: read_models.clone(),
        runtime_config: Arc::clone(&runtime_config),
    });

    let read_models_dyn: Arc<dyn ReadModelQuery> = Arc::new(read_models);
    let ws_router = create_ws_router(WsAppState {
        hub: Arc::clone(&hub),
        read_models: read_models_dyn,
        runtime_config: Arc::clone(&runtime_config),
    });

    let admin_router = create_admin_router(AdminAppState {
        runtime_config,
        admin_token,
    });

    // CORS — allow browsers (the FanRide fan-facing app) to fetch from this API
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT])
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE]);

    // Combine routers
    let app: Router = health_router
        .merge(matches_router)
        .merge(afl_router)
        .merge(readmodels_router)
        .merge(ws_router)
        .merge(admin_router)
        .layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse::<u16>()?;
    let addr = format!("0.0.0.0:{port}");
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
