use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use send_gate::api::{self, ApiState};
use send_gate::config::GateConfig;
use send_gate::services::balances::InMemoryBalanceSource;
use send_gate::services::events::ChannelEventSink;
use send_gate::services::executor::DryRunExecutor;
use send_gate::services::fees::{FeePriority, HttpPriceOracle, MempoolGasSampler};
use send_gate::services::reauth::PasswordReauthenticator;
use send_gate::services::resolver::HttpNameResolver;
use send_gate::services::sessions::SendSessionManager;
use send_gate::services::{GateCollaborators, GateServices};
use send_gate::storage::{DbManager, SqliteSendRecorder};

#[tokio::main]
async fn main() {
    // load env vars
    dotenv().ok();

    // initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GateConfig::from_env();
    tracing::info!(
        "Send gate for {} on {:?}, names ending in {}",
        config.gas_asset,
        config.network,
        config.name_suffix
    );

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let db_path = format!("{}/sends.db", data_dir);
    let db_manager = Arc::new(DbManager::new(&db_path).expect("Failed to open send database"));
    let recorder = Arc::new(SqliteSendRecorder::new(db_manager));

    let balances = Arc::new(InMemoryBalanceSource::new());
    let events = Arc::new(ChannelEventSink::new());

    let fee_priority = FeePriority::from(std::env::var("FEE_PRIORITY").unwrap_or_else(|_| "normal".to_string()));

    let collaborators = GateCollaborators {
        name_resolver: Arc::new(
            HttpNameResolver::new(&config.name_service_url).expect("Failed to build name service client"),
        ),
        price_oracle: Arc::new(
            HttpPriceOracle::new(&config.price_api_url, &config.fiat_currency)
                .expect("Failed to build price client"),
        ),
        gas_sampler: Arc::new(
            MempoolGasSampler::new(&config.fee_api_url, fee_priority).expect("Failed to build fee client"),
        ),
        balances: balances.clone(),
        executor: Arc::new(DryRunExecutor),
        reauthenticator: Arc::new(PasswordReauthenticator::from_env()),
        persistence: recorder.clone(),
        events: events.clone(),
    };

    let services = GateServices::new(collaborators, config).expect("Invalid send gate configuration");

    // log every send event
    let mut event_stream = events.subscribe();
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(event) = event_stream.next().await {
            tracing::info!("Send event: {:?}", event);
        }
    });

    // evict abandoned drafts
    let sessions = Arc::new(SendSessionManager::new(services));
    sessions.spawn_sweeper(Duration::from_secs(60));

    let api_state = ApiState {
        sessions,
        recorder,
        balances,
    };

    let app = api::router(api_state);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .expect("PORT must be a number");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.expect("Failed to bind listener");

    tracing::info!("Send gate server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
