use std::sync::Arc;

use meal_dispatch::config::{Config, LogFormat};
use meal_dispatch::engine::reminders::run_reminder_loop;
use meal_dispatch::error::AppError;
use meal_dispatch::gateway::{MessageGateway, RecordingGateway, WahaClient};
use meal_dispatch::state::AppState;
use meal_dispatch::store::memory::InMemoryStore;
use meal_dispatch::api;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let store = Arc::new(InMemoryStore::new(config.country_code.clone()));
    if let Some(path) = &config.seed_data_path {
        let (profiles, orders) = store.load_seed_file(path)?;
        tracing::info!(path = %path.display(), profiles, orders, "seed data loaded");
    }

    let gateway: Arc<dyn MessageGateway> = if config.dry_run {
        tracing::warn!("WHATSAPP_DRY_RUN enabled; messages are recorded, not sent");
        Arc::new(RecordingGateway::new())
    } else {
        Arc::new(WahaClient::new(config.gateway()))
    };

    let shared_state = Arc::new(AppState::new(
        store,
        gateway,
        config.waha_session_name.clone(),
        config.event_buffer_size,
    ));

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_reminder_loop(
        shared_state.automation.clone(),
        config.reminders()?,
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        session = %config.waha_session_name,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::new(config.log_level.clone());

    match config.log_format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
