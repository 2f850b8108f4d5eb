use std::sync::{Arc, Mutex};
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use walkbook::config::AppConfig;
use walkbook::db;
use walkbook::handlers;
use walkbook::services::holidays::feiertage::FeiertageApi;
use walkbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let holiday_api = FeiertageApi::new(
        config.holiday_api_url.clone(),
        Duration::from_secs(config.holiday_api_timeout_secs),
    )?;
    tracing::info!("using holiday API at {}", config.holiday_api_url);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        holiday_api: Box::new(holiday_api),
    });

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
