use consult_flow::Consultant;
use consulting_service::{AppConfig, AppState, build_router, create_services, create_session_storage};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "consulting_service=debug,consult_flow=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let services = create_services(&config).await?;
    let storage = create_session_storage(&config).await;

    let consultant = Arc::new(Consultant::new(
        services,
        config.consult.clone(),
        config.business.clone(),
    ));
    let app = build_router(AppState::new(consultant, storage));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!(business = %config.business.name, "Consulting service running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
