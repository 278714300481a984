use anyhow::Context;

use zenit_api::app;
use zenit_infra::config::FinancialConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zenit_observability::init();

    let config = FinancialConfig::from_env().context("invalid financial service configuration")?;
    tracing::info!(bind_addr = %config.bind_addr, core_api_url = %config.core_api_url, "starting financial service");

    let (services, database) = app::services::build_services(&config).await?;
    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(zenit_http::shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.shutdown().await;
    }
    tracing::info!("financial service stopped");
    Ok(())
}
