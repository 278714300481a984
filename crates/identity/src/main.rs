use anyhow::Context;

use zenit_identity::{app, bootstrap};
use zenit_infra::config::IdentityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zenit_observability::init();

    let config = IdentityConfig::from_env().context("invalid identity service configuration")?;
    tracing::info!(bind_addr = %config.bind_addr, "starting identity service");

    let (services, database) = app::services::build_services(&config).await?;

    if let Some(admin) = &config.bootstrap {
        bootstrap::ensure_admin(services.store.as_ref(), admin)
            .await
            .context("failed to bootstrap admin user")?;
    }

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
    tracing::info!("identity service stopped");
    Ok(())
}
