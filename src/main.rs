use tokio_util::sync::CancellationToken;
use tracing::info;

use crawld::api::{self, AppState};
use crawld::config::AppConfig;
use crawld::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crawld::logging::init();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let container = ServiceContainer::build(&config).await?;

    container.dispatch.start();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let state = AppState::new(container.job_service.clone());
    api::server::serve(&config.api, state, shutdown).await?;

    container.dispatch.stop().await;
    info!("crawld shut down");
    Ok(())
}
