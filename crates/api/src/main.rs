use std::sync::Arc;

use anyhow::Context;

use sheetkeeper_api::app::{self, services::AppServices};
use sheetkeeper_infra::{ConnectionConfig, CsvSheetStore, Settings, SheetStore};
use sheetkeeper_observability::LogConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid environment settings")?;
    sheetkeeper_observability::init(&LogConfig::default().with_format(settings.log_format));

    let config = ConnectionConfig::load(&settings.config_path)
        .with_context(|| format!("failed to load {}", settings.config_path.display()))?;
    tracing::info!(
        inventory = %config.inventory,
        orders = %config.orders,
        data_dir = %settings.data_dir.display(),
        "connection loaded"
    );

    let store: Arc<dyn SheetStore> = Arc::new(CsvSheetStore::new(&settings.data_dir));
    let services = Arc::new(AppServices::new(store, config));
    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
