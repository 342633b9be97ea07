use anyhow::{bail, Context as _};
use library_db::{ConnectionProvider, Settings};
use tracing::{info, warn};

/// Build the provider, check the schema once and report it.
pub async fn launch() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load database settings")?;
    info!(?settings, "Loaded database settings");

    let provider = ConnectionProvider::new(settings);
    let result = check_schema(&provider).await;
    provider.close().await;
    result
}

async fn check_schema(provider: &ConnectionProvider) -> anyhow::Result<()> {
    let conn = provider
        .acquire()
        .await
        .context("Failed to acquire a database connection")?;
    drop(conn);

    let report = provider
        .inspect_schema()
        .await
        .context("Failed to inspect the books schema")?;

    if !report.is_complete() {
        warn!(missing = ?report.missing_indexes(), table_present = report.table_present, "Schema incomplete");
        bail!("books schema is incomplete after ensure");
    }

    info!(indexes = ?report.indexes, "Schema ready");
    Ok(())
}
