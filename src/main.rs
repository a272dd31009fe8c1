use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use catalog_etl::{
    clients::{GenderApiClient, GenderApiConfig},
    config::Config,
    observability::Telemetry,
    pipeline::{CatalogPipeline, ingest::CsvTitleSource},
    store::{PgCatalogStore, connect_pool},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        match panic_info.location() {
            Some(location) => error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            ),
            None => error!(thread = thread_name, message, "panic occurred"),
        }
    }));

    let telemetry = Telemetry::new().context("failed to initialize telemetry")?;
    let config = Config::from_env().context("failed to load configuration")?;

    let pool = connect_pool(&config)?;
    let lookup = GenderApiClient::new(GenderApiConfig {
        url: config.gender_api_url().to_string(),
        connect_timeout: config.gender_api_connect_timeout(),
        total_timeout: config.gender_api_total_timeout(),
    })?;

    let pipeline = CatalogPipeline::builder()
        .with_source(Arc::new(CsvTitleSource::new(config.input_path())))
        .with_store(Arc::new(PgCatalogStore::new(pool.clone())))
        .with_lookup(Arc::new(lookup))
        .with_concurrency(config.lookup_concurrency().get())
        .with_empty_cast_policy(config.empty_cast_policy())
        .with_duplicate_check(config.check_duplicates())
        .with_metrics(telemetry.metrics())
        .build()?;

    let outcome = tokio::select! {
        result = pipeline.run() => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning run before commit");
            Err(anyhow::anyhow!("run interrupted"))
        }
    };

    if let Some(path) = config.metrics_textfile_path() {
        write_metrics_textfile(path, &telemetry).await;
    }

    pool.close().await;

    let summary = outcome.context("catalog load failed")?;
    info!(
        run_id = %summary.run_id,
        titles_loaded = summary.titles_loaded,
        titles_skipped = summary.titles_skipped_duplicate,
        cast_rows = summary.cast_rows,
        lookups_resolved = summary.lookups.resolved,
        lookups_unknown = summary.lookups.unknown,
        lookups_failed = summary.lookups.failed,
        "catalog load finished"
    );

    Ok(())
}

async fn write_metrics_textfile(path: &Path, telemetry: &Telemetry) {
    match tokio::fs::write(path, telemetry.render_prometheus()).await {
        Ok(()) => info!(path = %path.display(), "metrics textfile written"),
        Err(error) => warn!(path = %path.display(), error = %error, "failed to write metrics textfile"),
    }
}
