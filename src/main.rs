use std::time::Duration;

use assessment_engine::{
    config::{get_config, init_config, LogFormat},
    database::pool::{create_pool, run_migrations},
    AppState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config.log_format);

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    info!("Database ready");

    let app_state = AppState::new(pool, config);

    for entry in app_state.category_service.category_test_counts().await? {
        info!(
            category = %entry.category.title,
            tests = entry.tests_count,
            "Catalog"
        );
    }

    let sweeper = {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = state.attempt_service.abandon_overdue().await {
                    tracing::error!(error = ?e, "Overdue sweep failed");
                }
                tokio::time::sleep(SWEEP_INTERVAL).await;
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    sweeper.abort();
    Ok(())
}
