use dotenvy::dotenv;
use rosca_ledger::{
    config::{database, settings},
    core::{
        group,
        report::{format_currency, format_progress_bar},
    },
    engine::Engine,
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the application configuration
    let config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!(
        "Loaded configuration with {} group definitions.",
        config.groups.len()
    );

    // 4. Open the ledger (creates missing tables)
    let database_url = database::get_database_url();
    let engine = Engine::open(&database_url, config.ledger)
        .await
        .inspect_err(|e| error!("Failed to open ledger database: {}", e))?;

    // 5. Seed configured groups
    engine
        .seed_groups(&config.groups)
        .await
        .inspect_err(|e| error!("Failed to seed groups: {}", e))?;

    // 6. Summarize every group
    for row in group::list_all_groups(engine.connection()).await? {
        let view = engine.get_group(row.id).await?;
        let next = view
            .next_payout_date
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        info!(
            "{} [{}] cycle {}: saved {}, next payout {}, collected {}",
            view.group.name,
            view.group.status,
            view.group.current_cycle,
            format_currency(view.total_saved),
            next,
            format_progress_bar(view.collection_progress, None)
        );
    }

    engine.close().await
}
