use anyhow::Result;
use colored::Colorize;
use trellis_core::ConfigManager;
use tracing::info;

use super::open_store;

pub async fn execute(manager: &ConfigManager) -> Result<()> {
    println!("{}", "Initializing Trellis".green().bold());

    if manager.config_path().exists() {
        println!(
            "  {} {}",
            "Config:".dimmed(),
            manager.config_path().display()
        );
    } else {
        manager.save()?;
        println!(
            "  {} {} {}",
            "Config:".dimmed(),
            manager.config_path().display(),
            "(created)".green()
        );
    }

    let store = open_store(manager.config()).await?;
    store.initialize().await?;
    let migrations = store.migration_history().await?;
    info!("Schema at version {}", migrations.len());

    println!(
        "  {} {}",
        "Database:".dimmed(),
        store.db_path().display()
    );
    println!(
        "  {} {}",
        "Migrations:".dimmed(),
        migrations.len().to_string().cyan()
    );
    println!("\n{}", "Ready.".green());
    Ok(())
}
