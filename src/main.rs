//! EMA dashboard storage check
//!
//! Starts the storage stack the way the dashboard does and prints the health
//! report. The data directory comes from `EMA_DATA_DIR`; without it data is
//! kept in memory.

use ema_dashboard::{AppConfig, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::new();
    if let Ok(dir) = std::env::var("EMA_DATA_DIR") {
        config = config.data_dir(dir);
    }

    let ctx = AppContext::start(config).await?;

    let report = ctx.persistence.health_check().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
