use anyhow::{Context, Result};
use log::info;

mod api;
mod config;
mod error;
mod ingest;
mod req;
mod state;
mod store;
mod utils;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env()?;
    let store = store::Store::open(&config.data_dir)
        .with_context(|| format!("cannot open data directory {}", config.data_dir.display()))?;
    info!("Data directory: {}", config.data_dir.display());

    api::new_http_server(config, store)
        .await
        .context("http server failed")?;
    Ok(())
}
