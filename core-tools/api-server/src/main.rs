// Triad API Server
// Entry point for the triad-server binary

use triad_engine::config::Config;
use triad_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config path as the only argument
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from_path(std::path::Path::new(&path))?,
        None => Config::load_or_create()?,
    };

    init_telemetry_with_level(&config.core.log_level);
    tracing::info!("Triad server v{}", env!("CARGO_PKG_VERSION"));

    api_server::serve(&config).await
}
