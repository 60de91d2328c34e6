use anyhow::Context;
use audio_overlay::{start_server, ServerConfig};
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализируем логгер
    audio_overlay::utils::logger::init_logger();

    let config = ServerConfig::load().context("failed to load configuration")?;
    info!(
        "Starting audio-overlay {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.host,
        config.port
    );

    start_server(config).await.context("server error")?;
    Ok(())
}
