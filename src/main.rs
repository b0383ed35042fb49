use std::net::SocketAddr;

use anyhow::{Context, Result};
use dotenv::dotenv;
use log::{error, info};
use simplelog::TermLogger;

use m3u_relay_bot::{bot::Bot, config::Config, server, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    TermLogger::init(
        log::LevelFilter::Info,
        simplelog::ConfigBuilder::new()
            .set_time_format_rfc3339()
            .build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .context("error initializing termlogger")?;

    let config = Config::from_env().map_err(|err| {
        error!("{}", err);
        err
    })?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState::new(config);
    let bot = Bot::new(state.clone())?;

    // Refuse to serve with credentials that upstream APIs reject.
    if let Err(err) = bot.verify().await {
        error!("Startup check failed: {}", err);
        if err.is_fatal() {
            return Err(err.into());
        }
    }
    state.info(format!("Listening on {}", addr));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, server::router(bot))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, exiting");
        })
        .await?;

    Ok(())
}
