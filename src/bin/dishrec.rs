//! dishrec HTTP server.
//!
//! Usage: `dishrec [CONFIG_FILE]`. Without an argument `dishrec.*` is read
//! from the working directory when present; `DISHREC_*` variables override
//! either.

use dishrec::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    dishrec::server::start_server(config).await?;

    Ok(())
}
