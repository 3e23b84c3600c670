mod docker;
mod server;
mod shared;

use anyhow::Result;

use shared::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    // Keep the log writers alive until exit
    let _logging = shared::logging::init_logging(&config.log_dir, "browserd")?;

    server::rest::server::run_rest_server(config).await
}
