use std::path::PathBuf;

use cadence_agent::config::ServerConfig;
use cadence_agent::server;
use cadence_agent::utils::logger;

fn main() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch agent: {error}");
        std::process::exit(1);
    }
}

fn try_run() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = std::env::var("AGENT_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));
    logger::init_logging(&log_dir)?;

    let config = ServerConfig::from_env();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::run(config))?;
    Ok(())
}
