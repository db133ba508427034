//! Serve command implementation.

use dolphin_server::ServerConfig;
use dolphin_testkit::fixture_server;
use tokio::runtime::Runtime;
use tracing::info;

/// Runs the fixture controllers behind the HTTP endpoint until Ctrl-C.
pub fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.bind_addr;
    let server = fixture_server(config)?;
    info!(
        controllers = "Counter, TodoList",
        max_sessions = server.config().max_sessions,
        "starting dolphin server"
    );

    let runtime = Runtime::new()?;
    runtime.block_on(dolphin_http::serve(server, addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    }))?;
    Ok(())
}
