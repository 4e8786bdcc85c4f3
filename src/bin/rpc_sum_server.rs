use item_rpc_servers::{build_rpc_app, config::Config, logging, server::Server};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::rpc();
    let server = Server::from_config(&config)
        .await
        .inspect_err(|err| error!(error = %err, "rpc sum server failed to start"))?;

    info!(local_addr = %server.local_addr(), "rpc sum server starting");

    match server.run_until_signal(build_rpc_app()).await {
        Ok(()) => {
            info!("rpc sum server stopped");
            Ok(())
        }
        Err(err) if !err.is_fatal() => {
            warn!(error = %err, "rpc sum server stopped before draining all requests");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "rpc sum server failed");
            Err(err.into())
        }
    }
}
