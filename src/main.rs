use item_rpc_servers::{build_app, config::Config, logging, server::Server};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()
        .inspect_err(|err| error!(error = %err, "invalid configuration"))?;
    let server = Server::from_config(&config)
        .await
        .inspect_err(|err| error!(error = %err, "item server failed to start"))?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        local_addr = %server.local_addr(),
        "item server starting"
    );

    match server.run_until_signal(build_app()).await {
        Ok(()) => {
            info!("item server stopped");
            Ok(())
        }
        Err(err) if !err.is_fatal() => {
            warn!(error = %err, "item server stopped before draining all requests");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "item server failed");
            Err(err.into())
        }
    }
}
