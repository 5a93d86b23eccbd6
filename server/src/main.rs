use clap::Parser;
use log::{error, info};
use server::config::{Args, ServerConfig};
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and runs the server until Ctrl-C
/// or the `shutdown` admin command.
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                shutdown.trigger();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    if let Err(e) = server.run().await {
        error!("{}", e);
        std::process::exit(1);
    }

    // the stdin reader may still be parked on a blocking thread
    std::process::exit(0);
}
