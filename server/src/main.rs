use clap::Parser;
use log::info;
use server::registry::Registry;
use server::routes;
use std::sync::Arc;

/// Main-method of the server.
/// Parses command-line arguments, then serves the front desk and the
/// realtime endpoint until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
    }

    env_logger::init();
    let args = Args::parse();

    let registry = Arc::new(Registry::new());
    let app = routes::router(Arc::clone(&registry));

    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("server listening on {}", address);
    info!(
        "front desk: http://{}/create-room /join-room /list-rooms",
        address
    );
    info!("realtime: ws://{}/play?room=CODE&token=...", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received ctrl-c, shutting down");
        })
        .await?;

    Ok(())
}
