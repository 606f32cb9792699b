//! murmur-relay: signaling relay for anonymous voice pairing.
//!
//! Accepts WebSocket connections, queues clients looking for a partner,
//! pairs them by interest overlap under mutual gender filters, and
//! forwards negotiation and chat frames between the matched pair. Media
//! never touches the relay — it flows directly between the peers.

mod connection;
mod matchmaker;

use clap::Parser;
use tokio::net::TcpListener;

use crate::matchmaker::Registry;

#[derive(Parser)]
#[command(name = "murmur-relay", about = "Signaling relay for murmur voice pairing")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let registry = Registry::new();

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("murmur-relay listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    connection::handle(stream, addr, registry).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
