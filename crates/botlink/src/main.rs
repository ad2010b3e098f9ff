use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use botlink_core::{config::Config, credentials, link::LinkClient};
use botlink_ws::WsConnector;

#[tokio::main]
async fn main() -> Result<(), botlink_core::Error> {
    botlink_core::logging::init("botlink")?;

    let cfg = Arc::new(Config::load()?);
    let credentials = credentials::from_config(&cfg)?;
    let connector = Arc::new(WsConnector::new(cfg.connect_timeout));

    let client = LinkClient::new(Arc::clone(&cfg), connector, credentials);
    client.start().await;
    info!(uri = %cfg.ws_uri(), "backend link started");

    let mut notifications = client.subscribe();
    let _ = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(data) => info!(%data, "notification from backend"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification consumer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            client.stop().await;
            Ok(())
        }
        res = client.join() => res,
    }
}
