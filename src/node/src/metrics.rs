//! Metrics server for the node.

use anyhow::Result;
use std::net::SocketAddr;
use tracing::{error, info};
use warp::Filter;

/// Starts the metrics server.
pub async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    let metrics_route = warp::path("metrics").map(|| match ferry_bridge::metrics::gather_text() {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            String::new()
        }
    });

    info!("Serving metrics at http://{}/metrics", addr);
    tokio::spawn(async move {
        warp::serve(metrics_route).run(addr).await;
    });

    Ok(())
}
