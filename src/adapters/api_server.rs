use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::coordination::ShutdownToken;
use crate::error::Result;

/// Serve the operator API until shutdown is requested
pub async fn start_api_server(state: AppState, port: u16, mut shutdown: ShutdownToken) -> Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("API server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.wait_for_shutdown().await;
        })
        .await?;

    info!("API server stopped");
    Ok(())
}
