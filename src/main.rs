use anyhow::{Context, Result};
use blob_watch::app::App;
use blob_watch::client::{AzureBlobClient, StorageAccount};
use blob_watch::conf::HostSettings;
use blob_watch::host::{router, Shared};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Serve the blob and event trigger functions to the function host,
/// copying each created object under the watched root into its dated
/// destination.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::from_env()?;
    let host_settings: HostSettings =
        envy::from_env().context("Failed to read the host settings from the environment")?;
    let store = AzureBlobClient::new(StorageAccount::from_connection_string(
        &app.settings.app_storage,
    )?)?;
    info!(
        "Watching {} for account {}",
        app.input_root,
        store.account().name
    );

    let shared = Arc::new(Shared {
        app,
        store,
        event_binding: host_settings.event_binding,
    });
    let listener = TcpListener::bind(("127.0.0.1", host_settings.functions_customhandler_port))
        .await
        .with_context(|| {
            format!(
                "Failed to listen on port {}",
                host_settings.functions_customhandler_port
            )
        })?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(shared))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("CTRL-C");
            }
        })
        .await
        .context("The server stopped unexpectedly")
}
