use anyhow::{Context, Result};
use blob_watch::app::App;
use blob_watch::client::{AzureBlobClient, StorageAccount};
use blob_watch::trigger::{BlobCreated, Trigger};
use std::env::var;

/// Copy a single created object, named by an environment variable,
/// into its dated destination.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::from_env()?;
    let store = AzureBlobClient::new(StorageAccount::from_connection_string(
        &app.settings.app_storage,
    )?)?;

    let name = var(&app.settings.blob_name_var).context(app.settings.blob_name_var.clone())?;
    let trigger = Trigger::BlobCreated(BlobCreated { name, length: None });

    app.handle(&trigger, &store)
        .await
        .with_context(|| format!("Failed to handle {:?}", &trigger))?;

    Ok(())
}
