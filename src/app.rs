//! Defines the read-only application state, derived once from the
//! settings and handed to every invocation.

use crate::client::{BlobStore, StorageAccount};
use crate::conf::Settings;
use crate::copy::{copy_object, CopyOptions, CopyOutcome};
use crate::error::Error;
use crate::path::{
    date_partition, destination, relativize, validate_date_format, BlobLocation, ObjectKey,
};
use crate::trigger::Trigger;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use envy::from_env;
use tracing::{info, instrument};

/// An App is an initialized application state, derived from
/// settings. This is only useful to pre-compute stuff that will be
/// used on every invocation.
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The watched root, parsed.
    pub input_root: ObjectKey,

    /// The destination root, parsed.
    pub output_root: ObjectKey,

    /// How copies are performed.
    pub copy_options: CopyOptions,

    /// The path of the blob endpoint, non-empty for path-style
    /// endpoints such as the storage emulator's.
    pub endpoint_path: ObjectKey,
}

/// Where a created object is copied from and to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub source: BlobLocation,
    /// The path of the source relative to the watched root.
    pub relative: ObjectKey,
    pub destination: BlobLocation,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes
    /// the settings struct.
    pub fn new(settings: Settings) -> Result<Self> {
        let input_root = ObjectKey::parse(&settings.input_path);
        let output_root = ObjectKey::parse(&settings.output_path);
        if input_root.is_empty() || output_root.is_empty() {
            return Err(Error::configuration(
                "input_PATH and output_PATH must at least name a container",
            )
            .into());
        }
        validate_date_format(&settings.date_format)?;
        let endpoint_path = StorageAccount::from_connection_string(&settings.app_storage)?
            .endpoint_path();
        let copy_options = CopyOptions {
            delete_source: settings.delete_after_copy,
        };
        Ok(App {
            settings,
            input_root,
            output_root,
            copy_options,
            endpoint_path,
        })
    }

    /// Initialize an App instance from the environment.
    pub fn from_env() -> Result<Self> {
        let settings = from_env().context("Failed to read the settings from the environment")?;
        Self::new(settings)
    }

    /// Compute where the object at `source_key` is copied to, at the
    /// instant `now`.
    pub fn plan(&self, source_key: &ObjectKey, now: &DateTime<Utc>) -> Result<CopyPlan, Error> {
        let relative = relativize(source_key, &self.input_root)?;
        if relative.is_empty() {
            return Err(Error::configuration(format!(
                "{:?} is the watched root itself, not an object under it",
                source_key.join()
            )));
        }
        let source = source_key.location()?;
        let destination = destination(
            &self.output_root,
            &date_partition(now, &self.settings.date_format),
            &relative,
        )?;
        Ok(CopyPlan {
            source,
            relative,
            destination,
        })
    }

    /// Handle an invocation trigger. Returns `None` when the trigger
    /// isn't about a created object.
    #[instrument(skip(self, store))]
    pub async fn handle<S: BlobStore>(
        &self,
        trigger: &Trigger,
        store: &S,
    ) -> Result<Option<CopyOutcome>> {
        match trigger {
            Trigger::BlobCreated(blob) => info!(
                "Processing created blob {:?} ({} bytes)",
                blob.name,
                blob.length
                    .map(|length| length.to_string())
                    .unwrap_or_else(|| String::from("unknown"))
            ),
            Trigger::Event(event) => info!(
                "Processing event {:?} of type {:?} about {:?}",
                event.id, event.event_type, event.subject
            ),
        }
        let Some(source_key) = trigger.source_key(&self.endpoint_path)? else {
            info!("Not a created object, ignoring");
            return Ok(None);
        };

        let plan = self.plan(&source_key, &Utc::now())?;
        info!("input root: {}", self.input_root);
        info!("output root: {}", self.output_root);
        info!("source: {}", plan.source);
        info!("relative path: {}", plan.relative);
        info!("destination: {}", plan.destination);

        let outcome = copy_object(store, &plan.source, &plan.destination, self.copy_options).await?;
        Ok(Some(outcome))
    }
}
