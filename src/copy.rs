//! Defines the copy of a single object: a server-side copy from a
//! readable source URL, checked once it returns.

use crate::client::BlobStore;
use crate::error::Error;
use crate::path::BlobLocation;
use anyhow::{Context, Result};
use std::fmt;
use tracing::{info, instrument, warn};

/// The copy status the service reports for a completed copy.
pub const SUCCESS_STATUS: &str = "success";

/// The status of a copy, as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Success,
    Pending,
    Aborted,
    Failed,
    /// A status the service reported that isn't one of the above, or
    /// no status at all.
    Unknown(String),
}

impl From<Option<&str>> for CopyStatus {
    fn from(status: Option<&str>) -> Self {
        match status {
            Some(SUCCESS_STATUS) => Self::Success,
            Some("pending") => Self::Pending,
            Some("aborted") => Self::Aborted,
            Some("failed") => Self::Failed,
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Unknown(String::new()),
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str(SUCCESS_STATUS),
            Self::Pending => f.write_str("pending"),
            Self::Aborted => f.write_str("aborted"),
            Self::Failed => f.write_str("failed"),
            Self::Unknown(status) if status.is_empty() => f.write_str("<none>"),
            Self::Unknown(status) => f.write_str(status),
        }
    }
}

/// Options of a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Delete the source once the copy succeeded.
    pub delete_source: bool,
}

/// The result of a successful copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub source: BlobLocation,
    pub destination: BlobLocation,
    pub copy_id: Option<String>,
    pub source_deleted: bool,
}

/// Copy `source` into `destination` and verify the reported status.
/// On any status other than success the copy is aborted and the
/// invocation fails with [`Error::CopyFailed`]. Nothing is retried.
#[instrument(skip_all, fields(source = %source, destination = %destination))]
pub async fn copy_object<S: BlobStore>(
    store: &S,
    source: &BlobLocation,
    destination: &BlobLocation,
    options: CopyOptions,
) -> Result<CopyOutcome> {
    let source_url = store
        .source_url(source)
        .with_context(|| format!("Failed to authorize reading {}", source))?;
    info!(
        "Copying from {}://{}{}",
        source_url.scheme(),
        source_url.host_str().unwrap_or_default(),
        source_url.path()
    );

    store
        .start_copy_from_url(destination, &source_url)
        .await
        .with_context(|| format!("Failed to copy {} into {}", source, destination))?;
    let properties = store.copy_properties(destination).await?;
    let status = CopyStatus::from(properties.status.as_deref());

    if status != CopyStatus::Success {
        warn!("Copy into {} ended with status {}", destination, status);
        if let Some(copy_id) = &properties.id {
            if let Err(e) = store.abort_copy(destination, copy_id).await {
                warn!("Couldn't abort copy {:?} into {}: {:#}", copy_id, destination, e);
            }
        }
        return Err(Error::CopyFailed {
            source_key: source.to_string(),
            status: status.to_string(),
        }
        .into());
    }
    info!("Copied {} into {}", source, destination);

    if options.delete_source {
        store
            .delete_blob(source)
            .await
            .with_context(|| format!("Copied {} but failed to delete it", source))?;
        info!("Deleted {}", source);
    }

    Ok(CopyOutcome {
        source: source.clone(),
        destination: destination.clone(),
        copy_id: properties.id,
        source_deleted: options.delete_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{Call, RecordingStore};

    fn source() -> BlobLocation {
        BlobLocation {
            container: String::from("files"),
            blob: String::from("2024/report.csv"),
        }
    }

    fn destination() -> BlobLocation {
        BlobLocation {
            container: String::from("archive"),
            blob: String::from("2024-06-01/report.csv"),
        }
    }

    #[tokio::test]
    async fn successful_copy() {
        let store = RecordingStore::reporting("success");
        let outcome = copy_object(&store, &source(), &destination(), CopyOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.copy_id.as_deref(), Some("copy-1"));
        assert!(!outcome.source_deleted);
        assert_eq!(
            store.calls(),
            vec![
                Call::StartCopy {
                    destination: String::from("archive/2024-06-01/report.csv"),
                    source: String::from("files/2024/report.csv"),
                },
                Call::Properties(String::from("archive/2024-06-01/report.csv")),
            ]
        );
    }

    #[tokio::test]
    async fn pending_copy_is_aborted_once() {
        let store = RecordingStore::reporting("pending");
        let options = CopyOptions {
            delete_source: true,
        };
        let err = copy_object(&store, &source(), &destination(), options)
            .await
            .unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::CopyFailed { source_key, status }) => {
                assert_eq!(source_key, "files/2024/report.csv");
                assert_eq!(status, "pending");
            }
            other => panic!("unexpected error {:?}", other),
        }
        let calls = store.calls();
        let aborts: Vec<&Call> = calls
            .iter()
            .filter(|call| matches!(call, Call::Abort { .. }))
            .collect();
        assert_eq!(
            aborts,
            vec![&Call::Abort {
                destination: String::from("archive/2024-06-01/report.csv"),
                copy_id: String::from("copy-1"),
            }]
        );
        assert!(!calls.iter().any(|call| matches!(call, Call::Delete(_))));
        assert_eq!(
            calls
                .iter()
                .filter(|call| matches!(call, Call::StartCopy { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failure_message_omits_the_credential() {
        let store = RecordingStore::reporting("failed");
        let err = copy_object(&store, &source(), &destination(), CopyOptions::default())
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("files/2024/report.csv"));
        assert!(message.contains("failed"));
        assert!(!message.contains("secret"));
    }

    #[tokio::test]
    async fn abort_failure_still_reports_the_copy_failure() {
        let store = RecordingStore::reporting("failed").with_failing_abort();
        let err = copy_object(&store, &source(), &destination(), CopyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::CopyFailed { status, .. }) if status == "failed"
        ));
        assert_eq!(
            store
                .calls()
                .iter()
                .filter(|call| matches!(call, Call::Abort { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn source_deleted_when_requested() {
        let store = RecordingStore::reporting("success");
        let options = CopyOptions {
            delete_source: true,
        };
        let outcome = copy_object(&store, &source(), &destination(), options)
            .await
            .unwrap();
        assert!(outcome.source_deleted);
        assert_eq!(
            store.calls().last(),
            Some(&Call::Delete(String::from("files/2024/report.csv")))
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(CopyStatus::from(Some("success")), CopyStatus::Success);
        assert_eq!(CopyStatus::from(Some("pending")), CopyStatus::Pending);
        assert_eq!(CopyStatus::from(Some("weird")).to_string(), "weird");
        assert_eq!(CopyStatus::from(None).to_string(), "<none>");
    }
}
