//! Defines a _trigger_, the input of a handler invocation. A trigger
//! is either the creation of an object, as notified by a blob
//! trigger, or a generic event notification that may describe one.

use crate::path::{relativize, ObjectKey};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use url::Url;

/// The event type of a notification about a created object.
pub const BLOB_CREATED_EVENT_TYPE: &str = "Microsoft.Storage.BlobCreated";

/// Matches the subject of object events, capturing the container and
/// the object path.
static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/blobServices/default/containers/(?P<container>[^/]+)/blobs/(?P<blob>.+)$")
        .expect("subject regex is valid")
});

/// A newly created object, as notified by a blob trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobCreated {
    /// The full key of the object, container included.
    pub name: String,
    /// The size of the object in bytes, when known.
    pub length: Option<u64>,
}

/// A generic event notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "eventType", alias = "event_type")]
    pub event_type: String,
}

impl EventNotification {
    pub fn is_blob_created(&self) -> bool {
        self.event_type == BLOB_CREATED_EVENT_TYPE
    }

    /// The key of the object the event is about, taken from the
    /// subject or else from the URL in the event data. For path-style
    /// endpoints, `endpoint_path` is the part of the URL path that
    /// precedes the container.
    pub fn object_key(&self, endpoint_path: &ObjectKey) -> Option<ObjectKey> {
        if let Some(captures) = SUBJECT_RE.captures(&self.subject) {
            return Some(ObjectKey::parse(&format!(
                "{}/{}",
                &captures["container"], &captures["blob"]
            )));
        }
        let url = Url::parse(self.data.get("url")?.as_str()?).ok()?;
        let path = ObjectKey::parse(&percent_decode_str(url.path()).decode_utf8().ok()?);
        let key = relativize(&path, endpoint_path).ok()?;
        (key.len() > 1).then_some(key)
    }
}

/// The input of a handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    BlobCreated(BlobCreated),
    Event(EventNotification),
}

impl Trigger {
    /// The key of the created object this trigger is about, or
    /// `None` when the trigger isn't about a created object and must
    /// be ignored. `endpoint_path` is as in
    /// [`EventNotification::object_key`].
    #[instrument]
    pub fn source_key(&self, endpoint_path: &ObjectKey) -> Result<Option<ObjectKey>> {
        match self {
            Trigger::BlobCreated(blob) => Ok(Some(ObjectKey::parse(&blob.name))),
            Trigger::Event(event) if event.is_blob_created() => {
                event.object_key(endpoint_path).map(Some).ok_or_else(|| {
                    anyhow!(
                        "Event {:?} with subject {:?} doesn't name an object",
                        event.id,
                        event.subject
                    )
                })
            }
            Trigger::Event(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, subject: &str, data: Value) -> EventNotification {
        serde_json::from_value(json!({
            "id": "a1",
            "topic": "/subscriptions/x/resourceGroups/y/providers/Microsoft.Storage/storageAccounts/acct",
            "subject": subject,
            "eventType": event_type,
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn blob_trigger_key() {
        let trigger = Trigger::BlobCreated(BlobCreated {
            name: String::from("files/2024/report.csv"),
            length: Some(12),
        });
        assert_eq!(
            trigger.source_key(&ObjectKey::default()).unwrap(),
            Some(ObjectKey::parse("/files/2024/report.csv"))
        );
    }

    #[test]
    fn created_event_key_from_subject() {
        let trigger = Trigger::Event(event(
            BLOB_CREATED_EVENT_TYPE,
            "/blobServices/default/containers/files/blobs/2024/report.csv",
            json!({}),
        ));
        assert_eq!(
            trigger.source_key(&ObjectKey::default()).unwrap(),
            Some(ObjectKey::parse("files/2024/report.csv"))
        );
    }

    #[test]
    fn created_event_key_from_url() {
        let trigger = Trigger::Event(event(
            BLOB_CREATED_EVENT_TYPE,
            "unexpected",
            json!({"url": "https://acct.blob.core.windows.net/files/2024/my%20report.csv"}),
        ));
        assert_eq!(
            trigger.source_key(&ObjectKey::default()).unwrap(),
            Some(ObjectKey::parse("files/2024/my report.csv"))
        );
    }

    #[test]
    fn created_event_key_from_path_style_url() {
        let trigger = Trigger::Event(event(
            BLOB_CREATED_EVENT_TYPE,
            "unexpected",
            json!({"url": "http://127.0.0.1:10000/devstoreaccount1/files/2024/report.csv"}),
        ));
        assert_eq!(
            trigger
                .source_key(&ObjectKey::parse("/devstoreaccount1"))
                .unwrap(),
            Some(ObjectKey::parse("files/2024/report.csv"))
        );
        // A URL outside the endpoint doesn't name an object of the account.
        let trigger = Trigger::Event(event(
            BLOB_CREATED_EVENT_TYPE,
            "unexpected",
            json!({"url": "http://127.0.0.1:10000/otheraccount/files/report.csv"}),
        ));
        assert!(trigger
            .source_key(&ObjectKey::parse("/devstoreaccount1"))
            .is_err());
    }

    #[test]
    fn created_event_without_key_fails() {
        let trigger = Trigger::Event(event(BLOB_CREATED_EVENT_TYPE, "unexpected", json!({})));
        assert!(trigger.source_key(&ObjectKey::default()).is_err());
    }

    #[test]
    fn other_events_are_ignored() {
        let trigger = Trigger::Event(event(
            "Microsoft.Storage.BlobDeleted",
            "/blobServices/default/containers/files/blobs/report.csv",
            json!({}),
        ));
        assert_eq!(trigger.source_key(&ObjectKey::default()).unwrap(), None);
    }

    #[test]
    fn snake_case_event_type_is_accepted() {
        let event: EventNotification = serde_json::from_value(json!({
            "id": "a1",
            "subject": "/blobServices/default/containers/files/blobs/a.csv",
            "event_type": BLOB_CREATED_EVENT_TYPE,
        }))
        .unwrap();
        assert!(event.is_blob_created());
        assert_eq!(event.data, Value::Null);
    }
}
