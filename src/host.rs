//! Defines the HTTP surface the function host invokes. Each function
//! is a `POST /<FunctionName>` route receiving the trigger bindings
//! as JSON and answering with the invocation result.

use crate::app::App;
use crate::client::BlobStore;
use crate::trigger::{BlobCreated, EventNotification, Trigger};
use anyhow::{anyhow, Context};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Route of the blob trigger function.
pub const BLOB_TRIGGER_ROUTE: &str = "/BlobWatch";

/// Route of the event trigger function.
pub const EVENT_TRIGGER_ROUTE: &str = "/BlobWatchGrid";

/// State shared by the routes.
pub struct Shared<S> {
    pub app: App,
    pub store: S,
    /// Name of the event trigger binding inside `Data`.
    pub event_binding: String,
}

/// An invocation as sent by the function host.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationRequest {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// The answer to an invocation.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationResponse {
    pub outputs: Map<String, Value>,
    pub logs: Vec<String>,
    pub return_value: Value,
}

impl InvocationResponse {
    fn logged(line: String) -> Self {
        Self {
            logs: vec![line],
            ..Default::default()
        }
    }
}

/// A failed invocation.
#[derive(Debug)]
pub enum InvocationError {
    /// The payload doesn't describe a trigger.
    BadRequest(anyhow::Error),
    /// Handling the trigger failed.
    Failed(anyhow::Error),
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            InvocationError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            InvocationError::Failed(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        warn!("Invocation failed: {:#}", error);
        (status, Json(InvocationResponse::logged(format!("{:#}", error)))).into_response()
    }
}

impl InvocationRequest {
    /// Read the blob trigger metadata: the object name and, when
    /// available, its length.
    pub fn blob_created(&self) -> anyhow::Result<BlobCreated> {
        let name = ["BlobTrigger", "name"]
            .iter()
            .find_map(|field| self.metadata.get(*field).and_then(Value::as_str))
            .ok_or_else(|| anyhow!("The invocation metadata has no BlobTrigger"))?;
        let length = self
            .metadata
            .get("Properties")
            .and_then(|properties| {
                properties
                    .get("ContentLength")
                    .or_else(|| properties.get("Length"))
            })
            .and_then(Value::as_u64);
        Ok(BlobCreated {
            name: name.to_string(),
            length,
        })
    }

    /// Read the event bound to `binding`, given either as an object
    /// or as a JSON-encoded string.
    pub fn event(&self, binding: &str) -> anyhow::Result<EventNotification> {
        let value = self
            .data
            .get(binding)
            .ok_or_else(|| anyhow!("The invocation data has no {:?} binding", binding))?;
        let event = match value {
            Value::String(encoded) => serde_json::from_str(encoded),
            other => serde_json::from_value(other.clone()),
        }
        .with_context(|| format!("The {:?} binding is not an event", binding))?;
        Ok(event)
    }
}

async fn invoke<S: BlobStore>(
    shared: &Shared<S>,
    trigger: Trigger,
) -> Result<Json<InvocationResponse>, InvocationError> {
    let outcome = shared
        .app
        .handle(&trigger, &shared.store)
        .await
        .map_err(InvocationError::Failed)?;
    let line = match outcome {
        Some(outcome) => format!("Copied {} into {}", outcome.source, outcome.destination),
        None => String::from("Ignored event"),
    };
    Ok(Json(InvocationResponse::logged(line)))
}

async fn blob_trigger<S: BlobStore + 'static>(
    State(shared): State<Arc<Shared<S>>>,
    Json(request): Json<InvocationRequest>,
) -> Result<Json<InvocationResponse>, InvocationError> {
    let blob = request
        .blob_created()
        .map_err(InvocationError::BadRequest)?;
    invoke(&shared, Trigger::BlobCreated(blob)).await
}

async fn event_trigger<S: BlobStore + 'static>(
    State(shared): State<Arc<Shared<S>>>,
    Json(request): Json<InvocationRequest>,
) -> Result<Json<InvocationResponse>, InvocationError> {
    let event = request
        .event(&shared.event_binding)
        .map_err(InvocationError::BadRequest)?;
    invoke(&shared, Trigger::Event(event)).await
}

/// Build the router serving both functions.
pub fn router<S: BlobStore + 'static>(shared: Arc<Shared<S>>) -> Router {
    Router::new()
        .route(BLOB_TRIGGER_ROUTE, post(blob_trigger::<S>))
        .route(EVENT_TRIGGER_ROUTE, post(event_trigger::<S>))
        .with_state(shared)
}
