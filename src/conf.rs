//! Defines configuration as read from the environment.

use serde::Deserialize;

/// Default `date_format` value.
fn default_date_format() -> String {
    String::from("%Y-%m-%d")
}

/// Default `blob_name_var` value.
fn default_blob_name_var() -> String {
    String::from("BLOB_NAME")
}

/// Default `functions_customhandler_port` value.
fn default_port() -> u16 {
    8080
}

/// Default `event_binding` value.
fn default_event_binding() -> String {
    String::from("event")
}

/// The handlers copy newly created objects from a watched root to a
/// date-partitioned destination root. The configuration must be
/// given as environment variables, which are matched regardless of
/// case (`input_PATH` fills `input_path`).
#[derive(Clone, Deserialize)]
pub struct Settings {
    /// The watched root: a container, optionally followed by a path
    /// inside it, e.g. `/files/incoming`. Objects that trigger the
    /// handlers must be located under it.
    pub input_path: String,

    /// The destination root: a container, optionally followed by a
    /// path inside it. Copies land under
    /// `<output_path>/<date>/<path relative to input_path>`.
    pub output_path: String,

    /// The storage account connection string.
    pub app_storage: String,

    /// Delete the source object once it's been copied. Disabled
    /// unless explicitly requested.
    #[serde(default)]
    pub delete_after_copy: bool,

    /// The strftime pattern used to name the date partition. Dates
    /// are taken in UTC.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// The environment variable holding the name of the triggering
    /// object, read by the one-shot command.
    #[serde(default = "default_blob_name_var")]
    pub blob_name_var: String,
}

/// Settings of the HTTP surface that the function host talks to.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    /// The port the function host expects the handler to listen on.
    #[serde(default = "default_port")]
    pub functions_customhandler_port: u16,

    /// The name of the event trigger binding in invocation payloads.
    #[serde(default = "default_event_binding")]
    pub event_binding: String,
}
