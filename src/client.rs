//! Defines the storage collaborator: the handful of blob service
//! operations a copy needs, and their implementation over the blob
//! service REST API.

use crate::path::{BlobLocation, ObjectKey};
use crate::sign::{request_date, shared_key_authorization, AccountSas, STORAGE_VERSION};
use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Method, Response};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::debug;
use url::Url;

/// Account name of the local storage emulator.
const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";

/// Well-known account key of the local storage emulator.
const DEVELOPMENT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob endpoint of the local storage emulator.
const DEVELOPMENT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// The copy state of an object, as reported by its properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyProperties {
    pub id: Option<String>,
    pub status: Option<String>,
}

/// The operations of the storage service used to copy an object.
pub trait BlobStore: Send + Sync {
    /// A URL the service can read `source` from. Carries its own
    /// short-lived credential.
    fn source_url(&self, source: &BlobLocation) -> Result<Url>;

    /// Copy the object at `source_url` into `destination`, waiting
    /// for the copy to complete.
    fn start_copy_from_url(
        &self,
        destination: &BlobLocation,
        source_url: &Url,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read back the copy state of `destination`.
    fn copy_properties(
        &self,
        destination: &BlobLocation,
    ) -> impl Future<Output = Result<CopyProperties>> + Send;

    /// Abort the copy identified by `copy_id` into `destination`.
    fn abort_copy(
        &self,
        destination: &BlobLocation,
        copy_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete the object at `location`.
    fn delete_blob(&self, location: &BlobLocation) -> impl Future<Output = Result<()>> + Send;
}

/// A storage account, as described by a connection string.
#[derive(Clone)]
pub struct StorageAccount {
    pub name: String,
    key: Vec<u8>,
    pub blob_endpoint: Url,
}

impl StorageAccount {
    /// Parse a `Key=Value;Key=Value` connection string. Keys are
    /// matched regardless of case.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut fields = HashMap::new();
        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| {
                    anyhow!(
                        "Malformed connection string segment {:?}",
                        part.chars().take(16).collect::<String>()
                    )
                })?;
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        if fields
            .get("usedevelopmentstorage")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                name: String::from(DEVELOPMENT_ACCOUNT),
                key: Base64::decode_vec(DEVELOPMENT_KEY)
                    .map_err(|e| anyhow!("Invalid development account key: {}", e))?,
                blob_endpoint: Url::parse(DEVELOPMENT_BLOB_ENDPOINT)?,
            });
        }

        let name = fields
            .remove("accountname")
            .ok_or_else(|| anyhow!("The connection string has no AccountName"))?;
        let key = fields
            .remove("accountkey")
            .ok_or_else(|| anyhow!("The connection string has no AccountKey"))
            .and_then(|key| {
                Base64::decode_vec(&key)
                    .map_err(|e| anyhow!("AccountKey is not valid base64: {}", e))
            })?;
        let blob_endpoint = match fields.remove("blobendpoint") {
            Some(endpoint) => endpoint,
            None => format!(
                "{}://{}.blob.{}",
                fields
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https"),
                name,
                fields
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net"),
            ),
        };
        let blob_endpoint = Url::parse(&blob_endpoint)
            .with_context(|| format!("Invalid blob endpoint {:?}", blob_endpoint))?;
        if blob_endpoint.cannot_be_a_base() {
            return Err(anyhow!("Invalid blob endpoint {:?}", blob_endpoint.as_str()));
        }
        Ok(Self {
            name,
            key,
            blob_endpoint,
        })
    }

    /// The path of the blob endpoint, which prefixes container names
    /// in object URLs.
    pub fn endpoint_path(&self) -> ObjectKey {
        ObjectKey::parse(self.blob_endpoint.path())
    }

    /// The URL of an object. Each path segment is percent-encoded on
    /// its own, so separators inside the object path are kept.
    pub fn blob_url(&self, location: &BlobLocation) -> Result<Url> {
        let mut url = self.blob_endpoint.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid blob endpoint {:?}", self.blob_endpoint.as_str()))?
            .pop_if_empty()
            .push(&location.container)
            .extend(location.blob.split('/'));
        Ok(url)
    }

    /// The URL of an object, authorized for reading with a fresh
    /// account SAS.
    pub fn readable_blob_url(&self, location: &BlobLocation, now: DateTime<Utc>) -> Result<Url> {
        let sas = AccountSas::read_objects(now, self.blob_endpoint.scheme() == "http")
            .token(&self.name, &self.key)?;
        Ok(sas.authorize(&self.blob_url(location)?))
    }
}

impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// A [`BlobStore`] talking to the blob service REST API, authorized
/// with the account key.
#[derive(Debug, Clone)]
pub struct AzureBlobClient {
    account: StorageAccount,
    http: reqwest::Client,
}

impl AzureBlobClient {
    pub fn new(account: StorageAccount) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create the HTTP client")?;
        Ok(Self { account, http })
    }

    pub fn account(&self) -> &StorageAccount {
        &self.account
    }

    /// Send a signed request without body, failing on any non-2xx
    /// response.
    async fn send(
        &self,
        method: Method,
        url: Url,
        extra_headers: Vec<(&'static str, String)>,
        operation: &str,
    ) -> Result<Response> {
        let mut ms_headers = vec![
            ("x-ms-date", request_date(Utc::now())),
            ("x-ms-version", String::from(STORAGE_VERSION)),
        ];
        ms_headers.extend(extra_headers);
        let authorization = shared_key_authorization(
            method.as_str(),
            &url,
            &self.account.name,
            &self.account.key,
            &ms_headers,
        )?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, authorization);
        if method == Method::PUT {
            request = request.header(CONTENT_LENGTH, "0");
        }
        for (name, value) in &ms_headers {
            request = request.header(*name, value);
        }

        debug!("{} {}", method, url.path());
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to {} {:?}", operation, url.path()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Failed to {} {:?}: HTTP {} - {}",
                operation,
                url.path(),
                status,
                body
            ));
        }
        Ok(response)
    }
}

/// Read a header as a string, if present and printable.
fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

impl BlobStore for AzureBlobClient {
    fn source_url(&self, source: &BlobLocation) -> Result<Url> {
        self.account.readable_blob_url(source, Utc::now())
    }

    async fn start_copy_from_url(&self, destination: &BlobLocation, source_url: &Url) -> Result<()> {
        self.send(
            Method::PUT,
            self.account.blob_url(destination)?,
            vec![
                ("x-ms-copy-source", String::from(source_url.as_str())),
                ("x-ms-requires-sync", String::from("true")),
            ],
            "copy into",
        )
        .await?;
        Ok(())
    }

    async fn copy_properties(&self, destination: &BlobLocation) -> Result<CopyProperties> {
        let response = self
            .send(
                Method::HEAD,
                self.account.blob_url(destination)?,
                Vec::new(),
                "read the properties of",
            )
            .await?;
        Ok(CopyProperties {
            id: header(&response, "x-ms-copy-id"),
            status: header(&response, "x-ms-copy-status"),
        })
    }

    async fn abort_copy(&self, destination: &BlobLocation, copy_id: &str) -> Result<()> {
        let mut url = self.account.blob_url(destination)?;
        url.query_pairs_mut()
            .append_pair("comp", "copy")
            .append_pair("copyid", copy_id);
        self.send(
            Method::PUT,
            url,
            vec![("x-ms-copy-action", String::from("abort"))],
            "abort the copy into",
        )
        .await?;
        Ok(())
    }

    async fn delete_blob(&self, location: &BlobLocation) -> Result<()> {
        self.send(
            Method::DELETE,
            self.account.blob_url(location)?,
            Vec::new(),
            "delete",
        )
        .await?;
        Ok(())
    }
}
