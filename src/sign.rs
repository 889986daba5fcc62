//! Defines the signatures that authorize requests against the
//! storage account: account-level SAS tokens handed to the service
//! as part of a copy source, and Shared Key headers for the requests
//! the handlers issue themselves.

use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use itertools::Itertools;
use sha2::Sha256;
use std::fmt;
use url::{form_urlencoded, Url};

/// Service version used to sign SAS tokens and to call the REST API.
pub const STORAGE_VERSION: &str = "2021-08-06";

/// How long a minted SAS token stays valid.
pub const SAS_LIFETIME_HOURS: i64 = 1;

type HmacSha256 = Hmac<Sha256>;

/// Sign a message with the account key, producing a base64 digest.
fn sign(key: &[u8], message: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow!("Invalid account key: {}", e))?;
    mac.update(message.as_bytes());
    Ok(Base64::encode_string(&mac.finalize().into_bytes()))
}

/// An account SAS granting read access to objects in the blob
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSas {
    pub permissions: &'static str,
    pub services: &'static str,
    pub resource_types: &'static str,
    pub protocol: &'static str,
    pub expiry: DateTime<Utc>,
}

impl AccountSas {
    /// Read-only access to blob objects, until `now` plus the SAS
    /// lifetime.
    pub fn read_objects(now: DateTime<Utc>, allow_http: bool) -> Self {
        Self {
            permissions: "r",
            services: "b",
            resource_types: "o",
            protocol: if allow_http { "https,http" } else { "https" },
            expiry: now + Duration::hours(SAS_LIFETIME_HOURS),
        }
    }

    fn expiry_string(&self) -> String {
        self.expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// The string signed for an account SAS: account, permissions,
    /// services, resource types, start, expiry, IP range, protocol,
    /// version and encryption scope, each followed by a newline.
    pub fn string_to_sign(&self, account: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}\n\n{}\n\n{}\n{}\n\n",
            account,
            self.permissions,
            self.services,
            self.resource_types,
            self.expiry_string(),
            self.protocol,
            STORAGE_VERSION,
        )
    }

    /// Sign the SAS with the account key.
    pub fn token(&self, account: &str, key: &[u8]) -> Result<SasToken> {
        let signature = sign(key, &self.string_to_sign(account))?;
        Ok(SasToken(
            form_urlencoded::Serializer::new(String::new())
                .append_pair("sv", STORAGE_VERSION)
                .append_pair("ss", self.services)
                .append_pair("srt", self.resource_types)
                .append_pair("sp", self.permissions)
                .append_pair("se", &self.expiry_string())
                .append_pair("spr", self.protocol)
                .append_pair("sig", &signature)
                .finish(),
        ))
    }
}

/// A signed SAS query string. Its `Debug` output is redacted so the
/// credential doesn't leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken(String);

impl SasToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Authorize `url` with this token, replacing any query it had.
    pub fn authorize(&self, url: &Url) -> Url {
        let mut authorized = url.clone();
        authorized.set_query(Some(&self.0));
        authorized
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SasToken(..)")
    }
}

/// The date format expected by the `x-ms-date` header.
pub fn request_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The Shared Key string to sign for a request without body or
/// standard conditional headers. `ms_headers` are the `x-ms-*`
/// headers sent along.
pub fn shared_key_string_to_sign(
    method: &str,
    url: &Url,
    account: &str,
    ms_headers: &[(&str, String)],
) -> String {
    let canonicalized_headers = ms_headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim()))
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(name, value)| format!("{}:{}", name, value))
        .join("\n");
    let mut canonicalized_resource = format!("/{}{}", account, url.path());
    for (name, values) in &url
        .query_pairs()
        .map(|(name, value)| (name.to_lowercase(), value.into_owned()))
        .sorted()
        .group_by(|(name, _)| name.clone())
    {
        canonicalized_resource.push_str(&format!(
            "\n{}:{}",
            name,
            values.map(|(_, value)| value).join(",")
        ));
    }
    // The eleven standard headers between the verb and the
    // canonicalized headers are all empty.
    format!(
        "{}\n\n\n\n\n\n\n\n\n\n\n\n{}\n{}",
        method, canonicalized_headers, canonicalized_resource
    )
}

/// The `Authorization` header value for a Shared Key request.
pub fn shared_key_authorization(
    method: &str,
    url: &Url,
    account: &str,
    key: &[u8],
    ms_headers: &[(&str, String)],
) -> Result<String> {
    let signature = sign(
        key,
        &shared_key_string_to_sign(method, url, account, ms_headers),
    )?;
    Ok(format!("SharedKey {}:{}", account, signature))
}
