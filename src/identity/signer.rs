// Copyright 2021 Dmitry Tantsur <dtantsur@protonmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Access/secret key request signing.
//!
//! Requests are signed with `SDK-HMAC-SHA256` over a canonical request, the
//! signature scope being `<date>/<region>/<service>/sdk_request`.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, HOST};
use http::Request;
use log::trace;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::{Error, ErrorKind, Result};

const ALGORITHM: &str = "SDK-HMAC-SHA256";
const TERMINATOR: &str = "sdk_request";
const DEFAULT_SERVICE: &str = "iam";

static SDK_DATE: HeaderName = HeaderName::from_static("x-sdk-date");
static PROJECT_ID: HeaderName = HeaderName::from_static("x-project-id");
static DOMAIN_ID: HeaderName = HeaderName::from_static("x-domain-id");
static SECURITY_TOKEN: HeaderName = HeaderName::from_static("x-security-token");

/// Unreserved characters stay as is.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same as query, but keeps path separators.
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with an access key and a secret key.
#[derive(Clone)]
pub struct RequestSigner {
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
    region: String,
    service: String,
    project_id: Option<String>,
    domain_id: Option<String>,
    time: Option<DateTime<Utc>>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .finish()
    }
}

impl RequestSigner {
    /// Create a signer.
    pub fn new<S1, S2>(access_key: S1, secret_key: S2) -> RequestSigner
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        RequestSigner {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
            region: String::new(),
            service: DEFAULT_SERVICE.to_string(),
            project_id: None,
            domain_id: None,
            time: None,
        }
    }

    /// Region used in the signature scope.
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = region.into();
        self
    }

    /// Service used in the signature scope.
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = service.into();
        self
    }

    /// Security token of temporary credentials.
    pub fn with_security_token<S: Into<String>>(mut self, token: S) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Project ID sent with every request.
    pub fn with_project_id<S: Into<String>>(mut self, project_id: S) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Domain ID sent with every request.
    pub fn with_domain_id<S: Into<String>>(mut self, domain_id: S) -> Self {
        self.domain_id = Some(domain_id.into());
        self
    }

    /// Specify the signing time.
    ///
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Access key.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Project ID, if set.
    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Sign the request in place.
    pub fn sign(&self, request: &mut Request<Bytes>) -> Result<()> {
        let now = self.time.unwrap_or_else(Utc::now);
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        if !request.headers().contains_key(HOST) {
            let host = request
                .uri()
                .authority()
                .map(|a| a.as_str().to_string())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidInput,
                        format!("Cannot sign request to {}: no host", request.uri()),
                    )
                })?;
            let _ = request.headers_mut().insert(HOST, header_value(&host)?);
        }

        let headers = request.headers_mut();
        let _ = headers.insert(SDK_DATE.clone(), header_value(&date_time)?);
        if let Some(ref project_id) = self.project_id {
            let _ = headers.insert(PROJECT_ID.clone(), header_value(project_id)?);
        }
        if let Some(ref domain_id) = self.domain_id {
            let _ = headers.insert(DOMAIN_ID.clone(), header_value(domain_id)?);
        }
        if let Some(ref token) = self.security_token {
            let mut value = header_value(token)?;
            value.set_sensitive(true);
            let _ = headers.insert(SECURITY_TOKEN.clone(), value);
        }
        let _ = headers.remove(AUTHORIZATION);

        let (canonical, signed_headers) = canonical_request(request);
        trace!("Canonical request: {}", canonical);

        let scope = format!("{}/{}/{}/{}", date, self.region, self.service, TERMINATOR);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            date_time,
            scope,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = self.signing_key(&date)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        let mut auth = header_value(&format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, scope, signed_headers, signature
        ))?;
        auth.set_sensitive(true);
        let _ = request.headers_mut().insert(AUTHORIZATION, auth);
        Ok(())
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>> {
        let secret = format!("SDK{}", self.secret_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, TERMINATOR.as_bytes())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid header value: {}", e),
        )
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Invalid key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Canonical request and the list of signed headers.
pub(crate) fn canonical_request(request: &Request<Bytes>) -> (String, String) {
    let path = decode(request.uri().path());
    let path = if path.is_empty() { "/".to_string() } else { path };

    let mut query: Vec<(String, String)> = request
        .uri()
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (
                utf8_percent_encode(&decode(k), QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(&decode(v), QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    query.sort();
    let query: Vec<String> = query.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();

    let mut names: Vec<&str> = request.headers().keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    let mut canonical_headers = String::new();
    for name in &names {
        let values: Vec<&str> = request
            .headers()
            .get_all(*name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .collect();
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(&values.join(","));
        canonical_headers.push('\n');
    }
    let signed_headers = names.join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        utf8_percent_encode(&path, PATH_ENCODE_SET),
        query.join("&"),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(request.body()))
    );
    (canonical, signed_headers)
}
