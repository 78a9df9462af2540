// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Low-level HTTP utilities.
//!
//! All identity and service calls go through a [Transport](trait.Transport.html). The transport
//! only moves bytes: it does not interpret status codes, retry or enforce timeouts.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{Method, Request, Response};
use log::trace;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Error, ErrorKind, Result};

/// HTTP transport used by the session.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Send a request and return the response, whatever its status code.
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>>;
}

/// Transport based on `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a pre-configured `reqwest` client.
    pub fn new(client: Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let request = reqwest::Request::try_from(request)?;
        trace!("Sending {} {}", request.method(), request.url());
        let resp = self.client.execute(request).await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        let mut response = Response::builder().status(status).body(body)?;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Check the response status, converting failures into errors.
pub fn check(response: Response<Bytes>) -> Result<Response<Bytes>> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::from_status(status, response.body()))
    }
}

/// Decode a JSON body.
pub(crate) fn parse_json<T: DeserializeOwned>(response: &Response<Bytes>) -> Result<T> {
    serde_json::from_slice(response.body()).map_err(|e| {
        Error::new(
            ErrorKind::InvalidResponse,
            format!("Cannot decode JSON response: {}", e),
        )
    })
}

/// Build a GET request accepting JSON.
pub(crate) fn get(url: &Url) -> Result<Request<Bytes>> {
    Ok(Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .body(Bytes::new())?)
}

/// Build a POST request with a JSON body.
pub(crate) fn post_json<T: Serialize>(url: &Url, body: &T) -> Result<Request<Bytes>> {
    let body = serde_json::to_vec(body)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Cannot encode JSON: {}", e)))?;
    Ok(Request::builder()
        .method(Method::POST)
        .uri(url.as_str())
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(Bytes::from(body))?)
}

/// Copy a request so that it can be sent again.
pub(crate) fn clone_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}
