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

//! In-memory cloud used by the integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use serde_json::Value;

use osprovider::transport::Transport;
use osprovider::Result;

static INIT: Once = Once::new();

pub fn set_up() {
    INIT.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

type Handler = dyn Fn(&Request<Bytes>) -> Response<Bytes> + Send + Sync;

/// Transport answering requests with a handler and recording them.
#[derive(Clone)]
pub struct FakeCloud {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl fmt::Debug for FakeCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeCloud").finish()
    }
}

impl FakeCloud {
    pub fn new<F>(handler: F) -> FakeCloud
    where
        F: Fn(&Request<Bytes>) -> Response<Bytes> + Send + Sync + 'static,
    {
        FakeCloud {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Recorded requests as `METHOD url`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded requests starting with the prefix.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for FakeCloud {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method(), request.uri()));
        Ok((self.handler)(&request))
    }
}

pub fn json_response(status: u16, body: Value) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header("content-type", "application/json")
        .body(Bytes::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn token_response(token: &str, body: Value) -> Response<Bytes> {
    let mut resp = json_response(201, body);
    let _ = resp
        .headers_mut()
        .insert("x-subject-token", token.parse().unwrap());
    resp
}

pub fn not_found() -> Response<Bytes> {
    json_response(404, serde_json::json!({"error": {"message": "not found"}}))
}

pub fn body_json(request: &Request<Bytes>) -> Value {
    serde_json::from_slice(request.body()).unwrap()
}

pub fn header<'r>(request: &'r Request<Bytes>, name: &str) -> Option<&'r str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `METHOD path?query` of a request.
pub fn route(request: &Request<Bytes>) -> String {
    let uri = request.uri();
    format!(
        "{} {}",
        request.method(),
        uri.path_and_query().map_or(uri.path(), |pq| pq.as_str())
    )
}
