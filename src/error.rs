// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Error and Result implementations.

use std::fmt;

use reqwest::StatusCode;

/// Kind of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Authentication failure
    ///
    /// Maps to HTTP 401.
    AuthenticationFailed,

    /// Access denied.
    ///
    /// Maps to HTTP 403.
    AccessDenied,

    /// Requested resource was not found.
    ///
    /// Roughly maps to HTTP 404 and 410.
    ResourceNotFound,

    /// A lookup by name returned more than one resource.
    AmbiguousResource,

    /// Requested service endpoint was not found.
    EndpointNotFound,

    /// More than one endpoint matches the query.
    AmbiguousEndpoints,

    /// Endpoint interface is not one of `public`, `internal` or `admin`.
    InvalidInterface,

    /// The identity service does not advertise any supported version.
    NoSupportedVersion,

    /// The credential combination cannot be handled.
    UnknownCredential,

    /// Invalid value passed to one of paremeters.
    ///
    /// May be result of HTTP 400.
    InvalidInput,

    /// Configuration is missing or cannot be used.
    InvalidConfig,

    /// Conflict in the request.
    Conflict,

    /// Protocol-level error reported by underlying HTTP library.
    ProtocolError,

    /// Response received from the server is malformed.
    InvalidResponse,

    /// Internal server error.
    ///
    /// Maps to HTTP 5xx codes.
    InternalServerError,

    /// Re-authentication was abandoned before it finished.
    Cancelled,
}

/// Error from an OpenStack call.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    status: Option<StatusCode>,
    message: Option<String>,
    candidates: Vec<String>,
}

/// Result of an OpenStack call.
pub type Result<T> = ::std::result::Result<T, Error>;

impl Error {
    /// Create a new error of the provided kind.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Error {
        Error {
            kind,
            status: None,
            message: Some(message.into()),
            candidates: Vec::new(),
        }
    }

    /// Create with providing all details.
    pub(crate) fn new_with_details(
        kind: ErrorKind,
        status: Option<StatusCode>,
        message: Option<String>,
    ) -> Error {
        Error {
            kind,
            status,
            message,
            candidates: Vec::new(),
        }
    }

    /// Create an error from an HTTP status and response body.
    pub(crate) fn from_status(status: StatusCode, body: &[u8]) -> Error {
        let body = String::from_utf8_lossy(body).trim().to_string();
        let message = if body.is_empty() {
            format!("HTTP error {}", status)
        } else {
            format!("HTTP error {}: {}", status, body)
        };
        Error::new_with_details(ErrorKind::from_status(status), Some(status), Some(message))
    }

    /// Error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status code (if any).
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Error message (if any).
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Candidate URLs for `AmbiguousEndpoints` errors.
    #[inline]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Helper - error of kind EndpointNotFound.
    pub(crate) fn new_endpoint_not_found<D: fmt::Display>(service_type: D) -> Error {
        Error::new(
            ErrorKind::EndpointNotFound,
            format!("Endpoint for service {} was not found", service_type),
        )
    }

    /// Helper - error of kind AmbiguousEndpoints.
    pub(crate) fn new_ambiguous_endpoints<D: fmt::Display>(
        service_type: D,
        candidates: Vec<String>,
    ) -> Error {
        Error {
            kind: ErrorKind::AmbiguousEndpoints,
            status: None,
            message: Some(format!(
                "{} endpoints match service {}",
                candidates.len(),
                service_type
            )),
            candidates,
        }
    }
}

impl ErrorKind {
    /// Short description of the error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "Failed to authenticate",
            ErrorKind::AccessDenied => "Access to the resource is denied",
            ErrorKind::ResourceNotFound => "Requested resource was not found",
            ErrorKind::AmbiguousResource => "More than one resource matches the name",
            ErrorKind::EndpointNotFound => "Requested endpoint was not found",
            ErrorKind::AmbiguousEndpoints => "More than one endpoint matches the query",
            ErrorKind::InvalidInterface => "Invalid endpoint interface",
            ErrorKind::NoSupportedVersion => "No supported identity API version",
            ErrorKind::UnknownCredential => "Unrecognized credential combination",
            ErrorKind::InvalidInput => "Input value(s) are invalid or missing",
            ErrorKind::InvalidConfig => "Configuration is invalid or missing",
            ErrorKind::Conflict => "Requested cannot be fulfilled due to a conflict",
            ErrorKind::ProtocolError => "Error when accessing the server",
            ErrorKind::InvalidResponse => "Received invalid response",
            ErrorKind::InternalServerError => "Internal server error or bad gateway",
            ErrorKind::Cancelled => "Re-authentication was cancelled",
        }
    }

    /// Error kind matching an HTTP status code.
    pub fn from_status(status: StatusCode) -> ErrorKind {
        match status {
            StatusCode::UNAUTHORIZED => ErrorKind::AuthenticationFailed,
            StatusCode::FORBIDDEN => ErrorKind::AccessDenied,
            StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::ResourceNotFound,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            c if c.is_client_error() => ErrorKind::InvalidInput,
            c if c.is_server_error() => ErrorKind::InternalServerError,
            _ => ErrorKind::InvalidResponse,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ref msg) = self.message {
            write!(f, ": {}", msg)?;
        }

        if !self.candidates.is_empty() {
            write!(f, " ({})", self.candidates.join(", "))?;
        }

        Ok(())
    }
}

impl ::std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Error {
        let msg = value.to_string();
        let kind = match value.status() {
            Some(status) => ErrorKind::from_status(status),
            None if value.is_decode() => ErrorKind::InvalidResponse,
            None => ErrorKind::ProtocolError,
        };

        Error::new_with_details(kind, value.status(), Some(msg))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Error {
        Error::new(ErrorKind::InvalidResponse, value.to_string())
    }
}

impl From<http::Error> for Error {
    fn from(value: http::Error) -> Error {
        Error::new(ErrorKind::InvalidInput, value.to_string())
    }
}
