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

//! Identity service: version negotiation, credential flows and the service catalog.
//!
//! Both Identity API v2.0 and v3 are supported. Access/secret key credentials
//! only work with v3 and never receive a token, requests are signed instead.

mod catalog;
pub(crate) mod flows;
pub(crate) mod protocol;
mod signer;
mod version;

use std::sync::Arc;

use reqwest::Url;

pub use self::catalog::{CatalogEntry, Endpoint, EndpointQuery, Interface, ServiceCatalog};
pub use self::signer::RequestSigner;
pub use self::version::{ProtocolVersion, SUPPORTED_VERSIONS, V2, V3};

use crate::transport::Transport;
use crate::utils::split_identity_endpoint;
use crate::Result;

const SUBJECT_TOKEN_HEADER: &str = "x-subject-token";
const TENANT_ID_PLACEHOLDER: &str = "$(tenant_id)s";

/// Location of the identity service and the transport to reach it.
#[derive(Debug, Clone)]
pub(crate) struct IdentityClient {
    pub transport: Arc<dyn Transport>,
    /// Identity root without a version, ends with a slash.
    pub base: Url,
    /// Endpoint as provided by the caller, ends with a slash.
    pub endpoint: Url,
}

impl IdentityClient {
    pub fn new(identity_endpoint: &str, transport: Arc<dyn Transport>) -> Result<IdentityClient> {
        let (base, endpoint) = split_identity_endpoint(identity_endpoint)?;
        Ok(IdentityClient {
            transport,
            base,
            endpoint,
        })
    }
}
