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

//! Service clients.
//!
//! Many services are not present in the catalog under their own type. Their
//! endpoints are derived from the endpoint of another service by rewriting
//! the host name and the version segment. Each rule is a
//! [ServiceSpec](struct.ServiceSpec.html) registered by name in a
//! [ServiceRegistry](struct.ServiceRegistry.html).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::{Method, Request, Response};
use log::debug;
use reqwest::Url;

use super::identity::EndpointQuery;
use super::session::ProviderSession;
use super::utils::{normalize_url, parse_url};
use super::Result;

const PROJECT_ID_PLACEHOLDER: &str = "{project_id}";

/// How to build a client for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service type to look up in the catalog.
    pub catalog_type: &'static str,
    /// Substring replacements applied to the located URL, in order.
    pub substitutions: &'static [(&'static str, &'static str)],
    /// Version segment replacement applied before the substitutions.
    pub version: Option<(&'static str, &'static str)>,
    /// Appended to the rewritten URL to form the endpoint.
    pub endpoint_suffix: &'static str,
    /// Appended to the endpoint to form the resource base.
    pub resource_base: &'static str,
    /// URL used instead of the located one.
    pub fixed_endpoint: Option<&'static str>,
}

/// Service rules by name.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    specs: HashMap<String, ServiceSpec>,
}

/// A client for one service bound to a session.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    session: Arc<ProviderSession>,
    service: String,
    endpoint: Url,
    resource_base: Url,
}

impl ServiceSpec {
    /// Use the catalog endpoint of a service type as is.
    pub const fn plain(catalog_type: &'static str) -> ServiceSpec {
        ServiceSpec {
            catalog_type,
            substitutions: &[],
            version: None,
            endpoint_suffix: "",
            resource_base: "",
            fixed_endpoint: None,
        }
    }

    /// Add host substitutions.
    pub const fn with_substitutions(
        mut self,
        substitutions: &'static [(&'static str, &'static str)],
    ) -> ServiceSpec {
        self.substitutions = substitutions;
        self
    }

    /// Replace a version segment.
    pub const fn with_version(mut self, from: &'static str, to: &'static str) -> ServiceSpec {
        self.version = Some((from, to));
        self
    }

    /// Append a suffix to the endpoint.
    pub const fn with_endpoint_suffix(mut self, suffix: &'static str) -> ServiceSpec {
        self.endpoint_suffix = suffix;
        self
    }

    /// Set the resource base, `{project_id}` is replaced by the project ID.
    pub const fn with_resource_base(mut self, resource_base: &'static str) -> ServiceSpec {
        self.resource_base = resource_base;
        self
    }

    /// Ignore the located URL and use a fixed one.
    pub const fn with_fixed_endpoint(mut self, endpoint: &'static str) -> ServiceSpec {
        self.fixed_endpoint = Some(endpoint);
        self
    }

    /// Rewrite a located URL into the endpoint and the resource base.
    pub fn rewrite(&self, located: &str, project_id: &str) -> Result<(Url, Url)> {
        let mut url = self.fixed_endpoint.unwrap_or(located).to_string();
        if let Some((from, to)) = self.version {
            url = url.replacen(from, to, 1);
        }
        for (from, to) in self.substitutions {
            url = url.replacen(from, to, 1);
        }

        let endpoint = format!(
            "{}{}",
            normalize_url(&url),
            self.endpoint_suffix.replace(PROJECT_ID_PLACEHOLDER, project_id)
        );
        let resource_base = format!(
            "{}{}",
            endpoint,
            self.resource_base.replace(PROJECT_ID_PLACEHOLDER, project_id)
        );
        Ok((parse_url(&endpoint)?, parse_url(&resource_base)?))
    }
}

const NETWORK: ServiceSpec = ServiceSpec::plain("network");
const COMPUTE: ServiceSpec = ServiceSpec::plain("compute");
const VOLUME: ServiceSpec = ServiceSpec::plain("volumev2");

/// Rules for services found directly in the catalog or derived from others.
fn default_specs() -> Vec<(&'static str, ServiceSpec)> {
    vec![
        ("compute", COMPUTE),
        ("network", NETWORK.with_resource_base("v2.0/")),
        ("network-v1", NETWORK.with_resource_base("v1/")),
        ("loadbalancer", NETWORK.with_resource_base("v2.0/")),
        ("image", ServiceSpec::plain("image").with_resource_base("v2/")),
        ("dns", ServiceSpec::plain("dns").with_resource_base("v2/")),
        ("object-store", ServiceSpec::plain("object-store")),
        ("volume", VOLUME),
        ("volumev2", VOLUME),
        ("volumev3", ServiceSpec::plain("volumev3")),
        ("orchestration", ServiceSpec::plain("orchestration")),
        (
            "apig",
            NETWORK
                .with_substitutions(&[("vpc", "apig")])
                .with_resource_base("v1.0/apigw/"),
        ),
        (
            "ecs",
            NETWORK
                .with_substitutions(&[("vpc", "ecs")])
                .with_endpoint_suffix("v1/")
                .with_resource_base("{project_id}/"),
        ),
        (
            "rds-tag",
            NETWORK
                .with_substitutions(&[("vpc", "rds")])
                .with_endpoint_suffix("v1/")
                .with_resource_base("{project_id}/rds/"),
        ),
        (
            "elb",
            NETWORK
                .with_substitutions(&[("vpc", "elb"), ("myhwclouds", "myhuaweicloud")])
                .with_resource_base("v1.0/"),
        ),
        (
            "nat",
            NETWORK
                .with_substitutions(&[("vpc", "nat"), ("myhwclouds", "myhuaweicloud")])
                .with_resource_base("v2.0/"),
        ),
        (
            "cce",
            NETWORK
                .with_substitutions(&[("vpc", "cce"), ("myhwclouds", "myhuaweicloud")])
                .with_resource_base("api/v3/projects/{project_id}/"),
        ),
        (
            "dms",
            NETWORK
                .with_substitutions(&[("vpc", "dms")])
                .with_resource_base("v1.0/{project_id}/"),
        ),
        (
            "dcs",
            NETWORK
                .with_substitutions(&[("vpc", "dcs")])
                .with_resource_base("v1.0/{project_id}/"),
        ),
        (
            "sfs",
            NETWORK
                .with_substitutions(&[("vpc", "sfs")])
                .with_resource_base("v2/{project_id}/"),
        ),
        (
            "mls",
            NETWORK
                .with_substitutions(&[("vpc", "mls")])
                .with_resource_base("v1.0/{project_id}/"),
        ),
        (
            "mrs",
            NETWORK
                .with_substitutions(&[("vpc", "mrs")])
                .with_endpoint_suffix("v1.1/")
                .with_resource_base("{project_id}/"),
        ),
        (
            "antiddos",
            NETWORK
                .with_substitutions(&[("vpc", "antiddos")])
                .with_endpoint_suffix("v1/")
                .with_resource_base("{project_id}/"),
        ),
        (
            "sdrs",
            NETWORK
                .with_substitutions(&[("vpc", "sdrs")])
                .with_endpoint_suffix("v1/{project_id}/"),
        ),
        (
            "ces",
            VOLUME
                .with_version("v2", "V1.0")
                .with_substitutions(&[("evs", "ces")]),
        ),
        (
            "lts",
            VOLUME
                .with_version("v2", "v2.0")
                .with_substitutions(&[("evs", "lts")]),
        ),
        (
            "dws",
            VOLUME
                .with_version("v2", "v1.0")
                .with_substitutions(&[("evs", "dws")]),
        ),
        (
            "as",
            VOLUME
                .with_version("v2", "autoscaling-api/v1")
                .with_substitutions(&[("evs", "as")]),
        ),
        ("vbs", VOLUME.with_substitutions(&[("evs", "vbs")])),
        (
            "hw-antiddos",
            VOLUME
                .with_version("v2", "v1")
                .with_substitutions(&[("evs", "antiddos")]),
        ),
        (
            "smn",
            COMPUTE
                .with_substitutions(&[("ecs", "smn")])
                .with_resource_base("notifications/"),
        ),
        (
            "rds",
            COMPUTE
                .with_version("/v2/", "/rds/v1/")
                .with_substitutions(&[("ecs", "rds")]),
        ),
        (
            "csbs",
            COMPUTE
                .with_version("v2", "v1")
                .with_substitutions(&[("ecs", "csbs")]),
        ),
        (
            "cdn",
            NETWORK
                .with_fixed_endpoint("https://cdn.myhuaweicloud.com/")
                .with_resource_base("v1.0/"),
        ),
        (
            "tms",
            NETWORK.with_fixed_endpoint("https://tms.myhuaweicloud.com/v1.0/"),
        ),
    ]
}

impl Default for ServiceRegistry {
    fn default() -> ServiceRegistry {
        ServiceRegistry {
            specs: default_specs()
                .into_iter()
                .map(|(name, spec)| (name.to_string(), spec))
                .collect(),
        }
    }
}

impl ServiceRegistry {
    /// An empty registry: every service is looked up by its own type.
    pub fn empty() -> ServiceRegistry {
        ServiceRegistry {
            specs: HashMap::new(),
        }
    }

    /// Register a rule, returning the previous one.
    pub fn register<S: Into<String>>(&mut self, name: S, spec: ServiceSpec) -> Option<ServiceSpec> {
        self.specs.insert(name.into(), spec)
    }

    /// Rule for a service, if registered.
    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.specs.get(name)
    }

    /// Create a client for a service.
    ///
    /// The service type of the query is replaced by the catalog type of the
    /// rule, its region, name and interface are used as is.
    /// Unknown services are looked up under their own name.
    pub async fn client<S: Into<String>>(
        &self,
        session: Arc<ProviderSession>,
        service: S,
        query: &EndpointQuery,
    ) -> Result<ServiceClient> {
        let service = service.into();
        let (query, spec) = match self.specs.get(&service) {
            Some(spec) => (query.clone().with_service_type(spec.catalog_type), *spec),
            None => (
                query.clone().with_service_type(service.clone()),
                ServiceSpec::plain(""),
            ),
        };

        let located = session.locate_endpoint(&query).await?;
        let project_id = session.project_id().await.unwrap_or_default();
        let (endpoint, resource_base) = spec.rewrite(located.as_str(), &project_id)?;
        debug!(
            "Service {} uses endpoint {} and resource base {}",
            service, endpoint, resource_base
        );
        Ok(ServiceClient {
            session,
            service,
            endpoint,
            resource_base,
        })
    }
}

impl ServiceClient {
    /// Service name.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Service endpoint.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Base URL for resources.
    #[inline]
    pub fn resource_base(&self) -> &Url {
        &self.resource_base
    }

    /// Session of the client.
    #[inline]
    pub fn session(&self) -> &Arc<ProviderSession> {
        &self.session
    }

    /// URL of a resource relative to the resource base.
    pub fn url<I>(&self, path: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let path: Vec<String> = path
            .into_iter()
            .map(|p| p.as_ref().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        parse_url(&format!("{}{}", self.resource_base, path.join("/")))
    }

    /// Send a request to a resource.
    pub async fn request<I>(
        &self,
        method: Method,
        path: I,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let url = self.url(path)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let request = builder.body(body.unwrap_or_default())?;
        self.session.send(request).await
    }

    /// GET a resource.
    pub async fn get<I>(&self, path: I) -> Result<Response<Bytes>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.request(Method::GET, path, None).await
    }
}
