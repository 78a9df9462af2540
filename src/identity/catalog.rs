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

//! Abstraction over a service catalog.
//!
//! Catalogs from both Identity versions are stored in the V3 shape: every V2
//! endpoint becomes up to three endpoints, one per interface.

use std::fmt;
use std::str::FromStr;

use log::{debug, error, warn};
use reqwest::Url;

use super::protocol;
use crate::session::EndpointResolver;
use crate::utils::normalize_url;
use crate::{Error, ErrorKind, Result};

/// Network plane an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// Public interface.
    Public,
    /// Internal interface.
    Internal,
    /// Administrative interface.
    Admin,
}

/// A query for a service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointQuery {
    /// Service type, e.g. `compute`.
    pub service_type: String,
    /// Optional service name.
    pub name: Option<String>,
    /// Optional region, an empty value means any region.
    pub region: Option<String>,
    /// Interface: `public`, `internal` or `admin`.
    pub interface: String,
}

/// An endpoint in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint ID (empty for V2 catalogs).
    pub id: String,
    /// Region of the endpoint, may be `*`.
    pub region: String,
    /// URL as received from the identity service.
    pub url: String,
    /// Interface of the endpoint.
    pub interface: Interface,
}

/// A service in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Service ID (empty for V2 catalogs).
    pub id: String,
    /// Service type.
    pub service_type: String,
    /// Service name, may be empty.
    pub name: String,
    /// Endpoints of the service.
    pub endpoints: Vec<Endpoint>,
}

/// Immutable service catalog.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    entries: Vec<CatalogEntry>,
}

impl Interface {
    /// String representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Public => "public",
            Interface::Internal => "internal",
            Interface::Admin => "admin",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Interface> {
        match s {
            "public" => Ok(Interface::Public),
            "internal" => Ok(Interface::Internal),
            "admin" => Ok(Interface::Admin),
            other => Err(Error::new(
                ErrorKind::InvalidInterface,
                format!(
                    "Interface must be one of public, internal or admin, got {:?}",
                    other
                ),
            )),
        }
    }
}

impl EndpointQuery {
    /// Query for the public endpoint of a service type.
    pub fn new<S: Into<String>>(service_type: S) -> EndpointQuery {
        EndpointQuery {
            service_type: service_type.into(),
            name: None,
            region: None,
            interface: Interface::Public.as_str().to_string(),
        }
    }

    /// Restrict to a service name.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to a region.
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Use an interface other than `public`.
    ///
    /// The value is validated on lookup.
    pub fn with_interface<S: Into<String>>(mut self, interface: S) -> Self {
        self.interface = interface.into();
        self
    }

    /// Replace the service type.
    pub fn with_service_type<S: Into<String>>(mut self, service_type: S) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Validated interface.
    pub fn parsed_interface(&self) -> Result<Interface> {
        self.interface.parse()
    }

    fn region_filter(&self) -> Option<&str> {
        self.region.as_deref().filter(|r| !r.is_empty())
    }

    fn name_filter(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

impl fmt::Display for EndpointQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.service_type, self.interface)?;
        if let Some(name) = self.name_filter() {
            write!(f, ", name {}", name)?;
        }
        if let Some(region) = self.region_filter() {
            write!(f, ", region {}", region)?;
        }
        f.write_str(")")
    }
}

impl Endpoint {
    fn matches(&self, interface: Interface, region: Option<&str>) -> bool {
        self.interface == interface
            && match region {
                Some(region) => self.region == region,
                // An unspecified region matches anything, including "*".
                None => true,
            }
    }
}

impl ServiceCatalog {
    /// Create a catalog from entries.
    pub fn new(entries: Vec<CatalogEntry>) -> ServiceCatalog {
        ServiceCatalog { entries }
    }

    /// Convert a V2 catalog, creating one endpoint per non-empty URL.
    pub(crate) fn from_v2(records: Vec<protocol::V2CatalogRecord>) -> ServiceCatalog {
        let entries = records
            .into_iter()
            .map(|record| {
                let endpoints = record
                    .endpoints
                    .into_iter()
                    .flat_map(|endp| {
                        let id = endp.id;
                        let region = endp.region;
                        [
                            (Interface::Public, endp.public_url),
                            (Interface::Internal, endp.internal_url),
                            (Interface::Admin, endp.admin_url),
                        ]
                        .into_iter()
                        .filter_map(move |(interface, url)| {
                            url.filter(|u| !u.is_empty()).map(|url| Endpoint {
                                id: id.clone(),
                                region: region.clone(),
                                url,
                                interface,
                            })
                        })
                    })
                    .collect();
                CatalogEntry {
                    id: String::new(),
                    service_type: record.service_type,
                    name: record.name,
                    endpoints,
                }
            })
            .collect();
        ServiceCatalog { entries }
    }

    /// Convert a V3 catalog, skipping endpoints with unknown interfaces.
    pub(crate) fn from_v3(records: Vec<protocol::CatalogRecord>) -> ServiceCatalog {
        let entries = records
            .into_iter()
            .map(|record| {
                let endpoints = record
                    .endpoints
                    .into_iter()
                    .filter_map(|endp| match endp.interface.parse() {
                        Ok(interface) => Some(Endpoint {
                            id: endp.id,
                            region: endp.region,
                            url: endp.url,
                            interface,
                        }),
                        Err(..) => {
                            warn!(
                                "Ignoring endpoint {} of service {} with interface {}",
                                endp.url, record.service_type, endp.interface
                            );
                            None
                        }
                    })
                    .collect();
                CatalogEntry {
                    id: record.id,
                    service_type: record.service_type,
                    name: record.name,
                    endpoints,
                }
            })
            .collect();
        ServiceCatalog { entries }
    }

    /// Catalog entries.
    #[inline]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Whether the catalog has no services.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find exactly one endpoint matching the query.
    ///
    /// The returned URL always ends with a slash.
    pub fn find_endpoint(&self, query: &EndpointQuery) -> Result<Url> {
        if query.service_type.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Service type must not be empty",
            ));
        }

        let interface = query.parsed_interface()?;
        let region = query.region_filter();
        let name = query.name_filter();

        let found: Vec<&Endpoint> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.service_type == query.service_type && name.map_or(true, |n| entry.name == n)
            })
            .flat_map(|entry| entry.endpoints.iter())
            .filter(|endp| endp.matches(interface, region))
            .collect();

        match found.as_slice() {
            [] => Err(Error::new_endpoint_not_found(query)),
            [endp] => {
                debug!("Received {:?} for {}", endp, query);
                Url::parse(&normalize_url(&endp.url)).map_err(|e| {
                    error!(
                        "Invalid URL {} received from service catalog for {}: {}",
                        endp.url, query, e
                    );
                    Error::new(
                        ErrorKind::InvalidResponse,
                        format!("Invalid URL {} for {} - {}", endp.url, query, e),
                    )
                })
            }
            many => Err(Error::new_ambiguous_endpoints(
                query,
                many.iter().map(|e| normalize_url(&e.url)).collect(),
            )),
        }
    }

    /// Replace a placeholder in all endpoint URLs.
    pub(crate) fn substitute(mut self, placeholder: &str, value: &str) -> ServiceCatalog {
        for endp in self.entries.iter_mut().flat_map(|e| e.endpoints.iter_mut()) {
            if endp.url.contains(placeholder) {
                endp.url = endp.url.replace(placeholder, value);
            }
        }
        self
    }
}

impl EndpointResolver for ServiceCatalog {
    fn locate(&self, query: &EndpointQuery) -> Result<Url> {
        self.find_endpoint(query)
    }
}
