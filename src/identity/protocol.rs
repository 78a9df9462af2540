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

//! JSON structures and protocol bits for the Identity V2 and V3 APIs.

#![allow(missing_docs)]

use serde_derive::{Deserialize, Serialize};

use crate::types::IdOrName;

const PASSWORD_METHOD: &str = "password";
const ASSUME_ROLE_METHOD: &str = "assume_role";

// Identity V2.

#[derive(Clone, Debug, Serialize)]
pub struct V2PasswordCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct V2Auth {
    #[serde(rename = "passwordCredentials")]
    pub password_credentials: V2PasswordCredentials,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct V2AuthRoot {
    pub auth: V2Auth,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Tenant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Token {
    pub id: String,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub tenant: Option<V2Tenant>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Endpoint {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub region: String,
    #[serde(rename = "publicURL", default)]
    pub public_url: Option<String>,
    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,
    #[serde(rename = "adminURL", default)]
    pub admin_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2CatalogRecord {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<V2Endpoint>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Access {
    pub token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    pub service_catalog: Vec<V2CatalogRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2TokenRoot {
    pub access: V2Access,
}

// Identity V3 requests.

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DomainRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserAndPassword {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PasswordMethod {
    pub user: UserAndPassword,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssumeRole {
    pub domain_name: String,
    pub xrole_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Identity {
    pub methods: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_role: Option<AssumeRole>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainRef>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Auth {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthRoot {
    pub auth: Auth,
}

// Identity V3 responses.

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DomainRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<DomainRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub region: String,
    pub url: String,
    pub interface: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectRecord>,
    #[serde(default)]
    pub catalog: Vec<CatalogRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenRoot {
    pub token: Token,
}

// Version discovery.

#[derive(Clone, Debug, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub rel: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VersionAdvertisement {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Versions {
    Values { values: Vec<VersionAdvertisement> },
    List(Vec<VersionAdvertisement>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum VersionDocument {
    Many { versions: Versions },
    One { version: VersionAdvertisement },
}

// Discovery listings used by the access/secret key flow.

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProjectsRoot {
    #[serde(default)]
    pub projects: Vec<ProjectSummary>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DomainsRoot {
    #[serde(default)]
    pub domains: Vec<DomainRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServicesRoot {
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    #[serde(default)]
    pub links: Option<PageLinks>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EndpointRecord {
    pub id: String,
    pub service_id: String,
    #[serde(default)]
    pub region: String,
    pub url: String,
    pub interface: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EndpointsRoot {
    #[serde(default)]
    pub endpoints: Vec<EndpointRecord>,
    #[serde(default)]
    pub links: Option<PageLinks>,
}

/// A single page of a paginated listing.
pub trait Page {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for ServicesRoot {
    type Item = ServiceRecord;

    fn into_parts(self) -> (Vec<ServiceRecord>, Option<String>) {
        (self.services, self.links.and_then(|l| l.next))
    }
}

impl Page for EndpointsRoot {
    type Item = EndpointRecord;

    fn into_parts(self) -> (Vec<EndpointRecord>, Option<String>) {
        (self.endpoints, self.links.and_then(|l| l.next))
    }
}

impl From<&IdOrName> for DomainRef {
    fn from(value: &IdOrName) -> DomainRef {
        DomainRef {
            id: value.id().map(String::from),
            name: value.name().map(String::from),
        }
    }
}

impl V2AuthRoot {
    pub fn new(
        password_credentials: V2PasswordCredentials,
        tenant: Option<&IdOrName>,
    ) -> V2AuthRoot {
        V2AuthRoot {
            auth: V2Auth {
                password_credentials,
                tenant_id: tenant.and_then(|t| t.id()).map(String::from),
                tenant_name: tenant.and_then(|t| t.name()).map(String::from),
            },
        }
    }
}

impl Identity {
    pub fn password(user: UserAndPassword) -> Identity {
        Identity {
            methods: vec![PASSWORD_METHOD],
            password: Some(PasswordMethod { user }),
            assume_role: None,
        }
    }

    pub fn assume_role<S1, S2>(domain_name: S1, xrole_name: S2) -> Identity
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Identity {
            methods: vec![ASSUME_ROLE_METHOD],
            password: None,
            assume_role: Some(AssumeRole {
                domain_name: domain_name.into(),
                xrole_name: xrole_name.into(),
            }),
        }
    }
}

impl Scope {
    pub fn project_by_id<S: Into<String>>(id: S) -> Scope {
        Scope {
            project: Some(ProjectRef {
                id: Some(id.into()),
                name: None,
                domain: None,
            }),
            domain: None,
        }
    }

    pub fn project_by_name<S: Into<String>>(name: S, domain: Option<DomainRef>) -> Scope {
        Scope {
            project: Some(ProjectRef {
                id: None,
                name: Some(name.into()),
                domain,
            }),
            domain: None,
        }
    }

    pub fn domain(domain: DomainRef) -> Scope {
        Scope {
            project: None,
            domain: Some(domain),
        }
    }
}

impl AuthRoot {
    pub fn new(identity: Identity, scope: Option<Scope>) -> AuthRoot {
        AuthRoot {
            auth: Auth { identity, scope },
        }
    }
}

impl VersionDocument {
    pub fn into_versions(self) -> Vec<VersionAdvertisement> {
        match self {
            VersionDocument::Many {
                versions: Versions::Values { values },
            } => values,
            VersionDocument::Many {
                versions: Versions::List(list),
            } => list,
            VersionDocument::One { version } => vec![version],
        }
    }
}
