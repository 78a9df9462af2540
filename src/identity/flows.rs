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

//! Authentication flows for every credential variant.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use futures::future;
use http::header::HeaderValue;
use http::{Request, Response};
use log::{debug, error, info, trace, warn};
use reqwest::Url;
use serde::de::DeserializeOwned;

use super::catalog::{CatalogEntry, Endpoint, ServiceCatalog};
use super::protocol::{
    self, AuthRoot, DomainRef, DomainsRoot, EndpointRecord, EndpointsRoot, Identity, Page,
    ProjectsRoot, Scope, ServiceRecord, ServicesRoot, UserAndPassword, V2AuthRoot,
    V2PasswordCredentials,
};
use super::signer::RequestSigner;
use super::version::{self, ProtocolVersion, SUPPORTED_VERSIONS, V2, V3};
use super::{IdentityClient, SUBJECT_TOKEN_HEADER, TENANT_ID_PLACEHOLDER};
use crate::auth::{AccessSecret, AgencyDelegation, Credential, UserPassword};
use crate::session::{Grant, TokenRefresher};
use crate::transport;
use crate::types::IdOrName;
use crate::utils::{join_suffix, parse_url};
use crate::{Error, ErrorKind, Result};

pub(crate) use super::version::negotiate;

const AUTH_TOKEN_HEADER: &str = "x-auth-token";
const MISSING_SUBJECT_HEADER: &str = "Missing X-Subject-Token header";
const INVALID_SUBJECT_HEADER: &str = "Invalid X-Subject-Token header";

/// How identity requests are authorized.
#[derive(Debug, Clone, Copy)]
enum Authorization<'a> {
    Anonymous,
    Token(&'a str),
    Signature(&'a RequestSigner),
}

/// Token response from Identity v3.
struct IssuedToken {
    value: String,
    expires_at: Option<DateTime<FixedOffset>>,
    project_id: Option<String>,
    domain_id: Option<String>,
    catalog: ServiceCatalog,
}

/// Re-runs the flow that produced the current grant.
#[derive(Debug)]
pub(crate) struct CredentialRefresher {
    client: IdentityClient,
    version: ProtocolVersion,
    endpoint: Url,
    credential: Credential,
}

#[async_trait]
impl TokenRefresher for CredentialRefresher {
    async fn refresh(&self) -> Result<Grant> {
        debug!(
            "Re-authenticating with {} credentials at {}",
            self.credential.kind_name(),
            self.endpoint
        );
        run(&self.client, self.version, &self.endpoint, &self.credential).await
    }
}

impl Authorization<'_> {
    fn apply(&self, request: &mut Request<Bytes>) -> Result<()> {
        match self {
            Authorization::Anonymous => Ok(()),
            Authorization::Token(token) => {
                let mut value = HeaderValue::from_str(token).map_err(|e| {
                    Error::new(ErrorKind::InvalidInput, format!("Invalid token: {}", e))
                })?;
                value.set_sensitive(true);
                let _ = request.headers_mut().insert(AUTH_TOKEN_HEADER, value);
                Ok(())
            }
            Authorization::Signature(signer) => signer.sign(request),
        }
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Cannot build URL {}{}: {}", base, path, e),
        )
    })
}

fn parse_expiry(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    value.and_then(|v| match DateTime::parse_from_rfc3339(v) {
        Ok(expires_at) => Some(expires_at),
        Err(e) => {
            warn!("Cannot parse token expiration time {}: {}", v, e);
            None
        }
    })
}

async fn call(
    client: &IdentityClient,
    mut request: Request<Bytes>,
    auth: Authorization<'_>,
) -> Result<Response<Bytes>> {
    auth.apply(&mut request)?;
    debug!("Identity request {} {}", request.method(), request.uri());
    let resp = client.transport.send(request).await?;
    transport::check(resp)
}

fn subject_token(resp: &Response<Bytes>, url: &Url) -> Result<String> {
    match resp.headers().get(SUBJECT_TOKEN_HEADER) {
        Some(hdr) => match hdr.to_str() {
            Ok(s) if !s.is_empty() => Ok(s.to_string()),
            Ok(..) => {
                error!("Empty X-Subject-Token received from {}", url);
                Err(Error::new(ErrorKind::InvalidResponse, INVALID_SUBJECT_HEADER))
            }
            Err(e) => {
                error!("Invalid X-Subject-Token {:?} received from {}: {}", hdr, url, e);
                Err(Error::new(ErrorKind::InvalidResponse, INVALID_SUBJECT_HEADER))
            }
        },
        None => {
            error!("No X-Subject-Token header received from {}", url);
            Err(Error::new(ErrorKind::InvalidResponse, MISSING_SUBJECT_HEADER))
        }
    }
}

/// Request a token from Identity v3.
async fn issue_token(
    client: &IdentityClient,
    endpoint: &Url,
    body: &AuthRoot,
    auth: Authorization<'_>,
) -> Result<IssuedToken> {
    let url = join(endpoint, "auth/tokens")?;
    let resp = call(client, transport::post_json(&url, body)?, auth).await?;
    let value = subject_token(&resp, &url)?;
    let root: protocol::TokenRoot = transport::parse_json(&resp)?;
    trace!("Received catalog: {:?}", root.token.catalog);

    let (project_id, domain_id) = match root.token.project {
        Some(project) => (
            Some(project.id),
            project.domain.map(|d| d.id).filter(|id| !id.is_empty()),
        ),
        None => (None, None),
    };
    Ok(IssuedToken {
        value,
        expires_at: parse_expiry(root.token.expires_at.as_deref()),
        project_id,
        domain_id,
        catalog: ServiceCatalog::from_v3(root.token.catalog),
    })
}

impl IssuedToken {
    fn into_grant(self) -> Grant {
        Grant {
            token: Some(self.value),
            expires_at: self.expires_at,
            project_id: self.project_id,
            domain_id: self.domain_id,
            bss_domain_id: None,
            signer: None,
            resolver: Arc::new(self.catalog),
        }
    }

    /// Replace the base grant, keeping identifiers the response does not carry.
    fn replace(self, base: Grant) -> Grant {
        Grant {
            token: Some(self.value),
            expires_at: self.expires_at,
            project_id: self.project_id.or(base.project_id),
            domain_id: self.domain_id.or(base.domain_id),
            bss_domain_id: base.bss_domain_id,
            signer: None,
            resolver: Arc::new(self.catalog),
        }
    }
}

fn password_body(pw: &UserPassword) -> AuthRoot {
    let user = pw.user();
    let domain = match user {
        IdOrName::Id(..) => None,
        IdOrName::Name(..) => pw.domain().map(DomainRef::from),
    };
    let scope = match pw.tenant() {
        Some(IdOrName::Id(id)) => Some(Scope::project_by_id(id.clone())),
        Some(IdOrName::Name(name)) => Some(Scope::project_by_name(
            name.clone(),
            pw.domain().map(DomainRef::from),
        )),
        None => pw.domain().map(|d| Scope::domain(DomainRef::from(d))),
    };
    AuthRoot::new(
        Identity::password(UserAndPassword {
            id: user.id().map(String::from),
            name: user.name().map(String::from),
            password: pw.password().to_string(),
            domain,
        }),
        scope,
    )
}

fn agency_body(agency: &AgencyDelegation) -> AuthRoot {
    let scope = match agency.delegated_project().filter(|p| !p.is_empty()) {
        Some(project) => Scope::project_by_name(project, None),
        None => Scope::domain(DomainRef {
            id: None,
            name: Some(agency.agency_domain_name().to_string()),
        }),
    };
    AuthRoot::new(
        Identity::assume_role(agency.agency_domain_name(), agency.agency_name()),
        Some(scope),
    )
}

async fn v2_password(client: &IdentityClient, endpoint: &Url, pw: &UserPassword) -> Result<Grant> {
    let username = pw.user().name().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            "Identity v2.0 requires a user name, not an ID",
        )
    })?;
    let body = V2AuthRoot::new(
        V2PasswordCredentials {
            username: username.to_string(),
            password: pw.password().to_string(),
        },
        pw.tenant(),
    );

    let url = join(endpoint, "tokens")?;
    let resp = call(client, transport::post_json(&url, &body)?, Authorization::Anonymous).await?;
    let root: protocol::V2TokenRoot = transport::parse_json(&resp)?;
    let access = root.access;
    if access.token.id.is_empty() {
        error!("Empty token received from {}", url);
        return Err(Error::new(
            ErrorKind::InvalidResponse,
            "Identity v2.0 returned an empty token",
        ));
    }
    trace!("Received catalog: {:?}", access.service_catalog);

    info!("Authenticated as {} using Identity v2.0", pw.user());
    Ok(Grant {
        token: Some(access.token.id),
        expires_at: parse_expiry(access.token.expires.as_deref()),
        project_id: access.token.tenant.map(|t| t.id),
        domain_id: None,
        bss_domain_id: None,
        signer: None,
        resolver: Arc::new(ServiceCatalog::from_v2(access.service_catalog)),
    })
}

async fn v3_password(client: &IdentityClient, endpoint: &Url, pw: &UserPassword) -> Result<Grant> {
    let token = issue_token(client, endpoint, &password_body(pw), Authorization::Anonymous).await?;
    info!("Authenticated as {} using Identity v3", pw.user());
    Ok(token.into_grant())
}

async fn exchange_with_token(
    client: &IdentityClient,
    endpoint: &Url,
    base: Grant,
    agency: &AgencyDelegation,
) -> Result<Grant> {
    let token = base.token.clone().ok_or_else(|| {
        Error::new(
            ErrorKind::AuthenticationFailed,
            "No token to exchange for an agency token",
        )
    })?;
    let issued = issue_token(
        client,
        endpoint,
        &agency_body(agency),
        Authorization::Token(&token),
    )
    .await?;
    info!(
        "Received agency token for {} in domain {}",
        agency.agency_name(),
        agency.agency_domain_name()
    );
    Ok(issued.replace(base))
}

async fn exchange_signed(
    client: &IdentityClient,
    endpoint: &Url,
    base: Grant,
    signer: &RequestSigner,
    agency: &AgencyDelegation,
) -> Result<Grant> {
    if base.domain_id.is_none() {
        return Err(Error::new(
            ErrorKind::InvalidConfig,
            "Agency delegation with access/secret keys requires the user domain",
        ));
    }
    let issued = issue_token(
        client,
        endpoint,
        &agency_body(agency),
        Authorization::Signature(signer),
    )
    .await?;
    info!(
        "Received agency token for {} in domain {} using access key {}",
        agency.agency_name(),
        agency.agency_domain_name(),
        signer.access_key()
    );
    Ok(issued.replace(base))
}

fn single<T>(mut items: Vec<T>, what: &str, name: &str) -> Result<T> {
    match items.len() {
        0 => Err(Error::new(
            ErrorKind::ResourceNotFound,
            format!("No {} with name {}", what, name),
        )),
        1 => Ok(items.remove(0)),
        n => Err(Error::new(
            ErrorKind::AmbiguousResource,
            format!("{} {}s with name {}", n, what, name),
        )),
    }
}

async fn find_project(
    client: &IdentityClient,
    v3: &Url,
    name: &str,
    signer: &RequestSigner,
) -> Result<String> {
    let mut url = join(v3, "projects")?;
    let _ = url.query_pairs_mut().append_pair("name", name);
    let resp = call(client, transport::get(&url)?, Authorization::Signature(signer)).await?;
    let root: ProjectsRoot = transport::parse_json(&resp)?;
    let project = single(root.projects, "project", name)?;
    debug!("Resolved project {} to {}", name, project.id);
    Ok(project.id)
}

async fn find_domain(
    client: &IdentityClient,
    v3: &Url,
    name: &str,
    signer: &RequestSigner,
) -> Result<String> {
    let mut url = join(v3, "auth/domains")?;
    let _ = url.query_pairs_mut().append_pair("name", name);
    let resp = call(client, transport::get(&url)?, Authorization::Signature(signer)).await?;
    let root: DomainsRoot = transport::parse_json(&resp)?;
    Ok(single(root.domains, "domain", name)?.id)
}

/// Resolve a domain, failures are not fatal.
async fn resolve_domain(
    client: &IdentityClient,
    v3: &Url,
    domain: Option<&IdOrName>,
    signer: &RequestSigner,
) -> Option<String> {
    match domain {
        None => None,
        Some(IdOrName::Id(id)) => Some(id.clone()),
        Some(IdOrName::Name(name)) => match find_domain(client, v3, name, signer).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Cannot resolve domain {}, ignoring: {}", name, e);
                None
            }
        },
    }
}

async fn paginate<P>(
    client: &IdentityClient,
    first: Url,
    signer: &RequestSigner,
) -> Result<Vec<P::Item>>
where
    P: Page + DeserializeOwned,
{
    let mut result = Vec::new();
    let mut url = first;
    loop {
        let resp = call(client, transport::get(&url)?, Authorization::Signature(signer)).await?;
        let page: P = transport::parse_json(&resp)?;
        let (items, next) = page.into_parts();
        let exhausted = items.is_empty();
        result.extend(items);

        match next.filter(|n| !n.is_empty()) {
            Some(next) if !exhausted => {
                let next = parse_url(&next)?;
                if next == url {
                    break;
                }
                url = next;
            }
            _ => break,
        }
    }
    Ok(result)
}

fn synthesize(services: Vec<ServiceRecord>, endpoints: Vec<EndpointRecord>) -> ServiceCatalog {
    let mut entries: Vec<CatalogEntry> = services
        .into_iter()
        .map(|s| CatalogEntry {
            id: s.id,
            service_type: s.service_type,
            name: String::new(),
            endpoints: Vec::new(),
        })
        .collect();

    for endp in endpoints {
        let interface = match endp.interface.parse() {
            Ok(interface) => interface,
            Err(..) => {
                warn!(
                    "Ignoring endpoint {} with interface {}",
                    endp.id, endp.interface
                );
                continue;
            }
        };
        match entries.iter_mut().find(|e| e.id == endp.service_id) {
            Some(entry) => entry.endpoints.push(Endpoint {
                id: endp.id,
                region: endp.region,
                url: endp.url,
                interface,
            }),
            None => debug!(
                "Endpoint {} refers to unknown service {}",
                endp.id, endp.service_id
            ),
        }
    }

    ServiceCatalog::new(entries)
}

/// Discover the catalog with access/secret keys.
async fn discover(
    client: &IdentityClient,
    v3: &Url,
    aksk: &AccessSecret,
) -> Result<(Grant, Arc<RequestSigner>)> {
    let mut signer = RequestSigner::new(aksk.access_key(), aksk.secret_key());
    if let Some(region) = aksk.region() {
        signer = signer.with_region(region);
    }
    if let Some(token) = aksk.security_token() {
        signer = signer.with_security_token(token);
    }

    let project_id = match aksk.project() {
        Some(IdOrName::Id(id)) => Some(id.clone()),
        Some(IdOrName::Name(name)) => Some(find_project(client, v3, name, &signer).await?),
        None => None,
    };
    let (domain_id, bss_domain_id) = future::join(
        resolve_domain(client, v3, aksk.domain(), &signer),
        resolve_domain(client, v3, aksk.bss_domain(), &signer),
    )
    .await;

    let services = paginate::<ServicesRoot>(client, join(v3, "services")?, &signer).await?;
    let endpoints = paginate::<EndpointsRoot>(client, join(v3, "endpoints")?, &signer).await?;
    let catalog = synthesize(services, endpoints)
        .substitute(TENANT_ID_PLACEHOLDER, project_id.as_deref().unwrap_or_default());
    trace!("Synthesized catalog: {:?}", catalog);

    if let Some(ref project_id) = project_id {
        signer = signer.with_project_id(project_id.clone());
    }
    if let Some(ref domain_id) = domain_id {
        signer = signer.with_domain_id(domain_id.clone());
    }
    let signer = Arc::new(signer);

    info!(
        "Discovered {} services using access key {}",
        catalog.entries().len(),
        aksk.access_key()
    );
    let grant = Grant {
        token: None,
        expires_at: None,
        project_id,
        domain_id,
        bss_domain_id,
        signer: Some(Arc::clone(&signer)),
        resolver: Arc::new(catalog),
    };
    Ok((grant, signer))
}

/// Identity v3 endpoint, even if v2.0 was negotiated.
fn v3_endpoint(client: &IdentityClient, version: ProtocolVersion, endpoint: &Url) -> Result<Url> {
    if version == V3 {
        Ok(endpoint.clone())
    } else {
        join_suffix(&client.base, V3.suffix)
    }
}

fn unknown(credential: &Credential, version: ProtocolVersion) -> Error {
    Error::new(
        ErrorKind::UnknownCredential,
        format!(
            "Cannot use {} credentials with Identity {}",
            credential.kind_name(),
            version
        ),
    )
}

/// Run the flow for a credential against an already negotiated endpoint.
pub(crate) async fn run(
    client: &IdentityClient,
    version: ProtocolVersion,
    endpoint: &Url,
    credential: &Credential,
) -> Result<Grant> {
    match credential {
        Credential::Password(ref pw) if version == V2 => v2_password(client, endpoint, pw).await,
        Credential::Password(ref pw) if version == V3 => v3_password(client, endpoint, pw).await,
        Credential::AccessSecret(ref aksk) => {
            let v3 = v3_endpoint(client, version, endpoint)?;
            discover(client, &v3, aksk).await.map(|(grant, _)| grant)
        }
        Credential::Agency(ref agency) => match agency.base() {
            Credential::Password(ref pw) if version == V3 => {
                let base = v3_password(client, endpoint, pw).await?;
                exchange_with_token(client, endpoint, base, agency).await
            }
            Credential::Token(ref token) if version == V3 => {
                let base = Grant::from_token(token.token_id());
                exchange_with_token(client, endpoint, base, agency).await
            }
            Credential::AccessSecret(ref aksk) => {
                let v3 = v3_endpoint(client, version, endpoint)?;
                let (base, signer) = discover(client, &v3, aksk).await?;
                exchange_signed(client, &v3, base, &signer, agency).await
            }
            _ => Err(unknown(credential, version)),
        },
        _ => Err(unknown(credential, version)),
    }
}

/// Authenticate with a credential.
///
/// Returns the grant and, if the credential allows it, a refresher that
/// replays the same flow without negotiating the version again.
pub(crate) async fn authenticate(
    client: &IdentityClient,
    credential: &Credential,
) -> Result<(Grant, Option<Arc<dyn TokenRefresher>>)> {
    credential.validate()?;

    if let Credential::Token(ref token) = credential {
        debug!("Using a pre-issued token, no catalog will be available");
        return Ok((Grant::from_token(token.token_id()), None));
    }

    let (version, endpoint) = version::negotiate(client, &SUPPORTED_VERSIONS).await?;
    let grant = run(client, version, &endpoint, credential).await?;

    let refresher: Option<Arc<dyn TokenRefresher>> = if credential.can_reauth() {
        Some(Arc::new(CredentialRefresher {
            client: client.clone(),
            version,
            endpoint,
            credential: credential.clone(),
        }))
    } else {
        None
    };
    Ok((grant, refresher))
}
