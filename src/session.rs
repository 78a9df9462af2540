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

//! Session structure definition.
//!
//! The session owns the current authorization (a token or a request signer),
//! the project and domain identity and the endpoint resolver. It is shared
//! between all service clients, typically via an `Arc`.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use http::header::HeaderValue;
use http::{Request, Response, StatusCode};
use log::{debug, error, info};
use reqwest::Url;
use static_assertions::assert_impl_all;
use tokio::sync::{Mutex, RwLock};

use super::auth::{self, Credential};
use super::identity::flows;
use super::identity::{
    EndpointQuery, IdentityClient, ProtocolVersion, RequestSigner, ServiceCatalog,
    SUPPORTED_VERSIONS,
};
use super::transport::{self, ReqwestTransport, Transport};
use super::utils::hashed;
use super::{Error, ErrorKind, Result};

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Resolves endpoint queries to URLs.
pub trait EndpointResolver: fmt::Debug + Send + Sync {
    /// Find exactly one endpoint URL, ending with a slash.
    fn locate(&self, query: &EndpointQuery) -> Result<Url>;
}

/// Obtains a fresh grant when the current one is rejected.
#[async_trait]
pub trait TokenRefresher: fmt::Debug + Send + Sync {
    /// Authenticate again.
    async fn refresh(&self) -> Result<Grant>;
}

/// Result of a successful authentication.
#[derive(Clone)]
pub struct Grant {
    /// Token, absent for signed sessions.
    pub token: Option<String>,
    /// Token expiration time as reported by the identity service.
    pub expires_at: Option<DateTime<FixedOffset>>,
    /// Project ID.
    pub project_id: Option<String>,
    /// Domain ID.
    pub domain_id: Option<String>,
    /// Business domain ID.
    pub bss_domain_id: Option<String>,
    /// Request signer, used when there is no token.
    pub signer: Option<Arc<RequestSigner>>,
    /// Endpoint resolver.
    pub resolver: Arc<dyn EndpointResolver>,
}

/// A consistent view of the session identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    token: Option<String>,
    project_id: Option<String>,
    domain_id: Option<String>,
    generation: u64,
}

#[derive(Default)]
struct AuthState {
    token: Option<String>,
    expires_at: Option<DateTime<FixedOffset>>,
    project_id: Option<String>,
    domain_id: Option<String>,
    bss_domain_id: Option<String>,
    signer: Option<Arc<RequestSigner>>,
    resolver: Option<Arc<dyn EndpointResolver>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    credential: Option<Credential>,
    generation: u64,
}

/// Outcome of the last re-authentication attempt.
struct Attempt {
    number: u64,
    replaced_generation: u64,
    result: Result<()>,
}

/// Marks an attempt as finished even if its future is dropped.
struct AttemptGuard<'a> {
    finished: &'a AtomicU64,
    number: u64,
}

/// An authenticated session with an OpenStack-based cloud.
pub struct ProviderSession {
    identity: IdentityClient,
    state: RwLock<AuthState>,
    reauth: Mutex<Option<Attempt>>,
    finished_attempts: AtomicU64,
}

assert_impl_all!(ProviderSession: Send, Sync);
assert_impl_all!(Grant: Send, Sync);

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Grant {{ token: {:?}, expires_at: {:?}, project_id: {:?}, domain_id: {:?}, \
             bss_domain_id: {:?}, signer: {:?}, resolver: {:?} }}",
            self.token.as_deref().map(hashed),
            self.expires_at,
            self.project_id,
            self.domain_id,
            self.bss_domain_id,
            self.signer,
            self.resolver
        )
    }
}

impl fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TokenSnapshot {{ token: {:?}, project_id: {:?}, domain_id: {:?}, generation: {} }}",
            self.token.as_deref().map(hashed),
            self.project_id,
            self.domain_id,
            self.generation
        )
    }
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("identity_base", &self.identity.base.as_str())
            .field("identity_endpoint", &self.identity.endpoint.as_str())
            .finish()
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let _ = self.finished.fetch_max(self.number, Ordering::SeqCst);
    }
}

impl Grant {
    /// A grant with only a token and no catalog.
    pub fn from_token<S: Into<String>>(token: S) -> Grant {
        Grant {
            token: Some(token.into()),
            expires_at: None,
            project_id: None,
            domain_id: None,
            bss_domain_id: None,
            signer: None,
            resolver: Arc::new(ServiceCatalog::default()),
        }
    }
}

impl TokenSnapshot {
    /// Token, if any.
    #[inline]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Project ID, if any.
    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Domain ID, if any.
    #[inline]
    pub fn domain_id(&self) -> Option<&str> {
        self.domain_id.as_deref()
    }

    /// Increases every time a grant is installed.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl AuthState {
    fn install(&mut self, grant: Grant) -> u64 {
        self.token = grant.token;
        self.expires_at = grant.expires_at;
        self.project_id = grant.project_id;
        self.domain_id = grant.domain_id;
        self.bss_domain_id = grant.bss_domain_id;
        self.signer = grant.signer;
        self.resolver = Some(grant.resolver);
        self.generation += 1;
        self.generation
    }
}

impl ProviderSession {
    /// Create an unauthenticated session for the identity endpoint.
    ///
    /// The endpoint may include a version (e.g. `https://id.example.com/v3`).
    pub fn new<U: AsRef<str>>(identity_endpoint: U) -> Result<ProviderSession> {
        ProviderSession::new_with_transport(identity_endpoint, ReqwestTransport::default())
    }

    /// Create an unauthenticated session with a custom transport.
    pub fn new_with_transport<U, T>(identity_endpoint: U, transport: T) -> Result<ProviderSession>
    where
        U: AsRef<str>,
        T: Transport + 'static,
    {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let identity = IdentityClient::new(identity_endpoint.as_ref(), transport)?;
        debug!(
            "Created session for identity base {}, endpoint {}",
            identity.base, identity.endpoint
        );
        Ok(ProviderSession {
            identity,
            state: RwLock::new(AuthState::default()),
            reauth: Mutex::new(None),
            finished_attempts: AtomicU64::new(0),
        })
    }

    /// Create and authenticate a session from `OS_*` environment variables.
    pub async fn from_env() -> Result<ProviderSession> {
        let (auth_url, credential) = auth::from_env()?;
        let session = ProviderSession::new(auth_url)?;
        session.authenticate(credential).await?;
        Ok(session)
    }

    /// Create and authenticate a session for a cloud from `clouds.yaml`.
    pub async fn from_config<S: AsRef<str>>(cloud_name: S) -> Result<ProviderSession> {
        let (auth_url, credential) = auth::from_config(cloud_name)?;
        let session = ProviderSession::new(auth_url)?;
        session.authenticate(credential).await?;
        Ok(session)
    }

    /// Create and authenticate a session for a cloud from a specific file.
    pub async fn from_config_file<P, S>(path: P, cloud_name: S) -> Result<ProviderSession>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let (auth_url, credential) = auth::from_config_file(path, cloud_name)?;
        let session = ProviderSession::new(auth_url)?;
        session.authenticate(credential).await?;
        Ok(session)
    }

    /// Identity root without a version, always ends with a slash.
    #[inline]
    pub fn identity_base(&self) -> &Url {
        &self.identity.base
    }

    /// Identity endpoint as provided, always ends with a slash.
    #[inline]
    pub fn identity_endpoint(&self) -> &Url {
        &self.identity.endpoint
    }

    /// Negotiate the identity protocol version.
    pub async fn negotiate_version(&self) -> Result<(ProtocolVersion, Url)> {
        flows::negotiate(&self.identity, &SUPPORTED_VERSIONS).await
    }

    /// Authenticate with the credential.
    ///
    /// On failure the session is left unchanged.
    pub async fn authenticate(&self, credential: Credential) -> Result<()> {
        // Serialize with re-authentication.
        let _guard = self.reauth.lock().await;
        debug!("Authenticating with {} credentials", credential.kind_name());
        let (grant, refresher) = flows::authenticate(&self.identity, &credential).await?;

        let mut state = self.state.write().await;
        let generation = state.install(grant);
        state.refresher = refresher;
        state.credential = Some(credential);
        info!(
            "Session authenticated, project {:?}, generation {}",
            state.project_id, generation
        );
        Ok(())
    }

    /// Whether authentication has succeeded at least once.
    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.generation > 0
    }

    /// Current token, if any.
    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    /// Current project ID, if any.
    pub async fn project_id(&self) -> Option<String> {
        self.state.read().await.project_id.clone()
    }

    /// Current domain ID, if any.
    pub async fn domain_id(&self) -> Option<String> {
        self.state.read().await.domain_id.clone()
    }

    /// Current business domain ID, if any.
    pub async fn bss_domain_id(&self) -> Option<String> {
        self.state.read().await.bss_domain_id.clone()
    }

    /// Expiration time of the current token as reported by the identity service.
    pub async fn expires_at(&self) -> Option<DateTime<FixedOffset>> {
        self.state.read().await.expires_at
    }

    /// Credential used for the last successful authentication.
    pub async fn credential(&self) -> Option<Credential> {
        self.state.read().await.credential.clone()
    }

    /// Token, project and domain as one consistent tuple.
    pub async fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.read().await;
        TokenSnapshot {
            token: state.token.clone(),
            project_id: state.project_id.clone(),
            domain_id: state.domain_id.clone(),
            generation: state.generation,
        }
    }

    /// Find an endpoint using the installed resolver.
    pub async fn locate_endpoint(&self, query: &EndpointQuery) -> Result<Url> {
        let resolver = self.state.read().await.resolver.clone();
        match resolver {
            Some(resolver) => resolver.locate(query),
            None => Err(Error::new(
                ErrorKind::EndpointNotFound,
                "Session is not authenticated, no endpoints are known",
            )),
        }
    }

    /// Replace the endpoint resolver.
    pub async fn set_endpoint_resolver(&self, resolver: Arc<dyn EndpointResolver>) {
        self.state.write().await.resolver = Some(resolver);
    }

    /// Replace the token refresher.
    pub async fn set_token_refresher(&self, refresher: Option<Arc<dyn TokenRefresher>>) {
        self.state.write().await.refresher = refresher;
    }

    /// Re-authenticate now.
    ///
    /// Fails with `AuthenticationFailed` if the credential does not allow it.
    pub async fn reauthenticate(&self) -> Result<()> {
        let generation = self.state.read().await.generation;
        self.reauthenticate_after(generation).await
    }

    /// Re-authenticate because the grant of `generation` was rejected.
    ///
    /// Only one attempt runs at a time. Callers that were waiting for an
    /// attempt replacing the same generation get its outcome. Callers whose
    /// generation is already replaced return immediately.
    async fn reauthenticate_after(&self, generation: u64) -> Result<()> {
        let finished_before = self.finished_attempts.load(Ordering::SeqCst);
        let mut last = self.reauth.lock().await;

        if let Some(ref attempt) = *last {
            if attempt.number > finished_before && attempt.replaced_generation == generation {
                debug!("Re-authentication {} finished while waiting", attempt.number);
                return attempt.result.clone();
            }
        }

        let refresher = {
            let state = self.state.read().await;
            if state.generation != generation {
                debug!(
                    "Grant {} is already replaced by {}",
                    generation, state.generation
                );
                return Ok(());
            }
            state.refresher.clone()
        };
        let refresher = refresher.ok_or_else(|| {
            Error::new(
                ErrorKind::AuthenticationFailed,
                "Re-authentication is not possible with these credentials",
            )
        })?;

        let number = last.as_ref().map_or(1, |a| a.number + 1);
        let _finished = AttemptGuard {
            finished: &self.finished_attempts,
            number,
        };
        *last = Some(Attempt {
            number,
            replaced_generation: generation,
            result: Err(Error::new(
                ErrorKind::Cancelled,
                "Re-authentication was abandoned before it finished",
            )),
        });

        debug!("Starting re-authentication {}", number);
        let result = match refresher.refresh().await {
            Ok(grant) => {
                let generation = self.state.write().await.install(grant);
                info!("Re-authenticated, generation {}", generation);
                Ok(())
            }
            Err(e) => {
                error!("Re-authentication failed: {}", e);
                Err(e)
            }
        };

        if let Some(ref mut attempt) = *last {
            attempt.result = result.clone();
        }
        result
    }

    async fn authorize(&self, mut request: Request<Bytes>) -> Result<(Request<Bytes>, u64)> {
        let state = self.state.read().await;
        if let Some(ref token) = state.token {
            let mut value = HeaderValue::from_str(token)
                .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("Invalid token: {}", e)))?;
            value.set_sensitive(true);
            let _ = request.headers_mut().insert(AUTH_TOKEN_HEADER, value);
        } else if let Some(ref signer) = state.signer {
            signer.sign(&mut request)?;
        }
        Ok((request, state.generation))
    }

    /// Send an authorized request.
    ///
    /// If the request is rejected with HTTP 401 and the session can
    /// re-authenticate, it re-authenticates and retries exactly once.
    /// Non-success responses are converted into errors.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (first, generation) = self.authorize(transport::clone_request(&request)).await?;
        let resp = self.identity.transport.send(first).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return transport::check(resp);
        }

        if self.state.read().await.refresher.is_none() {
            return transport::check(resp);
        }

        debug!(
            "Request to {} was rejected with grant {}, re-authenticating",
            request.uri(),
            generation
        );
        self.reauthenticate_after(generation).await?;

        let (second, _) = self.authorize(request).await?;
        let resp = self.identity.transport.send(second).await?;
        transport::check(resp)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Url;

    use super::{EndpointResolver, Grant, ProviderSession, TokenRefresher};
    use crate::identity::EndpointQuery;
    use crate::{Error, ErrorKind, Result};

    #[derive(Debug)]
    struct FixedResolver;

    impl EndpointResolver for FixedResolver {
        fn locate(&self, query: &EndpointQuery) -> Result<Url> {
            Ok(Url::parse(&format!("https://{}.example/", query.service_type)).unwrap())
        }
    }

    #[derive(Debug, Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self) -> Result<Grant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(Error::new(ErrorKind::AuthenticationFailed, "bad password"))
            } else {
                Ok(Grant::from_token(format!("T{}", n + 1)))
            }
        }
    }

    #[derive(Debug)]
    struct SlowRefresher;

    #[async_trait]
    impl TokenRefresher for SlowRefresher {
        async fn refresh(&self) -> Result<Grant> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Grant::from_token("NEW"))
        }
    }

    fn session() -> ProviderSession {
        ProviderSession::new("https://id.example/v3").unwrap()
    }

    #[tokio::test]
    async fn test_new_session() {
        let s = session();
        assert_eq!(s.identity_base().as_str(), "https://id.example/");
        assert_eq!(s.identity_endpoint().as_str(), "https://id.example/v3/");
        assert!(!s.is_authenticated().await);
        assert!(s.token().await.is_none());
        let err = s
            .locate_endpoint(&EndpointQuery::new("compute"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
    }

    #[tokio::test]
    async fn test_resolver() {
        let s = session();
        s.set_endpoint_resolver(Arc::new(FixedResolver)).await;
        let url = s
            .locate_endpoint(&EndpointQuery::new("compute"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://compute.example/");
    }

    #[tokio::test]
    async fn test_reauthenticate_without_refresher() {
        let s = session();
        let err = s.reauthenticate().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_reauthenticate_repeatedly() {
        let s = session();
        let refresher = Arc::new(CountingRefresher::default());
        s.set_token_refresher(Some(refresher.clone())).await;

        for expected in 1..=3 {
            s.reauthenticate().await.unwrap();
            let snapshot = s.snapshot().await;
            assert_eq!(snapshot.generation(), expected);
            assert_eq!(snapshot.token(), Some(format!("T{}", expected + 1).as_str()));
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reauthenticate_failure_keeps_state() {
        let s = session();
        s.set_token_refresher(Some(Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            fail: false,
        })))
        .await;
        s.reauthenticate().await.unwrap();
        let before = s.snapshot().await;

        let failing = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        s.set_token_refresher(Some(failing.clone())).await;
        let err = s.reauthenticate().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(s.snapshot().await, before);

        // A later attempt is not served the stale failure.
        let _ = s.reauthenticate().await.err().unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_generation_skips_reauth() {
        let s = session();
        let refresher = Arc::new(CountingRefresher::default());
        s.set_token_refresher(Some(refresher.clone())).await;
        s.reauthenticate().await.unwrap();
        s.reauthenticate_after(0).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_debug_hides_token() {
        let s = session();
        let _ = s.state.write().await.install(Grant::from_token("secret-token"));
        assert!(!format!("{:?}", Grant::from_token("secret-token")).contains("secret-token"));
        assert!(!format!("{:?}", s.snapshot().await).contains("secret-token"));
    }

    #[tokio::test]
    async fn test_abandoned_reauth_is_reported_to_waiters() {
        let s = Arc::new(session());
        let generation = s.state.write().await.install(Grant::from_token("OLD"));
        s.set_token_refresher(Some(Arc::new(SlowRefresher))).await;

        let first = {
            let s = s.clone();
            tokio::spawn(async move { s.reauthenticate().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let s = s.clone();
            tokio::spawn(async move { s.reauthenticate().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        first.abort();
        assert!(first.await.err().unwrap().is_cancelled());
        let err = second.await.unwrap().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let snapshot = s.snapshot().await;
        assert_eq!(snapshot.token(), Some("OLD"));
        assert_eq!(snapshot.generation(), generation);
    }
}
