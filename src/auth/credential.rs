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

//! Credential variants.

use std::fmt;

use crate::types::IdOrName;
use crate::utils::hashed;
use crate::{Error, ErrorKind, Result};

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::new(
            ErrorKind::InvalidInput,
            format!("{} must not be empty", what),
        ))
    } else {
        Ok(())
    }
}

/// User name (or ID) and password.
#[derive(Clone)]
pub struct UserPassword {
    user: IdOrName,
    password: String,
    domain: Option<IdOrName>,
    tenant: Option<IdOrName>,
    allow_reauth: bool,
}

/// A token issued elsewhere.
#[derive(Clone)]
pub struct ExistingToken {
    token_id: String,
}

/// Access key and secret key used to sign requests.
#[derive(Clone)]
pub struct AccessSecret {
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
    project: Option<IdOrName>,
    domain: Option<IdOrName>,
    bss_domain: Option<IdOrName>,
    region: Option<String>,
}

/// Authentication on behalf of an agency in another domain.
#[derive(Debug, Clone)]
pub struct AgencyDelegation {
    base: Box<Credential>,
    agency_name: String,
    agency_domain_name: String,
    delegated_project: Option<String>,
}

/// Credentials to authenticate with.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Password authentication.
    Password(UserPassword),
    /// Pre-issued token.
    Token(ExistingToken),
    /// Access/secret key pair.
    AccessSecret(AccessSecret),
    /// Agency delegation on top of another credential.
    Agency(AgencyDelegation),
}

impl UserPassword {
    /// Authenticate with a user name and a password.
    pub fn new<S1, S2>(user_name: S1, password: S2) -> UserPassword
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        UserPassword::new_with_user(IdOrName::from_name(user_name), password)
    }

    /// Authenticate with a user ID or name and a password.
    pub fn new_with_user<S: Into<String>>(user: IdOrName, password: S) -> UserPassword {
        UserPassword {
            user,
            password: password.into(),
            domain: None,
            tenant: None,
            allow_reauth: true,
        }
    }

    /// Set the user domain.
    pub fn with_domain(mut self, domain: IdOrName) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Set the user domain by name.
    pub fn with_domain_name<S: Into<String>>(self, domain_name: S) -> Self {
        self.with_domain(IdOrName::from_name(domain_name))
    }

    /// Set the tenant (project) to scope to.
    pub fn with_tenant(mut self, tenant: IdOrName) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Set the tenant (project) to scope to by name.
    pub fn with_tenant_name<S: Into<String>>(self, tenant_name: S) -> Self {
        self.with_tenant(IdOrName::from_name(tenant_name))
    }

    /// Set the tenant (project) to scope to by ID.
    pub fn with_tenant_id<S: Into<String>>(self, tenant_id: S) -> Self {
        self.with_tenant(IdOrName::from_id(tenant_id))
    }

    /// Whether the session may re-authenticate with these credentials.
    pub fn with_reauth(mut self, allow_reauth: bool) -> Self {
        self.allow_reauth = allow_reauth;
        self
    }

    /// User name or ID.
    #[inline]
    pub fn user(&self) -> &IdOrName {
        &self.user
    }

    #[inline]
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// User domain.
    #[inline]
    pub fn domain(&self) -> Option<&IdOrName> {
        self.domain.as_ref()
    }

    /// Tenant (project).
    #[inline]
    pub fn tenant(&self) -> Option<&IdOrName> {
        self.tenant.as_ref()
    }

    /// Whether re-authentication is allowed.
    #[inline]
    pub fn allow_reauth(&self) -> bool {
        self.allow_reauth
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UserPassword {{ user: {:?}, password: hash({}), domain: {:?}, tenant: {:?}, \
             allow_reauth: {} }}",
            self.user,
            hashed(&self.password),
            self.domain,
            self.tenant,
            self.allow_reauth
        )
    }
}

impl ExistingToken {
    /// Use an existing token.
    pub fn new<S: Into<String>>(token_id: S) -> ExistingToken {
        ExistingToken {
            token_id: token_id.into(),
        }
    }

    #[inline]
    pub(crate) fn token_id(&self) -> &str {
        &self.token_id
    }
}

impl fmt::Debug for ExistingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExistingToken {{ token_id: hash({}) }}", hashed(&self.token_id))
    }
}

impl AccessSecret {
    /// Sign requests with an access key and a secret key.
    pub fn new<S1, S2>(access_key: S1, secret_key: S2) -> AccessSecret
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        AccessSecret {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
            project: None,
            domain: None,
            bss_domain: None,
            region: None,
        }
    }

    /// Set the project.
    pub fn with_project(mut self, project: IdOrName) -> Self {
        self.project = Some(project);
        self
    }

    /// Set the project by ID.
    pub fn with_project_id<S: Into<String>>(self, project_id: S) -> Self {
        self.with_project(IdOrName::from_id(project_id))
    }

    /// Set the project by name, it will be resolved on authentication.
    pub fn with_project_name<S: Into<String>>(self, project_name: S) -> Self {
        self.with_project(IdOrName::from_name(project_name))
    }

    /// Set the primary domain.
    pub fn with_domain(mut self, domain: IdOrName) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Set the business (billing) domain.
    pub fn with_bss_domain(mut self, bss_domain: IdOrName) -> Self {
        self.bss_domain = Some(bss_domain);
        self
    }

    /// Region to use in signatures.
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Security token of temporary credentials.
    pub fn with_security_token<S: Into<String>>(mut self, token: S) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Access key.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    #[inline]
    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }

    #[inline]
    pub(crate) fn security_token(&self) -> Option<&str> {
        self.security_token.as_deref()
    }

    /// Project.
    #[inline]
    pub fn project(&self) -> Option<&IdOrName> {
        self.project.as_ref()
    }

    /// Primary domain.
    #[inline]
    pub fn domain(&self) -> Option<&IdOrName> {
        self.domain.as_ref()
    }

    /// Business domain.
    #[inline]
    pub fn bss_domain(&self) -> Option<&IdOrName> {
        self.bss_domain.as_ref()
    }

    /// Signature region.
    #[inline]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

impl fmt::Debug for AccessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccessSecret {{ access_key: {:?}, secret_key: hash({}), project: {:?}, \
             domain: {:?}, bss_domain: {:?}, region: {:?} }}",
            self.access_key,
            hashed(&self.secret_key),
            self.project,
            self.domain,
            self.bss_domain,
            self.region
        )
    }
}

impl AgencyDelegation {
    /// Delegate to an agency after authenticating with the base credential.
    pub fn new<C, S1, S2>(base: C, agency_name: S1, agency_domain_name: S2) -> AgencyDelegation
    where
        C: Into<Credential>,
        S1: Into<String>,
        S2: Into<String>,
    {
        AgencyDelegation {
            base: Box::new(base.into()),
            agency_name: agency_name.into(),
            agency_domain_name: agency_domain_name.into(),
            delegated_project: None,
        }
    }

    /// Project to scope the delegated token to.
    pub fn with_delegated_project<S: Into<String>>(mut self, project: S) -> Self {
        self.delegated_project = Some(project.into());
        self
    }

    /// Base credential.
    #[inline]
    pub fn base(&self) -> &Credential {
        &self.base
    }

    /// Agency name.
    #[inline]
    pub fn agency_name(&self) -> &str {
        &self.agency_name
    }

    /// Domain of the agency.
    #[inline]
    pub fn agency_domain_name(&self) -> &str {
        &self.agency_domain_name
    }

    /// Delegated project name.
    #[inline]
    pub fn delegated_project(&self) -> Option<&str> {
        self.delegated_project.as_deref()
    }
}

impl Credential {
    /// Short name of the variant for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Credential::Password(..) => "password",
            Credential::Token(..) => "token",
            Credential::AccessSecret(..) => "access/secret key",
            Credential::Agency(..) => "agency",
        }
    }

    /// Whether a session using this credential can re-authenticate.
    pub fn can_reauth(&self) -> bool {
        match self {
            Credential::Password(ref pw) => pw.allow_reauth,
            Credential::Token(..) | Credential::AccessSecret(..) => false,
            Credential::Agency(..) => true,
        }
    }

    /// Check that required values are present.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Credential::Password(ref pw) => {
                require(pw.user.value(), "User name or ID")?;
                require(&pw.password, "Password")
            }
            Credential::Token(ref token) => require(&token.token_id, "Token"),
            Credential::AccessSecret(ref aksk) => {
                require(&aksk.access_key, "Access key")?;
                require(&aksk.secret_key, "Secret key")
            }
            Credential::Agency(ref agency) => {
                if agency.agency_name.is_empty() || agency.agency_domain_name.is_empty() {
                    return Err(Error::new(
                        ErrorKind::UnknownCredential,
                        "Agency delegation requires both agency name and agency domain name",
                    ));
                }
                if let Credential::Agency(..) = *agency.base {
                    return Err(Error::new(
                        ErrorKind::UnknownCredential,
                        "Agency delegation cannot be nested",
                    ));
                }
                agency.base.validate()
            }
        }
    }
}

impl From<UserPassword> for Credential {
    fn from(value: UserPassword) -> Credential {
        Credential::Password(value)
    }
}

impl From<ExistingToken> for Credential {
    fn from(value: ExistingToken) -> Credential {
        Credential::Token(value)
    }
}

impl From<AccessSecret> for Credential {
    fn from(value: AccessSecret) -> Credential {
        Credential::AccessSecret(value)
    }
}

impl From<AgencyDelegation> for Credential {
    fn from(value: AgencyDelegation) -> Credential {
        Credential::Agency(value)
    }
}

#[cfg(test)]
mod test {
    use super::{AccessSecret, AgencyDelegation, Credential, ExistingToken, UserPassword};
    use crate::types::IdOrName;
    use crate::ErrorKind;

    #[test]
    fn test_user_password() {
        let pw = UserPassword::new("u", "p")
            .with_domain_name("Default")
            .with_tenant_name("proj");
        assert_eq!(pw.user(), &IdOrName::from_name("u"));
        assert_eq!(pw.password(), "p");
        assert_eq!(pw.domain(), Some(&IdOrName::from_name("Default")));
        assert_eq!(pw.tenant(), Some(&IdOrName::from_name("proj")));
        assert!(pw.allow_reauth());

        let cred = Credential::from(pw.clone());
        assert!(cred.can_reauth());
        cred.validate().unwrap();

        let cred = Credential::from(pw.with_reauth(false));
        assert!(!cred.can_reauth());
    }

    #[test]
    fn test_validate_empty() {
        let cred = Credential::from(UserPassword::new("u", ""));
        assert_eq!(cred.validate().err().unwrap().kind(), ErrorKind::InvalidInput);

        let cred = Credential::from(ExistingToken::new(""));
        assert_eq!(cred.validate().err().unwrap().kind(), ErrorKind::InvalidInput);

        let cred = Credential::from(AccessSecret::new("AK", ""));
        assert_eq!(cred.validate().err().unwrap().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_agency() {
        let agency = AgencyDelegation::new(UserPassword::new("u", "p"), "a1", "d1")
            .with_delegated_project("p2");
        assert_eq!(agency.agency_name(), "a1");
        assert_eq!(agency.agency_domain_name(), "d1");
        assert_eq!(agency.delegated_project(), Some("p2"));
        let cred = Credential::from(agency);
        assert!(cred.can_reauth());
        cred.validate().unwrap();

        let nested = Credential::from(AgencyDelegation::new(cred, "a2", "d2"));
        assert_eq!(
            nested.validate().err().unwrap().kind(),
            ErrorKind::UnknownCredential
        );

        let empty = Credential::from(AgencyDelegation::new(ExistingToken::new("T"), "", "d1"));
        assert_eq!(
            empty.validate().err().unwrap().kind(),
            ErrorKind::UnknownCredential
        );
    }

    #[test]
    fn test_access_secret() {
        let aksk = AccessSecret::new("AK", "SK")
            .with_project_name("proj")
            .with_domain(IdOrName::from_id("D1"))
            .with_region("r1");
        assert_eq!(aksk.project(), Some(&IdOrName::from_name("proj")));
        assert_eq!(aksk.domain(), Some(&IdOrName::from_id("D1")));
        assert_eq!(aksk.region(), Some("r1"));
        let cred = Credential::from(aksk);
        assert!(!cred.can_reauth());
        assert_eq!(cred.kind_name(), "access/secret key");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let s = format!("{:?}", UserPassword::new("u", "secret-password"));
        assert!(!s.contains("secret-password"));
        let s = format!("{:?}", ExistingToken::new("secret-token"));
        assert!(!s.contains("secret-token"));
        let s = format!("{:?}", AccessSecret::new("AK", "secret-key"));
        assert!(s.contains("AK"));
        assert!(!s.contains("secret-key"));
    }
}
