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

//! Credentials from the environment and from `clouds.yaml`.

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_derive::Deserialize;

use super::{AccessSecret, AgencyDelegation, Credential, ExistingToken, UserPassword};
use crate::types::IdOrName;
use crate::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AuthOptions {
    auth_url: Option<String>,
    username: Option<String>,
    user_id: Option<String>,
    password: Option<String>,
    tenant_id: Option<String>,
    project_id: Option<String>,
    tenant_name: Option<String>,
    project_name: Option<String>,
    domain_id: Option<String>,
    domain_name: Option<String>,
    user_domain_name: Option<String>,
    bss_domain_id: Option<String>,
    bss_domain_name: Option<String>,
    token: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    security_token: Option<String>,
    agency_name: Option<String>,
    agency_domain_name: Option<String>,
    delegated_project: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Cloud {
    #[serde(default)]
    auth: AuthOptions,
    #[serde(default)]
    region_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Root {
    clouds: HashMap<String, Cloud>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl AuthOptions {
    fn from_lookup<F>(lookup: F) -> AuthOptions
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(lookup(name));
        AuthOptions {
            auth_url: get("OS_AUTH_URL"),
            username: get("OS_USERNAME"),
            user_id: get("OS_USERID"),
            password: get("OS_PASSWORD"),
            tenant_id: get("OS_TENANT_ID"),
            project_id: get("OS_PROJECT_ID"),
            tenant_name: get("OS_TENANT_NAME"),
            project_name: get("OS_PROJECT_NAME"),
            domain_id: get("OS_DOMAIN_ID"),
            domain_name: get("OS_DOMAIN_NAME"),
            user_domain_name: get("OS_USER_DOMAIN_NAME"),
            bss_domain_id: get("OS_BSS_DOMAIN_ID"),
            bss_domain_name: get("OS_BSS_DOMAIN_NAME"),
            token: get("OS_TOKEN"),
            access_key: get("OS_ACCESS_KEY"),
            secret_key: get("OS_SECRET_KEY"),
            security_token: get("OS_SECURITY_TOKEN"),
            agency_name: get("OS_AGENCY_NAME"),
            agency_domain_name: get("OS_AGENCY_DOMAIN_NAME"),
            delegated_project: get("OS_DELEGATED_PROJECT"),
        }
    }

    fn project(&self) -> Option<IdOrName> {
        IdOrName::pick(
            self.tenant_id.clone().or_else(|| self.project_id.clone()),
            self.tenant_name.clone().or_else(|| self.project_name.clone()),
        )
    }

    fn into_credential(self, region: Option<String>) -> Result<(String, Credential)> {
        let auth_url = non_empty(self.auth_url.clone()).ok_or_else(|| {
            Error::new(ErrorKind::InvalidConfig, "Identity endpoint (auth_url) is required")
        })?;

        let project = self.project();
        let base = match (
            non_empty(self.access_key.clone()),
            non_empty(self.secret_key.clone()),
        ) {
            (Some(ak), Some(sk)) => {
                let mut aksk = AccessSecret::new(ak, sk);
                if let Some(project) = project {
                    aksk = aksk.with_project(project);
                }
                if let Some(domain) =
                    IdOrName::pick(self.domain_id.clone(), self.domain_name.clone())
                {
                    aksk = aksk.with_domain(domain);
                }
                if let Some(bss) =
                    IdOrName::pick(self.bss_domain_id.clone(), self.bss_domain_name.clone())
                {
                    aksk = aksk.with_bss_domain(bss);
                }
                if let Some(token) = non_empty(self.security_token.clone()) {
                    aksk = aksk.with_security_token(token);
                }
                if let Some(region) = non_empty(region) {
                    aksk = aksk.with_region(region);
                }
                Credential::from(aksk)
            }
            (Some(..), None) | (None, Some(..)) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    "Both access key and secret key are required",
                ));
            }
            (None, None) => {
                if let Some(token) = non_empty(self.token.clone()) {
                    Credential::from(ExistingToken::new(token))
                } else {
                    let user = IdOrName::pick(self.user_id.clone(), self.username.clone());
                    match (user, non_empty(self.password.clone())) {
                        (Some(user), Some(password)) => {
                            let mut pw = UserPassword::new_with_user(user, password);
                            if let Some(domain) = IdOrName::pick(
                                self.domain_id.clone(),
                                self.domain_name.clone().or_else(|| self.user_domain_name.clone()),
                            ) {
                                pw = pw.with_domain(domain);
                            }
                            if let Some(project) = project {
                                pw = pw.with_tenant(project);
                            }
                            Credential::from(pw)
                        }
                        _ => {
                            return Err(Error::new(
                                ErrorKind::InvalidConfig,
                                "No credentials found: need access/secret keys, a token or \
                                 a user with a password",
                            ));
                        }
                    }
                }
            }
        };

        let credential = match (
            non_empty(self.agency_name),
            non_empty(self.agency_domain_name),
        ) {
            (Some(name), Some(domain)) => {
                let mut agency = AgencyDelegation::new(base, name, domain);
                if let Some(project) = non_empty(self.delegated_project) {
                    agency = agency.with_delegated_project(project);
                }
                Credential::from(agency)
            }
            (None, None) => base,
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    "Both agency name and agency domain name are required",
                ));
            }
        };

        debug!("Using {} credentials for {}", credential.kind_name(), auth_url);
        Ok((auth_url, credential))
    }
}

/// Read the identity endpoint and credentials from `OS_*` environment variables.
///
/// Access/secret keys take precedence over a token, which takes precedence
/// over a password. `OS_AGENCY_NAME` and `OS_AGENCY_DOMAIN_NAME` wrap the
/// result into an agency delegation.
pub fn from_env() -> Result<(String, Credential)> {
    from_lookup(|name| env::var(name).ok())
}

/// Same as `from_env`, but with a custom variable lookup.
pub fn from_lookup<F>(lookup: F) -> Result<(String, Credential)>
where
    F: Fn(&str) -> Option<String>,
{
    let region = non_empty(lookup("OS_REGION_NAME"));
    AuthOptions::from_lookup(lookup).into_credential(region)
}

fn home_config() -> Option<PathBuf> {
    dirs::home_dir().map(|mut home| {
        home.push(".config/openstack/clouds.yaml");
        home
    })
}

fn find_config() -> Option<PathBuf> {
    if let Ok(path) = env::var("OS_CLIENT_CONFIG_FILE") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
        warn!("OS_CLIENT_CONFIG_FILE {:?} does not exist", path);
    }

    let current = Path::new("./clouds.yaml");
    if current.is_file() {
        match current.canonicalize() {
            Ok(val) => return Some(val),
            Err(e) => warn!("Cannot canonicalize {:?}: {}", current, e),
        }
    }

    if let Some(home) = home_config() {
        if home.is_file() {
            return Some(home);
        }
    } else {
        warn!("Cannot find home directory");
    }

    let abs = PathBuf::from("/etc/openstack/clouds.yaml");
    if abs.is_file() {
        Some(abs)
    } else {
        None
    }
}

/// Read the identity endpoint and credentials of a cloud from `clouds.yaml`.
pub fn from_config<S: AsRef<str>>(cloud_name: S) -> Result<(String, Credential)> {
    let path = find_config().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            "clouds.yaml was not found in any location",
        )
    })?;
    from_config_file(path, cloud_name)
}

/// Read the identity endpoint and credentials of a cloud from the given file.
pub fn from_config_file<P, S>(path: P, cloud_name: S) -> Result<(String, Credential)>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    debug!("Reading cloud configuration from {:?}", path);
    let file = File::open(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot read {:?}: {}", path, e),
        )
    })?;
    let root: Root = serde_yaml::from_reader(file).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot parse {:?}: {}", path, e),
        )
    })?;
    cloud_from_root(root, cloud_name.as_ref())
}

/// Read a cloud from a YAML document.
pub fn from_yaml<S: AsRef<str>>(yaml: &str, cloud_name: S) -> Result<(String, Credential)> {
    let root: Root = serde_yaml::from_str(yaml).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot parse clouds.yaml: {}", e),
        )
    })?;
    cloud_from_root(root, cloud_name.as_ref())
}

fn cloud_from_root(mut root: Root, name: &str) -> Result<(String, Credential)> {
    let cloud = root
        .clouds
        .remove(name)
        .ok_or_else(|| Error::new(ErrorKind::InvalidConfig, format!("No such cloud: {}", name)))?;
    cloud.auth.into_credential(cloud.region_name)
}
