// Copyright 2019 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Identity API version negotiation.

use std::fmt;

use http::StatusCode;
use log::{debug, error};
use reqwest::Url;

use super::protocol::{VersionAdvertisement, VersionDocument};
use super::IdentityClient;
use crate::transport;
use crate::utils::join_suffix;
use crate::{Error, ErrorKind, Result};

/// A supported Identity protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    /// Version ID as advertised by the identity service.
    pub id: &'static str,
    /// Priority, higher wins.
    pub priority: u32,
    /// URL suffix of the versioned endpoint.
    pub suffix: &'static str,
}

/// Identity API v2.0.
pub const V2: ProtocolVersion = ProtocolVersion {
    id: "v2.0",
    priority: 20,
    suffix: "/v2.0/",
};

/// Identity API v3.
pub const V3: ProtocolVersion = ProtocolVersion {
    id: "v3",
    priority: 30,
    suffix: "/v3/",
};

/// All versions this crate can talk.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 2] = [V2, V3];

impl ProtocolVersion {
    /// Whether an advertised version ID denotes this version.
    ///
    /// `v3.14` matches `v3`, `v30` does not.
    pub fn matches(&self, advertised: &str) -> bool {
        advertised == self.id
            || advertised
                .strip_prefix(self.id)
                .map_or(false, |rest| rest.starts_with('.'))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

fn is_deprecated(advertised: &VersionAdvertisement) -> bool {
    advertised.status.eq_ignore_ascii_case("deprecated")
}

/// Pick the best supported version among advertised ones.
pub(crate) fn choose_version(
    advertised: &[VersionAdvertisement],
    supported: &[ProtocolVersion],
) -> Result<ProtocolVersion> {
    advertised
        .iter()
        .flat_map(|adv| {
            supported
                .iter()
                .filter(move |v| v.matches(&adv.id))
                .map(move |v| (v.priority, !is_deprecated(adv), *v))
        })
        .max_by_key(|(priority, stable, _)| (*priority, *stable))
        .map(|(_, _, v)| v)
        .ok_or_else(|| {
            let ids: Vec<&str> = advertised.iter().map(|a| a.id.as_str()).collect();
            Error::new(
                ErrorKind::NoSupportedVersion,
                format!(
                    "None of the advertised versions [{}] is supported",
                    ids.join(", ")
                ),
            )
        })
}

/// Version already present in the endpoint, if any.
pub(crate) fn version_from_endpoint(
    endpoint: &Url,
    supported: &[ProtocolVersion],
) -> Option<ProtocolVersion> {
    let mut candidates: Vec<ProtocolVersion> = supported
        .iter()
        .filter(|v| endpoint.path().contains(v.suffix))
        .copied()
        .collect();
    candidates.sort_by_key(|v| v.priority);
    candidates.pop()
}

/// Pick a version and the versioned endpoint for an identity client.
pub(crate) async fn negotiate(
    client: &IdentityClient,
    supported: &[ProtocolVersion],
) -> Result<(ProtocolVersion, Url)> {
    if let Some(version) = version_from_endpoint(&client.endpoint, supported) {
        debug!(
            "Identity endpoint {} already carries version {}",
            client.endpoint, version
        );
        return Ok((version, client.endpoint.clone()));
    }

    debug!("Fetching identity versions from {}", client.base);
    let resp = client.transport.send(transport::get(&client.base)?).await?;
    // The identity root answers with 300 Multiple Choices.
    let resp = if resp.status() == StatusCode::MULTIPLE_CHOICES {
        resp
    } else {
        transport::check(resp)?
    };

    let document: VersionDocument = transport::parse_json(&resp).map_err(|e| {
        error!("Cannot parse versions from {}: {}", client.base, e);
        e
    })?;
    let version = choose_version(&document.into_versions(), supported)?;
    let endpoint = join_suffix(&client.base, version.suffix)?;
    debug!("Negotiated identity version {} at {}", version, endpoint);
    Ok((version, endpoint))
}

#[cfg(test)]
mod test {
    use reqwest::Url;

    use super::super::protocol::VersionAdvertisement;
    use super::{choose_version, version_from_endpoint, SUPPORTED_VERSIONS, V2, V3};
    use crate::ErrorKind;

    fn adv(id: &str, status: &str) -> VersionAdvertisement {
        VersionAdvertisement {
            id: id.to_string(),
            status: status.to_string(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_matches() {
        assert!(V3.matches("v3"));
        assert!(V3.matches("v3.14"));
        assert!(!V3.matches("v30"));
        assert!(!V3.matches("v2.0"));
        assert!(V2.matches("v2.0"));
        assert!(!V2.matches("v2"));
    }

    #[test]
    fn test_choose_highest_priority() {
        let advertised = vec![adv("v2.0", "stable"), adv("v3.14", "stable")];
        assert_eq!(choose_version(&advertised, &SUPPORTED_VERSIONS).unwrap(), V3);

        let advertised = vec![adv("v2.0", "stable")];
        assert_eq!(choose_version(&advertised, &SUPPORTED_VERSIONS).unwrap(), V2);

        let advertised = vec![adv("v3.14", "stable")];
        assert_eq!(
            choose_version(&advertised, &[V2]).err().unwrap().kind(),
            ErrorKind::NoSupportedVersion
        );
    }

    #[test]
    fn test_choose_prefers_stable() {
        let advertised = vec![adv("v3.4", "deprecated"), adv("v3.10", "CURRENT")];
        assert_eq!(choose_version(&advertised, &SUPPORTED_VERSIONS).unwrap(), V3);
        // Deprecated is still better than nothing.
        let advertised = vec![adv("v3.4", "deprecated")];
        assert_eq!(choose_version(&advertised, &SUPPORTED_VERSIONS).unwrap(), V3);
    }

    #[test]
    fn test_choose_nothing() {
        let err = choose_version(&[adv("v1.0", "stable")], &SUPPORTED_VERSIONS)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NoSupportedVersion);
        assert!(err.message().unwrap().contains("v1.0"));

        let err = choose_version(&[], &SUPPORTED_VERSIONS).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoSupportedVersion);
    }

    #[test]
    fn test_version_from_endpoint() {
        let url = Url::parse("https://id.example/v3/").unwrap();
        assert_eq!(version_from_endpoint(&url, &SUPPORTED_VERSIONS), Some(V3));
        let url = Url::parse("https://id.example/identity/v2.0/").unwrap();
        assert_eq!(version_from_endpoint(&url, &SUPPORTED_VERSIONS), Some(V2));
        let url = Url::parse("https://id.example/").unwrap();
        assert_eq!(version_from_endpoint(&url, &SUPPORTED_VERSIONS), None);
        let url = Url::parse("https://id.example/v3/").unwrap();
        assert_eq!(version_from_endpoint(&url, &[V2]), None);
    }
}
