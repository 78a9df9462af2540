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

//! Various utilities.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use reqwest::Url;

use super::{Error, ErrorKind, Result};

/// Ensure that a URL ends with a slash.
///
/// The operation is idempotent.
#[inline]
pub fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Hash of a secret, safe to show in debug output.
pub(crate) fn hashed(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Parse a URL, failing with `InvalidInput`.
pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid URL {}: {}", url, e),
        )
    })
}

/// Whether a path segment looks like an API version (`v3`, `v2.0`, `v1.1`).
pub(crate) fn is_version_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v')
        && chars.clone().next().map_or(false, |c| c.is_ascii_digit())
        && chars.all(|c| c.is_ascii_digit() || c == '.')
}

/// Split an identity endpoint into the version-less base and the endpoint itself.
///
/// Query and fragment are dropped, both results end with a slash. The base
/// stops before the first path segment that looks like a version.
pub(crate) fn split_identity_endpoint(endpoint: &str) -> Result<(Url, Url)> {
    let mut endpoint = parse_url(endpoint)?;
    if endpoint.cannot_be_a_base() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid identity endpoint {}: wrong schema?", endpoint),
        ));
    }
    endpoint.set_query(None);
    endpoint.set_fragment(None);

    let kept: Vec<String> = endpoint
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .take_while(|s| !is_version_segment(s))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut base = endpoint.clone();
    if kept.is_empty() {
        base.set_path("/");
    } else {
        base.set_path(&format!("/{}/", kept.join("/")));
    }

    let endpoint = parse_url(&normalize_url(endpoint.as_str()))?;
    Ok((base, endpoint))
}

/// Append a suffix such as `/v3/` to a base URL, avoiding duplicate slashes.
pub(crate) fn join_suffix(base: &Url, suffix: &str) -> Result<Url> {
    let trimmed = suffix.trim_matches('/');
    let base = normalize_url(base.as_str());
    if trimmed.is_empty() {
        parse_url(&base)
    } else {
        parse_url(&format!("{}{}/", base, trimmed))
    }
}
