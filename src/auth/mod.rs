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

//! Credentials.
//!
//! The usual workflow is as follows:
//!
//! 1. Create a [Credential](enum.Credential.html) from one of the variants or
//!    load it with [from_env](fn.from_env.html) or
//!    [from_config](fn.from_config.html).
//! 2. Create a [ProviderSession](../struct.ProviderSession.html) for the
//!    identity endpoint.
//! 3. Authenticate the session with the credential.
//!
//! # Examples
//!
//! Password authentication scoped to a project:
//!
//! ```rust,no_run
//! # async fn example() -> osprovider::Result<()> {
//! use osprovider::auth::UserPassword;
//! use osprovider::ProviderSession;
//!
//! let session = ProviderSession::new("https://id.example.com/identity")?;
//! let credential = UserPassword::new("admin", "pa$$w0rd")
//!     .with_domain_name("Default")
//!     .with_tenant_name("project1");
//! session.authenticate(credential.into()).await?;
//! # Ok(()) }
//! ```
//!
//! Access and secret keys with an agency:
//!
//! ```rust,no_run
//! # async fn example() -> osprovider::Result<()> {
//! use osprovider::auth::{AccessSecret, AgencyDelegation};
//! use osprovider::{IdOrName, ProviderSession};
//!
//! let session = ProviderSession::new("https://iam.example.com/v3")?;
//! let base = AccessSecret::new("AK", "SK")
//!     .with_project_name("region-project")
//!     .with_domain(IdOrName::from_name("my-domain"));
//! let credential = AgencyDelegation::new(base, "ops-agency", "other-domain")
//!     .with_delegated_project("region-project");
//! session.authenticate(credential.into()).await?;
//! # Ok(()) }
//! ```

mod config;
mod credential;

pub use self::config::{from_config, from_config_file, from_env, from_lookup, from_yaml};
pub use self::credential::{AccessSecret, AgencyDelegation, Credential, ExistingToken, UserPassword};
