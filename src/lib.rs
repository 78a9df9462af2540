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

//! Identity bootstrap for OpenStack-based clouds.
//!
//! The goal of this project is to turn a credential into an authenticated
//! session and to find service endpoints for it.
//!
//! # Features
//!
//! * [Credentials](auth/index.html): password, existing token, access/secret
//!   keys and agency delegation, loaded directly, from the environment or
//!   from `clouds.yaml`.
//! * Identity API [version negotiation](identity/index.html) between v2.0
//!   and v3.
//! * [Service catalog](identity/struct.ServiceCatalog.html) lookup.
//! * Request signing for access/secret key credentials.
//! * Transparent re-authentication with a single refresh in flight.
//! * [Service clients](service/index.html) for services derived from
//!   catalog entries.

#![crate_type = "lib"]
// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
// Taken from https://github.com/rust-unofficial/patterns/
#![deny(
    bare_trait_objects,
    improper_ctypes,
    missing_debug_implementations,
    missing_docs,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    trivial_numeric_casts,
    unconditional_recursion,
    unsafe_code,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]

pub mod auth;
mod error;
pub mod identity;
pub mod service;
mod session;
pub mod transport;
mod types;
mod utils;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::identity::{EndpointQuery, Interface, ProtocolVersion, ServiceCatalog};
pub use crate::service::{ServiceClient, ServiceRegistry, ServiceSpec};
pub use crate::session::{EndpointResolver, Grant, ProviderSession, TokenRefresher, TokenSnapshot};
pub use crate::types::IdOrName;
pub use crate::utils::normalize_url;
