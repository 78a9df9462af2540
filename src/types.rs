// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Types shared between credentials and used for conversion.

use std::fmt;

/// A reference to a resource by either its ID or its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdOrName {
    /// Resource ID.
    Id(String),
    /// Resource name.
    Name(String),
}

impl IdOrName {
    /// Create an ID reference.
    #[inline]
    pub fn from_id<T: Into<String>>(id: T) -> IdOrName {
        IdOrName::Id(id.into())
    }

    /// Create a name reference.
    #[inline]
    pub fn from_name<T: Into<String>>(name: T) -> IdOrName {
        IdOrName::Name(name.into())
    }

    /// ID, if this is an ID reference.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        match self {
            IdOrName::Id(ref id) => Some(id),
            IdOrName::Name(..) => None,
        }
    }

    /// Name, if this is a name reference.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            IdOrName::Id(..) => None,
            IdOrName::Name(ref name) => Some(name),
        }
    }

    /// The referenced value, regardless of its kind.
    #[inline]
    pub fn value(&self) -> &str {
        match self {
            IdOrName::Id(ref v) | IdOrName::Name(ref v) => v,
        }
    }

    /// Pick an ID or a name, preferring the ID; empty strings count as missing.
    pub(crate) fn pick<S1, S2>(id: Option<S1>, name: Option<S2>) -> Option<IdOrName>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let id = id.map(Into::into).filter(|s: &String| !s.is_empty());
        let name = name.map(Into::into).filter(|s: &String| !s.is_empty());
        id.map(IdOrName::Id).or_else(|| name.map(IdOrName::Name))
    }
}

impl fmt::Display for IdOrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrName::Id(ref id) => write!(f, "ID {}", id),
            IdOrName::Name(ref name) => write!(f, "{}", name),
        }
    }
}
