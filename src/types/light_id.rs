// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Light identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a light as assigned by the gateway.
///
/// Identifiers are opaque strings (UUIDs on a Hue bridge) and are compared
/// verbatim.
///
/// # Examples
///
/// ```
/// use daylight_sync::types::LightId;
///
/// let id = LightId::new("3f1c2a0e-kitchen");
/// assert_eq!(id.as_str(), "3f1c2a0e-kitchen");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightId(String);

impl LightId {
    /// Creates a light identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LightId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LightId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for LightId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
