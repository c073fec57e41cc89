//! Device identity value.
//!
//! A device is identified by a random UUIDv4 generated once and persisted
//! alongside the journal. Loading and persisting it is `tally-store`'s job;
//! this module only generates and validates the value.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::IdentityError;

/// Length of a hyphenated UUID string.
const CANONICAL_LEN: usize = 36;

/// Character positions of the four hyphens.
const SEPARATORS: [usize; 4] = [8, 13, 18, 23];

/// Stable random identifier for this device, in canonical UUID form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generate a fresh identity from 16 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_random_bytes(rand::random::<[u8; 16]>())
    }

    /// Build an identity from raw bytes, forcing the version 4 nibble and the
    /// RFC 4122 variant bits.
    #[must_use]
    pub fn from_random_bytes(mut bytes: [u8; 16]) -> Self {
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(Uuid::from_bytes(bytes).hyphenated().to_string())
    }

    /// Accept a persisted value if it has the canonical UUID shape.
    ///
    /// The value is kept verbatim so re-reading it is idempotent.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        validate_shape(value)?;
        Ok(Self(value.to_owned()))
    }

    /// Return the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_shape(value: &str) -> Result<(), IdentityError> {
    let len = value.chars().count();
    if len != CANONICAL_LEN {
        return Err(IdentityError::WrongLength { len });
    }
    for (position, ch) in value.chars().enumerate() {
        let ok = if SEPARATORS.contains(&position) {
            ch == '-'
        } else {
            ch.is_ascii_hexdigit()
        };
        if !ok {
            return Err(IdentityError::BadCharacter {
                position,
                found: ch,
            });
        }
    }
    Ok(())
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_shape(&value)?;
        Ok(Self(value))
    }
}

impl From<DeviceIdentity> for String {
    fn from(id: DeviceIdentity) -> Self {
        id.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
