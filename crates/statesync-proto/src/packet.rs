//! Sync packet layout.
//!
//! A sync packet is a named multicast message carrying a version vector:
//! `<group-prefix>/<encoded-vector>/<auth-tail>`. The tail is either a
//! literal nonce (unsigned groups) or a signature over the preceding
//! components; receivers therefore always read the vector from `get(-2)`.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::name::{Component, Name};
use crate::vector::VersionVector;

/// Default lifetime for a sync packet in flight.
pub const DEFAULT_LIFETIME: Duration = Duration::from_millis(1000);

/// One sync message: a name plus transport metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPacket {
    name: Name,
    lifetime: Duration,
}

impl SyncPacket {
    /// Wraps a fully assembled name (prefix, vector component, auth tail).
    #[must_use]
    pub fn new(name: Name) -> Self {
        Self {
            name,
            lifetime: DEFAULT_LIFETIME,
        }
    }

    /// Overrides the packet lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Returns the full packet name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the packet lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Returns the component expected to hold the encoded version vector.
    pub fn vector_component(&self) -> Result<&Component> {
        self.name.get(-2)
    }

    /// Decodes the carried version vector.
    pub fn vector(&self) -> Result<VersionVector> {
        VersionVector::decode(self.vector_component()?.as_bytes())
    }

    /// Returns the trailing authentication component, if any.
    #[must_use]
    pub fn auth_tail(&self) -> Option<&Component> {
        self.name.get(-1).ok()
    }

    /// Bytes covered by the packet signature: the wire encoding of every
    /// component except the trailing auth component.
    #[must_use]
    pub fn signing_input(&self) -> Vec<u8> {
        self.name.parent().encode()
    }

    /// Signing input for a name that does not yet carry an auth tail.
    ///
    /// Senders call this before appending the signature; it must produce the
    /// same bytes [`signing_input`](Self::signing_input) yields on the
    /// receiving side.
    #[must_use]
    pub fn signing_input_for(unsigned_name: &Name) -> Vec<u8> {
        unsigned_name.encode()
    }
}

impl fmt::Display for SyncPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
