//! Hierarchical names.
//!
//! A [`Name`] is an ordered list of opaque byte components, written
//! `/comp1/comp2/...` with percent-escaping for bytes outside the URI
//! unreserved set. Sync packet names are built by appending the encoded
//! version vector and an authentication tail to the group prefix.

use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;

use crate::error::{CodecError, Result};
use crate::tlv;

/// One opaque component of a [`Name`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Component(Vec<u8>);

impl Component {
    /// Creates a component from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes of this component.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the component length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the component is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.0)
    }
}

/// Write bytes with percent-escaping for everything outside `[A-Za-z0-9._~-]`.
pub(crate) fn write_escaped(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for &b in bytes {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "%{:02X}", b)?;
        }
    }
    Ok(())
}

/// A hierarchical name: an ordered list of [`Component`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// Creates an empty name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if the name has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Appends a component and returns the name for chaining.
    #[must_use]
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Appends a non-negative integer as a minimally encoded component.
    #[must_use]
    pub fn append_number(self, value: u64) -> Self {
        let mut buf = BytesMut::new();
        tlv::write_nonneg_integer(&mut buf, value);
        self.append(buf.to_vec())
    }

    /// Returns the component at `index`.
    ///
    /// Negative indices count from the end: `get(-1)` is the last component,
    /// `get(-2)` the one before it.
    pub fn get(&self, index: isize) -> Result<&Component> {
        let resolved = if index < 0 {
            self.components
                .len()
                .checked_sub(index.unsigned_abs())
                .ok_or(CodecError::MissingComponent(index))?
        } else {
            index as usize
        };
        self.components
            .get(resolved)
            .ok_or(CodecError::MissingComponent(index))
    }

    /// Iterates over the components in order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Returns `true` if `self` is a prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    /// Returns a copy of this name without its last component.
    ///
    /// An empty name is returned unchanged.
    #[must_use]
    pub fn parent(&self) -> Name {
        let mut components = self.components.clone();
        components.pop();
        Name { components }
    }

    /// Encodes the name as a TLV block.
    ///
    /// Used as the signing input for packet authentication, so the encoding
    /// is deterministic.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = BytesMut::new();
        for component in &self.components {
            tlv::write_tlv(&mut inner, tlv::NAME_COMPONENT, component.as_bytes());
        }
        let mut buf = BytesMut::new();
        tlv::write_tlv(&mut buf, tlv::NAME, &inner);
        buf.to_vec()
    }

    /// Decodes a name from a TLV block produced by [`Name::encode`].
    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let mut payload = tlv::read_tlv_expect(&mut input, tlv::NAME)?;
        let mut components = Vec::new();
        while !payload.is_empty() {
            let bytes = tlv::read_tlv_expect(&mut payload, tlv::NAME_COMPONENT)?;
            components.push(Component::new(bytes));
        }
        Ok(Name { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        let mut name = Name::new();
        for part in s.split('/').filter(|p| !p.is_empty()) {
            name = name.append(unescape(part)?);
        }
        Ok(name)
    }
}

fn unescape(part: &str) -> Result<Vec<u8>> {
    let raw = part.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            if i + 3 > raw.len() {
                return Err(CodecError::InvalidName("truncated percent escape"));
            }
            let hex = std::str::from_utf8(&raw[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or(CodecError::InvalidName("bad percent escape"))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}
