//! Hierarchical names.
//!
//! A [`Name`] is a sequence of opaque octet components, the addressing
//! primitive of the named-data substrate roundsync runs on. Names order
//! canonically: component-wise lexicographic, with a shorter name sorting
//! before any extension of it. That ordering is what makes state encodings
//! (and therefore digests) identical on every node.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::tlv::{self, types, TlvReader, TlvWriter};

/// One opaque component of a [`Name`].
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameComponent(Vec<u8>);

impl NameComponent {
    /// Create a component from raw octets.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Create a component holding a shortest-form non-negative integer.
    pub fn from_number(n: u64) -> Self {
        Self(tlv::nonneg_bytes(n))
    }

    /// Interpret the component as a non-negative integer, if well-formed.
    pub fn to_number(&self) -> Option<u64> {
        tlv::read_nonneg(&self.0).ok()
    }

    /// The raw octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Component length in octets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the component is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({self})")
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl From<&str> for NameComponent {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// A hierarchical name: an ordered sequence of [`NameComponent`]s.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name(Vec<NameComponent>);

impl Name {
    /// The empty name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a name from components.
    pub fn from_components(components: Vec<NameComponent>) -> Self {
        Self(components)
    }

    /// Parse a `/`-separated URI-style name. Components are taken as
    /// literal UTF-8 octets; empty segments are skipped, so `"/"` is the
    /// empty name.
    pub fn from_uri(uri: &str) -> Self {
        Self(
            uri.split('/')
                .filter(|s| !s.is_empty())
                .map(NameComponent::from)
                .collect(),
        )
    }

    /// Append one component, returning the extended name.
    pub fn append(mut self, component: NameComponent) -> Self {
        self.0.push(component);
        self
    }

    /// Append a numeric component.
    pub fn append_number(self, n: u64) -> Self {
        self.append(NameComponent::from_number(n))
    }

    /// Append every component of `other`.
    pub fn append_name(mut self, other: &Name) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component by index. Negative indices count from the end, so
    /// `get(-1)` is the last component.
    pub fn get(&self, index: isize) -> Option<&NameComponent> {
        let n = self.0.len() as isize;
        let i = if index < 0 { n + index } else { index };
        if i < 0 {
            return None;
        }
        self.0.get(i as usize)
    }

    /// The first `count` components; a negative count drops that many
    /// components from the end, so `prefix(-1)` strips the last one.
    pub fn prefix(&self, count: isize) -> Name {
        let n = self.0.len() as isize;
        let keep = if count < 0 { n + count } else { count };
        let keep = keep.clamp(0, n) as usize;
        Self(self.0[..keep].to_vec())
    }

    /// True when `prefix` is a (non-strict) prefix of this name.
    pub fn starts_with(&self, prefix: &Name) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Iterate over the components.
    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.0.iter()
    }

    /// Append the TLV encoding of this name to `writer`.
    pub fn encode_into(&self, writer: &mut TlvWriter) {
        let mut inner = TlvWriter::new();
        for component in &self.0 {
            inner.write_block(types::GENERIC_COMPONENT, component.as_bytes());
        }
        writer.write_block(types::NAME, inner.bytes());
    }

    /// The standalone TLV encoding of this name.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = TlvWriter::new();
        self.encode_into(&mut writer);
        writer.into_bytes()
    }

    /// Decode a name from the value of a `Name` TLV element.
    pub fn decode_value(value: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(value);
        let mut components = Vec::new();
        while !reader.is_empty() {
            let bytes = reader.expect_element(types::GENERIC_COMPONENT)?;
            components.push(NameComponent::from_bytes(bytes));
        }
        Ok(Self(components))
    }

    /// Decode a complete `Name` TLV element from `reader`.
    pub fn decode_from(reader: &mut TlvReader<'_>) -> Result<Self> {
        let value = reader.expect_element(types::NAME)?;
        Self::decode_value(value)
    }

    /// Decode a standalone encoded name.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let name = Self::decode_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(CoreError::LengthOverrun(bytes.len() as u64));
        }
        Ok(name)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for component in &self.0 {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_roundtrip() {
        let name = Name::from_uri("/alpha/beta/gamma");
        assert_eq!(name.len(), 3);
        assert_eq!(name.to_string(), "/alpha/beta/gamma");
        assert_eq!(Name::from_uri("/").to_string(), "/");
    }

    #[test]
    fn test_negative_indexing() {
        let name = Name::from_uri("/a/b/c");
        assert_eq!(name.get(0).unwrap().as_bytes(), b"a");
        assert_eq!(name.get(-1).unwrap().as_bytes(), b"c");
        assert_eq!(name.get(-3).unwrap().as_bytes(), b"a");
        assert!(name.get(-4).is_none());
        assert!(name.get(3).is_none());
    }

    #[test]
    fn test_prefix() {
        let name = Name::from_uri("/a/b/c");
        assert_eq!(name.prefix(2).to_string(), "/a/b");
        assert_eq!(name.prefix(-1).to_string(), "/a/b");
        assert_eq!(name.prefix(-3).to_string(), "/");
        assert_eq!(name.prefix(10), name);
    }

    #[test]
    fn test_starts_with() {
        let name = Name::from_uri("/a/b/c");
        assert!(name.starts_with(&Name::from_uri("/a/b")));
        assert!(name.starts_with(&name));
        assert!(!name.starts_with(&Name::from_uri("/a/x")));
        assert!(!Name::from_uri("/a").starts_with(&name));
    }

    #[test]
    fn test_number_components() {
        let name = Name::from_uri("/sync").append_number(300);
        assert_eq!(name.get(-1).unwrap().to_number(), Some(300));
        assert_eq!(NameComponent::from_number(0).to_number(), Some(0));
    }

    #[test]
    fn test_canonical_order() {
        let a = Name::from_uri("/a");
        let ab = Name::from_uri("/a/b");
        let b = Name::from_uri("/b");
        assert!(a < ab, "a prefix sorts before its extension");
        assert!(ab < b);
    }

    #[test]
    fn test_tlv_roundtrip() {
        let name = Name::from_uri("/alpha/beta").append_number(77);
        let decoded = Name::decode(&name.encode()).unwrap();
        assert_eq!(decoded, name);

        let empty = Name::new();
        assert_eq!(Name::decode(&empty.encode()).unwrap(), empty);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Name::decode(b"not tlv at all").is_err());
        // Trailing bytes after the name element are an error.
        let mut bytes = Name::from_uri("/a").encode();
        bytes.push(0x00);
        assert!(Name::decode(&bytes).is_err());
    }

    #[test]
    fn test_display_escapes_binary() {
        let name = Name::new().append(NameComponent::from_bytes(vec![0x01, 0xff]));
        assert_eq!(name.to_string(), "/%01%FF");
    }
}
