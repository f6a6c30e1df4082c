//! SHA-1 object identities (Git-compatible)

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Kind of a stored object
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    /// Name used in the object header (`"blob"`, `"tree"`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    /// Parse a header name
    pub fn parse(name: &[u8]) -> Option<Self> {
        match name {
            b"blob" => Some(ObjectKind::Blob),
            b"tree" => Some(ObjectKind::Tree),
            b"commit" => Some(ObjectKind::Commit),
            b"tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Git object id (20-byte SHA-1)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Length of the raw id in bytes
    pub const LEN: usize = 20;

    /// Length of the hex form
    pub const HEX_LEN: usize = 40;

    /// Create an id from raw bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create an id from a slice, which must be exactly 20 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ParseError::InvalidIdLength { found: bytes.len() })?;
        Ok(Self(raw))
    }

    /// Get the id as a byte slice
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for display
    pub fn short(&self) -> String {
        self.to_hex()[..10].to_string()
    }

    /// Parse from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, ParseError> {
        if hex_str.len() != Self::HEX_LEN {
            return Err(ParseError::InvalidIdLength { found: hex_str.len() / 2 });
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|_| ParseError::InvalidHex(hex_str.to_string()))?;
        Ok(Self(bytes))
    }

    /// Compute the id of an object with the given kind and payload
    ///
    /// The hashed form is `"<kind> <len>\0<payload>"`, so two objects share an
    /// id exactly when kind and payload are identical.
    pub fn for_object(kind: ObjectKind, payload: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
