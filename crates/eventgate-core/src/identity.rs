//! Content-addressed identities for event sources and graph nodes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest for a node ID.
const NODE_ID_HEX_LEN: usize = 16;

/// Identity of an event source, derived from its key and raw config.
///
/// Two definitions with identical key and config collapse to the same ID;
/// any byte change in either produces a new one. Semantically equal configs
/// that serialize differently are treated as different sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Hash `key` and `raw_config` into a source identity.
    ///
    /// The key is length-prefixed so that `("ab", "c")` and `("a", "bc")`
    /// never share an identity.
    pub fn derive(key: &str, raw_config: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update(raw_config.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a node name into the key used by a sensor's node map.
pub(crate) fn node_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(NODE_ID_HEX_LEN);
    id
}
