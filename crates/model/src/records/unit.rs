use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Stable identity of a work unit: a row primary key, a chunk sequence
/// number or a remote file path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitKey(Arc<str>);

impl UnitKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// Key for sequence-numbered units such as file chunks.
    pub fn seq(n: u64) -> Self {
        Self::new(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UnitKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for UnitKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content carried by a work unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitPayload {
    /// Derived text, e.g. concatenated columns to be embedded.
    Text { text: String },
    /// A row as column -> value, in header order.
    Fields { fields: BTreeMap<String, String> },
    /// A byte range of a file.
    Chunk { offset: u64, bytes: Vec<u8> },
    /// A file to transfer, addressed relative to the byte-stream source.
    RemotePath { path: String },
}

impl UnitPayload {
    pub fn size_bytes(&self) -> usize {
        match self {
            UnitPayload::Text { text } => text.len(),
            UnitPayload::Fields { fields } => fields.iter().map(|(k, v)| k.len() + v.len()).sum(),
            UnitPayload::Chunk { bytes, .. } => bytes.len(),
            UnitPayload::RemotePath { path } => path.len(),
        }
    }
}

/// Smallest transferable piece of work. Immutable once read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub key: UnitKey,
    pub payload: UnitPayload,
}

impl WorkUnit {
    pub fn new(key: impl Into<UnitKey>, payload: UnitPayload) -> Self {
        WorkUnit {
            key: key.into(),
            payload,
        }
    }

    pub fn text(key: impl Into<UnitKey>, text: impl Into<String>) -> Self {
        Self::new(key, UnitPayload::Text { text: text.into() })
    }

    pub fn remote_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(path.clone(), UnitPayload::RemotePath { path })
    }
}
