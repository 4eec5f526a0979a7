use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle identifying one entry of backing storage.
///
/// A claim owns no bytes and carries no reference count of its own: how many
/// flow files hold it is tracked by [`ContentStore`](super::content_store::ContentStore)
/// under its lock. Cloning a claim is cheap and does not attach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentClaim {
    id: Uuid,
    content_path: String,
}

impl ContentClaim {
    /// A fresh claim whose backing key is derived from a random id.
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            content_path: id.to_string(),
        }
    }

    /// A claim bound to an explicit backing key.
    pub fn with_path(content_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_path: content_path.into(),
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Key of the backing entry in the content repository.
    pub fn content_path(&self) -> &str {
        &self.content_path
    }
}

impl Default for ContentClaim {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim[{}]", self.content_path)
    }
}
