use serde::Deserialize;
use serde::Serialize;

/// Length of a record digest
pub const DIGEST_SIZE: usize = 20;

/// User supplied part of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserKey {
    Int(i64),
    String(String),
    Blob(Vec<u8>),
}

impl From<i64> for UserKey {
    fn from(v: i64) -> Self {
        UserKey::Int(v)
    }
}

impl From<i32> for UserKey {
    fn from(v: i32) -> Self {
        UserKey::Int(i64::from(v))
    }
}

impl From<&str> for UserKey {
    fn from(v: &str) -> Self {
        UserKey::String(v.to_string())
    }
}

impl From<String> for UserKey {
    fn from(v: String) -> Self {
        UserKey::String(v)
    }
}

impl From<Vec<u8>> for UserKey {
    fn from(v: Vec<u8>) -> Self {
        UserKey::Blob(v)
    }
}

/// Immutable identifier of one record
///
/// Keys are compared by value and double as correlation tokens between a
/// batch request and the per-key results coming back from the nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub namespace: String,
    pub set_name: Option<String>,
    pub user_key: Option<UserKey>,
    pub digest: Option<[u8; DIGEST_SIZE]>,
}

impl Key {
    pub fn new(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
        user_key: impl Into<UserKey>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name: Some(set_name.into()),
            user_key: Some(user_key.into()),
            digest: None,
        }
    }

    /// Key addressed by digest only, as returned by scans that do not send
    /// the user key back
    pub fn from_digest(
        namespace: impl Into<String>,
        set_name: Option<String>,
        digest: [u8; DIGEST_SIZE],
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name,
            user_key: None,
            digest: Some(digest),
        }
    }

    pub fn set_name(&self) -> Option<&str> {
        self.set_name.as_deref()
    }
}
