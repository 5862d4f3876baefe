use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Server node as seen by the dispatcher's cluster view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: String,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.address)
    }
}

/// Slice of a batch owned by one node: the input offsets it must answer for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroup {
    pub node: Node,
    pub offsets: Vec<usize>,
}
