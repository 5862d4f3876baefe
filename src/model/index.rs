use serde::Deserialize;
use serde::Serialize;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Numeric,
    String,
    Blob,
    Geo2dSphere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexCollectionType {
    #[default]
    Default,
    List,
    MapKeys,
    MapValues,
}

/// Path element into a nested list or map bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ctx {
    ListIndex(i64),
    ListRank(i64),
    ListValue(Value),
    MapIndex(i64),
    MapRank(i64),
    MapKey(Value),
    MapValue(Value),
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub namespace: String,
    pub set_name: Option<String>,
    pub index_name: String,
    pub bin_name: String,
    pub index_type: IndexType,
    pub collection_type: IndexCollectionType,
    pub ctx: Vec<Ctx>,
}

impl IndexSpec {
    pub fn new(
        namespace: impl Into<String>,
        set_name: Option<String>,
        index_name: impl Into<String>,
        bin_name: impl Into<String>,
        index_type: IndexType,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name,
            index_name: index_name.into(),
            bin_name: bin_name.into(),
            index_type,
            collection_type: IndexCollectionType::Default,
            ctx: Vec::new(),
        }
    }
}
