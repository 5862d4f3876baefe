use serde::Deserialize;
use serde::Serialize;

use super::Value;

/// Secondary index predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Equal { bin: String, value: Value },
    /// Inclusive integer range
    Range { bin: String, begin: i64, end: i64 },
}

impl Filter {
    pub fn equal(
        bin: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Filter::Equal {
            bin: bin.into(),
            value: value.into(),
        }
    }

    pub fn range(
        bin: impl Into<String>,
        begin: i64,
        end: i64,
    ) -> Self {
        Filter::Range {
            bin: bin.into(),
            begin,
            end,
        }
    }

    pub fn bin(&self) -> &str {
        match self {
            Filter::Equal { bin, .. } | Filter::Range { bin, .. } => bin,
        }
    }
}

/// Query command
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statement {
    pub namespace: String,
    pub set_name: Option<String>,
    pub index_name: Option<String>,
    /// Empty means every bin
    pub bin_names: Vec<String>,
    pub filter: Option<Filter>,
    /// 0 = unlimited
    pub max_records: u64,
}

impl Statement {
    pub fn new(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name: Some(set_name.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(
        mut self,
        filter: Filter,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_bins(
        mut self,
        bins: Vec<String>,
    ) -> Self {
        self.bin_names = bins;
        self
    }
}

/// Full namespace/set scan command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub namespace: String,
    pub set_name: Option<String>,
    /// Empty means every bin
    pub bin_names: Vec<String>,
}
