use serde::Deserialize;
use serde::Serialize;

use super::Bin;

/// One read or write step applied to a record inside `operate` calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Read one bin, or every bin when `None`
    Get(Option<String>),
    /// Read generation and expiration only
    GetHeader,
    Put(Bin),
    Append(Bin),
    Prepend(Bin),
    Add(Bin),
    Touch,
    Delete,
}

impl Operation {
    pub fn get() -> Self {
        Operation::Get(None)
    }

    pub fn get_bin(name: impl Into<String>) -> Self {
        Operation::Get(Some(name.into()))
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Get(_) | Operation::GetHeader)
    }
}

/// Shape of a single-record write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    Put,
    Append,
    Prepend,
    Add,
}

impl WriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteKind::Put => "put",
            WriteKind::Append => "append",
            WriteKind::Prepend => "prepend",
            WriteKind::Add => "add",
        }
    }

    pub fn into_operation(
        self,
        bin: Bin,
    ) -> Operation {
        match self {
            WriteKind::Put => Operation::Put(bin),
            WriteKind::Append => Operation::Append(bin),
            WriteKind::Prepend => Operation::Prepend(bin),
            WriteKind::Add => Operation::Add(bin),
        }
    }
}

/// Which part of a record a read returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadMode {
    AllBins,
    Bins(Vec<String>),
    /// Generation and expiration only
    Header,
    /// Read through read-only operations
    Operations(Vec<Operation>),
}

/// User defined function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdfCall {
    pub package: String,
    pub function: String,
    pub args: Vec<super::Value>,
}

impl UdfCall {
    pub fn new(
        package: impl Into<String>,
        function: impl Into<String>,
        args: Vec<super::Value>,
    ) -> Self {
        Self {
            package: package.into(),
            function: function.into(),
            args,
        }
    }
}
