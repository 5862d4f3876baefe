//! Error hierarchy of the adaptation layer.
//!
//! Every failure a caller can observe travels through the error channel of a
//! [`Single`](crate::Single) or [`Multi`](crate::Multi) handle. Nothing in
//! this crate raises past the handle boundary.

use std::time::Duration;

use config::ConfigError;

use crate::ResultCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation could not even be scheduled on the transport
    #[error(transparent)]
    Dispatch(#[from] DispatchRegistrationError),

    /// A node failed while the batch ran under the abort-on-node-failure policy
    #[error("Batch aborted, node {node} failed: {source}")]
    BatchAbort {
        node: String,
        #[source]
        source: Box<Error>,
    },

    /// The server rejected a single-record command
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Node level transport failures
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Fatal precondition on the caller's input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The dispatcher dropped its listener without a terminal signal
    #[error("Dispatcher dropped the listener before a terminal signal")]
    Abandoned,

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchRegistrationError {
    /// Every event loop slot is taken
    #[error("Event loop capacity exhausted: {in_flight} commands in flight, limit {limit}")]
    EventLoopExhausted { in_flight: usize, limit: usize },

    /// No runtime available to drive the command
    #[error("No event loop available: {0}")]
    NoEventLoop(String),

    /// The client was closed
    #[error("Client is closed")]
    Closed,

    /// The node is not part of the cluster view
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// The partition map does not cover the batch exactly once
    #[error("Invalid partition map: {0}")]
    InvalidPartition(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Command failed with {code:?} (in doubt: {in_doubt}): {message}")]
pub struct CommandError {
    pub code: ResultCode,
    pub in_doubt: bool,
    pub message: String,
}

impl CommandError {
    pub fn new(
        code: ResultCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            in_doubt: false,
            message: message.into(),
        }
    }

    pub fn in_doubt(mut self) -> Self {
        self.in_doubt = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Connection refused or node missing from the cluster
    #[error("Node {node} unreachable")]
    Unreachable { node: String },

    /// The node did not answer in time
    #[error("Node {node} timed out after {after:?}")]
    Timeout { node: String, after: Duration },
}

impl Error {
    /// Result code recorded for an item whose failure is isolated rather
    /// than escalated.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Error::Dispatch(_) => ResultCode::NoMoreConnections,
            Error::BatchAbort { source, .. } => source.result_code(),
            Error::Command(e) => e.code,
            Error::Node(NodeError::Unreachable { .. }) => ResultCode::ServerNotAvailable,
            Error::Node(NodeError::Timeout { .. }) => ResultCode::Timeout,
            Error::InvalidInput(_) => ResultCode::ParameterError,
            Error::Abandoned => ResultCode::NoResponse,
            Error::Config(_) => ResultCode::ParameterError,
        }
    }

    /// Whether a write may have been applied even though it reported failure.
    pub fn is_in_doubt(&self) -> bool {
        match self {
            Error::Command(e) => e.in_doubt,
            Error::Node(NodeError::Timeout { .. }) => true,
            Error::BatchAbort { source, .. } => source.is_in_doubt(),
            Error::Abandoned => true,
            _ => false,
        }
    }
}
