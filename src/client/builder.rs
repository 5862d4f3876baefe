use std::sync::Arc;

use super::Client;
use super::ClientInner;
use crate::BatchPolicy;
use crate::ClientConfig;
use crate::CommandDispatcher;
use crate::QueryPolicy;
use crate::ReadPolicy;
use crate::Result;
use crate::ScanPolicy;
use crate::WritePolicy;

pub struct ClientBuilder {
    config: ClientConfig,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl ClientBuilder {
    /// Create a new builder with default config on top of `dispatcher`
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            config: ClientConfig::default(),
            dispatcher,
        }
    }

    /// Default policy of single-record reads
    pub fn read_policy(
        mut self,
        policy: ReadPolicy,
    ) -> Self {
        self.config.policies.read = policy;
        self
    }

    /// Default policy of single-record writes
    pub fn write_policy(
        mut self,
        policy: WritePolicy,
    ) -> Self {
        self.config.policies.write = policy;
        self
    }

    pub fn batch_policy(
        mut self,
        policy: BatchPolicy,
    ) -> Self {
        self.config.policies.batch = policy;
        self
    }

    /// Nodes with a sub-batch in flight at once (default: 0, every node)
    pub fn max_concurrent_nodes(
        mut self,
        nodes: usize,
    ) -> Self {
        self.config.policies.batch.max_concurrent_nodes = nodes;
        self
    }

    pub fn scan_policy(
        mut self,
        policy: ScanPolicy,
    ) -> Self {
        self.config.policies.scan = policy;
        self
    }

    pub fn query_policy(
        mut self,
        policy: QueryPolicy,
    ) -> Self {
        self.config.policies.query = policy;
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Warning: Configuration Override
    /// This will discard all previous settings configured through individual
    /// methods like [`read_policy`](ClientBuilder::read_policy) or
    /// [`max_concurrent_nodes`](ClientBuilder::max_concurrent_nodes).
    ///
    /// # Example: Full Configuration
    /// ```ignore
    /// let config = ClientConfig::new()?.validate()?;
    /// let client = Client::builder(dispatcher).set_config(config).build()?;
    /// ```
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the client
    pub fn build(self) -> Result<Client> {
        let config = self.config.validate()?;
        Ok(Client::new(ClientInner {
            dispatcher: self.dispatcher,
            config,
        }))
    }
}
