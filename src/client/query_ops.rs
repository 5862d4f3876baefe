//! Scans, queries, info commands and index administration.

use std::collections::HashMap;

use super::Client;
use crate::IndexSpec;
use crate::InfoPolicy;
use crate::KeyRecord;
use crate::Multi;
use crate::Node;
use crate::QueryPolicy;
use crate::ScanPolicy;
use crate::ScanRequest;
use crate::Single;
use crate::Statement;

impl Client {
    /// Streams the records matching `statement`
    pub fn query(
        &self,
        policy: Option<QueryPolicy>,
        statement: Statement,
    ) -> Multi<KeyRecord> {
        let policy = policy.unwrap_or_else(|| self.query_policy());
        self.multi("query", move |dispatcher, sink| dispatcher.query(&policy, &statement, sink))
    }

    /// Streams every record of a namespace and set. Empty `bin_names`
    /// reads every bin.
    pub fn scan_all(
        &self,
        policy: Option<ScanPolicy>,
        namespace: impl Into<String>,
        set_name: Option<String>,
        bin_names: Vec<String>,
    ) -> Multi<KeyRecord> {
        let policy = policy.unwrap_or_else(|| self.scan_policy());
        let request = ScanRequest {
            namespace: namespace.into(),
            set_name,
            bin_names,
        };
        self.multi("scan", move |dispatcher, sink| dispatcher.scan(&policy, &request, sink))
    }

    /// Sends one info command to `node`. Completes empty when the node does
    /// not know the command.
    pub fn info(
        &self,
        policy: Option<InfoPolicy>,
        node: Node,
        command: impl Into<String>,
    ) -> Single<String> {
        let policy = policy.unwrap_or_else(|| self.info_policy());
        let command = command.into();
        self.single("info", move |dispatcher, sink| {
            let name = command.clone();
            let sink = sink.adapt(move |mut answers: HashMap<String, String>| answers.remove(&name));
            dispatcher.info(&policy, &node, &[command], sink)
        })
    }

    /// Sends several info commands to `node` and maps each to its answer
    pub fn info_many(
        &self,
        policy: Option<InfoPolicy>,
        node: Node,
        commands: Vec<String>,
    ) -> Single<HashMap<String, String>> {
        let policy = policy.unwrap_or_else(|| self.info_policy());
        self.single("info", move |dispatcher, sink| dispatcher.info(&policy, &node, &commands, sink))
    }

    /// Creates a secondary index. Completes empty once the index exists.
    pub fn create_index(
        &self,
        policy: Option<InfoPolicy>,
        spec: IndexSpec,
    ) -> Single<()> {
        let policy = policy.unwrap_or_else(|| self.info_policy());
        self.single("create_index", move |dispatcher, sink| dispatcher.create_index(&policy, &spec, sink))
    }

    pub fn drop_index(
        &self,
        policy: Option<InfoPolicy>,
        namespace: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Single<()> {
        let policy = policy.unwrap_or_else(|| self.info_policy());
        let namespace = namespace.into();
        let index_name = index_name.into();
        self.single("drop_index", move |dispatcher, sink| {
            dispatcher.drop_index(&policy, &namespace, &index_name, sink)
        })
    }
}
