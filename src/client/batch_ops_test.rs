use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing_test::traced_test;

use crate::dispatcher::MockCommandDispatcher;
use crate::BatchDelete;
use crate::BatchEntry;
use crate::BatchItem;
use crate::BatchKind;
use crate::BatchRead;
use crate::BatchRecord;
use crate::BatchWrite;
use crate::BatchWritePolicy;
use crate::Bin;
use crate::Client;
use crate::Error;
use crate::Key;
use crate::KeyExists;
use crate::Node;
use crate::NodeError;
use crate::NodeGroup;
use crate::Operation;
use crate::Record;
use crate::ResultCode;
use crate::UserKey;
use crate::Value;

fn key(k: &str) -> Key {
    Key::new("test", "demo", k)
}

fn node(i: usize) -> Node {
    Node::new(format!("node-{i}"), format!("10.0.0.{i}:3000"))
}

fn record(k: &Key) -> Record {
    let name = match &k.user_key {
        Some(UserKey::String(s)) => s.clone(),
        _ => String::new(),
    };
    Record::new(HashMap::from([("name".to_string(), Value::String(name))]), 1, 0)
}

/// Dispatcher spreading offsets round-robin over `nodes` nodes and
/// answering each entry synchronously. Nodes named in `failing` fail
/// without answering.
fn answering<F>(
    nodes: usize,
    failing: &'static [&'static str],
    answer: F,
) -> MockCommandDispatcher
where
    F: Fn(&BatchEntry) -> Option<BatchRecord> + Send + 'static,
{
    let mut mock = MockCommandDispatcher::new();
    mock.expect_partition().returning(move |_, keys| {
        let mut groups: Vec<NodeGroup> = (0..nodes)
            .map(|i| NodeGroup {
                node: node(i),
                offsets: Vec::new(),
            })
            .collect();
        for offset in 0..keys.len() {
            groups[offset % nodes].offsets.push(offset);
        }
        Ok(groups)
    });
    mock.expect_batch_node().returning(move |_, node, entries, sink| {
        if failing.contains(&node.name.as_str()) {
            sink.fail(NodeError::Unreachable { node: node.name.clone() }.into());
            return Ok(());
        }
        for entry in &entries {
            if let Some(answer) = answer(entry) {
                sink.record(entry.offset, answer);
            }
        }
        sink.complete();
        Ok(())
    });
    mock
}

/// Answers every key except those named in `missing`
fn found_unless(missing: &'static [&'static str]) -> impl Fn(&BatchEntry) -> Option<BatchRecord> + Send + 'static {
    move |entry: &BatchEntry| {
        let key = entry.item.key().clone();
        let absent = matches!(&key.user_key, Some(UserKey::String(s)) if missing.contains(&s.as_str()));
        (!absent).then(|| {
            let record = record(&key);
            BatchRecord::ok(key, entry.item.kind(), Some(record))
        })
    }
}

fn client(mock: MockCommandDispatcher) -> Client {
    Client::builder(Arc::new(mock)).build().unwrap()
}

#[tokio::test]
#[traced_test]
async fn test_get_batch_keeps_missing_keys_as_empty_slots() {
    let client = client(answering(2, &[], found_unless(&["b"])));

    let result = client
        .get_batch(None, vec![key("a"), key("b"), key("c")])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.keys, vec![key("a"), key("b"), key("c")]);
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.records[0], Some(record(&key("a"))));
    assert_eq!(result.records[1], None);
    assert_eq!(result.records[2], Some(record(&key("c"))));
}

#[tokio::test]
async fn test_empty_batch_never_reaches_dispatcher() {
    let mut mock = MockCommandDispatcher::new();
    mock.expect_partition().never();
    mock.expect_batch_node().never();
    let client = client(mock);

    let result = client.get_batch(None, Vec::new()).await.unwrap().unwrap();
    assert!(result.is_empty());

    let streamed: Vec<_> = client.get_multi(None, Vec::new()).collect().await;
    assert!(streamed.is_empty());
}

#[tokio::test]
async fn test_get_batch_aborts_on_node_failure() {
    let client = client(answering(2, &["node-1"], found_unless(&[])));

    let err = client
        .get_batch(None, vec![key("a"), key("b"), key("c")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BatchAbort { .. }));
    assert_eq!(err.result_code(), ResultCode::ServerNotAvailable);
}

#[tokio::test]
async fn test_get_headers_and_exists_batch() {
    let client = client(answering(3, &[], found_unless(&["b"])));
    let keys = vec![key("a"), key("b"), key("c")];

    let headers = client.get_headers(None, keys.clone()).await.unwrap().unwrap();
    assert_eq!(headers.records.iter().filter(|r| r.is_some()).count(), 2);

    let exists = client.exists_batch(None, keys.clone()).await.unwrap().unwrap();
    assert_eq!(exists.keys, keys);
    assert_eq!(exists.exists, vec![true, false, true]);
}

/// Answers every key, failing those named in `rejected` with a parameter error
fn rejecting(rejected: &'static [&'static str]) -> impl Fn(&BatchEntry) -> Option<BatchRecord> + Send + 'static {
    move |entry: &BatchEntry| {
        let key = entry.item.key().clone();
        let bad = matches!(&key.user_key, Some(UserKey::String(s)) if rejected.contains(&s.as_str()));
        Some(if bad {
            BatchRecord::failed(key, entry.item.kind(), ResultCode::ParameterError, false)
        } else {
            let record = record(&key);
            BatchRecord::ok(key, entry.item.kind(), Some(record))
        })
    }
}

#[tokio::test]
#[traced_test]
async fn test_read_batches_abort_on_item_error() {
    let keys = vec![key("a"), key("b"), key("c")];

    let client = client(answering(2, &[], rejecting(&["b"])));
    let err = client.get_batch(None, keys.clone()).await.unwrap_err();
    assert!(matches!(err, Error::BatchAbort { .. }));
    assert_eq!(err.result_code(), ResultCode::ParameterError);

    let err = client.exists_batch(None, keys.clone()).await.unwrap_err();
    assert!(matches!(err, Error::BatchAbort { .. }));
    assert_eq!(err.result_code(), ResultCode::ParameterError);

    let err = client.get_headers(None, keys.clone()).await.unwrap_err();
    assert_eq!(err.result_code(), ResultCode::ParameterError);

    let err = client
        .get_batch_operate(None, keys, vec![Operation::get()])
        .await
        .unwrap_err();
    assert_eq!(err.result_code(), ResultCode::ParameterError);
    assert!(logs_contain("batch item failed"));
}

#[tokio::test]
async fn test_read_batches_reject_write_operations() {
    let mut mock = MockCommandDispatcher::new();
    mock.expect_partition().never();
    let client = client(mock);

    let err = client
        .get_batch_operate(None, vec![key("a")], vec![Operation::Touch])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let reads = vec![BatchRead::operations(key("a"), vec![Operation::Add(Bin::new("n", 1))])];
    let err = client.get_batch_reads(None, reads.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let streamed: Vec<_> = client.get_multi_reads(None, reads).collect().await;
    assert_eq!(streamed.len(), 1);
    assert!(matches!(streamed[0], Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_get_batch_reads_keeps_result_codes() {
    let client = client(answering(2, &[], found_unless(&["b"])));
    let reads = vec![
        BatchRead::all_bins(key("a")),
        BatchRead::bins(key("b"), vec!["name".into()]),
        BatchRead::operations(key("c"), vec![Operation::get()]),
    ];

    let records = client.get_batch_reads(None, reads).await.unwrap().unwrap();
    let codes: Vec<ResultCode> = records.iter().map(|r| r.result_code).collect();
    assert_eq!(codes, vec![ResultCode::Ok, ResultCode::KeyNotFound, ResultCode::Ok]);
}

#[tokio::test]
async fn test_operate_batch_requires_operations() {
    let mut mock = MockCommandDispatcher::new();
    mock.expect_partition().never();
    let client = client(mock);

    let err = client
        .operate_batch(None, None, vec![key("a")], Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let items = vec![BatchItem::Write(BatchWrite {
        key: key("a"),
        policy: None,
        ops: Vec::new(),
    })];
    let err = client.operate_records(None, items).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_operate_batch_attaches_default_write_policy() {
    let client = client(answering(1, &[], |entry| match &entry.item {
        BatchItem::Write(write) if write.policy == Some(BatchWritePolicy::default()) => {
            Some(BatchRecord::ok(write.key.clone(), BatchKind::Write, None))
        }
        other => Some(BatchRecord::failed(
            other.key().clone(),
            other.kind(),
            ResultCode::ParameterError,
            false,
        )),
    }));

    let results = client
        .operate_batch(None, None, vec![key("a"), key("b")], vec![Operation::Touch])
        .await
        .unwrap()
        .unwrap();
    assert!(results.status);
}

#[tokio::test]
async fn test_write_batch_isolates_item_failure() {
    let client = client(answering(2, &[], |entry| {
        let key = entry.item.key().clone();
        if key == Key::new("test", "demo", "b") {
            Some(BatchRecord::failed(key, BatchKind::Write, ResultCode::KeyExists, false))
        } else {
            Some(BatchRecord::ok(key, BatchKind::Write, None))
        }
    }));

    let results = client
        .operate_batch(None, None, vec![key("a"), key("b")], vec![Operation::Put(Bin::new("n", 1))])
        .await
        .unwrap()
        .unwrap();

    assert!(!results.status);
    assert_eq!(results.records[0].result_code, ResultCode::Ok);
    assert_eq!(results.records[1].result_code, ResultCode::KeyExists);
}

#[tokio::test]
async fn test_delete_batch_isolates_node_failure() {
    let client = client(answering(2, &["node-1"], |entry| {
        Some(BatchRecord::ok(entry.item.key().clone(), BatchKind::Delete, None))
    }));

    let results = client
        .delete_batch(None, None, vec![key("a"), key("b"), key("c")])
        .await
        .unwrap()
        .unwrap();

    assert!(!results.status);
    assert_eq!(results.records.len(), 3);
    assert_eq!(results.records[0].result_code, ResultCode::Ok);
    assert_eq!(results.records[1].result_code, ResultCode::ServerNotAvailable);
    assert!(!results.records[1].in_doubt);
    assert_eq!(results.records[2].result_code, ResultCode::Ok);
}

#[tokio::test]
async fn test_operate_records_mixes_item_kinds() {
    let client = client(answering(2, &[], found_unless(&[])));
    let items = vec![
        BatchItem::Read(BatchRead::all_bins(key("a"))),
        BatchItem::Write(BatchWrite {
            key: key("b"),
            policy: None,
            ops: vec![Operation::Put(Bin::new("n", 1))],
        }),
        BatchItem::Delete(BatchDelete {
            key: key("c"),
            policy: None,
        }),
    ];

    let results = client.operate_records(None, items).await.unwrap().unwrap();
    let kinds: Vec<BatchKind> = results.records.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![BatchKind::Read, BatchKind::Write, BatchKind::Delete]);
    assert!(results.status);
}

#[tokio::test]
async fn test_get_multi_skips_failed_node_then_errors() {
    let client = client(answering(3, &["node-1"], found_unless(&[])));

    let results: Vec<_> = client
        .get_multi(None, vec![key("a"), key("b"), key("c")])
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    let mut delivered: Vec<Key> = results[..2].iter().map(|r| r.as_ref().unwrap().key.clone()).collect();
    delivered.sort_by_key(|k| format!("{k:?}"));
    assert_eq!(delivered, vec![key("a"), key("c")]);
    assert_eq!(results[2].as_ref().unwrap_err().result_code(), ResultCode::ServerNotAvailable);
}

#[tokio::test]
async fn test_exists_multi_reports_each_key() {
    let client = client(answering(2, &[], found_unless(&["b"])));

    let mut results: Vec<KeyExists> = client
        .exists_multi(None, vec![key("a"), key("b")])
        .map(|r| r.unwrap())
        .collect()
        .await;
    results.sort_by_key(|e| format!("{:?}", e.key));

    assert_eq!(
        results,
        vec![
            KeyExists {
                key: key("a"),
                exists: true,
            },
            KeyExists {
                key: key("b"),
                exists: false,
            },
        ]
    );
}

#[tokio::test]
async fn test_get_multi_cancel_stops_delivery() {
    let client = client(answering(1, &[], found_unless(&[])));
    let keys: Vec<Key> = ["a", "b", "c", "d"].into_iter().map(key).collect();

    let mut stream = client.get_multi_operate(None, keys, vec![Operation::get()]);
    let first = stream.next().await.unwrap().unwrap();
    assert!(first.record.is_some());

    stream.cancel();
    assert!(stream.next().await.is_none());
    assert!(stream.is_cancelled());
}
