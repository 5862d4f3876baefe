use std::collections::HashMap;
use std::sync::Arc;

use kv_reactor::BatchItem;
use kv_reactor::BatchRead;
use kv_reactor::BatchUdf;
use kv_reactor::BatchWritePolicy;
use kv_reactor::Bin;
use kv_reactor::Error;
use kv_reactor::NodeFault;
use kv_reactor::Operation;
use kv_reactor::RecordExistsAction;
use kv_reactor::ResultCode;
use kv_reactor::UdfCall;
use kv_reactor::Value;
use kv_reactor::UDF_RESULT_BIN;

use crate::common::client;
use crate::common::cluster;
use crate::common::id_off_node;
use crate::common::key;
use crate::common::keys;
use crate::common::seed;

#[tokio::test]
async fn test_positional_read_with_missing_middle_key() {
    let cluster = cluster(3);
    seed(&cluster, &["A", "C"]);
    let client = client(&cluster);

    let result = client
        .get_batch(None, keys(&["A", "B", "C"]))
        .await
        .unwrap()
        .expect("positional batch resolves to a value");

    assert_eq!(result.keys, keys(&["A", "B", "C"]));
    assert_eq!(result.records.len(), 3);
    assert_eq!(
        result.records[0].as_ref().and_then(|r| r.get("name")),
        Some(&Value::from("A"))
    );
    assert!(result.records[1].is_none());
    assert_eq!(
        result.records[2].as_ref().and_then(|r| r.get("name")),
        Some(&Value::from("C"))
    );
}

#[tokio::test]
async fn test_positional_order_survives_jittered_replies() {
    let cluster = cluster(4);
    let ids: Vec<String> = (0..64).map(|i| format!("k{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    seed(&cluster, &id_refs);
    let client = client(&cluster);

    let exists = client.exists_batch(None, keys(&id_refs)).await.unwrap().unwrap();

    assert_eq!(exists.keys, keys(&id_refs));
    assert!(exists.exists.iter().all(|found| *found));
}

#[tokio::test]
async fn test_write_batch_constraint_failure_on_one_key() {
    let cluster = cluster(3);
    seed(&cluster, &["B"]);
    let client = client(&cluster);
    let create_only = BatchWritePolicy {
        record_exists_action: RecordExistsAction::CreateOnly,
        ..BatchWritePolicy::default()
    };

    let results = client
        .operate_batch(
            None,
            Some(create_only),
            keys(&["A", "B", "C"]),
            vec![Operation::Put(Bin::new("n", 1))],
        )
        .await
        .unwrap()
        .expect("write batch always resolves to a value");

    assert!(!results.status);
    let codes: Vec<ResultCode> = results.records.iter().map(|r| r.result_code).collect();
    assert_eq!(codes, vec![ResultCode::Ok, ResultCode::KeyExists, ResultCode::Ok]);
    assert!(!results.records[1].in_doubt);

    let a = client.get(None, key("A")).await.unwrap().unwrap();
    assert_eq!(a.record.unwrap().get("n"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_empty_positional_batch_resolves_without_dispatch() {
    let cluster = cluster(2);
    let client = client(&cluster);

    let found = client.get_batch(None, Vec::new()).await.unwrap().unwrap();
    assert!(found.is_empty());

    let results = client
        .operate_batch(None, None, Vec::new(), vec![Operation::Touch])
        .await
        .unwrap()
        .unwrap();
    assert!(results.records.is_empty());
    assert!(results.status);
    assert_eq!(cluster.in_flight(), 0);
}

#[tokio::test]
async fn test_read_batch_aborts_when_a_node_is_unreachable() {
    let cluster = cluster(3);
    let b = id_off_node(&cluster, &key("A"), "B");
    seed(&cluster, &["A", b.as_str()]);
    cluster.set_node_fault(&cluster.node_of(&key(&b)).name.clone(), Some(NodeFault::Unreachable));
    let client = client(&cluster);

    let err = client
        .get_batch(None, vec![key("A"), key(&b)])
        .await
        .unwrap_err();

    match &err {
        Error::BatchAbort { node, .. } => assert!(node.starts_with(&cluster.node_of(&key(&b)).name)),
        other => panic!("expected batch abort, got {other:?}"),
    }
    assert_eq!(err.result_code(), ResultCode::ServerNotAvailable);
}

#[tokio::test]
async fn test_delete_batch_keeps_going_past_unreachable_node() {
    let cluster = cluster(3);
    let b = id_off_node(&cluster, &key("A"), "B");
    seed(&cluster, &["A", b.as_str()]);
    cluster.set_node_fault(&cluster.node_of(&key(&b)).name.clone(), Some(NodeFault::Unreachable));
    let client = client(&cluster);

    let results = client
        .delete_batch(None, None, vec![key("A"), key(&b)])
        .await
        .unwrap()
        .unwrap();

    assert!(!results.status);
    assert_eq!(results.records[0].result_code, ResultCode::Ok);
    assert_eq!(results.records[1].result_code, ResultCode::ServerNotAvailable);
    assert_eq!(cluster.record_count(), 1);
}

#[tokio::test]
async fn test_operate_records_runs_batch_udf() {
    let cluster = cluster(2);
    seed(&cluster, &["A"]);
    cluster.register_udf(
        "util",
        "rename",
        Arc::new(|bins: &mut HashMap<String, Value>, args: &[Value]| -> Result<Option<Value>, String> {
            let name = args.first().cloned().ok_or("missing name")?;
            Ok(bins.insert("name".to_string(), name))
        }),
    );
    let client = client(&cluster);

    let items = vec![
        BatchItem::Udf(BatchUdf {
            key: key("A"),
            policy: None,
            call: UdfCall::new("util", "rename", vec![Value::from("Z")]),
        }),
        BatchItem::Read(BatchRead::bins(key("A"), vec!["name".to_string()])),
    ];
    let results = client.operate_records(None, items).await.unwrap().unwrap();

    assert!(results.status);
    let returned = results.records[0].record.as_ref().and_then(|r| r.get(UDF_RESULT_BIN));
    assert_eq!(returned, Some(&Value::from("A")));
}

#[tokio::test]
async fn test_read_batches_abort_on_failed_key() {
    let cluster = cluster(3);
    seed(&cluster, &["A", "B"]);
    cluster.fail_key(key("B"), ResultCode::ParameterError);
    let client = client(&cluster);

    let err = client.get_batch(None, keys(&["A", "B"])).await.unwrap_err();
    assert!(matches!(err, Error::BatchAbort { .. }));
    assert_eq!(err.result_code(), ResultCode::ParameterError);

    let err = client.exists_batch(None, keys(&["A", "B"])).await.unwrap_err();
    assert!(matches!(err, Error::BatchAbort { .. }));
    assert_eq!(err.result_code(), ResultCode::ParameterError);

    let found = client.get_batch(None, keys(&["A", "C"])).await.unwrap().unwrap();
    assert!(found.records[0].is_some());
    assert!(found.records[1].is_none());
}
