use futures::StreamExt;
use kv_reactor::Bin;
use kv_reactor::Filter;
use kv_reactor::IndexSpec;
use kv_reactor::IndexType;
use kv_reactor::KeyRecord;
use kv_reactor::NodeFault;
use kv_reactor::ResultCode;
use kv_reactor::Statement;

use crate::common::client;
use crate::common::cluster;
use crate::common::id_off_node;
use crate::common::key;
use crate::common::keys;
use crate::common::seed;
use crate::common::NAMESPACE;
use crate::common::SET;

#[tokio::test]
async fn test_streaming_get_skips_unreachable_node() {
    let cluster = cluster(3);
    let b = id_off_node(&cluster, &key("A"), "B");
    let c = id_off_node(&cluster, &key(&b), "C");
    seed(&cluster, &["A", b.as_str(), c.as_str()]);
    let faulty = cluster.node_of(&key(&b)).clone();
    cluster.set_node_fault(&faulty.name, Some(NodeFault::Unreachable));
    let client = client(&cluster);

    let results: Vec<_> = client.get_multi(None, keys(&["A", b.as_str(), c.as_str()])).collect().await;

    let (items, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    assert_eq!(errors.len(), 1, "one deferred terminal error");
    assert_eq!(
        errors[0].as_ref().unwrap_err().result_code(),
        ResultCode::ServerNotAvailable
    );

    let delivered: Vec<KeyRecord> = items.into_iter().map(Result::unwrap).collect();
    assert!(delivered.iter().all(|r| *cluster.node_of(&r.key) != faulty));
    assert!(delivered.iter().any(|r| r.key == key("A")));
    assert!(!delivered.iter().any(|r| r.key == key(&b)));
}

#[tokio::test]
async fn test_streaming_get_reports_missing_keys_without_records() {
    let cluster = cluster(2);
    seed(&cluster, &["A"]);
    let client = client(&cluster);

    let mut results: Vec<KeyRecord> = client
        .get_multi(None, keys(&["A", "B"]))
        .map(|r| r.unwrap())
        .collect()
        .await;
    results.sort_by_key(|r| format!("{:?}", r.key));

    assert_eq!(results.len(), 2);
    assert!(results[0].record.is_some());
    assert!(results[1].record.is_none());
}

#[tokio::test]
async fn test_cancel_after_k_items_stops_delivery() {
    let cluster = cluster(3);
    let ids: Vec<String> = (0..50).map(|i| format!("s{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    seed(&cluster, &id_refs);
    let client = client(&cluster);

    let mut stream = client.scan_all(None, NAMESPACE, Some(SET.to_string()), Vec::new());
    let mut received = 0;
    while received < 3 {
        stream.next().await.unwrap().unwrap();
        received += 1;
    }
    stream.cancel();

    assert!(stream.next().await.is_none());
    assert!(stream.is_cancelled());
}

#[tokio::test]
async fn test_stream_emits_exactly_one_terminal() {
    let cluster = cluster(3);
    seed(&cluster, &["A", "B", "C", "D"]);
    let client = client(&cluster);

    let mut stream = client.scan_all(None, NAMESPACE, None, vec!["name".to_string()]);
    let mut records = 0;
    while let Some(item) = stream.next().await {
        item.unwrap();
        records += 1;
    }

    assert_eq!(records, 4);
    // fused after the terminal
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_query_needs_index_then_filters() {
    let cluster = cluster(2);
    for (id, age) in [("A", 20), ("B", 35), ("C", 41), ("D", 60)] {
        cluster.seed(key(id), vec![Bin::new("age", age)]);
    }
    let client = client(&cluster);
    let statement = Statement::new(NAMESPACE, SET).with_filter(Filter::range("age", 30, 45));

    let unindexed: Vec<_> = client.query(None, statement.clone()).collect().await;
    assert_eq!(unindexed.len(), 1);
    assert_eq!(
        unindexed[0].as_ref().unwrap_err().result_code(),
        ResultCode::IndexNotFound
    );

    let index = IndexSpec::new(NAMESPACE, Some(SET.to_string()), "idx_age", "age", IndexType::Numeric);
    client.create_index(None, index).await.unwrap();

    let mut found: Vec<String> = client
        .query(None, statement)
        .map(|r| format!("{:?}", r.unwrap().key.user_key))
        .collect()
        .await;
    found.sort();
    assert_eq!(found.len(), 2);

    client.drop_index(None, NAMESPACE, "idx_age").await.unwrap();
}
