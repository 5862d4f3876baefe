use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kv_reactor::Bin;
use kv_reactor::DispatchRegistrationError;
use kv_reactor::Error;
use kv_reactor::KeyObject;
use kv_reactor::NodeFault;
use kv_reactor::Operation;
use kv_reactor::RecordExistsAction;
use kv_reactor::ResultCode;
use kv_reactor::UdfCall;
use kv_reactor::Value;
use kv_reactor::WritePolicy;

use crate::common::client;
use crate::common::cluster;
use crate::common::key;

#[tokio::test]
async fn test_record_lifecycle() {
    let cluster = cluster(3);
    let client = client(&cluster);

    let written = client.put(None, key("A"), vec![Bin::new("name", "Alice")]).await.unwrap();
    assert_eq!(written, Some(key("A")));

    client.append(None, key("A"), vec![Bin::new("name", " Smith")]).await.unwrap();
    let found = client.get(None, key("A")).await.unwrap().unwrap();
    let record = found.record.unwrap();
    assert_eq!(record.get("name"), Some(&Value::from("Alice Smith")));
    assert_eq!(record.generation, 2);

    assert_eq!(client.exists(None, key("A")).await.unwrap(), Some(key("A")));
    assert_eq!(client.delete(None, key("A")).await.unwrap(), Some(key("A")));
    assert_eq!(client.exists(None, key("A")).await.unwrap(), None);

    let missing = client.get(None, key("A")).await.unwrap().unwrap();
    assert!(missing.record.is_none());
}

#[tokio::test]
async fn test_create_only_put_fails_on_existing_record() {
    let cluster = cluster(2);
    let client = client(&cluster);
    let create_only = WritePolicy {
        record_exists_action: RecordExistsAction::CreateOnly,
        ..WritePolicy::default()
    };

    client.put(Some(create_only), key("A"), vec![Bin::new("n", 1)]).await.unwrap();
    let err = client
        .put(Some(create_only), key("A"), vec![Bin::new("n", 2)])
        .await
        .unwrap_err();

    assert_eq!(err.result_code(), ResultCode::KeyExists);
}

#[tokio::test]
async fn test_operate_and_udf_execute() {
    let cluster = cluster(2);
    cluster.register_udf(
        "math",
        "double",
        Arc::new(|bins: &mut HashMap<String, Value>, _: &[Value]| -> Result<Option<Value>, String> {
            let n = bins.get("n").and_then(Value::as_int).ok_or("n is not an integer")?;
            bins.insert("n".to_string(), Value::Int(n * 2));
            Ok(Some(Value::Int(n * 2)))
        }),
    );
    let client = client(&cluster);

    let result = client
        .operate(
            None,
            key("A"),
            vec![Operation::Add(Bin::new("n", 5)), Operation::get_bin("n")],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.record.unwrap().get("n"), Some(&Value::Int(5)));

    let object = client
        .execute(None, key("A"), UdfCall::new("math", "double", Vec::new()))
        .await
        .unwrap();
    assert_eq!(
        object,
        Some(KeyObject {
            key: key("A"),
            object: Some(Value::Int(10)),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_timing_out_node_fails_single_command() {
    let cluster = cluster(1);
    cluster.set_node_fault("node-0", Some(NodeFault::Timeout(Duration::from_millis(500))));
    let client = client(&cluster);

    let err = client.get(None, key("A")).await.unwrap_err();
    assert_eq!(err.result_code(), ResultCode::Timeout);

    cluster.set_node_fault("node-0", None);
    assert!(client.get(None, key("A")).await.is_ok());
}

#[tokio::test]
async fn test_closed_client_fails_through_handles() {
    let cluster = cluster(2);
    let client = client(&cluster);

    client.close();
    assert!(cluster.is_closed());

    let err = client.get(None, key("A")).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(DispatchRegistrationError::Closed)));
    assert_eq!(err.result_code(), ResultCode::NoMoreConnections);
}

#[tokio::test]
async fn test_info_reaches_every_node() {
    let cluster = cluster(3);
    let client = client(&cluster);

    for node in client.nodes() {
        let name = client.info(None, node.clone(), "node").await.unwrap();
        assert_eq!(name, Some(node.name.clone()));

        let unknown = client.info(None, node, "no-such-command").await.unwrap();
        assert_eq!(unknown, None);
    }
}
