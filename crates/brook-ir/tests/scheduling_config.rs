use brook_ir::config::{ConfigError, SchedulingConfig, DEFAULT_QUEUE_ID};

#[test]
fn absent_blob_decodes_to_default() {
    let config = SchedulingConfig::decode(None).expect("absent blob is fine");
    assert_eq!(config.operation_queue_id, DEFAULT_QUEUE_ID);
    assert!(config.wait_on_operation_queues.is_empty());
    assert!(!config.requests_nondefault_queue());
}

#[test]
fn decodes_numeric_queue_ids() {
    let config = SchedulingConfig::decode(Some(
        r#"{"operation_queue_id":2,"wait_on_operation_queues":[4,5]}"#,
    ))
    .expect("numeric form decodes");
    assert_eq!(config.operation_queue_id, 2);
    assert_eq!(config.wait_on_operation_queues, vec![4, 5]);
    assert!(config.requests_nondefault_queue());
}

#[test]
fn decodes_string_queue_ids() {
    // 64-bit ids often arrive stringified to avoid precision loss in JSON.
    let config = SchedulingConfig::decode(Some(
        r#"{"operation_queue_id":"1","wait_on_operation_queues":["2"," 3 "]}"#,
    ))
    .expect("string form decodes");
    assert_eq!(config.operation_queue_id, 1);
    assert_eq!(config.wait_on_operation_queues, vec![2, 3]);
}

#[test]
fn missing_fields_take_defaults() {
    let config = SchedulingConfig::decode(Some("{}")).expect("empty object decodes");
    assert_eq!(config, SchedulingConfig::default());

    let config = SchedulingConfig::decode(Some(r#"{"operation_queue_id":9}"#))
        .expect("partial object decodes");
    assert_eq!(config.operation_queue_id, 9);
    assert!(config.wait_on_operation_queues.is_empty());
}

#[test]
fn truncated_blob_is_an_error() {
    let err = SchedulingConfig::decode(Some(r#"{"operation_queue_id":"#))
        .expect_err("truncated blob must fail");
    assert!(matches!(err, ConfigError::Malformed(_)));
}

#[test]
fn non_numeric_queue_id_is_an_error() {
    assert!(SchedulingConfig::decode(Some(r#"{"operation_queue_id":"fast"}"#)).is_err());
    assert!(SchedulingConfig::decode(Some(r#"{"operation_queue_id":-1}"#)).is_err());
    assert!(
        SchedulingConfig::decode(Some(r#"{"wait_on_operation_queues":[true]}"#)).is_err()
    );
}

#[test]
fn encode_emits_canonical_form() {
    let config = SchedulingConfig {
        operation_queue_id: 7,
        wait_on_operation_queues: vec![3, 1],
    };
    let blob = config.encode().expect("encode succeeds");
    assert_eq!(
        blob,
        r#"{"operation_queue_id":7,"wait_on_operation_queues":[3,1]}"#
    );
    let decoded = SchedulingConfig::decode(Some(&blob)).expect("canonical form decodes");
    assert_eq!(decoded, config);
}
