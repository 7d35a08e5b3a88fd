use std::{
    env, fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use brook_ir::{
    ir_module,
    passes::{AsyncQueueWrapperPass, ModulePass},
    spec::{Module, ModuleSerdeError, SPEC_VERSION},
};

fn wrapped_module() -> Module {
    let mut module = ir_module!(
        r#"
func @entry(%p1: tensor<f32, 1>, %p2: tensor<f32, 1>) -> tensor<f32, 1> {
  %add_32 = add(%p1, %p2) queue[1] -> tensor<f32, 1>
  %exp_32 = exp(%add_32) -> tensor<f32, 1>
  return %exp_32
}
"#
    );
    AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    module
}

fn unique_path(ext: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    path.push(format!("brook_ir_{timestamp}.{ext}"));
    path
}

#[test]
fn json_roundtrip_preserves_async_pairs() {
    let module = wrapped_module();
    let json = module.to_json_string().expect("json serialization");
    let parsed = Module::from_json_str(&json).expect("json deserialization");
    assert_eq!(parsed, module);
}

#[test]
fn bincode_roundtrip_preserves_async_pairs() {
    let module = wrapped_module();
    let bytes = module.to_bincode_bytes().expect("bincode serialization");
    let parsed = Module::from_bincode_slice(&bytes).expect("bincode deserialization");
    assert_eq!(parsed, module);
}

#[test]
fn json_missing_spec_version_defaults() {
    let module = wrapped_module();
    let mut value = serde_json::to_value(&module).expect("serialize to json value");
    value
        .as_object_mut()
        .expect("json object")
        .remove("spec_version");
    let json = serde_json::to_string_pretty(&value).expect("encode json");
    let parsed = Module::from_json_str(&json).expect("parsed without spec version");
    assert_eq!(parsed.spec_version, SPEC_VERSION);
}

#[test]
fn json_spec_version_mismatch_errors() {
    let module = wrapped_module();
    let mut value = serde_json::to_value(&module).expect("serialize to json value");
    value["spec_version"] = serde_json::Value::String("bir.v999".to_string());
    let json = serde_json::to_string_pretty(&value).expect("encode json");
    let err = Module::from_json_str(&json).expect_err("expected spec version mismatch");
    match err {
        ModuleSerdeError::SpecVersionMismatch { found, expected } => {
            assert_eq!(found, "bir.v999");
            assert_eq!(expected, SPEC_VERSION);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn file_roundtrip_json() {
    let module = wrapped_module();
    let path = unique_path("json");
    module.save_json(&path).expect("save json to disk succeeds");
    let from_disk = Module::load_json(&path).expect("load json module");
    assert_eq!(from_disk, module);
    fs::remove_file(&path).expect("cleanup temp file");
}

#[test]
fn display_renders_async_pairs() {
    let module = wrapped_module();
    let rendered = module.to_text();
    assert!(
        rendered.contains("module @entry"),
        "rendered IR missing module header:\n{rendered}"
    );
    assert!(
        rendered.contains("async-start<add>"),
        "rendered IR missing async-start:\n{rendered}"
    );
    assert!(
        rendered.contains("async-done"),
        "rendered IR missing async-done:\n{rendered}"
    );
    assert!(
        rendered.contains("thread[parallel]"),
        "rendered IR missing thread tag:\n{rendered}"
    );
    assert!(
        rendered.contains("pending<F32, 1>"),
        "rendered IR missing pending type:\n{rendered}"
    );
    assert!(
        rendered.contains("root %exp_32"),
        "rendered IR missing root marker:\n{rendered}"
    );
}
