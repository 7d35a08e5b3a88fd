use brook_ir::{
    ir_module,
    passes::{AsyncQueueWrapperPass, ModulePass, PassError},
    spec::{ExecutionThread, InstrId, Opcode, ValueType},
    SchedulingConfig,
};

const ANNOTATED_ADD: &str = r#"
func @entry(%p1_32: tensor<f32, 1>, %p2_32: tensor<f32, 1>) -> tensor<f32, 1> {
  %add_32 = add(%p1_32, %p2_32) config[{"operation_queue_id":"1","wait_on_operation_queues":[]}] -> tensor<f32, 1>
  %exp_32 = exp(%add_32) config[{"operation_queue_id":"0","wait_on_operation_queues":[1]}] -> tensor<f32, 1>
  return %exp_32
}
"#;

#[test]
fn wraps_queue_annotated_instruction_into_async_pair() {
    let mut module = ir_module!(ANNOTATED_ADD);
    let result = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    assert!(result.changed);
    assert_eq!(result.rewrites_applied, 1);

    let entry = module.entry_computation().expect("entry computation");
    assert_eq!(entry.body.len(), 5);

    let start = &entry.body[2];
    assert_eq!(start.opcode(), Opcode::AsyncStart);
    assert_eq!(start.async_wrapped_opcode(), Some(Opcode::Add));
    assert_eq!(start.operands, vec![InstrId(0), InstrId(1)]);
    assert!(matches!(start.output, ValueType::Pending(_)));
    assert_eq!(start.execution_thread, ExecutionThread::Parallel);

    let done = &entry.body[3];
    assert_eq!(done.opcode(), Opcode::AsyncDone);
    assert_eq!(done.operands, vec![start.id]);
    assert!(matches!(done.output, ValueType::Tensor(_)));
    assert_eq!(done.execution_thread, ExecutionThread::Parallel);

    let consumer = &entry.body[4];
    assert_eq!(consumer.opcode(), Opcode::Exp);
    assert_eq!(consumer.operands, vec![done.id]);
    assert_eq!(entry.root_id, consumer.id);
}

#[test]
fn wrapped_instruction_keeps_queue_assignment() {
    let mut module = ir_module!(ANNOTATED_ADD);
    AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");

    let entry = module.entry_computation().expect("entry computation");
    let start = &entry.body[2];
    let wrapped = start.async_wrapped().expect("async-start payload");
    assert_eq!(wrapped.opcode(), Opcode::Add);
    assert_eq!(wrapped.execution_thread, ExecutionThread::Parallel);

    let config = SchedulingConfig::of(wrapped).expect("payload config decodes");
    assert_eq!(config.operation_queue_id, 1);
    assert!(config.wait_on_operation_queues.is_empty());

    let waiting = SchedulingConfig::of(&entry.body[4]).expect("consumer config decodes");
    assert_eq!(waiting.operation_queue_id, 0);
    assert_eq!(waiting.wait_on_operation_queues, vec![1]);
}

#[test]
fn config_blob_is_copied_verbatim() {
    // Key order and string-typed ids chosen by the producer must survive.
    let blob = r#"{"wait_on_operation_queues":["3","1"],"operation_queue_id":"7"}"#;
    let src = format!(
        r#"
func @entry(%p: tensor<f32, 2x2>) -> tensor<f32, 2x2> {{
  %t = tanh(%p) config[{blob}] -> tensor<f32, 2x2>
  return %t
}}
"#
    );
    let mut module = ir_module!(&src);
    AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");

    let entry = module.entry_computation().expect("entry computation");
    let start = &entry.body[1];
    let done = &entry.body[2];
    assert_eq!(start.backend_config.as_deref(), Some(blob));
    assert_eq!(done.backend_config.as_deref(), Some(blob));
    let wrapped = start.async_wrapped().expect("async-start payload");
    assert_eq!(wrapped.backend_config.as_deref(), Some(blob));

    let config = SchedulingConfig::of(start).expect("blob decodes");
    assert_eq!(config.operation_queue_id, 7);
    assert_eq!(config.wait_on_operation_queues, vec![3, 1]);
}

#[test]
fn redirects_root_to_async_done() {
    let mut module = ir_module!(
        r#"
func @entry(%p: tensor<f32, 4>) -> tensor<f32, 4> {
  %n = neg(%p) queue[2] -> tensor<f32, 4>
  return %n
}
"#
    );
    let result = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    assert!(result.changed);

    let entry = module.entry_computation().expect("entry computation");
    let root = entry.root().expect("root instruction");
    assert_eq!(root.opcode(), Opcode::AsyncDone);
    assert_eq!(entry.body.last().map(|inst| inst.id), Some(root.id));
}

#[test]
fn default_queue_module_is_left_untouched() {
    let mut module = ir_module!(
        r#"
func @entry(%p1: tensor<f32, 8>, %p2: tensor<f32, 8>) -> tensor<f32, 8> {
  %m = mul(%p1, %p2) queue[0] -> tensor<f32, 8>
  %e = exp(%m) -> tensor<f32, 8>
  return %e
}
"#
    );
    let before = module.clone();
    let result = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    assert!(!result.changed);
    assert_eq!(result.rewrites_applied, 0);
    assert_eq!(module, before);
}

#[test]
fn second_run_is_a_no_op() {
    let mut module = ir_module!(ANNOTATED_ADD);
    let first = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("first run must succeed");
    assert!(first.changed);

    let after_first = module.clone();
    let second = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("second run must succeed");
    assert!(!second.changed);
    assert_eq!(second.rewrites_applied, 0);
    assert_eq!(module, after_first);
}

#[test]
fn wraps_adjacent_producer_and_consumer_candidates() {
    let mut module = ir_module!(
        r#"
func @entry(%p: tensor<f32, 2>) -> tensor<f32, 2> {
  %a = add(%p, %p) queue[1] -> tensor<f32, 2>
  %b = mul(%a, %p) queue[3] -> tensor<f32, 2>
  return %b
}
"#
    );
    let result = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    assert_eq!(result.rewrites_applied, 2);

    let entry = module.entry_computation().expect("entry computation");
    assert_eq!(entry.body.len(), 5);

    let first_done = &entry.body[2];
    assert_eq!(first_done.opcode(), Opcode::AsyncDone);

    let second_start = &entry.body[3];
    assert_eq!(second_start.opcode(), Opcode::AsyncStart);
    assert_eq!(second_start.async_wrapped_opcode(), Some(Opcode::Mul));
    assert_eq!(second_start.operands, vec![first_done.id, InstrId(0)]);

    let second_done = &entry.body[4];
    assert_eq!(second_done.opcode(), Opcode::AsyncDone);
    assert_eq!(entry.root_id, second_done.id);
}

#[test]
fn wraps_candidate_without_consumers() {
    let mut module = ir_module!(
        r#"
func @entry(%p: tensor<f32, 2>) -> tensor<f32, 2> {
  %d = neg(%p) queue[5] -> tensor<f32, 2>
  %r = exp(%p) -> tensor<f32, 2>
  return %r
}
"#
    );
    let result = AsyncQueueWrapperPass
        .run(&mut module)
        .expect("pass must succeed");
    assert!(result.changed);

    let entry = module.entry_computation().expect("entry computation");
    assert_eq!(entry.body.len(), 4);
    assert_eq!(entry.body[1].opcode(), Opcode::AsyncStart);
    assert_eq!(entry.body[2].opcode(), Opcode::AsyncDone);
    assert_eq!(entry.root().map(|inst| inst.opcode()), Some(Opcode::Exp));
}

#[test]
fn malformed_config_blob_fails_the_run() {
    let mut module = ir_module!(
        r#"
func @entry(%p: tensor<f32, 2>) -> tensor<f32, 2> {
  %n = neg(%p) config[not json] -> tensor<f32, 2>
  return %n
}
"#
    );
    let err = AsyncQueueWrapperPass
        .run(&mut module)
        .expect_err("malformed blob must be a hard failure");
    match err {
        PassError::Config { pass, instruction, .. } => {
            assert_eq!(pass, AsyncQueueWrapperPass::NAME);
            assert_eq!(instruction, "n");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn malformed_blob_on_default_queue_instruction_also_fails() {
    let mut module = ir_module!(
        r#"
func @entry(%p: tensor<f32, 2>) -> tensor<f32, 2> {
  %a = add(%p, %p) config[{"operation_queue_id":"oops"}] -> tensor<f32, 2>
  return %a
}
"#
    );
    assert!(AsyncQueueWrapperPass.run(&mut module).is_err());
}
