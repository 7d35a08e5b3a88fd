//! Wraps queue-annotated instructions into async start/done pairs.
//!
//! Any instruction whose backend config assigns it to a non-default operation
//! queue is split into an `async-start` carrying the original instruction as
//! its payload and an `async-done` that retires it. Consumers of the original
//! value, the computation root included, are redirected to the `async-done`,
//! so later scheduling stages see an explicit split point instead of an
//! annotated synchronous op.

use crate::config::SchedulingConfig;
use crate::passes::{ModulePass, PassError, PassResult};
use crate::rewriter::ComputationRewriter;
use crate::spec::{Computation, ExecutionThread, InstrId, Module, Operation};

#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncQueueWrapperPass;

impl AsyncQueueWrapperPass {
    pub const NAME: &'static str = "async-queue-wrapper";

    /// Thread tag stamped on both halves of every pair the pass creates.
    pub const ASYNC_THREAD: ExecutionThread = ExecutionThread::Parallel;
}

impl ModulePass for AsyncQueueWrapperPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, module: &mut Module) -> Result<PassResult, PassError> {
        let mut rewrites = 0usize;
        for computation in &mut module.computations {
            rewrites += wrap_computation(computation)?;
        }
        Ok(PassResult {
            changed: rewrites > 0,
            iterations: 0,
            rewrites_applied: rewrites,
            erased_insts: 0,
        })
    }
}

fn wrap_computation(computation: &mut Computation) -> Result<usize, PassError> {
    let mut rewriter = ComputationRewriter::new(computation)?;

    // Candidates are fixed up front in declaration order. Pairs minted below
    // carry the original config blob and must not be reconsidered, hence the
    // async opcode filter; this is what keeps a second run a no-op.
    let mut candidates: Vec<InstrId> = Vec::new();
    for id in rewriter.insts_in_order() {
        let instruction = rewriter.instruction(id)?;
        if instruction.opcode().is_async() {
            continue;
        }
        let config = SchedulingConfig::of(instruction).map_err(|source| PassError::Config {
            pass: AsyncQueueWrapperPass::NAME,
            instruction: instruction.name.clone(),
            source,
        })?;
        if config.requests_nondefault_queue() {
            candidates.push(id);
        }
    }

    for id in &candidates {
        wrap_instruction(&mut rewriter, *id)?;
    }
    Ok(candidates.len())
}

fn wrap_instruction(rewriter: &mut ComputationRewriter, id: InstrId) -> Result<(), PassError> {
    let was_root = rewriter.is_root(id);
    let (pos, mut wrapped) = rewriter.take(id)?;

    let operands = wrapped.operands.clone();
    let output = wrapped.output.clone();
    // The config blob is copied byte for byte onto both halves; re-encoding
    // could perturb key order or number formatting chosen by the producer.
    let backend_config = wrapped.backend_config.clone();
    let base_name = wrapped.name.clone();
    wrapped.execution_thread = AsyncQueueWrapperPass::ASYNC_THREAD;

    let start = rewriter.insert_at(
        pos,
        format!("{base_name}-start"),
        Operation::AsyncStart(Box::new(wrapped)),
        operands,
        output.as_pending(),
        backend_config.clone(),
        AsyncQueueWrapperPass::ASYNC_THREAD,
    )?;
    let done = rewriter.insert_at(
        pos + 1,
        format!("{base_name}-done"),
        Operation::AsyncDone,
        vec![start],
        output,
        backend_config,
        AsyncQueueWrapperPass::ASYNC_THREAD,
    )?;

    rewriter.redirect_uses(id, done)?;
    if was_root {
        rewriter.set_root(done)?;
    }
    Ok(())
}
