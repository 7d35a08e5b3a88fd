pub mod config;
mod env;
pub mod index;
pub mod passes;
pub mod pipeline;
pub mod rewriter;
pub mod spec;
pub mod text_ir;
pub mod trace;

pub use config::SchedulingConfig;
pub use passes::{AsyncQueueWrapperPass, ModulePass, PassError, PassResult};
pub use rewriter::ComputationRewriter;
pub use spec::{Computation, ExecutionThread, InstrId, Instruction, Module, Opcode, Operation};
