//! Pass infrastructure for module-level IR transformations.

mod async_queue_wrapper;

pub use async_queue_wrapper::AsyncQueueWrapperPass;

use thiserror::Error;

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::spec::Module;

/// Result returned by a [`ModulePass`] after it runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the IR.
    pub changed: bool,
    /// Number of rewrite iterations executed while applying the pass.
    pub iterations: usize,
    /// Total number of rewrites applied by the pass.
    pub rewrites_applied: usize,
    /// Instructions removed by the pass.
    pub erased_insts: usize,
}

impl PassResult {
    /// Merges two run results, accumulating statistics.
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            iterations: self.iterations + other.iterations,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            erased_insts: self.erased_insts + other.erased_insts,
        }
    }
}

/// Canonical interface implemented by passes that operate on a whole module.
pub trait ModulePass: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, module: &mut Module) -> Result<PassResult, PassError>;
}

/// Hard failures raised by a pass run. The module may be partially rewritten
/// when an error is returned.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("pass `{pass}` cannot decode backend config of `{instruction}`: {source}")]
    Config {
        pass: &'static str,
        instruction: String,
        source: ConfigError,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
}
