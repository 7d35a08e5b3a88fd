//! Pipeline driver that sequences module passes.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::SystemTime;

use crate::passes::{AsyncQueueWrapperPass, ModulePass, PassError, PassResult};
use crate::spec::Module;
use crate::trace::{emit_pass_event, PassEvent, PassEventKind, PassRunStats};

pub enum Step {
    Pass(Arc<dyn ModulePass>),
    FixedPoint { max_iters: usize, steps: Vec<Step> },
}

pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn pass(&mut self, pass: Arc<dyn ModulePass>) {
        self.steps.push(Step::Pass(pass));
    }

    /// Adds a nested group of passes that reruns until quiescent, capped at
    /// `max_iters` iterations.
    pub fn fixed_point<F>(&mut self, max_iters: usize, build: F)
    where
        F: FnOnce(&mut PipelineBuilder),
    {
        let mut inner = PipelineBuilder::new();
        build(&mut inner);
        self.steps.push(Step::FixedPoint {
            max_iters: max_iters.max(1),
            steps: inner.steps,
        });
    }

    pub fn finish(self) -> Pipeline {
        Pipeline {
            steps: self.steps,
            log_stats: crate::env::pass_stats_enabled(),
            run_counter: AtomicUsize::new(0),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pipeline {
    steps: Vec<Step>,
    log_stats: bool,
    run_counter: AtomicUsize,
}

impl Pipeline {
    pub fn run(&self, module: &mut Module) -> Result<PassResult, PassError> {
        let track_run_id = self.log_stats || crate::trace::current_sink().is_some();
        let run_id = if track_run_id {
            Some(self.run_counter.fetch_add(1, Ordering::Relaxed))
        } else {
            None
        };

        let mut totals = PassResult::default();
        run_steps(&self.steps, module, run_id, &mut totals, self.log_stats)?;
        Ok(totals)
    }
}

/// Builds the default scheduling pipeline.
pub fn default_pipeline() -> Pipeline {
    let mut builder = PipelineBuilder::new();
    builder.pass(Arc::new(AsyncQueueWrapperPass));
    builder.finish()
}

fn run_steps(
    steps: &[Step],
    module: &mut Module,
    run_id: Option<usize>,
    totals: &mut PassResult,
    log_stats: bool,
) -> Result<bool, PassError> {
    let mut changed_any = false;
    for step in steps {
        match step {
            Step::Pass(pass) => {
                let stats = pass.run(module)?;
                changed_any |= stats.changed;
                *totals = totals.merge(stats);
                let emit_ir = crate::trace::current_sink().is_some();
                if log_stats || emit_ir {
                    emit_module_pass_stats(pass.name(), module, run_id, stats, emit_ir);
                }
            }
            Step::FixedPoint { max_iters, steps } => {
                let mut iter = 0usize;
                loop {
                    if iter >= *max_iters {
                        break;
                    }
                    iter += 1;
                    let mut local = PassResult::default();
                    let changed = run_steps(steps, module, run_id, &mut local, log_stats)?;
                    *totals = totals.merge(local);
                    changed_any |= changed;
                    if !changed {
                        break;
                    }
                }
            }
        }
    }
    Ok(changed_any)
}

fn emit_module_pass_stats(
    name: &str,
    module: &Module,
    run_id: Option<usize>,
    stats: PassResult,
    emit_ir: bool,
) {
    let body_len = module
        .computations
        .iter()
        .map(|computation| computation.body.len())
        .sum();
    emit_pass_event(PassEvent {
        timestamp: SystemTime::now(),
        kind: PassEventKind::PassStats {
            run_id,
            module: module.name.clone(),
            pass: name.to_string(),
            stats: PassRunStats {
                changed: stats.changed,
                iterations: stats.iterations,
                rewrites_applied: stats.rewrites_applied,
                erased_insts: stats.erased_insts,
                body_len,
            },
        },
    });
    if emit_ir {
        emit_pass_event(PassEvent {
            timestamp: SystemTime::now(),
            kind: PassEventKind::PassIr {
                run_id,
                module: module.name.clone(),
                pass: name.to_string(),
                module_text: module.to_text(),
            },
        });
    }
}
