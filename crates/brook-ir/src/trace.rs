//! Pluggable event sink for pass instrumentation.
//!
//! Pipelines emit one stats event per pass run, plus the rendered module text
//! when a sink is installed. Nothing is recorded unless a sink is present.

use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

/// Per-pass statistics attached to a [`PassEventKind::PassStats`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRunStats {
    pub changed: bool,
    pub iterations: usize,
    pub rewrites_applied: usize,
    pub erased_insts: usize,
    pub body_len: usize,
}

#[derive(Debug, Clone)]
pub enum PassEventKind {
    PassStats {
        run_id: Option<usize>,
        module: String,
        pass: String,
        stats: PassRunStats,
    },
    PassIr {
        run_id: Option<usize>,
        module: String,
        pass: String,
        module_text: String,
    },
}

#[derive(Debug, Clone)]
pub struct PassEvent {
    pub timestamp: SystemTime,
    pub kind: PassEventKind,
}

/// Receiver for pass events emitted during pipeline runs.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: PassEvent);
}

static SINK: RwLock<Option<Arc<dyn TraceSink>>> = RwLock::new(None);

pub fn install_sink(sink: Arc<dyn TraceSink>) {
    if let Ok(mut slot) = SINK.write() {
        *slot = Some(sink);
    }
}

pub fn clear_sink() {
    if let Ok(mut slot) = SINK.write() {
        *slot = None;
    }
}

pub fn current_sink() -> Option<Arc<dyn TraceSink>> {
    SINK.read().ok().and_then(|slot| slot.clone())
}

pub fn emit_pass_event(event: PassEvent) {
    if let Some(sink) = current_sink() {
        sink.record(event);
    }
}

/// Sink that buffers events in memory, used by tests and debugging sessions.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<PassEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<PassEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: PassEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
