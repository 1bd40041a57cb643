//! In-memory pipeline backend for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use super::{Pipeline, PipelineBackend, PipelineError, Sink, SinkKind};

/// Blocks pipeline starts until opened.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub(crate) fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    fn pass(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self.cond.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct Shared {
    fail_launch: AtomicBool,
    fail_start: AtomicBool,
    live: AtomicUsize,
    max_live: AtomicUsize,
    launches: AtomicUsize,
    descriptions: Mutex<Vec<String>>,
    start_gate: Mutex<Option<Arc<Gate>>>,
    /// Sinks of the most recently started pipeline.
    last_sinks: Mutex<Vec<(SinkKind, Arc<Sink>)>>,
}

/// Backend whose pipelines only track their own lifecycle.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_launch(&self, fail: bool) {
        self.shared.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_start(&self, fail: bool) {
        self.shared.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make every later start wait for the returned gate.
    pub(crate) fn gate_starts(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self
            .shared
            .start_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&gate));
        gate
    }

    /// Pipelines launched and not yet closed.
    pub(crate) fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of pipelines ever live at the same time.
    pub(crate) fn max_live(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn last_description(&self) -> Option<String> {
        self.shared
            .descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Push one buffer through the sink of the last started pipeline.
    pub(crate) fn emit(&self, kind: SinkKind, data: &[u8]) -> bool {
        let sinks = self
            .shared
            .last_sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sinks.iter().find(|(k, _)| *k == kind) {
            Some((_, sink)) => {
                sink(data, Duration::from_millis(33));
                true
            }
            None => false,
        }
    }
}

impl PipelineBackend for FakeBackend {
    fn launch(&self, description: &str) -> Result<Box<dyn Pipeline>, PipelineError> {
        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        self.shared
            .descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(description.to_string());

        if self.shared.fail_launch.load(Ordering::SeqCst) {
            return Err(PipelineError::Launch("fake launch failure".to_string()));
        }

        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakePipeline {
            shared: Arc::clone(&self.shared),
            sinks: Vec::new(),
        }))
    }
}

struct FakePipeline {
    shared: Arc<Shared>,
    sinks: Vec<(SinkKind, Arc<Sink>)>,
}

impl Pipeline for FakePipeline {
    fn set_sink(&mut self, kind: SinkKind, sink: Sink) -> Result<(), PipelineError> {
        self.sinks.push((kind, Arc::new(sink)));
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        let gate = self
            .shared
            .start_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            gate.pass();
        }

        if self.shared.fail_start.load(Ordering::SeqCst) {
            return Err(PipelineError::StateChange("no signal".to_string()));
        }

        *self
            .shared
            .last_sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = self.sinks.clone();
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PipelineError> {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
