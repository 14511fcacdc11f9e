//! Staged driver of a view-factor run.
//!
//! A [`Pipeline`] owns the state machine, the event bus, the geometry loader
//! and the compute backend. [`Pipeline::run`] walks the fixed stage order
//! (parse, transfer, compute) and publishes a [`ProgressEvent`] at every
//! stage boundary. Only one run is active per pipeline at a time.

pub mod bus;
pub mod event;
pub mod observers;
pub mod state;

use std::time::{Duration, Instant};

use serde::Serialize;

pub use bus::{EventBus, Observer};
pub use event::{EventKind, ProgressEvent, format_elapsed};
pub use observers::{
    ConsoleObserver, FileObserver, FnObserver, RemoteObserver, StatusHandle, StatusObserver,
    StatusSnapshot,
};
pub use state::{PipelineState, StateMachine};

use crate::config::RunConfig;
use crate::error::{Error, GeometryError};
use crate::geom::triangles::TriangleBatch;
use crate::io::{GeometryLoader, MeshSource, StlLoader};
use crate::job::JobDescriptor;
use crate::sim::{Accumulator, CancelToken, ComputeBackend, ViewFactorKernel};
use crate::uid::UID;

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: UID,
    pub view_factor: f64,
    pub emitter_triangles: usize,
    pub receiver_triangles: usize,
    pub interconnect_triangles: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    machine: StateMachine,
    bus: EventBus,
    loader: Box<dyn GeometryLoader>,
    backend: Box<dyn ComputeBackend>,
    config: RunConfig,
    cancel: CancelToken,
}

impl Pipeline {
    /// Pipeline with the STL loader and the backend selected by `config`.
    pub fn new(config: RunConfig) -> Self {
        let backend = config.make_backend();
        Self {
            machine: StateMachine::new(),
            bus: EventBus::new(),
            loader: Box::new(StlLoader),
            backend,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_loader<L: GeometryLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_backend<B: ComputeBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub fn with_observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.bus.subscribe(observer);
        self
    }

    pub fn subscribe<O: Observer + 'static>(&mut self, observer: O) {
        self.bus.subscribe(observer);
    }

    pub fn state(&self) -> PipelineState {
        self.machine.state()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Events of the current run, or of the last one when idle.
    pub fn events(&self) -> &[ProgressEvent] {
        self.bus.events()
    }

    /// Token that cancels the active run between emitter dispatches.
    /// It is reset when the next run starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Executes one job from `Init` to `Idle`.
    ///
    /// The event log is cleared when the run starts.
    ///
    /// Geometry and compute failures put the pipeline into `Exception`,
    /// publish an `Exception` event and are returned. State errors are
    /// returned as-is without touching the state.
    pub fn run(&mut self, job: &JobDescriptor) -> Result<RunReport, Error> {
        let run_id = UID::new();
        self.machine.transition(PipelineState::Init)?;
        self.bus.clear_log();
        self.cancel.reset();
        let started = Instant::now();
        log::info!("run {run_id} started on {} backend", self.backend.name());
        self.publish(&run_id, EventKind::JobStart);

        match self.execute(&run_id, job, started) {
            Ok(report) => Ok(report),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.machine.fail();
                self.publish(&run_id, EventKind::exception(&e));
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        run_id: &UID,
        job: &JobDescriptor,
        started: Instant,
    ) -> Result<RunReport, Error> {
        self.machine.transition(PipelineState::ParsingGeometry)?;
        self.publish(run_id, EventKind::ParseStart);
        let t = Instant::now();
        let emitter = self.load_batch(&job.emitter)?;
        let receiver = self.load_batch(&job.receiver)?;
        let interconnect = match &job.interconnect {
            Some(source) => self.load_batch(source)?,
            None => TriangleBatch::empty(),
        };
        self.machine.transition(PipelineState::GeometryReady)?;
        self.publish(run_id, EventKind::ParseFinish { elapsed: t.elapsed() });
        self.publish(
            run_id,
            EventKind::Info(format!(
                "Geometry: {} emitter, {} receiver, {} interconnect triangles.",
                emitter.len(),
                receiver.len(),
                interconnect.len()
            )),
        );

        self.machine.transition(PipelineState::TransferringData)?;
        self.publish(run_id, EventKind::TransferStart);
        let t = Instant::now();
        self.backend.prepare()?;
        self.machine.transition(PipelineState::DataReady)?;
        self.publish(run_id, EventKind::TransferFinish { elapsed: t.elapsed() });

        self.machine.transition(PipelineState::Computing)?;
        self.publish(run_id, EventKind::ComputeStart);
        let t = Instant::now();
        let accumulator = Accumulator::new(self.config.accumulator_workers)?;
        let kernel = ViewFactorKernel::new(&emitter, &receiver, &interconnect);
        let bus = &mut self.bus;
        kernel.run(self.backend.as_ref(), &accumulator, &self.cancel, |p| {
            bus.publish(ProgressEvent::new(
                run_id.clone(),
                EventKind::ComputeProgress {
                    current: p.emitters_done,
                    total: p.num_emitters,
                },
            ));
        })?;
        let sum = accumulator.finish()?;
        let view_factor = self.config.normalization.apply(sum, emitter.total_area());

        self.machine.transition(PipelineState::ComputationDone)?;
        self.publish(
            run_id,
            EventKind::ComputeFinish {
                elapsed: t.elapsed(),
                result: view_factor,
            },
        );
        self.machine.transition(PipelineState::Idle)?;
        let elapsed = started.elapsed();
        self.publish(run_id, EventKind::JobFinish { elapsed });
        log::info!("run {run_id} finished: view factor {view_factor}");

        Ok(RunReport {
            run_id: run_id.clone(),
            view_factor,
            emitter_triangles: emitter.len(),
            receiver_triangles: receiver.len(),
            interconnect_triangles: interconnect.len(),
            elapsed,
        })
    }

    fn load_batch(&self, identifier: &str) -> Result<TriangleBatch, GeometryError> {
        let source = MeshSource::parse(identifier);
        let facets = self.loader.load(&source)?;
        log::debug!("loaded {} facets from {source}", facets.len());
        TriangleBatch::from_facets(&facets)
    }

    fn publish(&mut self, run_id: &UID, kind: EventKind) {
        self.bus.publish(ProgressEvent::new(run_id.clone(), kind));
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(RunConfig::new())
    }
}
