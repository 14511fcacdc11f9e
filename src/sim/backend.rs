//! Compute-dispatch abstraction.
//!
//! A dispatch maps a work item `i -> f64` over the 1-D range `0..out.len()`
//! and stores each result in `out[i]`. The kernel does not know whether the
//! range runs on a thread pool or sequentially.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::ComputeError;

/// Work item evaluated once per index of a dispatch range.
pub type WorkItem<'a> = dyn Fn(usize) -> f64 + Sync + 'a;

pub trait ComputeBackend: Send {
    fn name(&self) -> &'static str;

    /// Stages the backend for a run (data transfer / resource acquisition).
    fn prepare(&mut self) -> Result<(), ComputeError> {
        Ok(())
    }

    /// Evaluates `work(i)` for every `i` in `0..out.len()`.
    fn dispatch(&self, out: &mut [f64], work: &WorkItem<'_>) -> Result<(), ComputeError>;
}

/// Single-threaded backend. Deterministic; useful as a reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn dispatch(&self, out: &mut [f64], work: &WorkItem<'_>) -> Result<(), ComputeError> {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = work(i);
        }
        Ok(())
    }
}

/// Data-parallel backend on a dedicated rayon pool built by [`ComputeBackend::prepare`].
pub struct RayonBackend {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl RayonBackend {
    /// `threads == 0` lets rayon pick the pool size.
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            pool: None,
        }
    }

    pub fn num_threads(&self) -> Option<usize> {
        self.pool.as_ref().map(|p| p.current_num_threads())
    }
}

impl ComputeBackend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn prepare(&mut self) -> Result<(), ComputeError> {
        if self.pool.is_some() {
            return Ok(());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("viewfactor-kernel-{i}"))
            .build()
            .map_err(|e| ComputeError::BackendUnavailable(e.to_string()))?;
        log::debug!(
            "rayon backend ready with {} threads",
            pool.current_num_threads()
        );
        self.pool = Some(pool);
        Ok(())
    }

    fn dispatch(&self, out: &mut [f64], work: &WorkItem<'_>) -> Result<(), ComputeError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or(ComputeError::NotPrepared("rayon"))?;
        pool.install(|| {
            out.par_iter_mut()
                .enumerate()
                .for_each(|(i, slot)| *slot = work(i));
        });
        Ok(())
    }
}
