//! Concurrent reduction of kernel result rows.
//!
//! Rows are handed to a fixed pool of worker threads through a channel. Each
//! worker sums a row and folds the partial sum into a shared atomic total, so
//! summation overlaps with the next kernel dispatch. [`Accumulator::finish`]
//! is the only blocking point: it closes the channel and joins the workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};

use crate::error::ComputeError;

/// `f64` with lock-free addition (CAS on the bit pattern).
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn fetch_add(&self, value: f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct Accumulator {
    sender: Option<Sender<Vec<f64>>>,
    workers: Vec<JoinHandle<()>>,
    total: Arc<AtomicF64>,
    rows_applied: Arc<AtomicUsize>,
}

impl Accumulator {
    /// Spawns `num_workers` summing threads (at least one).
    pub fn new(num_workers: usize) -> Result<Self, ComputeError> {
        let (sender, receiver) = unbounded::<Vec<f64>>();
        let total = Arc::new(AtomicF64::new(0.));
        let rows_applied = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(num_workers.max(1));
        for i in 0..num_workers.max(1) {
            let receiver = receiver.clone();
            let total = Arc::clone(&total);
            let rows_applied = Arc::clone(&rows_applied);
            let handle = std::thread::Builder::new()
                .name(format!("viewfactor-accumulator-{i}"))
                .spawn(move || {
                    for row in receiver.iter() {
                        let partial: f64 = row.iter().sum();
                        total.fetch_add(partial);
                        rows_applied.fetch_add(1, Ordering::Release);
                    }
                })
                .map_err(|e| ComputeError::Accumulator(format!("cannot spawn worker: {e}")))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            total,
            rows_applied,
        })
    }

    /// Queues a row for summation without waiting for it.
    pub fn submit(&self, row: Vec<f64>) -> Result<(), ComputeError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ComputeError::Accumulator("accumulator already finished".to_string()))?;
        sender
            .send(row)
            .map_err(|_| ComputeError::Accumulator("all workers exited".to_string()))
    }

    /// Waits until every submitted row has been applied and returns the total.
    pub fn finish(mut self) -> Result<f64, ComputeError> {
        self.join_workers()?;
        log::debug!(
            "accumulator drained {} rows",
            self.rows_applied.load(Ordering::Acquire)
        );
        Ok(self.total.load())
    }

    fn join_workers(&mut self) -> Result<(), ComputeError> {
        // Closing the channel lets workers exit once the queue is empty.
        drop(self.sender.take());
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(ComputeError::Accumulator(format!(
                "{panicked} worker(s) panicked"
            )));
        }
        Ok(())
    }
}

impl Drop for Accumulator {
    fn drop(&mut self) {
        let _ = self.join_workers();
    }
}
