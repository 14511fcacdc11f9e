//! View-factor computation: compute backends, the pair kernel and the
//! concurrent accumulator.

pub mod accumulator;
pub mod backend;
pub mod cancel;
pub mod kernel;

pub use accumulator::Accumulator;
pub use backend::{ComputeBackend, RayonBackend, SerialBackend};
pub use cancel::CancelToken;
pub use kernel::{KernelProgress, ViewFactorKernel, contribution};
