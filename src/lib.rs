pub mod config;
pub mod error;
pub mod geom;
pub mod io;
pub mod job;
pub mod pipeline;
pub mod sim;
mod uid;

// Prelude
pub use config::{BackendKind, Normalization, RunConfig};
pub use error::{ComputeError, Error, ErrorKind, GeometryError, StateError, TransportError};
pub use geom::point::Point;
pub use geom::triangles::{Facet, TriangleBatch};
pub use geom::vector::Vector;
pub use job::{JobDescriptor, JobOutcome, JobSource, LineJobSource, Worker};
pub use pipeline::{Pipeline, PipelineState, ProgressEvent, RunReport};
pub use uid::UID;
