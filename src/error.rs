//! Error kinds raised by the view-factor engine.
//!
//! Geometry and compute failures abort the current run and are reported as
//! `Exception` progress events. State errors mean an internal contract broke
//! and are fatal. Transport errors are logged and never abort a run.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Malformed or unreadable mesh.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("failed to read mesh {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("mesh declares {declared} facets but {parsed} were parsed")]
    FacetCount { declared: usize, parsed: usize },
    #[error("mesh data truncated: {0}")]
    Truncated(String),
    #[error("malformed facet {index}: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("unsupported mesh source: {0}")]
    UnsupportedSource(String),
}

/// Illegal pipeline transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal pipeline transition {from:?} -> {to:?}")]
pub struct StateError {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Kernel dispatch or reduction failure.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("compute backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("compute backend `{0}` was dispatched before its data was staged")]
    NotPrepared(&'static str),
    #[error("accumulator failed: {0}")]
    Accumulator(String),
    #[error("computation cancelled after {completed} of {total} emitter triangles")]
    Cancelled { completed: usize, total: usize },
}

/// Job-source or observer delivery failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Any failure surfaced by a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Geometry(_) => ErrorKind::Geometry,
            Error::State(_) => ErrorKind::State,
            Error::Compute(_) => ErrorKind::Compute,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }

    /// State errors indicate a broken invariant and must not be caught-and-continued.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::State(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Geometry,
    State,
    Compute,
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Geometry => "GeometryError",
            ErrorKind::State => "StateError",
            ErrorKind::Compute => "ComputeError",
            ErrorKind::Transport => "TransportError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_fatality() {
        let e: Error = StateError {
            from: PipelineState::Idle,
            to: PipelineState::ParsingGeometry,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::State);
        assert!(e.is_fatal());

        let e: Error = GeometryError::FacetCount {
            declared: 3,
            parsed: 2,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Geometry);
        assert!(!e.is_fatal());
        assert_eq!(e.to_string(), "mesh declares 3 facets but 2 were parsed");
    }
}
