use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Stage of a pipeline run.
///
/// ```text
/// Idle -> Init -> ParsingGeometry -> GeometryReady -> TransferringData
///      -> DataReady -> Computing -> ComputationDone -> Idle
/// ```
///
/// Every state may move to `Exception`; `Exception` only leaves to `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Init,
    ParsingGeometry,
    GeometryReady,
    TransferringData,
    DataReady,
    Computing,
    ComputationDone,
    Exception,
}

impl PipelineState {
    pub const ALL: [PipelineState; 9] = [
        PipelineState::Idle,
        PipelineState::Init,
        PipelineState::ParsingGeometry,
        PipelineState::GeometryReady,
        PipelineState::TransferringData,
        PipelineState::DataReady,
        PipelineState::Computing,
        PipelineState::ComputationDone,
        PipelineState::Exception,
    ];

    /// The single regular successor of this state.
    pub fn successor(self) -> PipelineState {
        use PipelineState::*;
        match self {
            Idle => Init,
            Init => ParsingGeometry,
            ParsingGeometry => GeometryReady,
            GeometryReady => TransferringData,
            TransferringData => DataReady,
            DataReady => Computing,
            Computing => ComputationDone,
            ComputationDone => Idle,
            Exception => Init,
        }
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        next == PipelineState::Exception || self.successor() == next
    }

    /// True when a new run may start from this state.
    pub fn accepts_run(self) -> bool {
        matches!(self, PipelineState::Idle | PipelineState::Exception)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Owns the current [`PipelineState`] and rejects transitions outside the table.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: PipelineState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transition(&mut self, next: PipelineState) -> Result<(), StateError> {
        if !self.state.can_transition_to(next) {
            return Err(StateError {
                from: self.state,
                to: next,
            });
        }
        log::debug!("pipeline state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Moves to `Exception`; legal from every state.
    pub fn fail(&mut self) {
        log::debug!("pipeline state {} -> Exception", self.state);
        self.state = PipelineState::Exception;
    }
}
