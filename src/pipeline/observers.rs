//! Built-in event sinks.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::TransportError;

use super::bus::Observer;
use super::event::{EventKind, ProgressEvent, format_percent};
use super::state::PipelineState;

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F> {
    f: F,
}

impl<F> FnObserver<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Observer for FnObserver<F>
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError> {
        (self.f)(event);
        Ok(())
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError> {
        match &event.kind {
            EventKind::Exception { kind, message } => log::error!("{kind}: {message}"),
            EventKind::ComputeProgress { .. } => log::debug!("{}", event.message()),
            _ => log::info!("{}", event.message()),
        }
        Ok(())
    }
}

pub const DEFAULT_LOG_FILE: &str = "output.log";

/// Appends `"[timestamp]: message\r\n"` lines to a file.
pub struct FileObserver {
    path: PathBuf,
    file: File,
}

impl FileObserver {
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Observer for FileObserver {
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError> {
        write!(self.file, "[{}]: {}\r\n", event.timestamp_ms, event.message())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Writes one JSON object per line to a remote (or any) writer.
pub struct RemoteObserver<W> {
    writer: W,
}

impl<W: Write + Send> RemoteObserver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Observer for RemoteObserver<W> {
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError> {
        serde_json::to_writer(&mut self.writer, &event.to_json())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Pollable view of the latest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: PipelineState,
    pub percentage: String,
    pub failure: bool,
    pub result: Option<f64>,
    /// Messages received since the last [`StatusHandle::take`].
    pub messages: Vec<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
            percentage: "0%".to_string(),
            failure: false,
            result: None,
            messages: vec![],
        }
    }
}

/// Cloneable reader side of a [`StatusObserver`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<Mutex<StatusSnapshot>>);

impl StatusHandle {
    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current status without draining messages.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    /// Current status; pending messages are handed over and cleared.
    pub fn take(&self) -> StatusSnapshot {
        let mut status = self.lock();
        let snapshot = status.clone();
        status.messages.clear();
        snapshot
    }
}

/// Folds events into a [`StatusSnapshot`] shared with a [`StatusHandle`].
#[derive(Debug, Default)]
pub struct StatusObserver {
    handle: StatusHandle,
}

impl StatusObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> StatusHandle {
        self.handle.clone()
    }
}

impl Observer for StatusObserver {
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError> {
        let mut status = self.handle.lock();
        if let Some(state) = event.kind.resulting_state() {
            status.state = state;
        }
        match &event.kind {
            EventKind::JobStart => {
                status.percentage = "0%".to_string();
                status.failure = false;
                status.result = None;
                status.messages.push(event.message());
            }
            EventKind::ComputeProgress { current, total } => {
                status.percentage = format_percent(*current, *total);
                status.messages.push(event.message());
            }
            EventKind::ComputeFinish { result, .. } => {
                status.percentage = "100%".to_string();
                status.result = Some(*result);
                status.messages.push(event.message());
            }
            EventKind::Info(text) => status.messages.push(format!("[INFO]: {text}")),
            EventKind::Exception { message, .. } => {
                status.failure = true;
                status.messages.push(format!("[ERROR]: {message}"));
            }
            _ => status.messages.push(event.message()),
        }
        Ok(())
    }
}
