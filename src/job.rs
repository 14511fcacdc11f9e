//! Job descriptors and the distributed worker loop.
//!
//! A coordinator hands out jobs as newline-delimited JSON:
//!
//! ```json
//! {"emitter": "top.stl", "receiver": "bottom.stl", "interconnect": ""}
//! ```
//!
//! An empty `interconnect` means no occluders. The worker answers each job
//! with one [`JobOutcome`] line.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, TransportError};
use crate::pipeline::{Pipeline, RunReport};
use crate::uid::UID;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub emitter: String,
    pub receiver: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub interconnect: Option<String>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl JobDescriptor {
    pub fn new(emitter: &str, receiver: &str, interconnect: Option<&str>) -> Self {
        Self {
            emitter: emitter.to_string(),
            receiver: receiver.to_string(),
            interconnect: interconnect
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Result of one job as reported back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: JobDescriptor,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<UID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(job: JobDescriptor, report: &RunReport) -> Self {
        Self {
            job,
            status: JobStatus::Completed,
            run_id: Some(report.run_id.clone()),
            result: Some(report.view_factor),
            error: None,
        }
    }

    pub fn failed(job: JobDescriptor, error: &Error) -> Self {
        Self {
            job,
            status: JobStatus::Failed,
            run_id: None,
            result: None,
            error: Some(format!("{}: {error}", error.kind())),
        }
    }
}

/// Supplies jobs and receives their outcomes.
pub trait JobSource {
    /// Next job, or `None` once the source is exhausted.
    fn next_job(&mut self) -> Result<Option<JobDescriptor>, TransportError>;

    fn report(&mut self, outcome: &JobOutcome) -> Result<(), TransportError>;
}

/// Newline-delimited JSON jobs over any reader/writer pair.
pub struct LineJobSource<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R: BufRead, W: Write> LineJobSource<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl LineJobSource<BufReader<TcpStream>, TcpStream> {
    /// Connects to a coordinator over TCP.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        log::info!("connected to coordinator at {}", stream.peer_addr()?);
        Ok(Self::new(reader, stream))
    }
}

impl<R: BufRead, W: Write> JobSource for LineJobSource<R, W> {
    fn next_job(&mut self) -> Result<Option<JobDescriptor>, TransportError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return JobDescriptor::from_json(text).map(Some);
        }
    }

    fn report(&mut self, outcome: &JobOutcome) -> Result<(), TransportError> {
        serde_json::to_writer(&mut self.writer, outcome)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Counts of what a worker did before its source ran dry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
    /// Lines that could not be decoded as jobs.
    pub skipped: usize,
}

/// Runs jobs from a [`JobSource`] one at a time on a single pipeline.
pub struct Worker<S> {
    pipeline: Pipeline,
    source: S,
}

impl<S: JobSource> Worker<S> {
    pub fn new(pipeline: Pipeline, source: S) -> Self {
        Self { pipeline, source }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_parts(self) -> (Pipeline, S) {
        (self.pipeline, self.source)
    }

    /// Processes jobs until the source is exhausted.
    ///
    /// A failing job is logged and reported; only source I/O errors and
    /// state errors end the loop early.
    pub fn run(&mut self) -> Result<WorkerSummary, Error> {
        let mut summary = WorkerSummary::default();
        loop {
            let job = match self.source.next_job() {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(TransportError::Codec(e)) => {
                    log::warn!("skipping undecodable job: {e}");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            log::info!("starting job {} -> {}", job.emitter, job.receiver);
            let outcome = match self.pipeline.run(&job) {
                Ok(report) => {
                    summary.completed += 1;
                    JobOutcome::completed(job, &report)
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("job failed: {e}");
                    summary.failed += 1;
                    JobOutcome::failed(job, &e)
                }
            };

            if let Err(e) = self.source.report(&outcome) {
                log::warn!("failed to report job outcome: {e}");
            }
        }
        log::info!(
            "job source exhausted: {} completed, {} failed, {} skipped",
            summary.completed,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }
}
