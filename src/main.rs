use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use viewfactor::pipeline::{ConsoleObserver, FileObserver};
use viewfactor::{JobDescriptor, LineJobSource, Pipeline, RunConfig, Worker};

/// Radiative view factors between triangulated STL surfaces.
#[derive(Parser, Debug)]
#[command(name = "viewfactor", version)]
#[command(about = "Computes view factors between emitter and receiver meshes")]
struct Args {
    /// Path to a run configuration TOML file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a single view factor and print it.
    Run {
        emitter: String,
        receiver: String,
        /// Optional occluding mesh between emitter and receiver.
        interconnect: Option<String>,
    },
    /// Take jobs from a coordinator, one at a time.
    Serve {
        /// Coordinator address, e.g. `127.0.0.1:7070`.
        addr: String,
        /// Exit when the coordinator closes the connection.
        #[arg(long)]
        once: bool,
        /// Seconds to wait before reconnecting.
        #[arg(long, default_value_t = 5)]
        retry_secs: u64,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match try_main(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::new(),
    };
    let pipeline = build_pipeline(config)?;

    match args.command {
        Command::Run {
            emitter,
            receiver,
            interconnect,
        } => {
            let mut pipeline = pipeline;
            let job = JobDescriptor::new(&emitter, &receiver, interconnect.as_deref());
            let report = pipeline.run(&job).context("View factor computation failed")?;
            println!("{}", report.view_factor);
            Ok(())
        }
        Command::Serve {
            addr,
            once,
            retry_secs,
        } => serve(pipeline, &addr, once, Duration::from_secs(retry_secs)),
    }
}

fn build_pipeline(config: RunConfig) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(config).with_observer(ConsoleObserver);
    if let Some(path) = pipeline.config().log_file.clone() {
        let observer = FileObserver::open(&path)
            .with_context(|| format!("Failed to open event log: {}", path.display()))?;
        pipeline.subscribe(observer);
    }
    log::debug!("using {} backend", pipeline.backend_name());
    Ok(pipeline)
}

fn serve(mut pipeline: Pipeline, addr: &str, once: bool, retry: Duration) -> Result<()> {
    loop {
        match LineJobSource::connect(addr) {
            Ok(source) => {
                let mut worker = Worker::new(pipeline, source);
                let outcome = worker.run();
                (pipeline, _) = worker.into_parts();
                match outcome {
                    Ok(summary) => log::info!("coordinator closed the connection: {summary:?}"),
                    Err(e) if e.is_fatal() => return Err(e).context("Worker stopped"),
                    Err(e) => log::warn!("connection to {addr} lost: {e}"),
                }
            }
            Err(e) => log::warn!("cannot reach coordinator at {addr}: {e}"),
        }
        if once {
            return Ok(());
        }
        thread::sleep(retry);
    }
}
