//! Background jobs: one engine invocation (or one Auto resolution) each.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::policy::{resolve, Mode};
use cryptool_common::{Direction, Error, KeyStrength, ProgressEvent, Result};
use cryptool_crypto::text::{decrypt_text_with, encrypt_text_with};
use cryptool_crypto::{
    derive, validate_file_paths, CancellationToken, Engine, FileSink, FileSource, KeyMaterial,
};

/// What a job reads and where its result goes.
#[derive(Debug, Clone)]
pub enum JobInput {
    /// Plaintext, or Base64 ciphertext when decrypting.
    Text(String),
    /// A file-to-file run.
    File {
        source: PathBuf,
        destination: PathBuf,
        /// Whether an existing destination may be replaced.
        overwrite: bool,
    },
}

/// Everything needed to start a job.
pub struct JobRequest {
    pub mode: Mode,
    pub strength: KeyStrength,
    pub passphrase: Zeroizing<String>,
    pub iv: Option<String>,
    pub input: JobInput,
}

/// Result payload of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Text(String),
    File { bytes_written: u64 },
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// The direction that produced the output. For Auto this tells the
    /// caller which way the input went.
    pub direction: Direction,
    pub output: JobOutput,
}

/// Events delivered while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// An engine run is starting. Auto may start a second run after a
    /// rejected decrypt attempt, and progress restarts from zero.
    Started { direction: Direction },
    Progress(ProgressEvent),
}

/// Handle to a running job.
pub struct JobHandle {
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<JobEvent>,
    task: JoinHandle<Result<JobReport>>,
}

impl JobHandle {
    /// Ask the job to stop at its next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker, for wiring into other stop sources.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive the next event. Returns `None` once the worker has finished.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<JobReport> {
        self.task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("Worker failed: {}", e))))?
    }
}

/// Start a job on the blocking thread pool.
///
/// Key derivation and path validation happen here, before any worker is
/// started, so `InvalidInput` is reported immediately.
///
/// # Preconditions
/// - Must be called from within a Tokio runtime
///
/// # Errors
/// - `InvalidInput` for an empty passphrase or unusable file paths
pub fn spawn(request: JobRequest, engine: Engine) -> Result<JobHandle> {
    let JobRequest {
        mode,
        strength,
        passphrase,
        iv,
        input,
    } = request;

    let key = derive(&passphrase, iv.as_deref(), strength)?;
    drop(passphrase);

    if let JobInput::File {
        source,
        destination,
        overwrite,
    } = &input
    {
        validate_file_paths(source, destination, *overwrite)?;
    }

    info!(%mode, %strength, kind = input.kind(), "Starting job");

    let cancel = CancellationToken::new();
    let (tx, events) = mpsc::unbounded_channel();
    let worker_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        execute(&engine, mode, key, input, &tx, &worker_cancel)
    });

    Ok(JobHandle {
        cancel,
        events,
        task,
    })
}

impl JobInput {
    fn kind(&self) -> &'static str {
        match self {
            JobInput::Text(_) => "text",
            JobInput::File { .. } => "file",
        }
    }
}

fn execute(
    engine: &Engine,
    mode: Mode,
    key: KeyMaterial,
    input: JobInput,
    tx: &mpsc::UnboundedSender<JobEvent>,
    cancel: &CancellationToken,
) -> Result<JobReport> {
    // A closed receiver just means nobody is watching.
    let forward = |event: ProgressEvent| {
        let _ = tx.send(JobEvent::Progress(event));
    };

    let (direction, output) = match input {
        JobInput::Text(text) => resolve(mode, |direction| {
            let _ = tx.send(JobEvent::Started { direction });
            let key = key.clone();
            let result = match direction {
                Direction::Encrypt => encrypt_text_with(engine, key, &text, forward, cancel),
                Direction::Decrypt => decrypt_text_with(engine, key, &text, forward, cancel),
            };
            result.map(JobOutput::Text)
        })?,
        JobInput::File {
            source,
            destination,
            ..
        } => resolve(mode, |direction| {
            let _ = tx.send(JobEvent::Started { direction });
            let mut reader = FileSource::open(&source)?;
            let mut writer = FileSink::create(&destination)?;
            engine
                .run(direction, key.clone(), &mut reader, &mut writer, forward, cancel)
                .into_result()
                .map(|bytes_written| JobOutput::File { bytes_written })
        })?,
    };

    debug!(%direction, "Job finished");
    Ok(JobReport { direction, output })
}
