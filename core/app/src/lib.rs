//! Caller-side orchestration for CrypTool.
//!
//! Runs one engine invocation per job on a blocking worker, forwards
//! progress over a channel, exposes cancellation, and applies the Auto
//! policy (decrypt, or encrypt when the input turns out not to be
//! ciphertext for the key).

pub mod job;
pub mod policy;

pub use job::{spawn, JobEvent, JobHandle, JobInput, JobOutput, JobReport, JobRequest};
pub use policy::{resolve, Mode};
