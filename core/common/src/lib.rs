//! Common utilities and types shared across CrypTool modules.
//!
//! This module provides the vocabulary that the key derivation, the stream
//! engine and the callers agree on: key strengths, directions, progress
//! snapshots and terminal outcomes.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Direction, FailureReason, KeyStrength, OperationOutcome, ProgressEvent};
