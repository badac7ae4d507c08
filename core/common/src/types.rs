//! Common types used throughout CrypTool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key-length class selected by the caller.
///
/// The 64-bit class is the legacy DES tier; the other three share the AES
/// family. Ciphertext produced under one tier is never accepted by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum KeyStrength {
    Bits64,
    Bits128,
    Bits192,
    Bits256,
}

impl KeyStrength {
    /// All strengths, weakest first.
    pub const ALL: [KeyStrength; 4] = [
        KeyStrength::Bits64,
        KeyStrength::Bits128,
        KeyStrength::Bits192,
        KeyStrength::Bits256,
    ];

    /// Nominal key size in bits.
    pub fn bits(self) -> u16 {
        match self {
            KeyStrength::Bits64 => 64,
            KeyStrength::Bits128 => 128,
            KeyStrength::Bits192 => 192,
            KeyStrength::Bits256 => 256,
        }
    }

    /// Derived key length in bytes.
    pub fn key_len(self) -> usize {
        usize::from(self.bits()) / 8
    }

    /// Block size of the cipher family for this tier, which is also the IV length.
    pub fn block_len(self) -> usize {
        match self {
            KeyStrength::Bits64 => 8,
            _ => 16,
        }
    }

    /// Single-byte tier identifier stored in ciphertext headers.
    pub fn tier_code(self) -> u8 {
        match self {
            KeyStrength::Bits64 => 1,
            KeyStrength::Bits128 => 2,
            KeyStrength::Bits192 => 3,
            KeyStrength::Bits256 => 4,
        }
    }

    /// Look up a strength by its header tier code.
    pub fn from_tier_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tier_code() == code)
    }

    /// Look up a strength by its bit count.
    pub fn from_bits(bits: u16) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.bits() == bits)
            .ok_or_else(|| {
                crate::Error::InvalidInput(format!(
                    "Unsupported key strength: {} (expected 64, 128, 192 or 256)",
                    bits
                ))
            })
    }
}

impl Default for KeyStrength {
    fn default() -> Self {
        KeyStrength::Bits128
    }
}

impl TryFrom<u16> for KeyStrength {
    type Error = crate::Error;

    fn try_from(bits: u16) -> crate::Result<Self> {
        Self::from_bits(bits)
    }
}

impl From<KeyStrength> for u16 {
    fn from(strength: KeyStrength) -> u16 {
        strength.bits()
    }
}

impl FromStr for KeyStrength {
    type Err = crate::Error;

    /// Accepts `128`, `128bit`, `128bits` and `128-bit` style spellings.
    fn from_str(s: &str) -> crate::Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let digits = normalized
            .trim_end_matches("bits")
            .trim_end_matches("bit")
            .trim_end_matches('-')
            .trim();
        let bits: u16 = digits.parse().map_err(|_| {
            crate::Error::InvalidInput(format!("Invalid key strength: {:?}", s))
        })?;
        Self::from_bits(bits)
    }
}

impl fmt::Display for KeyStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Direction of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => write!(f, "encrypt"),
            Direction::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Snapshot of stream progress.
///
/// `bytes_processed` counts source bytes consumed so far. `total_bytes` is
/// `None` when the source length was not known up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
}

impl ProgressEvent {
    /// Completed fraction in `0.0..=1.0`, or `None` for indeterminate progress.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_processed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The input was not valid ciphertext for the key material.
    CiphertextInvalid,
    /// Reading the source, writing the sink or cleaning up failed.
    Io {
        kind: std::io::ErrorKind,
        detail: String,
    },
}

impl FailureReason {
    pub fn io(err: &std::io::Error) -> Self {
        FailureReason::Io {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// Terminal result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The sink holds the complete output.
    Completed { bytes_written: u64 },
    /// The caller cancelled the run and partial output was removed.
    Cancelled,
    /// The run failed. `cleanup_error` is set when removing partial output
    /// failed as well.
    Failed {
        reason: FailureReason,
        cleanup_error: Option<String>,
    },
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed { .. })
    }

    /// Convert into a `Result`, mapping each failure class onto [`crate::Error`].
    pub fn into_result(self) -> crate::Result<u64> {
        match self {
            OperationOutcome::Completed { bytes_written } => Ok(bytes_written),
            OperationOutcome::Cancelled => Err(crate::Error::Cancelled),
            OperationOutcome::Failed {
                reason: FailureReason::CiphertextInvalid,
                ..
            } => Err(crate::Error::CiphertextInvalid),
            OperationOutcome::Failed {
                reason: FailureReason::Io { kind, detail },
                cleanup_error,
            } => {
                let detail = match cleanup_error {
                    Some(cleanup) => format!("{} (cleanup also failed: {})", detail, cleanup),
                    None => detail,
                };
                Err(crate::Error::Io(std::io::Error::new(kind, detail)))
            }
        }
    }
}
