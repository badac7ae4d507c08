//! Method selection, including the Auto fallback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use cryptool_common::{Direction, Error, Result};

/// Method requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Encrypt,
    Decrypt,
    /// Decrypt if the input is ciphertext for the key, otherwise encrypt.
    Auto,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypt" | "enc" | "e" => Ok(Mode::Encrypt),
            "decrypt" | "dec" | "d" => Ok(Mode::Decrypt),
            "auto" | "a" => Ok(Mode::Auto),
            _ => Err(Error::InvalidInput(format!(
                "Invalid method {:?}. Use: encrypt, decrypt, or auto",
                s
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Encrypt => write!(f, "encrypt"),
            Mode::Decrypt => write!(f, "decrypt"),
            Mode::Auto => write!(f, "auto"),
        }
    }
}

/// Run `attempt` for the direction(s) that `mode` calls for.
///
/// Auto tries [`Direction::Decrypt`] first and falls back to
/// [`Direction::Encrypt`] only when the decrypt attempt fails with
/// [`Error::CiphertextInvalid`]. I/O failures and cancellation are returned
/// as they are.
///
/// Returns the direction that produced the result.
pub fn resolve<T, F>(mode: Mode, mut attempt: F) -> Result<(Direction, T)>
where
    F: FnMut(Direction) -> Result<T>,
{
    match mode {
        Mode::Encrypt => attempt(Direction::Encrypt).map(|t| (Direction::Encrypt, t)),
        Mode::Decrypt => attempt(Direction::Decrypt).map(|t| (Direction::Decrypt, t)),
        Mode::Auto => match attempt(Direction::Decrypt) {
            Ok(t) => Ok((Direction::Decrypt, t)),
            Err(e) if e.is_ciphertext_invalid() => {
                info!("Input is not ciphertext for this key, encrypting instead");
                attempt(Direction::Encrypt).map(|t| (Direction::Encrypt, t))
            }
            Err(e) => Err(e),
        },
    }
}
