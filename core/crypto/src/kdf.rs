//! Passphrase to key material derivation.
//!
//! Keys and IVs are BLAKE2b-256 digests over a domain label, the strength
//! tier and the length-prefixed input, truncated to the tier's sizes. The
//! derivation is deterministic so that text encrypted without an explicit IV
//! can be decrypted later with the same passphrase alone.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::keys::KeyMaterial;
use cryptool_common::{Error, KeyStrength, Result};

const KEY_LABEL: &[u8] = b"cryptool/key";
const IV_LABEL: &[u8] = b"cryptool/iv";
const DEFAULT_IV_LABEL: &[u8] = b"cryptool/default-iv";

/// Derive key material from a passphrase and an optional IV string.
///
/// # Preconditions
/// - `passphrase` must not be empty after trimming
///
/// # Postconditions
/// - Key length is `strength.key_len()`, IV length is `strength.block_len()`
/// - Identical inputs always produce identical bytes
/// - An absent or blank `iv` is replaced by a default that depends only on
///   the passphrase and the strength
///
/// # Errors
/// - Returns `InvalidInput` if the passphrase is empty
///
/// # Security
/// - Passphrase is not stored or logged
pub fn derive(passphrase: &str, iv: Option<&str>, strength: KeyStrength) -> Result<KeyMaterial> {
    let passphrase = passphrase.trim();
    if passphrase.is_empty() {
        return Err(Error::InvalidInput("Passphrase cannot be empty".to_string()));
    }

    let mut key = tier_digest(KEY_LABEL, strength, passphrase.as_bytes());
    key.truncate(strength.key_len());

    let mut iv = match iv.map(str::trim).filter(|s| !s.is_empty()) {
        Some(iv) => tier_digest(IV_LABEL, strength, iv.as_bytes()),
        None => tier_digest(DEFAULT_IV_LABEL, strength, passphrase.as_bytes()),
    };
    iv.truncate(strength.block_len());

    KeyMaterial::from_parts(strength, key, iv)
}

fn tier_digest(label: &[u8], strength: KeyStrength, input: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(label);
    hasher.update([strength.tier_code()]);
    hasher.update((input.len() as u64).to_le_bytes());
    hasher.update(input);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        for strength in KeyStrength::ALL {
            let a = derive("test-password-123", Some("vector"), strength).unwrap();
            let b = derive("test-password-123", Some("vector"), strength).unwrap();
            assert_eq!(a.key(), b.key());
            assert_eq!(a.iv(), b.iv());
        }
    }

    #[test]
    fn test_derive_lengths() {
        for strength in KeyStrength::ALL {
            let m = derive("hunter2", None, strength).unwrap();
            assert_eq!(m.key().len(), strength.key_len());
            assert_eq!(m.iv().len(), strength.block_len());
            assert_eq!(m.strength(), strength);
        }
    }

    #[test]
    fn test_derive_empty_passphrase_fails() {
        for strength in KeyStrength::ALL {
            assert!(matches!(
                derive("", None, strength),
                Err(Error::InvalidInput(_))
            ));
            assert!(matches!(
                derive("   ", Some("iv"), strength),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_blank_iv_uses_default() {
        let absent = derive("hunter2", None, KeyStrength::Bits128).unwrap();
        let blank = derive("hunter2", Some("  "), KeyStrength::Bits128).unwrap();
        let explicit = derive("hunter2", Some("salt"), KeyStrength::Bits128).unwrap();

        assert_eq!(absent.iv(), blank.iv());
        assert_ne!(absent.iv(), explicit.iv());
        assert_eq!(absent.key(), explicit.key());
    }

    #[test]
    fn test_iv_is_trimmed() {
        let a = derive("hunter2", Some(" salt "), KeyStrength::Bits192).unwrap();
        let b = derive("hunter2", Some("salt"), KeyStrength::Bits192).unwrap();
        assert_eq!(a.iv(), b.iv());
    }

    #[test]
    fn test_derive_different_password() {
        let a = derive("password1", None, KeyStrength::Bits256).unwrap();
        let b = derive("password2", None, KeyStrength::Bits256).unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
    }

    #[test]
    fn test_tiers_derive_unrelated_keys() {
        let k128 = derive("hunter2", None, KeyStrength::Bits128).unwrap();
        let k256 = derive("hunter2", None, KeyStrength::Bits256).unwrap();
        assert_ne!(k128.key(), &k256.key()[..16]);
    }
}
