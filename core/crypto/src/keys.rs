//! Key material with secure memory handling.
//!
//! Key and IV bytes are zeroized on drop and never printed.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cryptool_common::KeyStrength;

/// Length of the MAC key bound to a [`KeyMaterial`].
pub const MAC_KEY_LENGTH: usize = 32;

/// Length of the key-check value written into ciphertext headers.
pub const CHECK_VALUE_LENGTH: usize = 8;

/// Derived key and IV for one strength tier.
///
/// Created fresh for every engine run and consumed by it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    strength: KeyStrength,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl KeyMaterial {
    /// Assemble key material from raw bytes.
    ///
    /// # Preconditions
    /// - `key.len()` equals `strength.key_len()`
    /// - `iv.len()` equals `strength.block_len()`
    ///
    /// # Errors
    /// - Returns `InvalidInput` if either length is wrong
    pub fn from_parts(
        strength: KeyStrength,
        key: Vec<u8>,
        iv: Vec<u8>,
    ) -> cryptool_common::Result<Self> {
        if key.len() != strength.key_len() || iv.len() != strength.block_len() {
            return Err(cryptool_common::Error::InvalidInput(format!(
                "Key material does not match {} tier",
                strength
            )));
        }
        Ok(Self { strength, key, iv })
    }

    pub fn strength(&self) -> KeyStrength {
        self.strength
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Get the IV bytes.
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Derive the key that authenticates ciphertext produced with this material.
    pub fn mac_key(&self) -> [u8; MAC_KEY_LENGTH] {
        let digest = self.bound_digest(b"cryptool/mac-key");
        let mut out = [0u8; MAC_KEY_LENGTH];
        out.copy_from_slice(&digest);
        out
    }

    /// Short fingerprint that lets a decryptor reject a wrong key up front.
    pub fn check_value(&self) -> [u8; CHECK_VALUE_LENGTH] {
        let digest = self.bound_digest(b"cryptool/key-check");
        let mut out = [0u8; CHECK_VALUE_LENGTH];
        out.copy_from_slice(&digest[..CHECK_VALUE_LENGTH]);
        out
    }

    fn bound_digest(&self, label: &[u8]) -> [u8; 32] {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(label);
        hasher.update([self.strength.tier_code()]);
        hasher.update(&self.key);
        hasher.update(&self.iv);

        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({}, [REDACTED])", self.strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(strength: KeyStrength, fill: u8) -> KeyMaterial {
        KeyMaterial::from_parts(
            strength,
            vec![fill; strength.key_len()],
            vec![fill; strength.block_len()],
        )
        .unwrap()
    }

    #[test]
    fn test_from_parts_rejects_wrong_lengths() {
        assert!(KeyMaterial::from_parts(KeyStrength::Bits128, vec![0; 8], vec![0; 16]).is_err());
        assert!(KeyMaterial::from_parts(KeyStrength::Bits64, vec![0; 8], vec![0; 16]).is_err());
    }

    #[test]
    fn test_check_value_depends_on_key() {
        let a = material(KeyStrength::Bits256, 1);
        let b = material(KeyStrength::Bits256, 2);
        assert_ne!(a.check_value(), b.check_value());
        assert_eq!(a.check_value(), a.clone().check_value());
    }

    #[test]
    fn test_mac_key_differs_from_check_value() {
        let m = material(KeyStrength::Bits128, 7);
        assert_ne!(&m.mac_key()[..CHECK_VALUE_LENGTH], &m.check_value()[..]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let m = material(KeyStrength::Bits64, 0xAB);
        let printed = format!("{:?}", m);
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171"));
    }
}
