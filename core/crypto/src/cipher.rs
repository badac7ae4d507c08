//! CBC block transforms for each strength tier.
//!
//! The 64-bit tier runs DES, the 128/192/256-bit tiers run AES with the
//! matching key size. Chaining state lives in the transform so that a stream
//! can be fed chunk by chunk; callers only ever hand over whole blocks and
//! apply PKCS#7 padding at the end of the stream.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use des::Des;
use zeroize::Zeroize;

use crate::keys::KeyMaterial;
use cryptool_common::{Error, KeyStrength, Result};

/// Largest block size of any supported cipher.
pub const MAX_BLOCK_SIZE: usize = 16;

enum BlockCipher {
    Des(Box<Des>),
    Aes128(Box<Aes128>),
    Aes192(Box<Aes192>),
    Aes256(Box<Aes256>),
}

impl BlockCipher {
    fn new(strength: KeyStrength, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::Crypto(format!("Invalid key length for {} tier", strength));
        Ok(match strength {
            KeyStrength::Bits64 => {
                BlockCipher::Des(Box::new(Des::new_from_slice(key).map_err(invalid)?))
            }
            KeyStrength::Bits128 => {
                BlockCipher::Aes128(Box::new(Aes128::new_from_slice(key).map_err(invalid)?))
            }
            KeyStrength::Bits192 => {
                BlockCipher::Aes192(Box::new(Aes192::new_from_slice(key).map_err(invalid)?))
            }
            KeyStrength::Bits256 => {
                BlockCipher::Aes256(Box::new(Aes256::new_from_slice(key).map_err(invalid)?))
            }
        })
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockCipher::Des(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes192(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockCipher::Des(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes128(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes192(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes256(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

/// Cipher-block-chaining state for one direction of one stream.
pub struct CbcTransform {
    cipher: BlockCipher,
    block_size: usize,
    prev: [u8; MAX_BLOCK_SIZE],
}

impl CbcTransform {
    /// Set up chaining from the key and IV held by `key`.
    ///
    /// # Errors
    /// - `Crypto` if the key bytes do not fit the tier's cipher
    pub fn new(key: &KeyMaterial) -> Result<Self> {
        let strength = key.strength();
        let block_size = strength.block_len();
        let cipher = BlockCipher::new(strength, key.key())?;

        let mut prev = [0u8; MAX_BLOCK_SIZE];
        prev[..block_size].copy_from_slice(key.iv());

        Ok(Self {
            cipher,
            block_size,
            prev,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Encrypt whole blocks in place.
    ///
    /// # Preconditions
    /// - `data.len()` is a multiple of the block size
    pub fn encrypt_blocks(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % self.block_size, 0);
        let bs = self.block_size;
        for block in data.chunks_exact_mut(bs) {
            xor_in_place(block, &self.prev[..bs]);
            self.cipher.encrypt_block(block);
            self.prev[..bs].copy_from_slice(block);
        }
    }

    /// Decrypt whole blocks in place.
    ///
    /// # Preconditions
    /// - `data.len()` is a multiple of the block size
    pub fn decrypt_blocks(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % self.block_size, 0);
        let bs = self.block_size;
        let mut ciphertext = [0u8; MAX_BLOCK_SIZE];
        for block in data.chunks_exact_mut(bs) {
            ciphertext[..bs].copy_from_slice(block);
            self.cipher.decrypt_block(block);
            xor_in_place(block, &self.prev[..bs]);
            self.prev[..bs].copy_from_slice(&ciphertext[..bs]);
        }
        ciphertext.zeroize();
    }
}

impl Drop for CbcTransform {
    fn drop(&mut self) {
        self.prev.zeroize();
    }
}

fn xor_in_place(block: &mut [u8], other: &[u8]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

/// Build the PKCS#7 padded final block from the trailing partial block.
///
/// # Preconditions
/// - `tail.len() < block_size`
pub fn pad_final_block(tail: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!(tail.len() < block_size);
    let pad = (block_size - tail.len()) as u8;
    let mut block = Vec::with_capacity(block_size);
    block.extend_from_slice(tail);
    block.resize(block_size, pad);
    block
}

/// Length of the plaintext inside a decrypted, PKCS#7 padded final block.
///
/// # Errors
/// - `CiphertextInvalid` if the padding bytes are malformed
pub fn unpadded_len(block: &[u8]) -> Result<usize> {
    let pad = *block.last().ok_or(Error::CiphertextInvalid)? as usize;
    if pad == 0 || pad > block.len() {
        return Err(Error::CiphertextInvalid);
    }
    let (data, padding) = block.split_at(block.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(Error::CiphertextInvalid);
    }
    Ok(data.len())
}

/// Size of the CBC body produced for `plaintext_len` bytes.
pub fn padded_len(plaintext_len: u64, block_size: usize) -> u64 {
    let bs = block_size as u64;
    (plaintext_len / bs + 1) * bs
}
