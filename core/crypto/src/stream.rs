//! Chunked stream encryption and decryption.
//!
//! The engine moves bytes from a [`ByteSource`] to a [`ByteSink`] in fixed
//! size chunks, reporting progress and checking for cancellation between
//! chunks. Any failure or cancellation rolls the sink back, so callers see
//! either the complete output or nothing.

use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use serde::{Deserialize, Serialize};
use std::io;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cipher::{pad_final_block, padded_len, unpadded_len, CbcTransform};
use crate::io::{ByteSink, ByteSource, MemorySink, MemorySource};
use crate::keys::{KeyMaterial, CHECK_VALUE_LENGTH};
use cryptool_common::{
    Direction, Error, FailureReason, KeyStrength, OperationOutcome, ProgressEvent, Result,
};

/// Default chunk size for streaming (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Leading bytes of every ciphertext.
pub const MAGIC: [u8; 4] = *b"CRYT";

/// Ciphertext format version.
pub const FORMAT_VERSION: u8 = 1;

/// Header size: magic (4) + version (1) + tier (1) + key check (8).
pub const HEADER_SIZE: usize = 4 + 1 + 1 + CHECK_VALUE_LENGTH;

/// Trailing MAC size.
pub const TAG_SIZE: usize = 32;

type Blake2bMac256 = Blake2bMac<U32>;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes read from the source per chunk; also the progress granularity.
    pub chunk_size: usize,
}

impl EngineConfig {
    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Size of the ciphertext produced for `plaintext_len` bytes under `strength`.
pub fn encrypted_len(plaintext_len: u64, strength: KeyStrength) -> u64 {
    (HEADER_SIZE + TAG_SIZE) as u64 + padded_len(plaintext_len, strength.block_len())
}

/// Why a run stopped early.
enum Interrupt {
    Cancelled,
    Invalid,
    Io(io::Error),
}

impl From<io::Error> for Interrupt {
    fn from(e: io::Error) -> Self {
        Interrupt::Io(e)
    }
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        match e {
            Error::CiphertextInvalid => Interrupt::Invalid,
            Error::Cancelled => Interrupt::Cancelled,
            Error::Io(e) => Interrupt::Io(e),
            other => Interrupt::Io(io::Error::new(io::ErrorKind::InvalidInput, other.to_string())),
        }
    }
}

struct Progress<'a, F: FnMut(ProgressEvent)> {
    on_progress: &'a mut F,
    processed: u64,
    total: Option<u64>,
}

impl<F: FnMut(ProgressEvent)> Progress<'_, F> {
    fn emit(&mut self) {
        (self.on_progress)(ProgressEvent {
            bytes_processed: self.processed,
            total_bytes: self.total,
        });
    }

    fn advance(&mut self, n: usize) {
        self.processed += n as u64;
        self.emit();
    }
}

/// Chunked encrypt/decrypt engine.
///
/// An engine holds only configuration; every [`Engine::run`] call owns its
/// key material, source, sink and token, so one engine can serve concurrent
/// runs from different threads.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine.
    ///
    /// # Errors
    /// - `InvalidInput` if the chunk size is zero
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::InvalidInput(
                "Chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one encryption or decryption from `source` into `sink`.
    ///
    /// # Postconditions
    /// - `Completed`: the sink holds the full output and has been finished
    /// - `Cancelled` or `Failed`: the sink has been aborted
    /// - `on_progress` saw non-decreasing counts, ending at the full source
    ///   length on completion
    ///
    /// # Security
    /// - `key` is consumed and zeroized when the run ends
    pub fn run<S, K, F>(
        &self,
        direction: Direction,
        key: KeyMaterial,
        source: &mut S,
        sink: &mut K,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> OperationOutcome
    where
        S: ByteSource + ?Sized,
        K: ByteSink + ?Sized,
        F: FnMut(ProgressEvent),
    {
        let mut progress = Progress {
            on_progress: &mut on_progress,
            processed: 0,
            total: source.len_hint(),
        };

        debug!(
            %direction,
            strength = %key.strength(),
            chunk_size = self.config.chunk_size,
            total_bytes = ?progress.total,
            "Starting stream run"
        );
        progress.emit();

        let result = match direction {
            Direction::Encrypt => self.encrypt(&key, source, sink, &mut progress, cancel),
            Direction::Decrypt => self.decrypt(&key, source, sink, &mut progress, cancel),
        };
        drop(key);

        let interrupt = match result {
            Ok(()) => match sink.finish() {
                Ok(bytes_written) => {
                    progress.emit();
                    debug!(%direction, bytes_written, "Stream run completed");
                    return OperationOutcome::Completed { bytes_written };
                }
                Err(e) => Interrupt::Io(e),
            },
            Err(interrupt) => interrupt,
        };

        let cleanup = sink.abort();
        if let Err(e) = &cleanup {
            warn!(%direction, error = %e, "Failed to remove partial output");
        }

        match interrupt {
            Interrupt::Cancelled => {
                debug!(%direction, processed = progress.processed, "Stream run cancelled");
                match cleanup {
                    Ok(()) => OperationOutcome::Cancelled,
                    Err(e) => OperationOutcome::Failed {
                        reason: FailureReason::io(&e),
                        cleanup_error: None,
                    },
                }
            }
            Interrupt::Invalid => {
                debug!(%direction, "Input is not valid ciphertext");
                OperationOutcome::Failed {
                    reason: FailureReason::CiphertextInvalid,
                    cleanup_error: cleanup.err().map(|e| e.to_string()),
                }
            }
            Interrupt::Io(e) => {
                debug!(%direction, error = %e, "Stream run failed");
                OperationOutcome::Failed {
                    reason: FailureReason::io(&e),
                    cleanup_error: cleanup.err().map(|e| e.to_string()),
                }
            }
        }
    }

    /// Encrypt the source.
    ///
    /// # Format
    /// - Header: magic (4) + version (1) + tier code (1) + key check (8)
    /// - Body: CBC ciphertext with PKCS#7 padding
    /// - Trailer: BLAKE2b-256 MAC over header and body
    fn encrypt<S, K, F>(
        &self,
        key: &KeyMaterial,
        source: &mut S,
        sink: &mut K,
        progress: &mut Progress<'_, F>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Interrupt>
    where
        S: ByteSource + ?Sized,
        K: ByteSink + ?Sized,
        F: FnMut(ProgressEvent),
    {
        let mut transform = CbcTransform::new(key)?;
        let mut mac = new_mac(key)?;
        let bs = transform.block_size();
        let chunk_size = self.config.chunk_size;

        // Leading bytes of `buf` hold the partial block carried between chunks.
        let mut buf = Zeroizing::new(vec![0u8; chunk_size + bs]);
        let mut carry = 0usize;
        let mut header_written = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }

            if !header_written {
                let header = encode_header(key);
                sink.write(&header)?;
                mac.update(&header);
                header_written = true;
            }

            let n = fill(source, &mut buf[carry..carry + chunk_size])?;
            if n == 0 {
                break;
            }

            let available = carry + n;
            let whole = available - available % bs;
            transform.encrypt_blocks(&mut buf[..whole]);
            sink.write(&buf[..whole])?;
            mac.update(&buf[..whole]);

            buf.copy_within(whole..available, 0);
            carry = available - whole;
            progress.advance(n);
        }

        let mut last = Zeroizing::new(pad_final_block(&buf[..carry], bs));
        transform.encrypt_blocks(&mut last);
        sink.write(&last)?;
        mac.update(&last);

        sink.write(&mac.finalize().into_bytes())?;
        Ok(())
    }

    /// Decrypt the source.
    ///
    /// The header is checked as soon as it has been read, so a wrong key or
    /// tier is rejected before any plaintext reaches the sink. The last block
    /// and the MAC are held back until the end of the stream.
    fn decrypt<S, K, F>(
        &self,
        key: &KeyMaterial,
        source: &mut S,
        sink: &mut K,
        progress: &mut Progress<'_, F>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Interrupt>
    where
        S: ByteSource + ?Sized,
        K: ByteSink + ?Sized,
        F: FnMut(ProgressEvent),
    {
        let mut transform = CbcTransform::new(key)?;
        let mut mac = new_mac(key)?;
        let bs = transform.block_size();
        let chunk_size = self.config.chunk_size;
        let reserve = TAG_SIZE + bs;

        let mut chunk = Zeroizing::new(vec![0u8; chunk_size]);
        let mut pending = Zeroizing::new(Vec::with_capacity(chunk_size + HEADER_SIZE + reserve));
        let mut header_checked = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }

            let n = fill(source, &mut chunk)?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&chunk[..n]);

            if !header_checked && pending.len() >= HEADER_SIZE {
                check_header(&pending[..HEADER_SIZE], key)?;
                mac.update(&pending[..HEADER_SIZE]);
                pending.drain(..HEADER_SIZE);
                header_checked = true;
            }

            if header_checked && pending.len() > reserve {
                let ready = (pending.len() - reserve) / bs * bs;
                if ready > 0 {
                    mac.update(&pending[..ready]);
                    transform.decrypt_blocks(&mut pending[..ready]);
                    sink.write(&pending[..ready])?;
                    pending.drain(..ready);
                }
            }

            progress.advance(n);
        }

        if !header_checked || pending.len() < reserve || (pending.len() - TAG_SIZE) % bs != 0 {
            return Err(Interrupt::Invalid);
        }

        let body_len = pending.len() - TAG_SIZE;
        mac.update(&pending[..body_len]);
        mac.verify_slice(&pending[body_len..])
            .map_err(|_| Interrupt::Invalid)?;

        transform.decrypt_blocks(&mut pending[..body_len]);
        let last_start = body_len - bs;
        let keep = last_start + unpadded_len(&pending[last_start..body_len])?;
        sink.write(&pending[..keep])?;
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

fn new_mac(key: &KeyMaterial) -> Result<Blake2bMac256> {
    let mac_key = Zeroizing::new(key.mac_key());
    <Blake2bMac256 as Mac>::new_from_slice(&mac_key[..])
        .map_err(|e| Error::Crypto(format!("MAC setup failed: {}", e)))
}

fn encode_header(key: &KeyMaterial) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&MAGIC);
    header[4] = FORMAT_VERSION;
    header[5] = key.strength().tier_code();
    header[6..].copy_from_slice(&key.check_value());
    header
}

fn check_header(header: &[u8], key: &KeyMaterial) -> Result<()> {
    if header[..4] != MAGIC || header[4] != FORMAT_VERSION {
        return Err(Error::CiphertextInvalid);
    }
    match KeyStrength::from_tier_code(header[5]) {
        Some(strength) if strength == key.strength() => {}
        Some(strength) => {
            debug!(expected = %key.strength(), found = %strength, "Ciphertext tier mismatch");
            return Err(Error::CiphertextInvalid);
        }
        None => return Err(Error::CiphertextInvalid),
    }
    if !bool::from(header[6..].ct_eq(&key.check_value()[..])) {
        return Err(Error::CiphertextInvalid);
    }
    Ok(())
}

/// Read until `buf` is full or the source is exhausted.
fn fill<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Encrypt a complete byte slice in memory.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(key: KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    run_in_memory(Direction::Encrypt, key, data)
}

/// Decrypt a complete byte slice in memory.
pub fn decrypt_bytes(key: KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    run_in_memory(Direction::Decrypt, key, data)
}

fn run_in_memory(direction: Direction, key: KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    let mut source = MemorySource::new(data);
    let mut sink = MemorySink::new();
    Engine::default()
        .run(
            direction,
            key,
            &mut source,
            &mut sink,
            |_| {},
            &CancellationToken::new(),
        )
        .into_result()?;
    Ok(sink.into_inner())
}
