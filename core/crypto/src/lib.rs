//! Cryptographic core of CrypTool.
//!
//! This module provides:
//! - Key derivation from a passphrase and optional IV string
//! - CBC block transforms for the DES (64-bit) and AES (128/192/256-bit) tiers
//! - A chunked stream engine with progress reporting and cooperative
//!   cancellation
//! - Memory and file adapters for the engine, plus Base64 text mode
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No passphrase, key or plaintext is ever logged
//! - Ciphertext is authenticated; a wrong key is rejected before output is
//!   produced
//! - Cancelled or failed runs never leave partial output behind

pub mod cipher;
pub mod io;
pub mod kdf;
pub mod keys;
pub mod stream;
pub mod text;

pub use io::{
    validate_file_paths, ByteSink, ByteSource, FileSink, FileSource, MemorySink, MemorySource,
    ReaderSource,
};
pub use kdf::derive;
pub use keys::KeyMaterial;
pub use stream::{decrypt_bytes, encrypt_bytes, encrypted_len, Engine, EngineConfig};
pub use text::{decrypt_text, encrypt_text};
pub use tokio_util::sync::CancellationToken;
