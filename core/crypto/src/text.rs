//! Text mode: strings in, Base64 ciphertext out, and back.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::io::{MemorySink, MemorySource};
use crate::keys::KeyMaterial;
use crate::stream::Engine;
use cryptool_common::{Direction, Error, ProgressEvent, Result};

/// Encrypt `text` and return the ciphertext as Base64.
///
/// Surrounding whitespace in `text` is ignored.
pub fn encrypt_text(engine: &Engine, key: KeyMaterial, text: &str) -> Result<String> {
    encrypt_text_with(engine, key, text, |_| {}, &CancellationToken::new())
}

/// Decrypt Base64 ciphertext produced by [`encrypt_text`].
///
/// # Errors
/// - `CiphertextInvalid` if `text` is not Base64, is not ciphertext for
///   `key`, or does not decrypt to UTF-8
pub fn decrypt_text(engine: &Engine, key: KeyMaterial, text: &str) -> Result<String> {
    decrypt_text_with(engine, key, text, |_| {}, &CancellationToken::new())
}

/// [`encrypt_text`] with progress reporting and cancellation.
pub fn encrypt_text_with<F>(
    engine: &Engine,
    key: KeyMaterial,
    text: &str,
    on_progress: F,
    cancel: &CancellationToken,
) -> Result<String>
where
    F: FnMut(ProgressEvent),
{
    let mut source = MemorySource::new(text.trim().as_bytes());
    let mut sink = MemorySink::new();
    engine
        .run(Direction::Encrypt, key, &mut source, &mut sink, on_progress, cancel)
        .into_result()?;
    Ok(STANDARD.encode(sink.as_bytes()))
}

/// [`decrypt_text`] with progress reporting and cancellation.
pub fn decrypt_text_with<F>(
    engine: &Engine,
    key: KeyMaterial,
    text: &str,
    on_progress: F,
    cancel: &CancellationToken,
) -> Result<String>
where
    F: FnMut(ProgressEvent),
{
    let ciphertext = STANDARD
        .decode(text.trim())
        .map_err(|_| Error::CiphertextInvalid)?;

    let mut source = MemorySource::new(&ciphertext);
    let mut sink = MemorySink::new();
    engine
        .run(Direction::Decrypt, key, &mut source, &mut sink, on_progress, cancel)
        .into_result()?;

    let plaintext = Zeroizing::new(sink.into_inner());
    std::str::from_utf8(&plaintext)
        .map(str::to_owned)
        .map_err(|_| Error::CiphertextInvalid)
}
