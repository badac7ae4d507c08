//! Byte source and sink adapters for the stream engine.
//!
//! The engine only sees [`ByteSource`] and [`ByteSink`]; whether the bytes
//! live in memory or on disk is decided by the caller when it picks an
//! adapter.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use zeroize::Zeroize;

use cryptool_common::{Error, Result};

/// A finite sequence of input bytes, read front to back once.
pub trait ByteSource {
    /// Total length in bytes, if it can be known without reading.
    fn len_hint(&self) -> Option<u64>;

    /// Read up to `buf.len()` bytes. Returns 0 once exhausted.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// An ordered destination for output bytes that can be rolled back.
pub trait ByteSink {
    /// Append bytes.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Make the written bytes the final result. Returns the final size.
    fn finish(&mut self) -> io::Result<u64>;

    /// Remove everything written so far.
    fn abort(&mut self) -> io::Result<()>;
}

/// Source over a borrowed in-memory buffer.
pub struct MemorySource<'a> {
    remaining: &'a [u8],
    len: u64,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            remaining: data,
            len: data.len() as u64,
        }
    }
}

impl ByteSource for MemorySource<'_> {
    fn len_hint(&self) -> Option<u64> {
        Some(self.len)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.remaining.read(buf)
    }
}

/// Source over any reader whose length is unknown, such as stdin.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn len_hint(&self) -> Option<u64> {
        None
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// Source backed by a file on disk.
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    /// Open `path` for reading and record its length.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteSource for FileSource {
    fn len_hint(&self) -> Option<u64> {
        Some(self.len)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// Sink accumulating output in memory.
///
/// Aborting wipes the buffer, so a caller never observes partial output.
#[derive(Default)]
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

impl ByteSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<u64> {
        Ok(self.buf.len() as u64)
    }

    fn abort(&mut self) -> io::Result<()> {
        self.buf.zeroize();
        Ok(())
    }
}

/// Sink writing to a file through a temporary sibling.
///
/// Output goes to a temporary file in the destination's directory and is
/// renamed over the destination only by [`ByteSink::finish`]. Aborting (or
/// dropping the sink unfinished) deletes the temporary file, leaving any
/// previous destination file untouched. The output gets the usual mode for a
/// new file, or the mode of the destination it replaces.
pub struct FileSink {
    destination: PathBuf,
    temp: Option<NamedTempFile>,
    written: u64,
}

impl FileSink {
    /// Prepare a sink that will produce `destination`.
    ///
    /// # Errors
    /// - I/O errors creating the temporary file
    pub fn create(destination: impl AsRef<Path>) -> io::Result<Self> {
        let destination = destination.as_ref().to_path_buf();
        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut builder = Builder::new();
        builder.prefix(".cryptool");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Mode of any freshly created file, before the umask.
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
        let temp = builder.tempfile_in(parent)?;

        // A replaced destination keeps its mode.
        if let Ok(meta) = fs::metadata(&destination) {
            if meta.is_file() {
                temp.as_file().set_permissions(meta.permissions())?;
            }
        }

        Ok(Self {
            destination,
            temp: Some(temp),
            written: 0,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn closed() -> io::Error {
        io::Error::other("file sink already finished or aborted")
    }
}

impl ByteSink for FileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let temp = self.temp.as_mut().ok_or_else(Self::closed)?;
        temp.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<u64> {
        let mut temp = self.temp.take().ok_or_else(Self::closed)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&self.destination)?;
        Ok(self.written)
    }

    fn abort(&mut self) -> io::Result<()> {
        match self.temp.take() {
            Some(temp) => temp.close(),
            None => Ok(()),
        }
    }
}

/// Check a source/destination pair before any work starts.
///
/// # Errors
/// - `InvalidInput` if either path is empty, the source is not an existing
///   regular file, the destination is a directory or lives in a missing
///   directory, the destination is the source, or the destination exists
///   and `overwrite` is false
pub fn validate_file_paths(source: &Path, destination: &Path, overwrite: bool) -> Result<()> {
    if source.as_os_str().is_empty() {
        return Err(Error::InvalidInput("Source path is empty".to_string()));
    }
    if destination.as_os_str().is_empty() {
        return Err(Error::InvalidInput("Destination path is empty".to_string()));
    }

    match fs::metadata(source) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err(Error::InvalidInput(format!(
                "Source is not a regular file: {}",
                source.display()
            )))
        }
        Err(_) => {
            return Err(Error::InvalidInput(format!(
                "Source file does not exist: {}",
                source.display()
            )))
        }
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Destination directory does not exist: {}",
                parent.display()
            )));
        }
    }

    if let Ok(meta) = fs::metadata(destination) {
        if meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Destination is a directory: {}",
                destination.display()
            )));
        }
        if same_file(source, destination) {
            return Err(Error::InvalidInput(
                "Source and destination must be different files".to_string(),
            ));
        }
        if !overwrite {
            return Err(Error::InvalidInput(format!(
                "Destination already exists: {}",
                destination.display()
            )));
        }
    }

    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_source_reads_all() {
        let data = b"hello world";
        let mut source = MemorySource::new(data);
        assert_eq!(source.len_hint(), Some(11));

        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = source.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn test_reader_source_has_no_length() {
        let source = ReaderSource::new(&b"abc"[..]);
        assert_eq!(source.len_hint(), None);
    }

    #[test]
    fn test_memory_sink_abort_clears() {
        let mut sink = MemorySink::new();
        sink.write(b"partial").unwrap();
        sink.abort().unwrap();
        assert!(sink.as_bytes().is_empty());
    }

    #[test]
    fn test_file_sink_finish_creates_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let mut sink = FileSink::create(&dest).unwrap();
        sink.write(b"abc").unwrap();
        sink.write(b"def").unwrap();
        assert!(!dest.exists());

        assert_eq!(sink.finish().unwrap(), 6);
        assert_eq!(fs::read(&dest).unwrap(), b"abcdef");
        assert!(sink.write(b"more").is_err());
    }

    #[test]
    fn test_file_sink_abort_leaves_nothing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let mut sink = FileSink::create(&dest).unwrap();
        sink.write(b"partial").unwrap();
        sink.abort().unwrap();

        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_sink_abort_keeps_previous_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"original").unwrap();

        let mut sink = FileSink::create(&dest).unwrap();
        sink.write(b"replacement").unwrap();
        sink.abort().unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"original");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_sink_new_output_follows_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let reference = dir.path().join("reference.bin");
        fs::write(&reference, b"x").unwrap();
        let dest = dir.path().join("out.bin");

        let mut sink = FileSink::create(&dest).unwrap();
        sink.write(b"abc").unwrap();
        sink.finish().unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dest), mode(&reference));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_sink_replacement_keeps_destination_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"old").unwrap();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o640)).unwrap();

        let mut sink = FileSink::create(&dest).unwrap();
        sink.write(b"new").unwrap();
        sink.finish().unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(
            fs::metadata(&dest).unwrap().permissions().mode() & 0o777,
            0o640
        );
    }

    #[test]
    fn test_file_source_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.bin");
        fs::write(&path, vec![1u8; 1234]).unwrap();

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.len_hint(), Some(1234));
    }

    #[test]
    fn test_validate_file_paths() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let dest = dir.path().join("out.txt");
        fs::write(&source, b"data").unwrap();

        assert!(validate_file_paths(&source, &dest, false).is_ok());

        // Missing source
        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            validate_file_paths(&missing, &dest, false),
            Err(Error::InvalidInput(_))
        ));

        // Directory as source or destination
        assert!(validate_file_paths(dir.path(), &dest, false).is_err());
        assert!(validate_file_paths(&source, dir.path(), true).is_err());

        // Same file
        assert!(validate_file_paths(&source, &source, true).is_err());

        // Existing destination needs overwrite
        fs::write(&dest, b"old").unwrap();
        assert!(validate_file_paths(&source, &dest, false).is_err());
        assert!(validate_file_paths(&source, &dest, true).is_ok());

        // Missing destination directory
        let nested = dir.path().join("nope").join("out.txt");
        assert!(validate_file_paths(&source, &nested, true).is_err());

        // Empty paths
        assert!(validate_file_paths(Path::new(""), &dest, true).is_err());
        assert!(validate_file_paths(&source, Path::new(""), true).is_err());
    }
}
