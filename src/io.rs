//! File reading for ingestion.
//!
//! Large filings are memory-mapped instead of copied through a read buffer.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memmap2::Mmap;

/// Files at or above this size are memory-mapped.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Reads a UTF-8 text file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read, or
/// [`io::ErrorKind::InvalidData`] if it is not valid UTF-8.
pub fn read_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    if len >= MMAP_THRESHOLD {
        // SAFETY: the map is read-only and dropped before returning; the
        // content is copied into an owned String.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        return std::str::from_utf8(&mmap)
            .map(ToString::to_string)
            .map_err(|e| invalid_utf8(path, &e));
    }

    let mut bytes = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
    (&file).read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| invalid_utf8(path, &e.utf8_error()))
}

fn invalid_utf8(path: &Path, err: &std::str::Utf8Error) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} is not valid UTF-8: {err}", path.display()),
    )
}
