//! File access used when loading key material

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Narrow file interface consumed by the TLS context builder.
///
/// Streams returned by `open_stream` are owned by the caller and released
/// when dropped.
pub trait FileSource: Send + Sync {
    /// Check that a path resolves to an existing regular file
    fn file_exists(&self, path: &Path) -> bool;

    /// Read the entire file as UTF-8 text
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Open the file as a byte stream
    fn open_stream(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// `FileSource` backed by the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFiles;

impl FileSource for LocalFiles {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn open_stream(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}
