//! File source backed by `tokio::fs::File`.

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ReadableSource, MAX_PREALLOCATION};

/// Source reading chunks from a file at absolute offsets.
///
/// Tracks the file cursor so sequential chunks skip the seek.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    /// Known cursor position, if any.
    position: Option<u64>,
}

impl FileSource {
    /// Open the file at `path` for reading.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::from_file(file))
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File) -> Self {
        Self {
            file,
            position: None,
        }
    }

    /// Unwrap the file.
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl ReadableSource for FileSource {
    type Error = std::io::Error;

    fn read_chunk(
        &mut self,
        offset: u64,
        length: usize,
    ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send {
        async move {
            if self.position != Some(offset) {
                self.position = None;
                self.file.seek(SeekFrom::Start(offset)).await?;
            }

            let mut buf = Vec::with_capacity(length.min(MAX_PREALLOCATION));
            let read = (&mut self.file)
                .take(length as u64)
                .read_to_end(&mut buf)
                .await?;
            self.position = Some(offset + read as u64);

            Ok(Bytes::from(buf))
        }
    }
}
