use crate::{CsvPipelineError, CsvResult};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// 64 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// Read size once the known length is consumed: detects EOF or growth.
const TAIL_READ: usize = 8 * 1024;

/// A contiguous slice of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of `data[0]` in the file.
    pub offset: u64,
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

enum LoaderState {
    Unopened(PathBuf),
    Reading { file: File, offset: u64, len: u64 },
}

/// Lazy stream of fixed-size chunks read from a file.
///
/// The file is opened on first poll and the handle lives inside the stream:
/// it is dropped at EOF, after the first error, or when the stream itself is
/// dropped before completion.
pub struct ChunkLoader {
    inner: BoxStream<'static, CsvResult<Chunk>>,
}

impl ChunkLoader {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        let state = LoaderState::Unopened(path.into());
        let inner = stream::try_unfold(state, move |state| next_chunk(state, chunk_size));
        Self {
            inner: inner.boxed(),
        }
    }

    pub fn with_default_chunk_size(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_CHUNK_SIZE)
    }
}

impl Stream for ChunkLoader {
    type Item = CsvResult<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

async fn next_chunk(
    state: LoaderState,
    chunk_size: usize,
) -> CsvResult<Option<(Chunk, LoaderState)>> {
    let (mut file, offset, len) = match state {
        LoaderState::Unopened(path) => {
            if chunk_size == 0 {
                return Err(CsvPipelineError::InvalidConfig("chunk size must be non-zero"));
            }
            let file = File::open(&path).await?;
            let len = file.metadata().await?.len();
            debug!(path = %path.display(), len, chunk_size, "opened source file");
            (file, 0, len)
        }
        LoaderState::Reading { file, offset, len } => (file, offset, len),
    };

    // Never allocate past the known end of the file.
    let remaining = usize::try_from(len.saturating_sub(offset)).unwrap_or(usize::MAX);
    let capacity = match remaining {
        0 => chunk_size.min(TAIL_READ),
        n => chunk_size.min(n),
    };

    // Short reads are retried until the buffer is full or EOF.
    let mut buf = vec![0u8; capacity];
    let mut filled = 0usize;
    while filled < capacity {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        debug!(bytes = offset, "source exhausted, releasing file handle");
        return Ok(None);
    }

    buf.truncate(filled);
    let chunk = Chunk {
        offset,
        data: Bytes::from(buf),
    };
    let next = LoaderState::Reading {
        file,
        offset: offset + filled as u64,
        len,
    };
    Ok(Some((chunk, next)))
}
