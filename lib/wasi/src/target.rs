//! Fd targets: the non-inode endpoints a file descriptor can point at.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::pipe::{PipeReader, PipeWriter};
use crate::types::Errno;

struct BufferState {
    chunks: Vec<Bytes>,
    total: usize,
    limit: Option<usize>,
    truncated: bool,
}

/// A write-capturing sink with an optional byte limit.
///
/// Writes past the limit are counted but not stored; the `truncated` flag
/// is reported in the command result rather than surfaced as an error.
#[derive(Clone)]
pub struct OutputBuffer {
    state: Arc<Mutex<BufferState>>,
}

impl OutputBuffer {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState {
                chunks: Vec::new(),
                total: 0,
                limit,
                truncated: false,
            })),
        }
    }

    /// Accepts the whole write; stores at most up to the limit.
    pub fn push(&self, data: &[u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let stored = match state.limit {
            Some(limit) => {
                let room = limit.saturating_sub(state.total);
                if room < data.len() {
                    state.truncated = true;
                }
                room.min(data.len())
            }
            None => data.len(),
        };
        if stored > 0 {
            state.chunks.push(Bytes::copy_from_slice(&data[..stored]));
            state.total += stored;
        }
        data.len()
    }

    pub fn truncated(&self) -> bool {
        self.state.lock().unwrap().truncated
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut out = Vec::with_capacity(state.total);
        for chunk in &state.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn into_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

struct StaticState {
    data: Bytes,
    offset: usize,
}

/// A read-only byte source (heredoc bodies, `<<<` strings).
#[derive(Clone)]
pub struct StaticSource {
    state: Arc<Mutex<StaticState>>,
}

impl StaticSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StaticState {
                data: data.into(),
                offset: 0,
            })),
        }
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let remaining = state.data.len().saturating_sub(state.offset);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&state.data[state.offset..state.offset + n]);
        state.offset += n;
        n
    }
}

/// Where a file descriptor's bytes come from or go to when it is not
/// backed by an inode.
#[derive(Clone)]
pub enum FdTarget {
    /// Captures writes; reads fail.
    Buffer(OutputBuffer),
    /// Read end of a pipe.
    PipeRead(PipeReader),
    /// Write end of a pipe.
    PipeWrite(PipeWriter),
    /// Read-only data; writes fail.
    Static(StaticSource),
    /// Reads return EOF; writes are discarded.
    Null,
}

impl FdTarget {
    /// Fresh static target over the given bytes.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Static(StaticSource::new(data))
    }

    /// Reads into `buf`. May suspend on a pipe target.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        match self {
            Self::Buffer(_) => Err(Errno::Badf),
            Self::PipeRead(reader) => Ok(reader.read(buf).await),
            Self::PipeWrite(_) => Err(Errno::Badf),
            Self::Static(source) => Ok(source.read(buf)),
            Self::Null => Ok(0),
        }
    }

    /// Writes `data`. May suspend on a pipe target; short writes are
    /// reported, not retried.
    pub async fn write(&self, data: &[u8]) -> Result<usize, Errno> {
        match self {
            Self::Buffer(buffer) => Ok(buffer.push(data)),
            Self::PipeRead(_) => Err(Errno::Badf),
            Self::PipeWrite(writer) => writer.write(data).await,
            Self::Static(_) => Err(Errno::Badf),
            Self::Null => Ok(data.len()),
        }
    }

    /// Writes everything, looping over pipe backpressure.
    pub async fn write_all(&self, data: &[u8]) -> Result<(), Errno> {
        match self {
            Self::PipeWrite(writer) => writer.write_all(data).await,
            other => {
                other.write(data).await?;
                Ok(())
            }
        }
    }

    /// Drops pipe endpoints so the peer observes close. Other targets
    /// have no close-time behavior.
    pub fn close(&self) {
        match self {
            Self::PipeRead(reader) => reader.close(),
            Self::PipeWrite(writer) => writer.close(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn buffer_captures_and_truncates_at_limit() {
        let buffer = OutputBuffer::new(Some(5));
        let target = FdTarget::Buffer(buffer.clone());
        block_on(async {
            assert_eq!(target.write(b"hello world").await, Ok(11));
        });
        assert_eq!(buffer.contents(), b"hello");
        assert!(buffer.truncated());

        let unlimited = OutputBuffer::new(None);
        unlimited.push(b"all of it");
        assert!(!unlimited.truncated());
    }

    #[test]
    fn static_target_reads_then_eof_and_rejects_writes() {
        let target = FdTarget::from_bytes(&b"data"[..]);
        block_on(async {
            let mut buf = [0u8; 3];
            assert_eq!(target.read(&mut buf).await, Ok(3));
            assert_eq!(&buf, b"dat");
            assert_eq!(target.read(&mut buf).await, Ok(1));
            assert_eq!(target.read(&mut buf).await, Ok(0));
            assert_eq!(target.write(b"x").await, Err(Errno::Badf));
        });
    }

    #[test]
    fn null_discards_writes_and_reads_eof() {
        let target = FdTarget::Null;
        block_on(async {
            assert_eq!(target.write(b"gone").await, Ok(4));
            let mut buf = [0u8; 4];
            assert_eq!(target.read(&mut buf).await, Ok(0));
        });
    }

    #[test]
    fn buffer_reads_fail() {
        let target = FdTarget::Buffer(OutputBuffer::new(None));
        block_on(async {
            let mut buf = [0u8; 1];
            assert_eq!(target.read(&mut buf).await, Err(Errno::Badf));
        });
    }
}
