//! Bounded byte pipes.
//!
//! A pipe is a single-writer, single-reader FIFO with a capacity bound.
//! Reads suspend on empty until data arrives or the writer closes; writes
//! suspend on full until the reader frees space, and fail with `EPIPE`
//! once the reader is gone. Suspension is plain `Waker` bookkeeping: the
//! scheduler is a single-threaded pool, so whichever side makes progress
//! wakes the other.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::types::Errno;

/// Default pipe capacity: 64 KiB.
pub const PIPE_CAPACITY: usize = 64 * 1024;

struct PipeState {
    buf: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl PipeState {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }
}

struct Shared {
    state: Mutex<PipeState>,
}

/// Creates a connected reader/writer pair with the given capacity.
pub fn pipe(capacity: usize) -> (PipeReader, PipeWriter) {
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            buf: VecDeque::new(),
            capacity: capacity.max(1),
            writer_closed: false,
            reader_closed: false,
            read_waker: None,
            write_waker: None,
        }),
    });
    (
        PipeReader {
            inner: Arc::new(ReaderInner {
                shared: shared.clone(),
            }),
        },
        PipeWriter {
            inner: Arc::new(WriterInner { shared }),
        },
    )
}

struct ReaderInner {
    shared: Arc<Shared>,
}

impl Drop for ReaderInner {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.reader_closed = true;
        state.wake_writer();
    }
}

struct WriterInner {
    shared: Arc<Shared>,
}

impl Drop for WriterInner {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.writer_closed = true;
        state.wake_reader();
    }
}

/// The read end of a pipe. Cloning shares the endpoint; the side closes
/// when the last clone is dropped.
#[derive(Clone)]
pub struct PipeReader {
    inner: Arc<ReaderInner>,
}

impl PipeReader {
    /// Reads up to `buf.len()` bytes. Returns 0 only at EOF (writer gone
    /// and buffer drained).
    pub fn read<'a>(&'a self, buf: &'a mut [u8]) -> PipeRead<'a> {
        PipeRead { reader: self, buf }
    }

    /// Explicitly closes the read end, failing subsequent writes.
    pub fn close(&self) {
        let mut state = self.inner.shared.state.lock().unwrap();
        state.reader_closed = true;
        state.wake_writer();
    }
}

/// The write end of a pipe. Cloning shares the endpoint; the side closes
/// when the last clone is dropped, which is what gives downstream readers
/// their EOF.
#[derive(Clone)]
pub struct PipeWriter {
    inner: Arc<WriterInner>,
}

impl PipeWriter {
    /// Writes as much of `data` as fits, suspending while the pipe is
    /// full. Resolves with the byte count actually accepted (at least 1)
    /// or `Errno::Pipe` when the reader is gone.
    pub fn write<'a>(&'a self, data: &'a [u8]) -> PipeWrite<'a> {
        PipeWrite { writer: self, data }
    }

    /// Writes the whole buffer, suspending as needed.
    pub async fn write_all(&self, mut data: &[u8]) -> Result<(), Errno> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Explicitly closes the write end; readers drain then see EOF.
    pub fn close(&self) {
        let mut state = self.inner.shared.state.lock().unwrap();
        state.writer_closed = true;
        state.wake_reader();
    }
}

/// Future returned by [`PipeReader::read`].
pub struct PipeRead<'a> {
    reader: &'a PipeReader,
    buf: &'a mut [u8],
}

impl Future for PipeRead<'_> {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();
        let mut state = this.reader.inner.shared.state.lock().unwrap();
        if this.buf.is_empty() {
            return Poll::Ready(0);
        }
        if !state.buf.is_empty() {
            let n = state.buf.len().min(this.buf.len());
            for byte in this.buf.iter_mut().take(n) {
                *byte = state.buf.pop_front().expect("length checked");
            }
            state.wake_writer();
            return Poll::Ready(n);
        }
        if state.writer_closed {
            return Poll::Ready(0);
        }
        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`PipeWriter::write`].
pub struct PipeWrite<'a> {
    writer: &'a PipeWriter,
    data: &'a [u8],
}

impl Future for PipeWrite<'_> {
    type Output = Result<usize, Errno>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.writer.inner.shared.state.lock().unwrap();
        if state.reader_closed {
            return Poll::Ready(Err(Errno::Pipe));
        }
        if this.data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let space = state.capacity.saturating_sub(state.buf.len());
        if space == 0 {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = space.min(this.data.len());
        state.buf.extend(&this.data[..n]);
        state.wake_reader();
        Poll::Ready(Ok(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;

    #[test]
    fn bytes_arrive_in_fifo_order() {
        let (reader, writer) = pipe(PIPE_CAPACITY);
        block_on(async {
            writer.write_all(b"abc").await.unwrap();
            writer.write_all(b"def").await.unwrap();
            let mut buf = [0u8; 16];
            let n = reader.read(&mut buf).await;
            assert_eq!(&buf[..n], b"abcdef");
        });
    }

    #[test]
    fn read_sees_remaining_bytes_then_eof_after_writer_close() {
        let (reader, writer) = pipe(PIPE_CAPACITY);
        block_on(async {
            writer.write_all(b"tail").await.unwrap();
            writer.close();
            let mut buf = [0u8; 2];
            assert_eq!(reader.read(&mut buf).await, 2);
            assert_eq!(&buf, b"ta");
            assert_eq!(reader.read(&mut buf).await, 2);
            assert_eq!(&buf, b"il");
            assert_eq!(reader.read(&mut buf).await, 0);
            assert_eq!(reader.read(&mut buf).await, 0);
        });
    }

    #[test]
    fn write_after_reader_close_is_epipe() {
        let (reader, writer) = pipe(PIPE_CAPACITY);
        drop(reader);
        block_on(async {
            assert_eq!(writer.write(b"x").await, Err(Errno::Pipe));
        });
    }

    #[test]
    fn full_pipe_suspends_writer_until_reader_drains() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let (reader, writer) = pipe(4);

        let writer_task = spawner
            .spawn_local_with_handle(async move {
                writer.write_all(b"12345678").await.unwrap();
            })
            .unwrap();
        let reader_task = spawner
            .spawn_local_with_handle(async move {
                let mut out = Vec::new();
                let mut buf = [0u8; 3];
                loop {
                    let n = reader.read(&mut buf).await;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                out
            })
            .unwrap();

        pool.run_until(async move {
            writer_task.await;
            // Writer future owned the only PipeWriter clone, so EOF follows.
            assert_eq!(reader_task.await, b"12345678");
        });
    }

    #[test]
    fn reads_are_a_prefix_of_writes() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let (reader, writer) = pipe(7);
        let written: Vec<u8> = (0u16..2000).map(|i| (i % 251) as u8).collect();
        let expected = written.clone();

        spawner
            .spawn_local(async move {
                writer.write_all(&written).await.unwrap();
            })
            .unwrap();
        let collected = pool.run_until(async move {
            let mut out = Vec::new();
            let mut buf = [0u8; 13];
            loop {
                let n = reader.read(&mut buf).await;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            out
        });
        assert_eq!(collected, expected);
    }
}
