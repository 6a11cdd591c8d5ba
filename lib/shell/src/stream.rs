//! Shell-side byte streams.
//!
//! The executor threads an [`Io`] triple through every command. A stream
//! is either an fd target (buffer, pipe end, static bytes, null) or an
//! inode-backed file cursor created by a redirection. When an external
//! command is spawned the streams are installed into its fd table.

use std::sync::{Arc, Mutex};

use wasmbox_vfs::FsError;
use wasmbox_wasi::types::Errno;
use wasmbox_wasi::{FdTable, FdTarget, OpenMode, SharedVfs};

/// A file opened by a redirection: path plus cursor.
pub struct FileCursor {
    pub path: String,
    pub offset: u64,
    pub append: bool,
    pub readable: bool,
    pub writable: bool,
}

/// One end of a command's standard streams.
#[derive(Clone)]
pub enum Stream {
    Target(FdTarget),
    File(Arc<Mutex<FileCursor>>),
}

impl Stream {
    pub fn null() -> Self {
        Self::Target(FdTarget::Null)
    }

    pub fn from_file(path: String, append: bool, readable: bool, writable: bool) -> Self {
        Self::File(Arc::new(Mutex::new(FileCursor {
            path,
            offset: 0,
            append,
            readable,
            writable,
        })))
    }

    /// Writes the whole buffer, suspending on pipe backpressure.
    pub async fn write_all(&self, vfs: &SharedVfs, data: &[u8]) -> Result<(), Errno> {
        match self {
            Self::Target(target) => target.write_all(data).await,
            Self::File(cursor) => {
                let mut cursor = cursor.lock().unwrap();
                if !cursor.writable {
                    return Err(Errno::Badf);
                }
                let mut vfs = vfs.lock().unwrap();
                if cursor.append {
                    vfs.append_file(&cursor.path, data).map_err(Errno::from)?;
                    return Ok(());
                }
                let existing = match vfs.read_file(&cursor.path) {
                    Ok(content) => content,
                    Err(FsError::NotFound) => bytes::Bytes::new(),
                    Err(e) => return Err(e.into()),
                };
                let offset = cursor.offset as usize;
                let mut content = Vec::with_capacity(offset + data.len());
                content.extend_from_slice(&existing[..offset.min(existing.len())]);
                content.resize(offset, 0);
                content.extend_from_slice(data);
                if offset + data.len() < existing.len() {
                    content.extend_from_slice(&existing[offset + data.len()..]);
                }
                vfs.write_file(&cursor.path, content).map_err(Errno::from)?;
                cursor.offset += data.len() as u64;
                Ok(())
            }
        }
    }

    /// Reads up to `buf.len()` bytes; 0 means EOF.
    pub async fn read(&self, vfs: &SharedVfs, buf: &mut [u8]) -> Result<usize, Errno> {
        match self {
            Self::Target(target) => target.read(buf).await,
            Self::File(cursor) => {
                let mut cursor = cursor.lock().unwrap();
                if !cursor.readable {
                    return Err(Errno::Badf);
                }
                let content = {
                    let mut vfs = vfs.lock().unwrap();
                    vfs.read_file(&cursor.path).map_err(Errno::from)?
                };
                let start = (cursor.offset as usize).min(content.len());
                let n = (content.len() - start).min(buf.len());
                buf[..n].copy_from_slice(&content[start..start + n]);
                cursor.offset += n as u64;
                Ok(n)
            }
        }
    }

    pub async fn read_to_end(&self, vfs: &SharedVfs) -> Result<Vec<u8>, Errno> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(vfs, &mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Reads one line (without the newline). `None` at EOF. Byte-wise so
    /// it never reads past the newline on shared pipes.
    pub async fn read_line(&self, vfs: &SharedVfs) -> Result<Option<String>, Errno> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.read(vfs, &mut byte).await?;
            if n == 0 {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Installs this stream as `fd` in a child's descriptor table.
    pub fn install(&self, table: &mut FdTable, vfs: &SharedVfs, fd: u32) -> Result<(), FsError> {
        match self {
            Self::Target(target) => {
                table.set_target(fd, target.clone());
                Ok(())
            }
            Self::File(cursor) => {
                let cursor = cursor.lock().unwrap();
                let mode = match (cursor.readable, cursor.writable, cursor.append) {
                    (_, true, true) => OpenMode::Append,
                    (true, true, false) => OpenMode::ReadWrite,
                    (_, true, false) => OpenMode::Write,
                    _ => OpenMode::Read,
                };
                let mut vfs = vfs.lock().unwrap();
                let opened = table.open(&mut vfs, &cursor.path, mode, true, false, false)?;
                // The child expects the stream on a well-known fd.
                if opened != fd {
                    let entry = match table.get(opened) {
                        Some(wasmbox_wasi::FdEntry::File(handle)) => handle.clone(),
                        _ => return Err(FsError::NotFound),
                    };
                    table.close(opened).ok();
                    table.insert_file(fd, entry);
                }
                Ok(())
            }
        }
    }
}

/// The three standard streams handed to a command.
#[derive(Clone)]
pub struct Io {
    pub stdin: Stream,
    pub stdout: Stream,
    pub stderr: Stream,
}

impl Io {
    pub fn null() -> Self {
        Self {
            stdin: Stream::null(),
            stdout: Stream::null(),
            stderr: Stream::null(),
        }
    }

    /// Builds a child fd table with the streams on fds 0–2.
    pub fn to_fd_table(&self, vfs: &SharedVfs) -> Result<FdTable, FsError> {
        let mut table = FdTable::new();
        self.stdin.install(&mut table, vfs, 0)?;
        self.stdout.install(&mut table, vfs, 1)?;
        self.stderr.install(&mut table, vfs, 2)?;
        Ok(table)
    }
}
