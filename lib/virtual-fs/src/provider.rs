//! Virtual providers: synthetic subtrees mounted over the inode tree.
//!
//! A provider answers `stat`/`read`/`write`/`readdir` for everything under
//! its mount path without any backing inodes. Lookups always consult the
//! mount table before the real tree.

use bytes::Bytes;

use crate::{DirEntry, FileStat, FsError, FsResult, NodeKind};

/// A synthetic filesystem subtree (e.g. `/dev`, `/proc`).
///
/// Paths handed to a provider are relative to its mount point, with the
/// empty string denoting the mount root.
pub trait VirtualProvider: Send {
    fn stat(&self, rel: &str) -> FsResult<FileStat>;
    fn read_file(&self, rel: &str) -> FsResult<Bytes>;
    fn write_file(&mut self, rel: &str, data: &[u8]) -> FsResult<()>;
    fn readdir(&self, rel: &str) -> FsResult<Vec<DirEntry>>;

    /// Builds a fresh instance for a forked filesystem.
    fn fork(&self) -> Box<dyn VirtualProvider>;
}

fn device_stat(size: u64) -> FileStat {
    FileStat {
        kind: NodeKind::File,
        size,
        mode: 0o666,
        atime: 0,
        mtime: 0,
        ctime: 0,
    }
}

fn dir_stat() -> FileStat {
    FileStat {
        kind: NodeKind::Dir,
        size: 0,
        mode: 0o755,
        atime: 0,
        mtime: 0,
        ctime: 0,
    }
}

/// `/dev`: null, zero, urandom and tty.
#[derive(Default)]
pub struct DevProvider;

/// Byte count handed out per read of the unbounded devices.
const DEV_READ_CHUNK: usize = 4096;

impl DevProvider {
    const ENTRIES: [&'static str; 4] = ["null", "tty", "urandom", "zero"];
}

impl VirtualProvider for DevProvider {
    fn stat(&self, rel: &str) -> FsResult<FileStat> {
        match rel {
            "" => Ok(dir_stat()),
            r if Self::ENTRIES.contains(&r) => Ok(device_stat(0)),
            _ => Err(FsError::NotFound),
        }
    }

    fn read_file(&self, rel: &str) -> FsResult<Bytes> {
        match rel {
            "null" | "tty" => Ok(Bytes::new()),
            "zero" => Ok(Bytes::from(vec![0u8; DEV_READ_CHUNK])),
            "urandom" => {
                let mut buf = vec![0u8; DEV_READ_CHUNK];
                getrandom::getrandom(&mut buf).map_err(|_| FsError::NotSupported)?;
                Ok(Bytes::from(buf))
            }
            "" => Err(FsError::IsDir),
            _ => Err(FsError::NotFound),
        }
    }

    fn write_file(&mut self, rel: &str, _data: &[u8]) -> FsResult<()> {
        match rel {
            "null" | "zero" | "tty" | "urandom" => Ok(()),
            "" => Err(FsError::IsDir),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, rel: &str) -> FsResult<Vec<DirEntry>> {
        if !rel.is_empty() {
            return Err(FsError::NotDir);
        }
        Ok(Self::ENTRIES
            .iter()
            .map(|name| DirEntry {
                name: (*name).to_string(),
                kind: NodeKind::File,
                size: 0,
            })
            .collect())
    }

    fn fork(&self) -> Box<dyn VirtualProvider> {
        Box::new(Self)
    }
}

/// `/proc`: a handful of read-only status files.
pub struct ProcProvider {
    /// Epoch nanoseconds at provider construction, used for `uptime`.
    booted_at: u64,
}

impl ProcProvider {
    const ENTRIES: [&'static str; 3] = ["meminfo", "uptime", "version"];

    pub fn new(booted_at: u64) -> Self {
        Self { booted_at }
    }

    fn render(&self, rel: &str) -> FsResult<String> {
        match rel {
            "meminfo" => Ok("MemTotal:        262144 kB\nMemFree:         131072 kB\nMemAvailable:    196608 kB\n".to_string()),
            "uptime" => {
                let up = crate::now_nanos().saturating_sub(self.booted_at) / 1_000_000_000;
                Ok(format!("{}.00 {}.00\n", up, up))
            }
            "version" => Ok("wasmbox sandbox kernel (wasi-p1)\n".to_string()),
            _ => Err(FsError::NotFound),
        }
    }
}

impl VirtualProvider for ProcProvider {
    fn stat(&self, rel: &str) -> FsResult<FileStat> {
        if rel.is_empty() {
            return Ok(dir_stat());
        }
        let content = self.render(rel)?;
        let mut stat = device_stat(content.len() as u64);
        stat.mode = 0o444;
        Ok(stat)
    }

    fn read_file(&self, rel: &str) -> FsResult<Bytes> {
        if rel.is_empty() {
            return Err(FsError::IsDir);
        }
        Ok(Bytes::from(self.render(rel)?))
    }

    fn write_file(&mut self, rel: &str, _data: &[u8]) -> FsResult<()> {
        if rel.is_empty() {
            return Err(FsError::IsDir);
        }
        self.render(rel)?;
        Err(FsError::PermissionDenied)
    }

    fn readdir(&self, rel: &str) -> FsResult<Vec<DirEntry>> {
        if !rel.is_empty() {
            return Err(FsError::NotDir);
        }
        Ok(Self::ENTRIES
            .iter()
            .map(|name| DirEntry {
                name: (*name).to_string(),
                kind: NodeKind::File,
                size: self.render(name).map(|c| c.len() as u64).unwrap_or(0),
            })
            .collect())
    }

    fn fork(&self) -> Box<dyn VirtualProvider> {
        Box::new(Self::new(self.booted_at))
    }
}
