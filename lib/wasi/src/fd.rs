//! Per-process file-descriptor state.

use std::collections::BTreeMap;

use wasmbox_vfs::{FsError, FsResult, NodeKind, Vfs};

use crate::target::FdTarget;
use crate::types::Errno;

/// First fd handed out for directory pseudo-descriptors; keeps readdir
/// handles clear of the regular-file range.
pub const DIR_FD_BASE: u32 = 100;

/// First fd considered for regular opens.
pub const FILE_FD_BASE: u32 = 3;

/// Open mode for an inode-backed descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    Append,
}

impl OpenMode {
    pub fn readable(self) -> bool {
        !matches!(self, Self::Write | Self::Append)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// An open regular file: path, mode and cursor.
#[derive(Clone, Debug)]
pub struct FileHandle {
    pub path: String,
    pub mode: OpenMode,
    pub offset: u64,
}

/// An open directory, walked by `fd_readdir` with an index cookie.
#[derive(Clone, Debug)]
pub struct DirStream {
    pub path: String,
}

/// What a descriptor points at.
pub enum FdEntry {
    File(FileHandle),
    Target(FdTarget),
    Dir(DirStream),
    /// A startup capability: the guest-visible prefix this fd grants.
    Preopen(String),
}

/// The per-process descriptor table.
///
/// fds 0–2 always carry fd targets; regular opens take the smallest free
/// fd from 3; directory handles live from [`DIR_FD_BASE`] up.
#[derive(Default)]
pub struct FdTable {
    entries: BTreeMap<u32, FdEntry>,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the three standard streams wired to targets.
    pub fn with_stdio(stdin: FdTarget, stdout: FdTarget, stderr: FdTarget) -> Self {
        let mut table = Self::new();
        table.set_target(0, stdin);
        table.set_target(1, stdout);
        table.set_target(2, stderr);
        table
    }

    pub fn set_target(&mut self, fd: u32, target: FdTarget) {
        self.entries.insert(fd, FdEntry::Target(target));
    }

    pub fn get(&self, fd: u32) -> Option<&FdEntry> {
        self.entries.get(&fd)
    }

    pub fn get_mut(&mut self, fd: u32) -> Option<&mut FdEntry> {
        self.entries.get_mut(&fd)
    }

    /// Clones the target attached to `fd`, if that is what it holds.
    pub fn target(&self, fd: u32) -> Option<FdTarget> {
        match self.entries.get(&fd) {
            Some(FdEntry::Target(target)) => Some(target.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, fd: u32) -> bool {
        self.entries.contains_key(&fd)
    }

    fn alloc_from(&self, base: u32) -> u32 {
        let mut fd = base;
        while self.entries.contains_key(&fd) {
            fd += 1;
        }
        fd
    }

    /// Installs a preopen capability on the given fd.
    pub fn insert_preopen(&mut self, fd: u32, prefix: impl Into<String>) {
        self.entries.insert(fd, FdEntry::Preopen(prefix.into()));
    }

    /// Installs a file handle on a specific fd (`fd_renumber`).
    pub fn insert_file(&mut self, fd: u32, handle: FileHandle) {
        self.entries.insert(fd, FdEntry::File(handle));
    }

    /// Installs a directory stream on a specific fd (`fd_renumber`).
    pub fn insert_dir(&mut self, fd: u32, stream: DirStream) {
        self.entries.insert(fd, FdEntry::Dir(stream));
    }

    /// Opens an inode-backed file. `path` must already be absolute.
    pub fn open(
        &mut self,
        vfs: &mut Vfs,
        path: &str,
        mode: OpenMode,
        create: bool,
        excl: bool,
        truncate: bool,
    ) -> FsResult<u32> {
        match vfs.stat(path) {
            Ok(stat) => {
                if stat.kind == NodeKind::Dir {
                    return Err(FsError::IsDir);
                }
                if excl {
                    return Err(FsError::AlreadyExists);
                }
                if truncate && mode.writable() {
                    vfs.write_file(path, bytes::Bytes::new())?;
                }
            }
            Err(FsError::NotFound) if create && mode.writable() => {
                vfs.write_file(path, bytes::Bytes::new())?;
            }
            Err(e) => return Err(e),
        }
        let offset = if mode == OpenMode::Append {
            vfs.stat(path)?.size
        } else {
            0
        };
        let fd = self.alloc_from(FILE_FD_BASE);
        self.entries.insert(
            fd,
            FdEntry::File(FileHandle {
                path: path.to_string(),
                mode,
                offset,
            }),
        );
        Ok(fd)
    }

    /// Opens a directory pseudo-fd for `fd_readdir`.
    pub fn open_dir(&mut self, vfs: &Vfs, path: &str) -> FsResult<u32> {
        let stat = vfs.stat(path)?;
        if stat.kind != NodeKind::Dir {
            return Err(FsError::NotDir);
        }
        let fd = self.alloc_from(DIR_FD_BASE);
        self.entries.insert(
            fd,
            FdEntry::Dir(DirStream {
                path: path.to_string(),
            }),
        );
        Ok(fd)
    }

    /// Removes the descriptor. Pipe endpoints close when their last
    /// clone drops, so releasing the entry is all that is needed.
    pub fn close(&mut self, fd: u32) -> Result<(), Errno> {
        self.entries.remove(&fd).map(|_| ()).ok_or(Errno::Badf)
    }

    /// Reads from an inode-backed descriptor at its cursor.
    pub fn read_file(&mut self, vfs: &mut Vfs, fd: u32, buf: &mut [u8]) -> Result<usize, Errno> {
        let handle = match self.entries.get_mut(&fd) {
            Some(FdEntry::File(handle)) => handle,
            _ => return Err(Errno::Badf),
        };
        if !handle.mode.readable() {
            return Err(Errno::Badf);
        }
        let content = vfs.read_file(&handle.path).map_err(Errno::from)?;
        let start = (handle.offset as usize).min(content.len());
        let n = (content.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&content[start..start + n]);
        handle.offset += n as u64;
        Ok(n)
    }

    /// Writes through an inode-backed descriptor, replacing the file
    /// content wholesale (the VFS snapshot contract).
    pub fn write_file(&mut self, vfs: &mut Vfs, fd: u32, data: &[u8]) -> Result<usize, Errno> {
        let handle = match self.entries.get_mut(&fd) {
            Some(FdEntry::File(handle)) => handle,
            _ => return Err(Errno::Badf),
        };
        if !handle.mode.writable() {
            return Err(Errno::Badf);
        }
        let existing = vfs.read_file(&handle.path).map_err(Errno::from)?;
        if handle.mode == OpenMode::Append {
            handle.offset = existing.len() as u64;
        }
        let offset = handle.offset as usize;
        let mut content = Vec::with_capacity(offset.max(existing.len()) + data.len());
        content.extend_from_slice(&existing[..offset.min(existing.len())]);
        // Sparse seeks past EOF fill with zeroes.
        if offset > existing.len() {
            content.resize(offset, 0);
        }
        content.extend_from_slice(data);
        if offset + data.len() < existing.len() {
            content.extend_from_slice(&existing[offset + data.len()..]);
        }
        vfs.write_file(&handle.path, content).map_err(Errno::from)?;
        handle.offset += data.len() as u64;
        Ok(data.len())
    }

    pub fn seek(
        &mut self,
        vfs: &Vfs,
        fd: u32,
        offset: i64,
        whence: crate::types::Whence,
    ) -> Result<u64, Errno> {
        let handle = match self.entries.get_mut(&fd) {
            Some(FdEntry::File(handle)) => handle,
            Some(FdEntry::Target(_)) => return Err(Errno::Spipe),
            _ => return Err(Errno::Badf),
        };
        let size = vfs.stat(&handle.path).map_err(Errno::from)?.size;
        let base = match whence {
            crate::types::Whence::Set => 0i64,
            crate::types::Whence::Cur => handle.offset as i64,
            crate::types::Whence::End => size as i64,
        };
        let next = base.checked_add(offset).ok_or(Errno::Inval)?;
        if next < 0 {
            return Err(Errno::Inval);
        }
        handle.offset = next as u64;
        Ok(handle.offset)
    }

    pub fn tell(&self, fd: u32) -> Result<u64, Errno> {
        match self.entries.get(&fd) {
            Some(FdEntry::File(handle)) => Ok(handle.offset),
            Some(FdEntry::Target(_)) => Err(Errno::Spipe),
            _ => Err(Errno::Badf),
        }
    }

    /// Iterates the installed descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FdEntry)> {
        self.entries.iter().map(|(fd, entry)| (*fd, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Whence;

    fn vfs() -> Vfs {
        let mut vfs = Vfs::new();
        vfs.host_mkdirp("/home/user").unwrap();
        vfs
    }

    #[test]
    fn open_allocates_smallest_free_fd_from_three() {
        let mut vfs = vfs();
        vfs.write_file("/home/user/a", &b"x"[..]).unwrap();
        let mut table = FdTable::with_stdio(FdTarget::Null, FdTarget::Null, FdTarget::Null);
        let first = table
            .open(&mut vfs, "/home/user/a", OpenMode::Read, false, false, false)
            .unwrap();
        let second = table
            .open(&mut vfs, "/home/user/a", OpenMode::Read, false, false, false)
            .unwrap();
        assert_eq!((first, second), (3, 4));
        table.close(first).unwrap();
        let reused = table
            .open(&mut vfs, "/home/user/a", OpenMode::Read, false, false, false)
            .unwrap();
        assert_eq!(reused, 3);
    }

    #[test]
    fn dir_fds_use_a_disjoint_range() {
        let mut vfs = vfs();
        let mut table = FdTable::new();
        let fd = table.open_dir(&vfs, "/home/user").unwrap();
        assert_eq!(fd, DIR_FD_BASE);
        let fd2 = table.open_dir(&vfs, "/home").unwrap();
        assert_eq!(fd2, DIR_FD_BASE + 1);
    }

    #[test]
    fn read_write_seek_tell_round_trip() {
        let mut vfs = vfs();
        let mut table = FdTable::new();
        let fd = table
            .open(&mut vfs, "/home/user/f", OpenMode::ReadWrite, true, false, false)
            .unwrap();
        assert_eq!(table.write_file(&mut vfs, fd, b"hello world").unwrap(), 11);
        assert_eq!(table.seek(&vfs, fd, 6, Whence::Set).unwrap(), 6);
        let mut buf = [0u8; 5];
        assert_eq!(table.read_file(&mut vfs, fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(table.tell(fd).unwrap(), 11);

        // Overwrite in the middle keeps the tail.
        table.seek(&vfs, fd, 0, Whence::Set).unwrap();
        table.write_file(&mut vfs, fd, b"HELLO").unwrap();
        assert_eq!(&vfs.read_file("/home/user/f").unwrap()[..], b"HELLO world");
    }

    #[test]
    fn append_mode_always_writes_at_end() {
        let mut vfs = vfs();
        vfs.write_file("/home/user/log", &b"one\n"[..]).unwrap();
        let mut table = FdTable::new();
        let fd = table
            .open(&mut vfs, "/home/user/log", OpenMode::Append, true, false, false)
            .unwrap();
        table.write_file(&mut vfs, fd, b"two\n").unwrap();
        table.write_file(&mut vfs, fd, b"three\n").unwrap();
        assert_eq!(&vfs.read_file("/home/user/log").unwrap()[..], b"one\ntwo\nthree\n");
    }

    #[test]
    fn closed_fds_report_badf() {
        let mut vfs = vfs();
        let mut table = FdTable::new();
        let fd = table
            .open(&mut vfs, "/home/user/f", OpenMode::Write, true, false, false)
            .unwrap();
        table.close(fd).unwrap();
        assert_eq!(table.close(fd), Err(Errno::Badf));
        assert_eq!(table.write_file(&mut vfs, fd, b"x"), Err(Errno::Badf));
        assert_eq!(table.tell(fd), Err(Errno::Badf));
    }

    #[test]
    fn exclusive_create_rejects_existing() {
        let mut vfs = vfs();
        vfs.write_file("/home/user/f", &b"x"[..]).unwrap();
        let mut table = FdTable::new();
        assert_eq!(
            table.open(&mut vfs, "/home/user/f", OpenMode::Write, true, true, false),
            Err(FsError::AlreadyExists)
        );
    }
}
