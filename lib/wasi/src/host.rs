//! The WASI Preview 1 host.
//!
//! One [`WasiCtx`] per guest process. Every syscall reads its arguments
//! out of guest linear memory, dispatches to the VFS, the fd table or an
//! fd target, writes results back and returns a WASI errno. Calls that
//! can block (pipe I/O, yield) are async; the engine adapter is expected
//! to turn those into guest suspensions.
//!
//! Stubbed calls return `ENOSYS`; faking success for `poll_oneoff` or
//! the socket family would corrupt guests that depend on them.

use std::sync::{Arc, Mutex};

use tracing::trace;
use wasmbox_vfs::{path as vfspath, NodeKind, Vfs};

use crate::control::ExecControl;
use crate::fd::{FdEntry, FdTable, FileHandle, OpenMode, FILE_FD_BASE};
use crate::memory::GuestMemory;
use crate::target::FdTarget;
use crate::types::{
    Clockid, Errno, ExitSignal, FdFlags, Filetype, LookupFlags, OFlags, Rights, Whence,
    DIRENT_HEADER_SIZE,
};

/// The filesystem as shared by every process of one sandbox.
pub type SharedVfs = Arc<Mutex<Vfs>>;

/// Result of one syscall: an errno for the guest, or a typed exit signal
/// unwinding the guest entirely (`proc_exit`, timeout, cancellation).
pub type SyscallResult = Result<Errno, ExitSignal>;

/// Per-process WASI state: args, env, descriptor table, preopens, and the
/// shared filesystem and control plane.
pub struct WasiCtx {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub fds: FdTable,
    pub vfs: SharedVfs,
    pub control: ExecControl,
    preopens: Vec<(u32, String)>,
}

/// Stable pseudo inode numbers derived from the canonical path (FNV-1a).
fn pseudo_ino(path: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in path.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl WasiCtx {
    pub fn new(vfs: SharedVfs, control: ExecControl) -> Self {
        Self {
            args: Vec::new(),
            env: Vec::new(),
            fds: FdTable::with_stdio(FdTarget::Null, FdTarget::Null, FdTarget::Null),
            vfs,
            control,
            preopens: Vec::new(),
        }
    }

    /// Grants the guest a directory capability, consuming the next free
    /// regular fd. Reported through `fd_prestat_get`.
    pub fn push_preopen(&mut self, prefix: impl Into<String>) -> u32 {
        let prefix = prefix.into();
        let mut fd = FILE_FD_BASE;
        while self.fds.contains(fd) {
            fd += 1;
        }
        self.fds.insert_preopen(fd, prefix.clone());
        self.preopens.push((fd, prefix));
        fd
    }

    /// The granted capabilities, in grant order.
    pub fn preopens(&self) -> &[(u32, String)] {
        &self.preopens
    }

    /// Absolute base directory named by a dirfd (preopen or dir handle).
    fn dir_base(&self, fd: u32) -> Result<String, Errno> {
        match self.fds.get(fd) {
            Some(FdEntry::Preopen(prefix)) => Ok(prefix.clone()),
            Some(FdEntry::Dir(stream)) => Ok(stream.path.clone()),
            Some(_) => Err(Errno::Notdir),
            None => Err(Errno::Badf),
        }
    }

    fn resolve_at(&self, dirfd: u32, raw: &str) -> Result<String, Errno> {
        let base = self.dir_base(dirfd)?;
        if raw.starts_with('/') {
            vfspath::normalize(raw).map_err(Errno::from)
        } else {
            vfspath::absolutize(&base, raw).map_err(Errno::from)
        }
    }

    // ---- args & environ ---------------------------------------------------

    pub fn args_sizes_get(
        &self,
        mem: &mut dyn GuestMemory,
        argc_ptr: u32,
        argv_buf_size_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let bytes: u32 = self.args.iter().map(|a| a.len() as u32 + 1).sum();
        if mem.write_u32(argc_ptr, self.args.len() as u32).is_err()
            || mem.write_u32(argv_buf_size_ptr, bytes).is_err()
        {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn args_get(
        &self,
        mem: &mut dyn GuestMemory,
        argv_ptr: u32,
        argv_buf_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        Ok(write_string_table(mem, argv_ptr, argv_buf_ptr, self.args.iter().cloned())
            .err()
            .unwrap_or(Errno::Success))
    }

    pub fn environ_sizes_get(
        &self,
        mem: &mut dyn GuestMemory,
        count_ptr: u32,
        buf_size_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let bytes: u32 = self
            .env
            .iter()
            .map(|(k, v)| k.len() as u32 + v.len() as u32 + 2)
            .sum();
        if mem.write_u32(count_ptr, self.env.len() as u32).is_err()
            || mem.write_u32(buf_size_ptr, bytes).is_err()
        {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn environ_get(
        &self,
        mem: &mut dyn GuestMemory,
        environ_ptr: u32,
        environ_buf_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let entries = self.env.iter().map(|(k, v)| format!("{k}={v}"));
        Ok(write_string_table(mem, environ_ptr, environ_buf_ptr, entries)
            .err()
            .unwrap_or(Errno::Success))
    }

    // ---- clocks, random, process ------------------------------------------

    pub fn clock_time_get(
        &self,
        mem: &mut dyn GuestMemory,
        clock_id: u32,
        _precision: u64,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        if Clockid::from_raw(clock_id).is_none() {
            return Ok(Errno::Inval);
        }
        // Realtime and monotonic both report host epoch nanoseconds.
        match mem.write_u64(out_ptr, wasmbox_vfs::now_nanos()) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn clock_res_get(
        &self,
        mem: &mut dyn GuestMemory,
        clock_id: u32,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        if Clockid::from_raw(clock_id).is_none() {
            return Ok(Errno::Inval);
        }
        match mem.write_u64(out_ptr, 1_000) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn random_get(&self, mem: &mut dyn GuestMemory, buf_ptr: u32, buf_len: u32) -> SyscallResult {
        self.control.check()?;
        let mut bytes = vec![0u8; buf_len as usize];
        if getrandom::getrandom(&mut bytes).is_err() {
            return Ok(Errno::Io);
        }
        match mem.write(buf_ptr as u64, &bytes) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    /// Never returns normally: `proc_exit` is a typed unwind caught at
    /// the top of `_start`.
    pub fn proc_exit(&self, code: u32) -> ExitSignal {
        ExitSignal::Exit(code as i32)
    }

    pub async fn sched_yield(&self) -> SyscallResult {
        self.control.check()?;
        crate::kernel::yield_now().await;
        self.control.check()?;
        Ok(Errno::Success)
    }

    // ---- fd I/O -----------------------------------------------------------

    pub fn fd_close(&mut self, fd: u32) -> SyscallResult {
        self.control.check()?;
        Ok(self.fds.close(fd).err().unwrap_or(Errno::Success))
    }

    pub async fn fd_read(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        iovs_ptr: u32,
        iovs_len: u32,
        nread_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let iovs = match mem.read_iovecs(iovs_ptr, iovs_len) {
            Ok(iovs) => iovs,
            Err(_) => return Ok(Errno::Fault),
        };
        let target = self.fds.target(fd);
        let mut total = 0u32;
        for iov in iovs {
            if iov.len == 0 {
                continue;
            }
            let mut buf = vec![0u8; iov.len as usize];
            let n = match &target {
                Some(target) => {
                    let n = match target.read(&mut buf).await {
                        Ok(n) => n,
                        Err(errno) => return Ok(errno),
                    };
                    // A pipe read may have suspended; re-check on resume.
                    self.control.check()?;
                    n
                }
                None => {
                    let mut vfs = self.vfs.lock().unwrap();
                    match self.fds.read_file(&mut vfs, fd, &mut buf) {
                        Ok(n) => n,
                        Err(errno) => return Ok(errno),
                    }
                }
            };
            if n > 0 && mem.write(iov.buf as u64, &buf[..n]).is_err() {
                return Ok(Errno::Fault);
            }
            total += n as u32;
            // Short read: report what we have, skip remaining iovecs.
            if n < iov.len as usize {
                break;
            }
        }
        if mem.write_u32(nread_ptr, total).is_err() {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub async fn fd_write(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        iovs_ptr: u32,
        iovs_len: u32,
        nwritten_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let iovs = match mem.read_iovecs(iovs_ptr, iovs_len) {
            Ok(iovs) => iovs,
            Err(_) => return Ok(Errno::Fault),
        };
        let target = self.fds.target(fd);
        let mut total = 0u32;
        for iov in iovs {
            if iov.len == 0 {
                continue;
            }
            let data = match mem.read_bytes(iov.buf, iov.len) {
                Ok(data) => data,
                Err(_) => return Ok(Errno::Fault),
            };
            let n = match &target {
                Some(target) => {
                    let n = match target.write(&data).await {
                        Ok(n) => n,
                        Err(errno) => return Ok(errno),
                    };
                    self.control.check()?;
                    n
                }
                None => {
                    let mut vfs = self.vfs.lock().unwrap();
                    match self.fds.write_file(&mut vfs, fd, &data) {
                        Ok(n) => n,
                        Err(errno) => return Ok(errno),
                    }
                }
            };
            total += n as u32;
            if n < data.len() {
                break;
            }
        }
        if mem.write_u32(nwritten_ptr, total).is_err() {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn fd_seek(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        offset: i64,
        whence: u8,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let whence = match Whence::from_raw(whence) {
            Some(whence) => whence,
            None => return Ok(Errno::Inval),
        };
        let vfs = self.vfs.lock().unwrap();
        match self.fds.seek(&vfs, fd, offset, whence) {
            Ok(pos) => {
                drop(vfs);
                if mem.write_u64(out_ptr, pos).is_err() {
                    return Ok(Errno::Fault);
                }
                Ok(Errno::Success)
            }
            Err(errno) => Ok(errno),
        }
    }

    pub fn fd_tell(&self, mem: &mut dyn GuestMemory, fd: u32, out_ptr: u32) -> SyscallResult {
        self.control.check()?;
        match self.fds.tell(fd) {
            Ok(pos) => {
                if mem.write_u64(out_ptr, pos).is_err() {
                    return Ok(Errno::Fault);
                }
                Ok(Errno::Success)
            }
            Err(errno) => Ok(errno),
        }
    }

    pub fn fd_fdstat_get(&self, mem: &mut dyn GuestMemory, fd: u32, out_ptr: u32) -> SyscallResult {
        self.control.check()?;
        let (filetype, flags, rights) = match self.fds.get(fd) {
            Some(FdEntry::File(handle)) => {
                let flags = if handle.mode == OpenMode::Append {
                    FdFlags::APPEND
                } else {
                    FdFlags::empty()
                };
                let mut rights = Rights::FD_SEEK | Rights::FD_TELL;
                if handle.mode.readable() {
                    rights |= Rights::FD_READ;
                }
                if handle.mode.writable() {
                    rights |= Rights::FD_WRITE;
                }
                (Filetype::RegularFile, flags, rights)
            }
            Some(FdEntry::Dir(_)) | Some(FdEntry::Preopen(_)) => (
                Filetype::Directory,
                FdFlags::empty(),
                Rights::PATH_OPEN | Rights::FD_READDIR,
            ),
            Some(FdEntry::Target(target)) => {
                let filetype = match target {
                    FdTarget::PipeRead(_) | FdTarget::PipeWrite(_) => Filetype::Unknown,
                    _ => Filetype::CharacterDevice,
                };
                (filetype, FdFlags::empty(), Rights::FD_READ | Rights::FD_WRITE)
            }
            None => return Ok(Errno::Badf),
        };
        let mut record = [0u8; 24];
        record[0] = filetype as u8;
        record[2..4].copy_from_slice(&flags.bits().to_le_bytes());
        record[8..16].copy_from_slice(&rights.bits().to_le_bytes());
        record[16..24].copy_from_slice(&rights.bits().to_le_bytes());
        match mem.write(out_ptr as u64, &record) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn fd_filestat_get(
        &self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let result = match self.fds.get(fd) {
            Some(FdEntry::File(FileHandle { path, .. }))
            | Some(FdEntry::Dir(crate::fd::DirStream { path })) => {
                let vfs = self.vfs.lock().unwrap();
                match vfs.stat(path) {
                    Ok(stat) => Some((pseudo_ino(path), stat)),
                    Err(err) => return Ok(err.into()),
                }
            }
            Some(FdEntry::Preopen(prefix)) => {
                let vfs = self.vfs.lock().unwrap();
                match vfs.stat(prefix) {
                    Ok(stat) => Some((pseudo_ino(prefix), stat)),
                    Err(err) => return Ok(err.into()),
                }
            }
            Some(FdEntry::Target(_)) => None,
            None => return Ok(Errno::Badf),
        };
        let written = match result {
            Some((ino, stat)) => write_filestat(
                mem,
                out_ptr,
                ino,
                Filetype::from(stat.kind),
                stat.size,
                stat.atime,
                stat.mtime,
                stat.ctime,
            ),
            None => write_filestat(mem, out_ptr, 0, Filetype::CharacterDevice, 0, 0, 0, 0),
        };
        match written {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn fd_readdir(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        buf_ptr: u32,
        buf_len: u32,
        cookie: u64,
        bufused_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let dir_path = match self.fds.get(fd) {
            Some(FdEntry::Dir(stream)) => stream.path.clone(),
            Some(FdEntry::Preopen(prefix)) => prefix.clone(),
            Some(_) => return Ok(Errno::Notdir),
            None => return Ok(Errno::Badf),
        };
        let entries = {
            let mut vfs = self.vfs.lock().unwrap();
            match vfs.readdir(&dir_path) {
                Ok(entries) => entries,
                Err(err) => return Ok(err.into()),
            }
        };
        let mut packed: Vec<u8> = Vec::new();
        for (idx, entry) in entries.iter().enumerate().skip(cookie as usize) {
            let name = entry.name.as_bytes();
            let mut header = [0u8; DIRENT_HEADER_SIZE as usize];
            header[0..8].copy_from_slice(&(idx as u64 + 1).to_le_bytes());
            let ino = pseudo_ino(&format!("{}/{}", dir_path, entry.name));
            header[8..16].copy_from_slice(&ino.to_le_bytes());
            header[16..20].copy_from_slice(&(name.len() as u32).to_le_bytes());
            header[20] = Filetype::from(entry.kind) as u8;
            packed.extend_from_slice(&header);
            packed.extend_from_slice(name);
            if packed.len() >= buf_len as usize {
                break;
            }
        }
        // A full buffer (bufused == buf_len) tells the caller to come
        // back with more space; the final record may be truncated.
        let used = packed.len().min(buf_len as usize);
        if mem.write(buf_ptr as u64, &packed[..used]).is_err() {
            return Ok(Errno::Fault);
        }
        if mem.write_u32(bufused_ptr, used as u32).is_err() {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn fd_prestat_get(&self, mem: &mut dyn GuestMemory, fd: u32, out_ptr: u32) -> SyscallResult {
        self.control.check()?;
        let prefix = match self.fds.get(fd) {
            Some(FdEntry::Preopen(prefix)) => prefix,
            Some(_) => return Ok(Errno::Badf),
            None => return Ok(Errno::Badf),
        };
        let mut record = [0u8; 8];
        record[0] = 0; // preopen kind: directory
        record[4..8].copy_from_slice(&(prefix.len() as u32).to_le_bytes());
        match mem.write(out_ptr as u64, &record) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn fd_prestat_dir_name(
        &self,
        mem: &mut dyn GuestMemory,
        fd: u32,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let prefix = match self.fds.get(fd) {
            Some(FdEntry::Preopen(prefix)) => prefix.clone(),
            _ => return Ok(Errno::Badf),
        };
        if (path_len as usize) < prefix.len() {
            return Ok(Errno::Nametoolong);
        }
        match mem.write(path_ptr as u64, prefix.as_bytes()) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    pub fn fd_renumber(&mut self, from: u32, to: u32) -> SyscallResult {
        self.control.check()?;
        if !self.fds.contains(from) {
            return Ok(Errno::Badf);
        }
        if from == to {
            return Ok(Errno::Success);
        }
        let entry = match self.fds.get(from) {
            Some(FdEntry::Target(target)) => FdEntry::Target(target.clone()),
            Some(FdEntry::File(handle)) => FdEntry::File(handle.clone()),
            Some(FdEntry::Dir(stream)) => FdEntry::Dir(stream.clone()),
            Some(FdEntry::Preopen(prefix)) => FdEntry::Preopen(prefix.clone()),
            None => return Ok(Errno::Badf),
        };
        self.fds.close(to).ok();
        match entry {
            FdEntry::Target(target) => self.fds.set_target(to, target),
            FdEntry::File(handle) => self.fds.insert_file(to, handle),
            FdEntry::Dir(stream) => self.fds.insert_dir(to, stream),
            FdEntry::Preopen(prefix) => self.fds.insert_preopen(to, prefix),
        }
        self.fds.close(from).ok();
        Ok(Errno::Success)
    }

    // Safe no-ops: sync and advisory calls have nothing to do against an
    // in-memory tree.

    pub fn fd_sync(&self, fd: u32) -> SyscallResult {
        self.control.check()?;
        if self.fds.contains(fd) {
            Ok(Errno::Success)
        } else {
            Ok(Errno::Badf)
        }
    }

    pub fn fd_datasync(&self, fd: u32) -> SyscallResult {
        self.fd_sync(fd)
    }

    pub fn fd_advise(&self, fd: u32, _offset: u64, _len: u64, _advice: u8) -> SyscallResult {
        self.fd_sync(fd)
    }

    pub fn fd_allocate(&self, fd: u32, _offset: u64, _len: u64) -> SyscallResult {
        self.fd_sync(fd)
    }

    pub fn fd_fdstat_set_flags(&self, fd: u32, _flags: u16) -> SyscallResult {
        self.fd_sync(fd)
    }

    pub fn fd_fdstat_set_rights(&self, fd: u32, _base: u64, _inheriting: u64) -> SyscallResult {
        self.fd_sync(fd)
    }

    // ---- path I/O ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn path_open(
        &mut self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        _dirflags: u32,
        path_ptr: u32,
        path_len: u32,
        oflags: u16,
        rights_base: u64,
        _rights_inheriting: u64,
        fdflags: u16,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let raw = match mem.read_string(path_ptr, path_len) {
            Ok(raw) => raw,
            Err(errno) => return Ok(errno),
        };
        let abs = match self.resolve_at(dirfd, &raw) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let oflags = OFlags::from_bits_truncate(oflags);
        let fdflags = FdFlags::from_bits_truncate(fdflags);
        let rights = Rights::from_bits_truncate(rights_base);
        trace!(path = %abs, ?oflags, "path_open");

        let mut vfs = self.vfs.lock().unwrap();
        let existing_dir = matches!(
            vfs.stat(&abs),
            Ok(stat) if stat.kind == NodeKind::Dir
        );
        let fd = if oflags.contains(OFlags::DIRECTORY) || existing_dir {
            match self.fds.open_dir(&vfs, &abs) {
                Ok(fd) => fd,
                Err(err) => return Ok(err.into()),
            }
        } else {
            let wants_write = rights.contains(Rights::FD_WRITE);
            let wants_read = rights.contains(Rights::FD_READ) || !wants_write;
            let mode = if fdflags.contains(FdFlags::APPEND) {
                OpenMode::Append
            } else if wants_read && wants_write {
                OpenMode::ReadWrite
            } else if wants_write {
                OpenMode::Write
            } else {
                OpenMode::Read
            };
            match self.fds.open(
                &mut vfs,
                &abs,
                mode,
                oflags.contains(OFlags::CREAT),
                oflags.contains(OFlags::EXCL),
                oflags.contains(OFlags::TRUNC),
            ) {
                Ok(fd) => fd,
                Err(err) => return Ok(err.into()),
            }
        };
        drop(vfs);
        if mem.write_u32(out_ptr, fd).is_err() {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn path_create_directory(
        &mut self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let abs = match self.read_path(mem, dirfd, path_ptr, path_len) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let mut vfs = self.vfs.lock().unwrap();
        Ok(vfs.mkdir(&abs).err().map(Errno::from).unwrap_or(Errno::Success))
    }

    pub fn path_remove_directory(
        &mut self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let abs = match self.read_path(mem, dirfd, path_ptr, path_len) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let mut vfs = self.vfs.lock().unwrap();
        Ok(vfs.rmdir(&abs).err().map(Errno::from).unwrap_or(Errno::Success))
    }

    pub fn path_unlink_file(
        &mut self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        path_ptr: u32,
        path_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let abs = match self.read_path(mem, dirfd, path_ptr, path_len) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let mut vfs = self.vfs.lock().unwrap();
        Ok(vfs.unlink(&abs).err().map(Errno::from).unwrap_or(Errno::Success))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn path_rename(
        &mut self,
        mem: &mut dyn GuestMemory,
        old_dirfd: u32,
        old_ptr: u32,
        old_len: u32,
        new_dirfd: u32,
        new_ptr: u32,
        new_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let old = match self.read_path(mem, old_dirfd, old_ptr, old_len) {
            Ok(old) => old,
            Err(errno) => return Ok(errno),
        };
        let new = match self.read_path(mem, new_dirfd, new_ptr, new_len) {
            Ok(new) => new,
            Err(errno) => return Ok(errno),
        };
        let mut vfs = self.vfs.lock().unwrap();
        Ok(vfs
            .rename(&old, &new)
            .err()
            .map(Errno::from)
            .unwrap_or(Errno::Success))
    }

    pub fn path_symlink(
        &mut self,
        mem: &mut dyn GuestMemory,
        target_ptr: u32,
        target_len: u32,
        dirfd: u32,
        link_ptr: u32,
        link_len: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let target = match mem.read_string(target_ptr, target_len) {
            Ok(target) => target,
            Err(errno) => return Ok(errno),
        };
        let link = match self.read_path(mem, dirfd, link_ptr, link_len) {
            Ok(link) => link,
            Err(errno) => return Ok(errno),
        };
        let mut vfs = self.vfs.lock().unwrap();
        Ok(vfs
            .symlink(&target, &link)
            .err()
            .map(Errno::from)
            .unwrap_or(Errno::Success))
    }

    pub fn path_readlink(
        &mut self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        path_ptr: u32,
        path_len: u32,
        buf_ptr: u32,
        buf_len: u32,
        bufused_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let abs = match self.read_path(mem, dirfd, path_ptr, path_len) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let target = {
            let vfs = self.vfs.lock().unwrap();
            match vfs.readlink(&abs) {
                Ok(target) => target,
                Err(err) => return Ok(err.into()),
            }
        };
        let bytes = target.as_bytes();
        let used = bytes.len().min(buf_len as usize);
        if mem.write(buf_ptr as u64, &bytes[..used]).is_err() {
            return Ok(Errno::Fault);
        }
        if mem.write_u32(bufused_ptr, used as u32).is_err() {
            return Ok(Errno::Fault);
        }
        Ok(Errno::Success)
    }

    pub fn path_filestat_get(
        &self,
        mem: &mut dyn GuestMemory,
        dirfd: u32,
        lookup_flags: u32,
        path_ptr: u32,
        path_len: u32,
        out_ptr: u32,
    ) -> SyscallResult {
        self.control.check()?;
        let abs = match self.read_path(mem, dirfd, path_ptr, path_len) {
            Ok(abs) => abs,
            Err(errno) => return Ok(errno),
        };
        let follow = LookupFlags::from_bits_truncate(lookup_flags).contains(LookupFlags::SYMLINK_FOLLOW);
        let vfs = self.vfs.lock().unwrap();
        let stat = match if follow { vfs.stat(&abs) } else { vfs.lstat(&abs) } {
            Ok(stat) => stat,
            Err(err) => return Ok(err.into()),
        };
        drop(vfs);
        match write_filestat(
            mem,
            out_ptr,
            pseudo_ino(&abs),
            Filetype::from(stat.kind),
            stat.size,
            stat.atime,
            stat.mtime,
            stat.ctime,
        ) {
            Ok(()) => Ok(Errno::Success),
            Err(_) => Ok(Errno::Fault),
        }
    }

    fn read_path(
        &self,
        mem: &dyn GuestMemory,
        dirfd: u32,
        path_ptr: u32,
        path_len: u32,
    ) -> Result<String, Errno> {
        let raw = mem.read_string(path_ptr, path_len)?;
        self.resolve_at(dirfd, &raw)
    }

    // ---- stubs ------------------------------------------------------------
    // Faking these would corrupt guests; they fail loudly instead.

    pub fn fd_pread(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn fd_pwrite(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn fd_filestat_set_size(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn fd_filestat_set_times(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn path_filestat_set_times(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn path_link(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn poll_oneoff(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn proc_raise(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn sock_accept(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn sock_recv(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn sock_send(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }

    pub fn sock_shutdown(&self) -> SyscallResult {
        self.control.check()?;
        Ok(Errno::Nosys)
    }
}

/// Packs the 64-byte filestat record at fixed offsets: dev@0, ino@8,
/// filetype@16, nlink@24, size@32, atim@40, mtim@48, ctim@56.
#[allow(clippy::too_many_arguments)]
fn write_filestat(
    mem: &mut dyn GuestMemory,
    ptr: u32,
    ino: u64,
    filetype: Filetype,
    size: u64,
    atime: u64,
    mtime: u64,
    ctime: u64,
) -> Result<(), crate::memory::MemoryAccessError> {
    let mut record = [0u8; 64];
    record[8..16].copy_from_slice(&ino.to_le_bytes());
    record[16] = filetype as u8;
    record[24..32].copy_from_slice(&1u64.to_le_bytes());
    record[32..40].copy_from_slice(&size.to_le_bytes());
    record[40..48].copy_from_slice(&atime.to_le_bytes());
    record[48..56].copy_from_slice(&mtime.to_le_bytes());
    record[56..64].copy_from_slice(&ctime.to_le_bytes());
    mem.write(ptr as u64, &record)
}

/// Writes a NUL-terminated string table: pointers at `table_ptr`, bytes
/// packed consecutively at `buf_ptr`. Shared by args_get/environ_get.
fn write_string_table(
    mem: &mut dyn GuestMemory,
    table_ptr: u32,
    buf_ptr: u32,
    entries: impl Iterator<Item = String>,
) -> Result<(), Errno> {
    let mut slot = table_ptr;
    let mut cursor = buf_ptr;
    for entry in entries {
        mem.write_u32(slot, cursor)?;
        mem.write(cursor as u64, entry.as_bytes())?;
        mem.write((cursor as u64) + entry.len() as u64, &[0])?;
        cursor += entry.len() as u32 + 1;
        slot += 4;
    }
    Ok(())
}
