//! WASI Preview 1 ABI types.
//!
//! Values and layouts follow the snapshot-1 witx definitions: 32-bit
//! little-endian guest pointers, 16-bit errnos, 64-byte filestat records
//! and 24-byte dirent headers.

use wasmbox_vfs::{FsError, NodeKind};

/// WASI errno, returned from every syscall.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Errno {
    Success = 0,
    TooBig = 1,
    Acces = 2,
    Addrinuse = 3,
    Addrnotavail = 4,
    Afnosupport = 5,
    Again = 6,
    Already = 7,
    Badf = 8,
    Badmsg = 9,
    Busy = 10,
    Canceled = 11,
    Child = 12,
    Connaborted = 13,
    Connrefused = 14,
    Connreset = 15,
    Deadlk = 16,
    Destaddrreq = 17,
    Dom = 18,
    Dquot = 19,
    Exist = 20,
    Fault = 21,
    Fbig = 22,
    Hostunreach = 23,
    Idrm = 24,
    Ilseq = 25,
    Inprogress = 26,
    Intr = 27,
    Inval = 28,
    Io = 29,
    Isconn = 30,
    Isdir = 31,
    Loop = 32,
    Mfile = 33,
    Mlink = 34,
    Msgsize = 35,
    Multihop = 36,
    Nametoolong = 37,
    Netdown = 38,
    Netreset = 39,
    Netunreach = 40,
    Nfile = 41,
    Nobufs = 42,
    Nodev = 43,
    Noent = 44,
    Noexec = 45,
    Nolck = 46,
    Nolink = 47,
    Nomem = 48,
    Nomsg = 49,
    Noprotoopt = 50,
    Nospc = 51,
    Nosys = 52,
    Notconn = 53,
    Notdir = 54,
    Notempty = 55,
    Notrecoverable = 56,
    Notsock = 57,
    Notsup = 58,
    Notty = 59,
    Nxio = 60,
    Overflow = 61,
    Ownerdead = 62,
    Perm = 63,
    Pipe = 64,
    Proto = 65,
    Protonosupport = 66,
    Prototype = 67,
    Range = 68,
    Rofs = 69,
    Spipe = 70,
    Srch = 71,
    Stale = 72,
    Timedout = 73,
    Txtbsy = 74,
    Xdev = 75,
    Notcapable = 76,
}

impl Errno {
    pub fn raw(self) -> u16 {
        self as u16
    }

    /// Short strerror-style text for the errnos user-facing code prints.
    pub fn message(self) -> &'static str {
        match self {
            Errno::Success => "success",
            Errno::Acces => "permission denied",
            Errno::Badf => "bad file descriptor",
            Errno::Exist => "file exists",
            Errno::Inval => "invalid argument",
            Errno::Isdir => "is a directory",
            Errno::Loop => "too many levels of symbolic links",
            Errno::Noent => "no such file or directory",
            Errno::Nospc => "no space left on device",
            Errno::Nosys => "function not implemented",
            Errno::Notdir => "not a directory",
            Errno::Notempty => "directory not empty",
            Errno::Pipe => "broken pipe",
            Errno::Rofs => "read-only file system",
            Errno::Spipe => "invalid seek",
            Errno::Xdev => "cross-device link",
            _ => "i/o error",
        }
    }
}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Errno::Noent,
            FsError::AlreadyExists => Errno::Exist,
            FsError::NotDir => Errno::Notdir,
            FsError::IsDir => Errno::Isdir,
            FsError::NotEmpty => Errno::Notempty,
            FsError::NoSpace => Errno::Nospc,
            FsError::ReadOnly => Errno::Rofs,
            FsError::PermissionDenied => Errno::Acces,
            FsError::TooManyLinks => Errno::Loop,
            FsError::InvalidInput => Errno::Inval,
            FsError::CrossDevice => Errno::Xdev,
            FsError::NotSupported => Errno::Notsup,
        }
    }
}

/// WASI file type byte, as stored in filestat and dirent records.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Filetype {
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

impl From<NodeKind> for Filetype {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => Filetype::RegularFile,
            NodeKind::Dir => Filetype::Directory,
            NodeKind::Symlink => Filetype::SymbolicLink,
        }
    }
}

/// `fd_seek` whence values.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl Whence {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Set),
            1 => Some(Self::Cur),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

/// `clock_time_get` clock ids. Both supported clocks report host epoch
/// nanoseconds.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Clockid {
    Realtime = 0,
    Monotonic = 1,
}

impl Clockid {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Realtime),
            1 => Some(Self::Monotonic),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// `path_open` oflags.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct OFlags: u16 {
        const CREAT = 1 << 0;
        const DIRECTORY = 1 << 1;
        const EXCL = 1 << 2;
        const TRUNC = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Per-fd status flags.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FdFlags: u16 {
        const APPEND = 1 << 0;
        const DSYNC = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC = 1 << 3;
        const SYNC = 1 << 4;
    }
}

bitflags::bitflags! {
    /// `path_*` lookup flags.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LookupFlags: u32 {
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Fd rights. Recorded so `fd_fdstat_get` can answer; never enforced
    /// beyond the read/write split the open mode already implies.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Rights: u64 {
        const FD_READ = 1 << 1;
        const FD_SEEK = 1 << 2;
        const FD_TELL = 1 << 5;
        const FD_WRITE = 1 << 6;
        const PATH_OPEN = 1 << 13;
        const FD_READDIR = 1 << 14;
    }
}

/// Size of one packed filestat record.
pub const FILESTAT_SIZE: u32 = 64;
/// Size of the fixed dirent header preceding each name.
pub const DIRENT_HEADER_SIZE: u32 = 24;
/// Size of a packed prestat record.
pub const PRESTAT_SIZE: u32 = 8;

/// The exit paths out of a guest: a voluntary `proc_exit`, the shared
/// deadline expiring, or an explicit cancellation. Raised as a typed
/// value from syscalls and caught at the top of `_start`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExitSignal {
    Exit(i32),
    Timeout,
    Cancelled,
}

impl ExitSignal {
    /// POSIX-convention exit code: 124 for timeout, 125 for cancellation.
    pub fn code(self) -> i32 {
        match self {
            Self::Exit(code) => code,
            Self::Timeout => 124,
            Self::Cancelled => 125,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_wire_values_match_the_snapshot() {
        assert_eq!(Errno::Success.raw(), 0);
        assert_eq!(Errno::Badf.raw(), 8);
        assert_eq!(Errno::Noent.raw(), 44);
        assert_eq!(Errno::Nospc.raw(), 51);
        assert_eq!(Errno::Nosys.raw(), 52);
        assert_eq!(Errno::Rofs.raw(), 69);
        assert_eq!(Errno::Notcapable.raw(), 76);
    }

    #[test]
    fn fs_errors_map_onto_wasi_errnos() {
        assert_eq!(Errno::from(FsError::NotFound), Errno::Noent);
        assert_eq!(Errno::from(FsError::ReadOnly), Errno::Rofs);
        assert_eq!(Errno::from(FsError::NoSpace), Errno::Nospc);
        assert_eq!(Errno::from(FsError::CrossDevice), Errno::Xdev);
    }

    #[test]
    fn exit_signal_codes_follow_posix() {
        assert_eq!(ExitSignal::Exit(3).code(), 3);
        assert_eq!(ExitSignal::Timeout.code(), 124);
        assert_eq!(ExitSignal::Cancelled.code(), 125);
    }
}
