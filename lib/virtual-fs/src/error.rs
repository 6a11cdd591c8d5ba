use thiserror::Error;

/// Result alias used across the filesystem API.
pub type FsResult<T> = Result<T, FsError>;

/// Error type for filesystem operations.
///
/// Each variant corresponds to one POSIX errno; the WASI host maps them
/// onto the wire errno values, and shell builtins format them onto stderr.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// No such file or directory (ENOENT)
    #[error("no such file or directory")]
    NotFound,
    /// File or directory already exists (EEXIST)
    #[error("file or directory already exists")]
    AlreadyExists,
    /// A path component is not a directory (ENOTDIR)
    #[error("not a directory")]
    NotDir,
    /// The operation needs a file but got a directory (EISDIR)
    #[error("is a directory")]
    IsDir,
    /// Directory is not empty (ENOTEMPTY)
    #[error("directory is not empty")]
    NotEmpty,
    /// Byte or file-count quota exceeded (ENOSPC)
    #[error("no space left on device")]
    NoSpace,
    /// Path is outside every writable prefix (EROFS)
    #[error("read-only file system")]
    ReadOnly,
    /// Permission denied (EACCES)
    #[error("permission denied")]
    PermissionDenied,
    /// Too many levels of symbolic links (ELOOP)
    #[error("too many levels of symbolic links")]
    TooManyLinks,
    /// Invalid path or argument (EINVAL)
    #[error("invalid argument")]
    InvalidInput,
    /// Rename across provider mounts (EXDEV)
    #[error("cross-device link")]
    CrossDevice,
    /// The operation is not supported by this node or provider (ENOTSUP)
    #[error("operation not supported")]
    NotSupported,
}
