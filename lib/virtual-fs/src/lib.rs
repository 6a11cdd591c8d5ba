//! Wasmbox virtual filesystem.
//!
//! An inode-based in-memory filesystem with POSIX-ish semantics:
//! absolute-path resolution with bounded symlink following, a writable-path
//! policy, byte and file-count quotas, copy-on-write snapshots, and
//! pluggable virtual providers for synthetic subtrees such as `/dev` and
//! `/proc`.
//!
//! The one contract everything else leans on: file content is an immutable
//! [`bytes::Bytes`] buffer replaced wholesale on every write. Snapshots
//! deep-clone the directory structure while sharing those buffers, which
//! makes them cheap; mutating a buffer in place is therefore forbidden.

mod error;
mod inode;
pub mod path;
mod provider;
mod vfs;

pub use error::{FsError, FsResult};
pub use inode::{
    DirEntry, DirNode, FileNode, FileStat, Inode, Metadata, NodeKind, SymlinkNode,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};
pub use provider::{DevProvider, ProcProvider, VirtualProvider};
pub use vfs::{SnapshotId, Vfs, SYMLINK_DEPTH_LIMIT};

/// Host epoch time in nanoseconds.
pub fn now_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
