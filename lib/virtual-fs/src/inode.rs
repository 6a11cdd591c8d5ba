use std::collections::BTreeMap;

use bytes::Bytes;

/// Default mode bits for files created by guests.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default mode bits for directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// The kind of a filesystem node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
    Symlink,
}

/// Timestamps and mode bits carried by every inode.
///
/// Mode bits are recorded and reported but never enforced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub mode: u32,
    /// Access time, epoch nanoseconds.
    pub atime: u64,
    /// Modification time, epoch nanoseconds.
    pub mtime: u64,
    /// Status-change time, epoch nanoseconds.
    pub ctime: u64,
}

impl Metadata {
    pub fn new(mode: u32, now: u64) -> Self {
        Self {
            mode,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

/// A regular file. Content is an immutable [`Bytes`] buffer that is
/// replaced wholesale on every write; snapshots rely on this to share
/// payloads between clones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNode {
    pub content: Bytes,
    pub meta: Metadata,
}

/// A directory. Children are keyed by name; names are non-empty, contain
/// no `/`, and are never `.` or `..`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirNode {
    pub children: BTreeMap<String, Inode>,
    pub meta: Metadata,
}

/// A symbolic link. The target string is interpreted against the
/// filesystem root at resolution time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymlinkNode {
    pub target: String,
    pub meta: Metadata,
}

/// A node in the inode tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inode {
    File(FileNode),
    Dir(DirNode),
    Symlink(SymlinkNode),
}

impl Inode {
    pub fn file(content: impl Into<Bytes>, mode: u32, now: u64) -> Self {
        Self::File(FileNode {
            content: content.into(),
            meta: Metadata::new(mode, now),
        })
    }

    pub fn dir(mode: u32, now: u64) -> Self {
        Self::Dir(DirNode {
            children: BTreeMap::new(),
            meta: Metadata::new(mode, now),
        })
    }

    pub fn symlink(target: impl Into<String>, now: u64) -> Self {
        Self::Symlink(SymlinkNode {
            target: target.into(),
            meta: Metadata::new(0o777, now),
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::File(_) => NodeKind::File,
            Self::Dir(_) => NodeKind::Dir,
            Self::Symlink(_) => NodeKind::Symlink,
        }
    }

    pub fn meta(&self) -> &Metadata {
        match self {
            Self::File(f) => &f.meta,
            Self::Dir(d) => &d.meta,
            Self::Symlink(s) => &s.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Metadata {
        match self {
            Self::File(f) => &mut f.meta,
            Self::Dir(d) => &mut d.meta,
            Self::Symlink(s) => &mut s.meta,
        }
    }

    /// Content length for files, zero for everything else.
    pub fn size(&self) -> u64 {
        match self {
            Self::File(f) => f.content.len() as u64,
            _ => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Self::Dir(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut DirNode> {
        match self {
            Self::Dir(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    /// Walks the subtree counting non-root inodes and file bytes.
    /// Used to rebuild the live counters after a snapshot restore.
    pub fn subtree_totals(&self) -> (u64, u64) {
        let mut files = 0u64;
        let mut bytes = 0u64;
        if let Self::Dir(d) = self {
            for child in d.children.values() {
                let (f, b) = child.subtree_totals();
                files += 1 + f;
                bytes += child.size() + b;
            }
        }
        (files, bytes)
    }
}

/// Stat information reported for a node, real or synthesized by a
/// virtual provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub kind: NodeKind,
    pub size: u64,
    pub mode: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl FileStat {
    pub fn of(node: &Inode) -> Self {
        let meta = node.meta();
        Self {
            kind: node.kind(),
            size: node.size(),
            mode: meta.mode,
            atime: meta.atime,
            mtime: meta.mtime,
            ctime: meta.ctime,
        }
    }
}

/// One entry returned by `readdir`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
}
