use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    path, DirEntry, FileStat, FsError, FsResult, Inode, NodeKind, VirtualProvider,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};

/// Bound on symlink indirections during path resolution.
pub const SYMLINK_DEPTH_LIMIT: u32 = 40;

/// Identifier returned by [`Vfs::snapshot`].
pub type SnapshotId = u64;

type ChangeHook = Box<dyn Fn(&str) + Send + Sync>;

struct Mount {
    path: String,
    provider: Box<dyn VirtualProvider>,
}

struct Snapshot {
    root: Inode,
    file_count: u64,
    total_bytes: u64,
}

/// The in-memory filesystem.
///
/// Owns the root inode exclusively. All mutations funnel through the same
/// sequence: virtual-provider dispatch, writable-prefix policy, quota,
/// then the tree edit itself. File content is replaced wholesale on every
/// write so that snapshot clones can share payload buffers.
pub struct Vfs {
    root: Inode,
    writable_prefixes: Vec<String>,
    fs_limit_bytes: Option<u64>,
    file_count_limit: Option<u64>,
    file_count: u64,
    total_bytes: u64,
    snapshots: HashMap<SnapshotId, Snapshot>,
    next_snapshot_id: SnapshotId,
    mounts: Vec<Mount>,
    on_change: Option<ChangeHook>,
}

impl Vfs {
    /// An empty filesystem: a bare root directory, the default writable
    /// prefixes and no quota.
    pub fn new() -> Self {
        Self {
            root: Inode::dir(DEFAULT_DIR_MODE, crate::now_nanos()),
            writable_prefixes: vec!["/home/user".to_string(), "/tmp".to_string()],
            fs_limit_bytes: None,
            file_count_limit: None,
            file_count: 0,
            total_bytes: 0,
            snapshots: HashMap::new(),
            next_snapshot_id: 1,
            mounts: Vec::new(),
            on_change: None,
        }
    }

    /// The sandbox default: standard directory layout plus `/dev` and
    /// `/proc` providers.
    pub fn with_standard_layout() -> Self {
        let mut vfs = Self::new();
        for dir in ["/home", "/home/user", "/tmp", "/bin", "/usr", "/usr/bin", "/mnt"] {
            vfs.host_mkdirp(dir).expect("static layout paths are valid");
        }
        vfs.mount("/dev", Box::new(crate::DevProvider));
        vfs.mount("/proc", Box::new(crate::ProcProvider::new(crate::now_nanos())));
        vfs
    }

    pub fn set_limits(&mut self, fs_limit_bytes: Option<u64>, file_count_limit: Option<u64>) {
        self.fs_limit_bytes = fs_limit_bytes;
        self.file_count_limit = file_count_limit;
    }

    pub fn set_writable_prefixes(&mut self, prefixes: Vec<String>) {
        self.writable_prefixes = prefixes;
    }

    pub fn writable_prefixes(&self) -> &[String] {
        &self.writable_prefixes
    }

    /// Installs a callback fired with the affected path after every
    /// successful mutation.
    pub fn set_on_change(&mut self, hook: ChangeHook) {
        self.on_change = Some(hook);
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Mounts a virtual provider, creating the mount directory if needed.
    pub fn mount(&mut self, mount_path: &str, provider: Box<dyn VirtualProvider>) {
        let mount_path = path::normalize(mount_path).expect("mount paths are absolute");
        if self.stat(&mount_path).is_err() {
            self.host_mkdirp(&mount_path).expect("mount parent exists");
        }
        self.mounts.push(Mount {
            path: mount_path,
            provider,
        });
    }

    fn mount_index(&self, norm: &str) -> Option<(usize, String)> {
        self.mounts.iter().position(|m| path::is_within(&m.path, norm)).map(|idx| {
            let rel = norm[self.mounts[idx].path.len()..]
                .trim_start_matches('/')
                .to_string();
            (idx, rel)
        })
    }

    fn notify(&self, p: &str) {
        if let Some(hook) = &self.on_change {
            hook(p);
        }
    }

    // ---- resolution -------------------------------------------------------

    /// Resolves a normalized absolute path to its canonical, symlink-free
    /// form. Every intermediate symlink is followed; the leaf only when
    /// `follow_leaf` is set.
    fn canonicalize(&self, norm: &str, follow_leaf: bool, depth: u32) -> FsResult<String> {
        let segs = path::segments(norm)?;
        let mut node = &self.root;
        let mut cur = String::new();
        for (i, seg) in segs.iter().enumerate() {
            let dir = node.as_dir().ok_or(FsError::NotDir)?;
            let child = dir.children.get(seg).ok_or(FsError::NotFound)?;
            let is_leaf = i + 1 == segs.len();
            if let Inode::Symlink(link) = child {
                if !is_leaf || follow_leaf {
                    if depth + 1 > SYMLINK_DEPTH_LIMIT {
                        return Err(FsError::TooManyLinks);
                    }
                    let base = if link.target.starts_with('/') {
                        link.target.clone()
                    } else {
                        format!("{}/{}", cur, link.target)
                    };
                    let rest = segs[i + 1..].join("/");
                    let full = if rest.is_empty() {
                        path::normalize(&base)?
                    } else {
                        path::normalize(&format!("{}/{}", base, rest))?
                    };
                    return self.canonicalize(&full, follow_leaf, depth + 1);
                }
            }
            cur.push('/');
            cur.push_str(seg);
            node = child;
        }
        Ok(if cur.is_empty() { "/".to_string() } else { cur })
    }

    /// Borrow the node at a canonical (symlink-free) path.
    fn node_at(&self, canonical: &str) -> FsResult<&Inode> {
        let mut node = &self.root;
        for seg in path::segments(canonical)? {
            node = node
                .as_dir()
                .ok_or(FsError::NotDir)?
                .children
                .get(&seg)
                .ok_or(FsError::NotFound)?;
        }
        Ok(node)
    }

    fn node_at_mut(&mut self, canonical: &str) -> FsResult<&mut Inode> {
        let mut node = &mut self.root;
        for seg in path::segments(canonical)? {
            node = node
                .as_dir_mut()
                .ok_or(FsError::NotDir)?
                .children
                .get_mut(&seg)
                .ok_or(FsError::NotFound)?;
        }
        Ok(node)
    }

    /// Canonical parent directory plus leaf name for a mutation target.
    ///
    /// Fails with `AlreadyExists` when asked for the parent of the root,
    /// `NotFound`/`NotDir` when an intermediate segment is missing or not
    /// a directory.
    fn locate_parent(&self, norm: &str) -> FsResult<(String, String)> {
        if norm == "/" {
            return Err(FsError::AlreadyExists);
        }
        let canon_parent = self.canonicalize(path::parent(norm), true, 0)?;
        if !self.node_at(&canon_parent)?.is_dir() {
            return Err(FsError::NotDir);
        }
        Ok((canon_parent, path::file_name(norm).to_string()))
    }

    fn child_path(parent: &str, leaf: &str) -> String {
        if parent == "/" {
            format!("/{leaf}")
        } else {
            format!("{parent}/{leaf}")
        }
    }

    // ---- policy & quota ---------------------------------------------------

    fn check_writable(&self, norm: &str) -> FsResult<()> {
        if self
            .writable_prefixes
            .iter()
            .any(|p| path::is_within(p, norm))
        {
            Ok(())
        } else {
            trace!(path = norm, "write outside writable prefixes");
            Err(FsError::ReadOnly)
        }
    }

    fn check_byte_growth(&self, grow: u64) -> FsResult<()> {
        if let Some(limit) = self.fs_limit_bytes {
            if self.total_bytes + grow > limit {
                return Err(FsError::NoSpace);
            }
        }
        Ok(())
    }

    fn check_file_slot(&self) -> FsResult<()> {
        if let Some(limit) = self.file_count_limit {
            if self.file_count >= limit {
                return Err(FsError::NoSpace);
            }
        }
        Ok(())
    }

    // ---- read operations --------------------------------------------------

    pub fn stat(&self, p: &str) -> FsResult<FileStat> {
        let norm = path::normalize(p)?;
        if let Some((idx, rel)) = self.mount_index(&norm) {
            return self.mounts[idx].provider.stat(&rel);
        }
        let canonical = self.canonicalize(&norm, true, 0)?;
        Ok(FileStat::of(self.node_at(&canonical)?))
    }

    pub fn lstat(&self, p: &str) -> FsResult<FileStat> {
        let norm = path::normalize(p)?;
        if let Some((idx, rel)) = self.mount_index(&norm) {
            return self.mounts[idx].provider.stat(&rel);
        }
        let canonical = self.canonicalize(&norm, false, 0)?;
        Ok(FileStat::of(self.node_at(&canonical)?))
    }

    pub fn exists(&self, p: &str) -> bool {
        self.stat(p).is_ok()
    }

    pub fn is_dir(&self, p: &str) -> bool {
        self.stat(p).map(|s| s.kind == NodeKind::Dir).unwrap_or(false)
    }

    /// Reads a whole file. Updates atime.
    pub fn read_file(&mut self, p: &str) -> FsResult<Bytes> {
        let norm = path::normalize(p)?;
        if let Some((idx, rel)) = self.mount_index(&norm) {
            return self.mounts[idx].provider.read_file(&rel);
        }
        let canonical = self.canonicalize(&norm, true, 0)?;
        let now = crate::now_nanos();
        match self.node_at_mut(&canonical)? {
            Inode::File(f) => {
                f.meta.atime = now;
                Ok(f.content.clone())
            }
            Inode::Dir(_) => Err(FsError::IsDir),
            Inode::Symlink(_) => Err(FsError::NotFound),
        }
    }

    pub fn readlink(&self, p: &str) -> FsResult<String> {
        let norm = path::normalize(p)?;
        let canonical = self.canonicalize(&norm, false, 0)?;
        match self.node_at(&canonical)? {
            Inode::Symlink(s) => Ok(s.target.clone()),
            _ => Err(FsError::InvalidInput),
        }
    }

    /// Lists a directory in name order. Updates atime.
    pub fn readdir(&mut self, p: &str) -> FsResult<Vec<DirEntry>> {
        let norm = path::normalize(p)?;
        if let Some((idx, rel)) = self.mount_index(&norm) {
            return self.mounts[idx].provider.readdir(&rel);
        }
        let canonical = self.canonicalize(&norm, true, 0)?;
        let now = crate::now_nanos();
        match self.node_at_mut(&canonical)? {
            Inode::Dir(d) => {
                d.meta.atime = now;
                Ok(d.children
                    .iter()
                    .map(|(name, node)| DirEntry {
                        name: name.clone(),
                        kind: node.kind(),
                        size: node.size(),
                    })
                    .collect())
            }
            _ => Err(FsError::NotDir),
        }
    }

    // ---- mutations --------------------------------------------------------

    /// Writes a whole file, creating it if needed. The previous content
    /// buffer is dropped, never edited in place.
    pub fn write_file(&mut self, p: &str, data: impl Into<Bytes>) -> FsResult<()> {
        self.write_file_inner(p, data.into(), true)
    }

    /// Policy-exempt write used by the runtime to provision the image.
    /// Quota limits are skipped; the counters still track the result.
    pub fn host_write_file(&mut self, p: &str, data: impl Into<Bytes>) -> FsResult<()> {
        self.write_file_inner(p, data.into(), false)
    }

    fn write_file_inner(&mut self, p: &str, data: Bytes, enforce: bool) -> FsResult<()> {
        let norm = path::normalize(p)?;
        if let Some((idx, rel)) = self.mount_index(&norm) {
            self.mounts[idx].provider.write_file(&rel, &data)?;
            self.notify(&norm);
            return Ok(());
        }
        if enforce {
            self.check_writable(&norm)?;
        }
        let now = crate::now_nanos();
        match self.canonicalize(&norm, true, 0) {
            Ok(canonical) => {
                let old_len = match self.node_at(&canonical)? {
                    Inode::File(f) => f.content.len() as u64,
                    Inode::Dir(_) => return Err(FsError::IsDir),
                    Inode::Symlink(_) => return Err(FsError::NotFound),
                };
                let new_len = data.len() as u64;
                if enforce && new_len > old_len {
                    self.check_byte_growth(new_len - old_len)?;
                }
                if let Inode::File(f) = self.node_at_mut(&canonical)? {
                    f.content = data;
                    f.meta.mtime = now;
                    f.meta.ctime = now;
                }
                self.total_bytes = self.total_bytes - old_len + new_len;
                trace!(path = %canonical, bytes = new_len, "write_file");
                self.notify(&canonical);
                Ok(())
            }
            Err(FsError::NotFound) => {
                let (parent, leaf) = self.locate_parent(&norm)?;
                let parent_dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
                if parent_dir.children.contains_key(&leaf) {
                    // A dangling symlink leaf: refuse rather than create
                    // the missing target.
                    return Err(FsError::NotFound);
                }
                if enforce {
                    self.check_file_slot()?;
                    self.check_byte_growth(data.len() as u64)?;
                }
                let new_len = data.len() as u64;
                let target = Self::child_path(&parent, &leaf);
                let dir = self
                    .node_at_mut(&parent)?
                    .as_dir_mut()
                    .ok_or(FsError::NotDir)?;
                dir.children
                    .insert(leaf, Inode::file(data, DEFAULT_FILE_MODE, now));
                dir.meta.mtime = now;
                dir.meta.ctime = now;
                self.file_count += 1;
                self.total_bytes += new_len;
                trace!(path = %target, bytes = new_len, "create file");
                self.notify(&target);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Appends by reading, concatenating and replacing wholesale.
    pub fn append_file(&mut self, p: &str, data: &[u8]) -> FsResult<()> {
        let existing = match self.read_file(p) {
            Ok(content) => content,
            Err(FsError::NotFound) => Bytes::new(),
            Err(e) => return Err(e),
        };
        let mut combined = Vec::with_capacity(existing.len() + data.len());
        combined.extend_from_slice(&existing);
        combined.extend_from_slice(data);
        self.write_file(p, combined)
    }

    pub fn mkdir(&mut self, p: &str) -> FsResult<()> {
        self.mkdir_inner(p, true)
    }

    fn mkdir_inner(&mut self, p: &str, enforce: bool) -> FsResult<()> {
        let norm = path::normalize(p)?;
        if self.mount_index(&norm).is_some() {
            return Err(FsError::NotSupported);
        }
        if enforce {
            self.check_writable(&norm)?;
        }
        let (parent, leaf) = self.locate_parent(&norm)?;
        let dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
        if dir.children.contains_key(&leaf) {
            return Err(FsError::AlreadyExists);
        }
        if enforce {
            self.check_file_slot()?;
        }
        let now = crate::now_nanos();
        let target = Self::child_path(&parent, &leaf);
        let dir = self
            .node_at_mut(&parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.insert(leaf, Inode::dir(DEFAULT_DIR_MODE, now));
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        self.file_count += 1;
        self.notify(&target);
        Ok(())
    }

    /// `mkdir -p`: creates every missing ancestor, tolerates existing dirs.
    pub fn mkdirp(&mut self, p: &str) -> FsResult<()> {
        self.mkdirp_inner(p, true)
    }

    /// Policy-exempt variant used to provision the image.
    pub fn host_mkdirp(&mut self, p: &str) -> FsResult<()> {
        self.mkdirp_inner(p, false)
    }

    fn mkdirp_inner(&mut self, p: &str, enforce: bool) -> FsResult<()> {
        let norm = path::normalize(p)?;
        let segs = path::segments(&norm)?;
        let mut cur = String::new();
        for seg in segs {
            cur.push('/');
            cur.push_str(&seg);
            match self.stat(&cur) {
                Ok(stat) if stat.kind == NodeKind::Dir => {}
                Ok(_) => return Err(FsError::NotDir),
                Err(FsError::NotFound) => self.mkdir_inner(&cur, enforce)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, p: &str) -> FsResult<()> {
        let norm = path::normalize(p)?;
        if self.mount_index(&norm).is_some() {
            return Err(FsError::NotSupported);
        }
        self.check_writable(&norm)?;
        let canonical = self.canonicalize(&norm, false, 0)?;
        let (parent, leaf) = self.locate_parent(&canonical)?;
        let dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
        match dir.children.get(&leaf) {
            Some(Inode::Dir(d)) if d.children.is_empty() => {}
            Some(Inode::Dir(_)) => return Err(FsError::NotEmpty),
            Some(_) => return Err(FsError::NotDir),
            None => return Err(FsError::NotFound),
        }
        let now = crate::now_nanos();
        let dir = self
            .node_at_mut(&parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.remove(&leaf);
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        self.file_count -= 1;
        self.notify(&canonical);
        Ok(())
    }

    /// Removes a file or symlink. The leaf is not followed.
    pub fn unlink(&mut self, p: &str) -> FsResult<()> {
        let norm = path::normalize(p)?;
        if self.mount_index(&norm).is_some() {
            return Err(FsError::NotSupported);
        }
        self.check_writable(&norm)?;
        let canonical = self.canonicalize(&norm, false, 0)?;
        let (parent, leaf) = self.locate_parent(&canonical)?;
        let dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
        let removed_bytes = match dir.children.get(&leaf) {
            Some(Inode::Dir(_)) => return Err(FsError::IsDir),
            Some(node) => node.size(),
            None => return Err(FsError::NotFound),
        };
        let now = crate::now_nanos();
        let dir = self
            .node_at_mut(&parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.remove(&leaf);
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        self.file_count -= 1;
        self.total_bytes -= removed_bytes;
        self.notify(&canonical);
        Ok(())
    }

    /// Recursive removal (`rm -r`). Works on files too.
    pub fn remove_all(&mut self, p: &str) -> FsResult<()> {
        let norm = path::normalize(p)?;
        if self.mount_index(&norm).is_some() {
            return Err(FsError::NotSupported);
        }
        self.check_writable(&norm)?;
        let canonical = self.canonicalize(&norm, false, 0)?;
        let (parent, leaf) = self.locate_parent(&canonical)?;
        let dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
        let node = dir.children.get(&leaf).ok_or(FsError::NotFound)?;
        let (sub_files, sub_bytes) = node.subtree_totals();
        let own_bytes = node.size();
        let now = crate::now_nanos();
        let dir = self
            .node_at_mut(&parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.remove(&leaf);
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        self.file_count -= 1 + sub_files;
        self.total_bytes -= own_bytes + sub_bytes;
        self.notify(&canonical);
        Ok(())
    }

    /// Renames within the tree, preserving the inode. Renames that touch
    /// a provider mount are rejected.
    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        let from_norm = path::normalize(from)?;
        let to_norm = path::normalize(to)?;
        if self.mount_index(&from_norm).is_some() || self.mount_index(&to_norm).is_some() {
            return Err(FsError::CrossDevice);
        }
        self.check_writable(&from_norm)?;
        self.check_writable(&to_norm)?;

        let from_canon = self.canonicalize(&from_norm, false, 0)?;
        let (from_parent, from_leaf) = self.locate_parent(&from_canon)?;
        let (to_parent, to_leaf) = self.locate_parent(&to_norm)?;
        if from_parent == to_parent && from_leaf == to_leaf {
            return Ok(());
        }
        let moving_dir = self
            .node_at(&from_parent)?
            .as_dir()
            .ok_or(FsError::NotDir)?
            .children
            .get(&from_leaf)
            .ok_or(FsError::NotFound)?
            .is_dir();
        // Refuse to move a directory into itself.
        let from_full = Self::child_path(&from_parent, &from_leaf);
        if path::is_within(&from_full, &Self::child_path(&to_parent, &to_leaf)) {
            return Err(FsError::InvalidInput);
        }

        // Check what the destination holds before detaching the source.
        let mut replaced: Option<(u64, u64, u64)> = None; // (files, bytes, own)
        if let Some(dest) = self
            .node_at(&to_parent)?
            .as_dir()
            .ok_or(FsError::NotDir)?
            .children
            .get(&to_leaf)
        {
            match dest {
                Inode::Dir(d) => {
                    if !moving_dir {
                        return Err(FsError::IsDir);
                    }
                    if !d.children.is_empty() {
                        return Err(FsError::NotEmpty);
                    }
                    replaced = Some((0, 0, 0));
                }
                node => {
                    let (f, b) = node.subtree_totals();
                    replaced = Some((f, b, node.size()));
                }
            }
        }

        let now = crate::now_nanos();
        let node = {
            let dir = self
                .node_at_mut(&from_parent)?
                .as_dir_mut()
                .ok_or(FsError::NotDir)?;
            let node = dir.children.remove(&from_leaf).ok_or(FsError::NotFound)?;
            dir.meta.mtime = now;
            dir.meta.ctime = now;
            node
        };
        let target = Self::child_path(&to_parent, &to_leaf);
        let dir = self
            .node_at_mut(&to_parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.insert(to_leaf, node);
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        if let Some((files, bytes, own)) = replaced {
            self.file_count -= 1 + files;
            self.total_bytes -= own + bytes;
        }
        self.notify(&from_canon);
        self.notify(&target);
        Ok(())
    }

    pub fn symlink(&mut self, target: &str, linkpath: &str) -> FsResult<()> {
        let norm = path::normalize(linkpath)?;
        if self.mount_index(&norm).is_some() {
            return Err(FsError::NotSupported);
        }
        self.check_writable(&norm)?;
        let (parent, leaf) = self.locate_parent(&norm)?;
        let dir = self.node_at(&parent)?.as_dir().ok_or(FsError::NotDir)?;
        if dir.children.contains_key(&leaf) {
            return Err(FsError::AlreadyExists);
        }
        self.check_file_slot()?;
        let now = crate::now_nanos();
        let target_path = Self::child_path(&parent, &leaf);
        let dir = self
            .node_at_mut(&parent)?
            .as_dir_mut()
            .ok_or(FsError::NotDir)?;
        dir.children.insert(leaf, Inode::symlink(target, now));
        dir.meta.mtime = now;
        dir.meta.ctime = now;
        self.file_count += 1;
        self.notify(&target_path);
        Ok(())
    }

    /// Records mode bits. Follows the leaf like `chmod`.
    pub fn set_mode(&mut self, p: &str, mode: u32) -> FsResult<()> {
        let norm = path::normalize(p)?;
        self.check_writable(&norm)?;
        self.set_mode_inner(&norm, mode)
    }

    /// Policy-exempt mode change used when provisioning the image.
    pub fn host_set_mode(&mut self, p: &str, mode: u32) -> FsResult<()> {
        let norm = path::normalize(p)?;
        self.set_mode_inner(&norm, mode)
    }

    fn set_mode_inner(&mut self, norm: &str, mode: u32) -> FsResult<()> {
        if self.mount_index(norm).is_some() {
            return Err(FsError::NotSupported);
        }
        let canonical = self.canonicalize(&norm, true, 0)?;
        let now = crate::now_nanos();
        let meta = self.node_at_mut(&canonical)?.meta_mut();
        meta.mode = mode;
        meta.ctime = now;
        self.notify(&canonical);
        Ok(())
    }

    /// Creates an empty file or refreshes timestamps on an existing one.
    pub fn touch(&mut self, p: &str) -> FsResult<()> {
        let norm = path::normalize(p)?;
        match self.canonicalize(&norm, true, 0) {
            Ok(canonical) => {
                self.check_writable(&norm)?;
                let now = crate::now_nanos();
                let meta = self.node_at_mut(&canonical)?.meta_mut();
                meta.atime = now;
                meta.mtime = now;
                self.notify(&canonical);
                Ok(())
            }
            Err(FsError::NotFound) => self.write_file(&norm, Bytes::new()),
            Err(e) => Err(e),
        }
    }

    // ---- snapshots --------------------------------------------------------

    /// Deep-clones the root (child maps copied, file payloads shared) and
    /// stores it under a fresh id.
    pub fn snapshot(&mut self) -> SnapshotId {
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.snapshots.insert(
            id,
            Snapshot {
                root: self.root.clone(),
                file_count: self.file_count,
                total_bytes: self.total_bytes,
            },
        );
        debug!(id, "vfs snapshot");
        id
    }

    /// Replaces the live tree with a clone of the saved one. The snapshot
    /// stays valid, so restores are repeatable.
    pub fn restore(&mut self, id: SnapshotId) -> FsResult<()> {
        let snap = self.snapshots.get(&id).ok_or(FsError::NotFound)?;
        self.root = snap.root.clone();
        self.file_count = snap.file_count;
        self.total_bytes = snap.total_bytes;
        debug!(id, "vfs restore");
        Ok(())
    }

    pub fn discard_snapshot(&mut self, id: SnapshotId) -> bool {
        self.snapshots.remove(&id).is_some()
    }

    /// A copy-on-write clone: independent tree, shared file payloads,
    /// freshly constructed providers, no snapshots carried over.
    pub fn fork(&self) -> Vfs {
        Vfs {
            root: self.root.clone(),
            writable_prefixes: self.writable_prefixes.clone(),
            fs_limit_bytes: self.fs_limit_bytes,
            file_count_limit: self.file_count_limit,
            file_count: self.file_count,
            total_bytes: self.total_bytes,
            snapshots: HashMap::new(),
            next_snapshot_id: 1,
            mounts: self
                .mounts
                .iter()
                .map(|m| Mount {
                    path: m.path.clone(),
                    provider: m.provider.fork(),
                })
                .collect(),
            on_change: None,
        }
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn writable() -> Vfs {
        let mut vfs = Vfs::new();
        vfs.host_mkdirp("/home/user").unwrap();
        vfs.host_mkdirp("/tmp").unwrap();
        vfs
    }

    fn totals(vfs: &Vfs) -> (u64, u64) {
        (vfs.file_count(), vfs.total_bytes())
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut vfs = writable();
        vfs.write_file("/home/user/a.txt", &b"hello"[..]).unwrap();
        assert_eq!(&vfs.read_file("/home/user/a.txt").unwrap()[..], b"hello");
    }

    #[test]
    fn counters_track_non_root_inodes_and_file_bytes() {
        let mut vfs = writable();
        let base = totals(&vfs);
        vfs.write_file("/home/user/a.txt", &b"12345"[..]).unwrap();
        vfs.mkdir("/home/user/d").unwrap();
        vfs.write_file("/home/user/d/b.txt", &b"xy"[..]).unwrap();
        assert_eq!(totals(&vfs), (base.0 + 3, base.1 + 7));

        // The live counters must agree with a full walk of the tree.
        assert_eq!(totals(&vfs), vfs.root.subtree_totals());

        vfs.remove_all("/home/user/d").unwrap();
        assert_eq!(totals(&vfs), (base.0 + 1, base.1 + 5));
    }

    #[test]
    fn writes_outside_prefixes_fail_and_leave_tree_unchanged() {
        let mut vfs = writable();
        vfs.host_mkdirp("/etc").unwrap();
        let before = totals(&vfs);
        assert_eq!(
            vfs.write_file("/etc/passwd", &b"root"[..]),
            Err(FsError::ReadOnly)
        );
        assert_eq!(totals(&vfs), before);
        assert!(!vfs.exists("/etc/passwd"));
    }

    #[test]
    fn byte_quota_rejects_growth_and_preserves_totals() {
        let mut vfs = writable();
        vfs.set_limits(Some(500), None);
        let before = totals(&vfs);
        assert_eq!(
            vfs.write_file("/home/user/big.txt", vec![0u8; 1000]),
            Err(FsError::NoSpace)
        );
        assert_eq!(totals(&vfs), before);

        // Shrinking an existing file is always allowed.
        vfs.write_file("/home/user/ok.txt", vec![1u8; 400]).unwrap();
        vfs.write_file("/home/user/ok.txt", vec![1u8; 100]).unwrap();
        assert_eq!(vfs.total_bytes(), before.1 + 100);
    }

    #[test]
    fn file_count_quota_applies_to_new_nodes() {
        let mut vfs = writable();
        let base = vfs.file_count();
        vfs.set_limits(None, Some(base + 2));
        vfs.write_file("/home/user/1", &b"x"[..]).unwrap();
        vfs.mkdir("/home/user/d").unwrap();
        assert_eq!(vfs.write_file("/home/user/2", &b"x"[..]), Err(FsError::NoSpace));
        assert_eq!(vfs.mkdir("/home/user/d2"), Err(FsError::NoSpace));
        assert_eq!(vfs.symlink("/tmp", "/home/user/l"), Err(FsError::NoSpace));
        // Rewriting an existing file needs no new slot.
        vfs.write_file("/home/user/1", &b"yy"[..]).unwrap();
    }

    #[test]
    fn snapshot_restore_reverts_mutations() {
        let mut vfs = writable();
        vfs.write_file("/home/user/keep.txt", &b"original"[..]).unwrap();
        let snap = vfs.snapshot();
        let before = totals(&vfs);

        vfs.write_file("/home/user/keep.txt", &b"clobbered!"[..]).unwrap();
        vfs.write_file("/home/user/new.txt", &b"junk"[..]).unwrap();
        vfs.remove_all("/home/user/keep.txt").ok();

        vfs.restore(snap).unwrap();
        assert_eq!(&vfs.read_file("/home/user/keep.txt").unwrap()[..], b"original");
        assert!(!vfs.exists("/home/user/new.txt"));
        assert_eq!(totals(&vfs), before);

        // Restore is repeatable.
        vfs.write_file("/home/user/again.txt", &b"x"[..]).unwrap();
        vfs.restore(snap).unwrap();
        assert!(!vfs.exists("/home/user/again.txt"));
    }

    #[test]
    fn fork_is_independent() {
        let mut vfs = Vfs::with_standard_layout();
        vfs.write_file("/home/user/a.txt", &b"one"[..]).unwrap();
        let mut forked = vfs.fork();
        forked.write_file("/home/user/a.txt", &b"two"[..]).unwrap();
        assert_eq!(&vfs.read_file("/home/user/a.txt").unwrap()[..], b"one");
        assert_eq!(&forked.read_file("/home/user/a.txt").unwrap()[..], b"two");
        // Forked provider still answers.
        assert!(forked.stat("/dev/null").is_ok());
    }

    #[test]
    fn symlinks_resolve_and_loops_are_bounded() {
        let mut vfs = writable();
        vfs.write_file("/home/user/real.txt", &b"data"[..]).unwrap();
        vfs.symlink("/home/user/real.txt", "/home/user/link").unwrap();
        assert_eq!(&vfs.read_file("/home/user/link").unwrap()[..], b"data");
        assert_eq!(vfs.lstat("/home/user/link").unwrap().kind, NodeKind::Symlink);
        assert_eq!(vfs.stat("/home/user/link").unwrap().kind, NodeKind::File);

        vfs.symlink("/home/user/b", "/home/user/a").unwrap();
        vfs.symlink("/home/user/a", "/home/user/b").unwrap();
        assert_eq!(vfs.read_file("/home/user/a"), Err(FsError::TooManyLinks));
    }

    #[test]
    fn relative_symlink_targets_resolve_against_their_directory() {
        let mut vfs = writable();
        vfs.mkdir("/home/user/d").unwrap();
        vfs.write_file("/home/user/d/real.txt", &b"rel"[..]).unwrap();
        vfs.symlink("real.txt", "/home/user/d/link").unwrap();
        assert_eq!(&vfs.read_file("/home/user/d/link").unwrap()[..], b"rel");
    }

    #[test]
    fn rename_preserves_content_and_replaces_files() {
        let mut vfs = writable();
        vfs.write_file("/home/user/a", &b"payload"[..]).unwrap();
        vfs.write_file("/home/user/b", &b"old"[..]).unwrap();
        let before = totals(&vfs);
        vfs.rename("/home/user/a", "/home/user/b").unwrap();
        assert!(!vfs.exists("/home/user/a"));
        assert_eq!(&vfs.read_file("/home/user/b").unwrap()[..], b"payload");
        assert_eq!(totals(&vfs), (before.0 - 1, before.1 - 3));
    }

    #[test]
    fn rename_into_provider_mount_is_rejected() {
        let mut vfs = Vfs::with_standard_layout();
        vfs.write_file("/home/user/a", &b"x"[..]).unwrap();
        assert_eq!(vfs.rename("/home/user/a", "/dev/a"), Err(FsError::CrossDevice));
    }

    #[test]
    fn rmdir_requires_empty() {
        let mut vfs = writable();
        vfs.mkdir("/home/user/d").unwrap();
        vfs.write_file("/home/user/d/f", &b"x"[..]).unwrap();
        assert_eq!(vfs.rmdir("/home/user/d"), Err(FsError::NotEmpty));
        vfs.unlink("/home/user/d/f").unwrap();
        vfs.rmdir("/home/user/d").unwrap();
        assert!(!vfs.exists("/home/user/d"));
    }

    #[test]
    fn readdir_is_sorted_and_providers_take_precedence() {
        let mut vfs = Vfs::with_standard_layout();
        vfs.write_file("/home/user/b", &b""[..]).unwrap();
        vfs.write_file("/home/user/a", &b""[..]).unwrap();
        let names: Vec<_> = vfs
            .readdir("/home/user")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        // The mount point itself shows up in the parent listing...
        let root: Vec<_> = vfs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert!(root.contains(&"dev".to_string()));
        // ...and the provider answers inside it.
        assert!(vfs.readdir("/dev").unwrap().iter().any(|e| e.name == "null"));
    }

    #[test]
    fn on_change_fires_for_mutations() {
        use std::sync::{Arc, Mutex};
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut vfs = writable();
        let sink = seen.clone();
        vfs.set_on_change(Box::new(move |p| sink.lock().unwrap().push(p.to_string())));
        vfs.write_file("/home/user/a", &b"x"[..]).unwrap();
        vfs.unlink("/home/user/a").unwrap();
        assert_eq!(&*seen.lock().unwrap(), &["/home/user/a", "/home/user/a"]);
    }

    #[test]
    fn parent_errors_are_distinguished() {
        let mut vfs = writable();
        assert_eq!(
            vfs.write_file("/home/user/missing/f", &b"x"[..]),
            Err(FsError::NotFound)
        );
        vfs.write_file("/home/user/file", &b"x"[..]).unwrap();
        assert_eq!(
            vfs.write_file("/home/user/file/f", &b"x"[..]),
            Err(FsError::NotDir)
        );
    }
}
