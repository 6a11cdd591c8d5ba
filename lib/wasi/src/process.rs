//! Contracts at the module-loader seam.
//!
//! The sandbox never instantiates WebAssembly itself; it asks a [`Tool`]
//! for a process future. An engine adapter implements `Tool` by
//! instantiating the registered module and bridging its WASI imports to
//! [`crate::WasiCtx`]; the built-in tool set implements it natively over
//! the same fd plumbing.

use std::sync::Arc;

use futures::future::LocalBoxFuture;

use crate::control::ExecControl;
use crate::fd::FdTable;
use crate::host::SharedVfs;

/// Everything a spawned process sees: argv (argv[0] is the program
/// name), environment, descriptor table with targets already planted,
/// the shared filesystem, working directory and control plane.
pub struct ProcessCtx {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub fds: FdTable,
    pub vfs: SharedVfs,
    pub cwd: String,
    pub control: ExecControl,
}

impl ProcessCtx {
    /// Joins a command-line path onto the working directory.
    pub fn absolute(&self, raw: &str) -> Result<String, wasmbox_vfs::FsError> {
        wasmbox_vfs::path::absolutize(&self.cwd, raw)
    }

    /// Reads from a descriptor, target- or inode-backed. May suspend on
    /// a pipe.
    pub async fn read(&mut self, fd: u32, buf: &mut [u8]) -> Result<usize, crate::Errno> {
        if let Some(target) = self.fds.target(fd) {
            return target.read(buf).await;
        }
        let mut vfs = self.vfs.lock().unwrap();
        self.fds.read_file(&mut vfs, fd, buf)
    }

    /// Writes the whole buffer to a descriptor.
    pub async fn write_all(&mut self, fd: u32, data: &[u8]) -> Result<(), crate::Errno> {
        if let Some(target) = self.fds.target(fd) {
            return target.write_all(data).await;
        }
        let mut vfs = self.vfs.lock().unwrap();
        let mut remaining = data;
        while !remaining.is_empty() {
            let n = self.fds.write_file(&mut vfs, fd, remaining)?;
            remaining = &remaining[n..];
        }
        Ok(())
    }

    /// Drains a descriptor to EOF.
    pub async fn read_to_end(&mut self, fd: u32) -> Result<Vec<u8>, crate::Errno> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(fd, &mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Reads one line (newline stripped); `None` at EOF. Byte-wise so a
    /// shared pipe is never over-read.
    pub async fn read_line(&mut self, fd: u32) -> Result<Option<String>, crate::Errno> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.read(fd, &mut byte).await?;
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
}

/// A runnable program: returns the future that is scheduled as the guest
/// process, resolving to its exit code.
pub trait Tool: Send + Sync {
    fn spawn(&self, ctx: ProcessCtx) -> LocalBoxFuture<'static, i32>;
}

/// The package-manager contract. The kernel-facing half is `lookup`;
/// install/remove/list belong to the package collaborator and are
/// audited there.
pub trait ToolRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>>;
    fn list(&self) -> Vec<String>;
    fn install(&self, name: &str, module_bytes: Vec<u8>, source_url: &str) -> Result<(), String>;
    fn remove(&self, name: &str) -> Result<(), String>;
}
