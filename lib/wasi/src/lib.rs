//! WASI Preview 1 host, fd plumbing and the process kernel.
//!
//! This crate is the bridge between guest processes and the sandbox: the
//! [`WasiCtx`] syscall surface over the virtual filesystem, per-process
//! [`FdTable`]s whose descriptors point at inodes or [`FdTarget`]
//! endpoints, bounded [`pipe`]s connecting pipeline stages, and the
//! [`ProcessKernel`] that schedules guest futures cooperatively on a
//! single thread.
//!
//! The WebAssembly engine itself is a collaborator: it implements
//! [`GuestMemory`] over its linear memory and routes the module's WASI
//! imports into the methods on [`WasiCtx`], using its own fiber support
//! to suspend the guest inside the async calls.

mod control;
mod fd;
mod host;
mod kernel;
mod memory;
mod pipe;
mod process;
mod target;
pub mod types;

pub use control::ExecControl;
pub use fd::{DirStream, FdEntry, FdTable, FileHandle, OpenMode, DIR_FD_BASE, FILE_FD_BASE};
pub use host::{SharedVfs, SyscallResult, WasiCtx};
pub use kernel::{yield_now, Pid, ProcessKernel, WaitPid, YieldNow};
pub use memory::{GuestMemory, IoVec, MemoryAccessError, VecMemory};
pub use pipe::{pipe, PipeRead, PipeReader, PipeWrite, PipeWriter, PIPE_CAPACITY};
pub use process::{ProcessCtx, Tool, ToolRegistry};
pub use target::{FdTarget, OutputBuffer, StaticSource};
pub use types::{Errno, ExitSignal};
