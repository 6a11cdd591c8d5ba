//! The host-kernel import namespace.
//!
//! A guest shell (or any guest that builds pipelines itself) imports
//! these functions alongside WASI. The engine adapter wires them to
//! [`wasmbox_wasi::ProcessKernel`] and the per-process fd table; the
//! in-process shell calls the kernel directly and never goes through
//! this surface.
//!
//! Signatures (32-bit pointers, little-endian):
//!
//! - `host_spawn(prog_ptr, prog_len, argv_ptr, argv_len, env_ptr,
//!   env_len, fd_map_ptr, fd_map_len) -> pid`: argv/env are packed
//!   NUL-separated strings, fd_map is `(u32 child_fd, u32 parent_fd)`
//!   pairs naming the targets to plant before `_start`.
//! - `host_waitpid(pid) -> exit_code`: suspends until the child exits;
//!   idempotent after reap.
//! - `host_yield()`: cooperative reschedule.
//! - `host_pipe() -> (read_fd, write_fd)`: a bounded pipe, both ends
//!   installed in the caller's fd table.
//! - `host_close_fd(fd)`: releases one descriptor.
//! - `host_extension_invoke(name_ptr, name_len, payload_ptr,
//!   payload_len, out_ptr, out_cap) -> bytes_written`: escape hatch to
//!   named host extensions (the network gateway and package manager
//!   register themselves here).

/// Import module name for the kernel surface.
pub const KERNEL_MODULE: &str = "wasmbox_kernel";

pub const HOST_SPAWN: &str = "host_spawn";
pub const HOST_WAITPID: &str = "host_waitpid";
pub const HOST_YIELD: &str = "host_yield";
pub const HOST_PIPE: &str = "host_pipe";
pub const HOST_CLOSE_FD: &str = "host_close_fd";
pub const HOST_EXTENSION_INVOKE: &str = "host_extension_invoke";

/// Import module name for WASI Preview 1.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";
