//! The sandbox: one object owning the filesystem, process kernel,
//! registry and shell session.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::executor::LocalPool;
use tracing::info;
use wasmbox_shell::{DenyAllGateway, Executor, Io, NetworkGateway, RunStatus, Stream};
use wasmbox_vfs::{SnapshotId, Vfs};
use wasmbox_wasi::{
    ExecControl, FdTarget, OutputBuffer, ProcessKernel, SharedVfs, Tool, ToolRegistry,
};

use crate::registry::InMemoryRegistry;

/// Default cap on captured stdout/stderr bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Construction-time knobs.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    pub fs_limit_bytes: Option<u64>,
    pub file_count_limit: Option<u64>,
    /// Captured stdout/stderr cap; overflow truncates and sets a flag.
    pub output_limit_bytes: usize,
    /// Per-`run` deadline in milliseconds.
    pub run_timeout_ms: Option<u64>,
    pub pipefail: bool,
    pub writable_prefixes: Option<Vec<String>>,
    /// Skip registering the native tool set.
    pub bare: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fs_limit_bytes: None,
            file_count_limit: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            run_timeout_ms: None,
            pipefail: false,
            writable_prefixes: None,
            bare: false,
        }
    }
}

/// Why a run ended abnormally.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    Cancelled,
}

/// The result of one `run` call.
#[derive(Clone, Debug)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub truncated: bool,
    pub error_class: Option<ErrorClass>,
}

/// A sandbox session: persistent filesystem and shell state across
/// `run` calls.
pub struct Sandbox {
    pool: LocalPool,
    executor: Executor,
    registry: Arc<InMemoryRegistry>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default(), Arc::new(DenyAllGateway))
    }

    pub fn with_config(config: SandboxConfig, gateway: Arc<dyn NetworkGateway>) -> Self {
        let pool = LocalPool::new();
        let kernel = ProcessKernel::new(pool.spawner());
        let control = ExecControl::new();

        let mut vfs = Vfs::with_standard_layout();
        vfs.set_limits(config.fs_limit_bytes, config.file_count_limit);
        if let Some(prefixes) = &config.writable_prefixes {
            vfs.set_writable_prefixes(prefixes.clone());
        }

        let registry = Arc::new(InMemoryRegistry::new());
        if !config.bare {
            for (name, tool) in wasmbox_coreutils::builtin_tools() {
                registry.register(name, tool);
            }
        }
        // One zero-length 0755 stub per registered tool, so `ls /bin`
        // and `which` see the tool set.
        for name in registry.list() {
            let stub = format!("/bin/{name}");
            vfs.host_write_file(&stub, bytes::Bytes::new()).expect("stub path");
            vfs.host_set_mode(&stub, 0o755).expect("stub mode");
        }

        let vfs: SharedVfs = Arc::new(Mutex::new(vfs));
        let mut executor = Executor::new(
            vfs,
            kernel,
            control,
            registry.clone() as Arc<dyn ToolRegistry>,
            gateway,
        );
        for (name, value) in [
            ("HOME", "/home/user"),
            ("PWD", "/home/user"),
            ("USER", "user"),
            ("PATH", "/bin:/usr/bin"),
            ("SHELL", "/bin/sh"),
        ] {
            executor.state.set_var(name, value);
            executor.state.export(name);
        }
        executor.state.options.pipefail = config.pipefail;

        Self {
            pool,
            executor,
            registry,
            config,
        }
    }

    /// Runs one command string to completion.
    pub fn run(&mut self, command: &str) -> RunResult {
        let started = Instant::now();
        self.executor.state.history.push(command.to_string());

        self.executor.control.reset();
        if let Some(timeout_ms) = self.config.run_timeout_ms {
            let deadline = wasmbox_vfs::now_nanos() + timeout_ms * 1_000_000;
            self.executor.control.set_deadline(deadline);
        }

        let stdout = OutputBuffer::new(Some(self.config.output_limit_bytes));
        let stderr = OutputBuffer::new(Some(self.config.output_limit_bytes));
        let io = Io {
            stdin: Stream::null(),
            stdout: Stream::Target(FdTarget::Buffer(stdout.clone())),
            stderr: Stream::Target(FdTarget::Buffer(stderr.clone())),
        };

        let status = self.pool.run_until(self.executor.run_source(command, &io));
        let (exit_code, error_class) = match status {
            RunStatus::Done(code) => (code, None),
            RunStatus::Timeout => (124, Some(ErrorClass::Timeout)),
            RunStatus::Cancelled => (125, Some(ErrorClass::Cancelled)),
        };

        let result = RunResult {
            exit_code,
            stdout: stdout.into_string_lossy(),
            stderr: stderr.into_string_lossy(),
            duration_ms: started.elapsed().as_millis() as u64,
            truncated: stdout.truncated() || stderr.truncated(),
            error_class,
        };
        info!(
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            truncated = result.truncated,
            "run complete"
        );
        result
    }

    /// Runs any `trap … EXIT` handlers; call when ending the session.
    pub fn run_exit_traps(&mut self) -> RunResult {
        let stdout = OutputBuffer::new(Some(self.config.output_limit_bytes));
        let stderr = OutputBuffer::new(Some(self.config.output_limit_bytes));
        let io = Io {
            stdin: Stream::null(),
            stdout: Stream::Target(FdTarget::Buffer(stdout.clone())),
            stderr: Stream::Target(FdTarget::Buffer(stderr.clone())),
        };
        self.pool.run_until(self.executor.run_exit_trap(&io));
        RunResult {
            exit_code: 0,
            stdout: stdout.into_string_lossy(),
            stderr: stderr.into_string_lossy(),
            duration_ms: 0,
            truncated: false,
            error_class: None,
        }
    }

    /// Sets (and exports) a shell variable.
    pub fn set_env(&mut self, name: &str, value: &str) {
        self.executor.state.set_var(name, value);
        self.executor.state.export(name);
    }

    pub fn get_env(&self, name: &str) -> Option<String> {
        self.executor.state.get_var(name).map(str::to_string)
    }

    /// The shared filesystem, for host-side seeding and inspection.
    pub fn vfs(&self) -> SharedVfs {
        self.executor.vfs.clone()
    }

    /// Cancel/deadline handle shared with the executor and WASI host.
    pub fn control(&self) -> ExecControl {
        self.executor.control.clone()
    }

    pub fn registry(&self) -> Arc<InMemoryRegistry> {
        self.registry.clone()
    }

    /// Registers a native tool and drops its `/bin` stub in place.
    pub fn install_tool(&mut self, name: &str, tool: Arc<dyn Tool>) {
        self.registry.register(name, tool);
        let mut vfs = self.executor.vfs.lock().unwrap();
        let stub = format!("/bin/{name}");
        vfs.host_write_file(&stub, bytes::Bytes::new()).ok();
        vfs.host_set_mode(&stub, 0o755).ok();
    }

    pub fn snapshot(&self) -> SnapshotId {
        self.executor.vfs.lock().unwrap().snapshot()
    }

    pub fn restore(&self, id: SnapshotId) -> Result<(), wasmbox_vfs::FsError> {
        self.executor.vfs.lock().unwrap().restore(id)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}
