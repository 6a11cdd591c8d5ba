//! The Wasmbox runtime: a sandboxed code-execution environment.
//!
//! One [`Sandbox`] owns the virtual filesystem, the cooperative process
//! kernel, the tool registry and a persistent shell session. Commands
//! go in as strings; captured output, exit codes and resource flags
//! come back in a [`RunResult`].
//!
//! ```no_run
//! use wasmbox_runtime::Sandbox;
//!
//! let mut sandbox = Sandbox::new();
//! let result = sandbox.run("echo hello | wc -l");
//! assert_eq!(result.exit_code, 0);
//! ```
//!
//! Collaborator seams: the WASM engine plugs in through
//! [`registry::ModuleLoader`], real HTTP through
//! [`wasmbox_shell::NetworkGateway`], and guest-side pipeline
//! construction through the import namespace documented in [`abi`].

pub mod abi;
pub mod registry;
mod sandbox;

pub use registry::{InMemoryRegistry, ModuleLoader};
pub use sandbox::{ErrorClass, RunResult, Sandbox, SandboxConfig, DEFAULT_OUTPUT_LIMIT};
pub use wasmbox_shell::{
    DenyAllGateway, FetchRequest, FetchResponse, GatewayError, NetworkGateway,
};
