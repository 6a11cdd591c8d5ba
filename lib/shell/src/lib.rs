//! A POSIX shell interpreter driving the sandbox.
//!
//! Commands are lexed and parsed into a closed [`ast::Command`] tree,
//! then walked by the [`Executor`]: words expand in the fixed POSIX
//! order, pipelines run as concurrent guest processes wired together
//! with pipes, builtins execute in the current shell, and external
//! commands resolve through the tool registry.

pub mod arith;
pub mod ast;
mod builtins;
mod error;
mod exec;
mod expand;
pub mod gateway;
mod lexer;
pub mod parser;
pub mod pattern;
mod state;
mod stream;
pub mod word;

pub use builtins::is_builtin;
pub use error::{ShellError, SyntaxError};
pub use exec::{Executor, Flow, RunStatus, MAX_FUNC_DEPTH, MAX_LOOP_ITERATIONS};
pub use expand::MAX_SUBST_DEPTH;
pub use gateway::{DenyAllGateway, FetchRequest, FetchResponse, GatewayError, NetworkGateway};
pub use lexer::{lex, Token};
pub use parser::parse;
pub use state::{ShellOptions, ShellState};
pub use stream::{Io, Stream};
