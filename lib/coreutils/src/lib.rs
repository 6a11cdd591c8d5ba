//! The native tool set.
//!
//! Each tool implements [`Tool`] and runs as a kernel-scheduled guest
//! process: argv and environment from the spawn spec, I/O through the
//! process fd table (pipes, buffers, files), files through the shared
//! VFS. A real WASM module registered under the same name would replace
//! any of these transparently.

mod archive;
mod fsops;
mod text;

use std::sync::Arc;

use futures::future::LocalBoxFuture;
use wasmbox_wasi::{ProcessCtx, Tool};

pub(crate) type ToolResult = Result<i32, String>;

/// Adapts a `fn(ctx) -> future<ToolResult>` tool body: errors are
/// printed as `name: message` on stderr with exit code 1.
struct NamedTool {
    name: &'static str,
    run: for<'a> fn(&'a mut ProcessCtx) -> LocalBoxFuture<'a, ToolResult>,
}

impl Tool for NamedTool {
    fn spawn(&self, mut ctx: ProcessCtx) -> LocalBoxFuture<'static, i32> {
        let name = self.name;
        let run = self.run;
        Box::pin(async move {
            if ctx.control.check().is_err() {
                return 125;
            }
            match run(&mut ctx).await {
                Ok(code) => code,
                Err(message) => {
                    let _ = ctx.write_all(2, format!("{name}: {message}\n").as_bytes()).await;
                    1
                }
            }
        })
    }
}

macro_rules! tool {
    ($name:literal, $body:path) => {{
        fn wrapper(ctx: &mut ProcessCtx) -> LocalBoxFuture<'_, ToolResult> {
            Box::pin($body(ctx))
        }
        (
            $name,
            Arc::new(NamedTool {
                name: $name,
                run: wrapper,
            }) as Arc<dyn Tool>,
        )
    }};
}

/// Every bundled tool, ready to seed a registry.
pub fn builtin_tools() -> Vec<(&'static str, Arc<dyn Tool>)> {
    vec![
        tool!("basename", fsops::basename),
        tool!("cat", text::cat),
        tool!("cp", fsops::cp),
        tool!("dirname", fsops::dirname),
        tool!("env", fsops::env),
        tool!("grep", text::grep),
        tool!("gunzip", archive::gunzip),
        tool!("gzip", archive::gzip),
        tool!("head", text::head),
        tool!("ls", fsops::ls),
        tool!("mkdir", fsops::mkdir),
        tool!("mv", fsops::mv),
        tool!("rm", fsops::rm),
        tool!("rmdir", fsops::rmdir),
        tool!("sort", text::sort),
        tool!("tail", text::tail),
        tool!("tar", archive::tar_tool),
        tool!("touch", fsops::touch),
        tool!("uniq", text::uniq),
        tool!("wc", text::wc),
    ]
}

/// Reads a tool input: `-` and no-operand mean stdin, otherwise a VFS
/// path resolved against the working directory.
pub(crate) async fn read_input(ctx: &mut ProcessCtx, operand: Option<&str>) -> Result<Vec<u8>, String> {
    match operand {
        None | Some("-") => ctx
            .read_to_end(0)
            .await
            .map_err(|errno| format!("stdin: errno {}", errno.raw())),
        Some(path) => {
            let abs = ctx.absolute(path).map_err(|e| format!("{path}: {e}"))?;
            let mut vfs = ctx.vfs.lock().unwrap();
            vfs.read_file(&abs)
                .map(|bytes| bytes.to_vec())
                .map_err(|e| format!("{path}: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_sorted_and_unique() {
        let names: Vec<&str> = builtin_tools().iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
