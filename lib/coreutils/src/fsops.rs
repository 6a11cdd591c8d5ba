//! Filesystem tools.

use wasmbox_vfs::{NodeKind, Vfs};
use wasmbox_wasi::ProcessCtx;

use crate::ToolResult;

fn flags_and_operands(args: &[String]) -> (Vec<char>, Vec<String>) {
    let mut flags = Vec::new();
    let mut operands = Vec::new();
    for arg in args.iter().skip(1) {
        if let Some(rest) = arg.strip_prefix('-') {
            if !rest.is_empty() && rest.chars().all(char::is_alphabetic) {
                flags.extend(rest.chars());
                continue;
            }
        }
        operands.push(arg.clone());
    }
    (flags, operands)
}

async fn emit(ctx: &mut ProcessCtx, text: String) -> ToolResult {
    ctx.write_all(1, text.as_bytes())
        .await
        .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
    Ok(0)
}

pub(crate) async fn ls(ctx: &mut ProcessCtx) -> ToolResult {
    let (flags, operands) = flags_and_operands(&ctx.args);
    let long = flags.contains(&'l');
    let all = flags.contains(&'a');
    let target = operands.first().map(String::as_str).unwrap_or(".");
    let path = ctx.absolute(target).map_err(|e| format!("{target}: {e}"))?;

    let mut vfs = ctx.vfs.lock().unwrap();
    let stat = vfs.stat(&path).map_err(|e| format!("{target}: {e}"))?;
    let entries = if stat.kind == NodeKind::Dir {
        vfs.readdir(&path).map_err(|e| format!("{target}: {e}"))?
    } else {
        vec![wasmbox_vfs::DirEntry {
            name: target.to_string(),
            kind: stat.kind,
            size: stat.size,
        }]
    };
    drop(vfs);

    let mut out = String::new();
    for entry in entries {
        if !all && entry.name.starts_with('.') {
            continue;
        }
        if long {
            let type_char = match entry.kind {
                NodeKind::Dir => 'd',
                NodeKind::Symlink => 'l',
                NodeKind::File => '-',
            };
            out.push_str(&format!("{type_char} {:8} {}\n", entry.size, entry.name));
        } else {
            out.push_str(&entry.name);
            out.push('\n');
        }
    }
    emit(ctx, out).await
}

pub(crate) async fn mkdir(ctx: &mut ProcessCtx) -> ToolResult {
    let (flags, operands) = flags_and_operands(&ctx.args);
    let parents = flags.contains(&'p');
    if operands.is_empty() {
        return Err("missing operand".to_string());
    }
    for dir in operands {
        let path = ctx.absolute(&dir).map_err(|e| format!("{dir}: {e}"))?;
        let mut vfs = ctx.vfs.lock().unwrap();
        let result = if parents {
            vfs.mkdirp(&path)
        } else {
            vfs.mkdir(&path)
        };
        result.map_err(|e| format!("{dir}: {e}"))?;
    }
    Ok(0)
}

pub(crate) async fn rmdir(ctx: &mut ProcessCtx) -> ToolResult {
    let (_, operands) = flags_and_operands(&ctx.args);
    if operands.is_empty() {
        return Err("missing operand".to_string());
    }
    for dir in operands {
        let path = ctx.absolute(&dir).map_err(|e| format!("{dir}: {e}"))?;
        ctx.vfs
            .lock()
            .unwrap()
            .rmdir(&path)
            .map_err(|e| format!("{dir}: {e}"))?;
    }
    Ok(0)
}

pub(crate) async fn rm(ctx: &mut ProcessCtx) -> ToolResult {
    let (flags, operands) = flags_and_operands(&ctx.args);
    let recursive = flags.contains(&'r') || flags.contains(&'R');
    let force = flags.contains(&'f');
    if operands.is_empty() {
        return Err("missing operand".to_string());
    }
    let mut status = 0;
    for target in operands {
        let path = match ctx.absolute(&target) {
            Ok(path) => path,
            Err(e) => return Err(format!("{target}: {e}")),
        };
        let mut vfs = ctx.vfs.lock().unwrap();
        let result = if recursive {
            vfs.remove_all(&path)
        } else {
            vfs.unlink(&path)
        };
        drop(vfs);
        if let Err(err) = result {
            if force && err == wasmbox_vfs::FsError::NotFound {
                continue;
            }
            let _ = ctx
                .write_all(2, format!("rm: {target}: {err}\n").as_bytes())
                .await;
            status = 1;
        }
    }
    Ok(status)
}

fn copy_tree(vfs: &mut Vfs, from: &str, to: &str) -> Result<(), wasmbox_vfs::FsError> {
    let stat = vfs.stat(from)?;
    match stat.kind {
        NodeKind::Dir => {
            vfs.mkdirp(to)?;
            let entries = vfs.readdir(from)?;
            for entry in entries {
                copy_tree(vfs, &format!("{from}/{}", entry.name), &format!("{to}/{}", entry.name))?;
            }
            Ok(())
        }
        _ => {
            let content = vfs.read_file(from)?;
            vfs.write_file(to, content)?;
            vfs.set_mode(to, stat.mode).ok();
            Ok(())
        }
    }
}

/// Destination directory targets get the source's basename appended.
fn destination_for(vfs: &Vfs, source: &str, dest: &str) -> String {
    if vfs.is_dir(dest) {
        format!("{dest}/{}", wasmbox_vfs::path::file_name(source))
    } else {
        dest.to_string()
    }
}

pub(crate) async fn cp(ctx: &mut ProcessCtx) -> ToolResult {
    let (flags, operands) = flags_and_operands(&ctx.args);
    let recursive = flags.contains(&'r') || flags.contains(&'R');
    let [sources @ .., dest] = &operands[..] else {
        return Err("missing destination".to_string());
    };
    if sources.is_empty() {
        return Err("missing operand".to_string());
    }
    let dest_abs = ctx.absolute(dest).map_err(|e| format!("{dest}: {e}"))?;
    for source in sources {
        let src_abs = ctx.absolute(source).map_err(|e| format!("{source}: {e}"))?;
        let mut vfs = ctx.vfs.lock().unwrap();
        let target = destination_for(&vfs, &src_abs, &dest_abs);
        let stat = vfs.stat(&src_abs).map_err(|e| format!("{source}: {e}"))?;
        if stat.kind == NodeKind::Dir && !recursive {
            return Err(format!("{source}: is a directory (use -r)"));
        }
        copy_tree(&mut vfs, &src_abs, &target).map_err(|e| format!("{source}: {e}"))?;
    }
    Ok(0)
}

pub(crate) async fn mv(ctx: &mut ProcessCtx) -> ToolResult {
    let (_, operands) = flags_and_operands(&ctx.args);
    let [sources @ .., dest] = &operands[..] else {
        return Err("missing destination".to_string());
    };
    if sources.is_empty() {
        return Err("missing operand".to_string());
    }
    let dest_abs = ctx.absolute(dest).map_err(|e| format!("{dest}: {e}"))?;
    for source in sources {
        let src_abs = ctx.absolute(source).map_err(|e| format!("{source}: {e}"))?;
        let mut vfs = ctx.vfs.lock().unwrap();
        let target = destination_for(&vfs, &src_abs, &dest_abs);
        vfs.rename(&src_abs, &target)
            .map_err(|e| format!("{source}: {e}"))?;
    }
    Ok(0)
}

pub(crate) async fn touch(ctx: &mut ProcessCtx) -> ToolResult {
    let (_, operands) = flags_and_operands(&ctx.args);
    if operands.is_empty() {
        return Err("missing operand".to_string());
    }
    for file in operands {
        let path = ctx.absolute(&file).map_err(|e| format!("{file}: {e}"))?;
        ctx.vfs
            .lock()
            .unwrap()
            .touch(&path)
            .map_err(|e| format!("{file}: {e}"))?;
    }
    Ok(0)
}

pub(crate) async fn basename(ctx: &mut ProcessCtx) -> ToolResult {
    let (_, operands) = flags_and_operands(&ctx.args);
    let Some(path) = operands.first() else {
        return Err("missing operand".to_string());
    };
    let trimmed = path.trim_end_matches('/');
    let mut name = if trimmed.is_empty() {
        "/"
    } else {
        wasmbox_vfs::path::file_name(trimmed)
    }
    .to_string();
    if let Some(suffix) = operands.get(1) {
        if name.len() > suffix.len() {
            if let Some(stripped) = name.strip_suffix(suffix.as_str()) {
                name = stripped.to_string();
            }
        }
    }
    emit(ctx, format!("{name}\n")).await
}

pub(crate) async fn dirname(ctx: &mut ProcessCtx) -> ToolResult {
    let (_, operands) = flags_and_operands(&ctx.args);
    let Some(path) = operands.first() else {
        return Err("missing operand".to_string());
    };
    let trimmed = path.trim_end_matches('/');
    let parent = match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    };
    emit(ctx, format!("{parent}\n")).await
}

pub(crate) async fn env(ctx: &mut ProcessCtx) -> ToolResult {
    let mut out = String::new();
    for (name, value) in &ctx.env {
        out.push_str(&format!("{name}={value}\n"));
    }
    emit(ctx, out).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_splitting() {
        let args: Vec<String> = ["rm", "-rf", "a", "-", "b"].iter().map(|s| s.to_string()).collect();
        let (flags, operands) = flags_and_operands(&args);
        assert_eq!(flags, vec!['r', 'f']);
        assert_eq!(operands, vec!["a", "-", "b"]);
    }
}
