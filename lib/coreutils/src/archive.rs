//! Compression and archive tools: gzip/gunzip over `flate2`, tar over
//! the `tar` crate, all against in-memory buffers.

use std::io::{Read, Write};

use wasmbox_vfs::NodeKind;
use wasmbox_wasi::ProcessCtx;

use crate::{read_input, ToolResult};

fn compress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| format!("not in gzip format: {e}"))?;
    Ok(out)
}

pub(crate) async fn gzip(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let keep = args.iter().any(|a| a == "-k");
    let to_stdout = args.iter().any(|a| a == "-c");
    let operand = args.iter().skip(1).find(|a| !a.starts_with('-')).cloned();

    let data = read_input(ctx, operand.as_deref()).await?;
    let packed = compress(&data)?;

    match operand {
        Some(file) if !to_stdout => {
            let path = ctx.absolute(&file).map_err(|e| format!("{file}: {e}"))?;
            let mut vfs = ctx.vfs.lock().unwrap();
            vfs.write_file(&format!("{path}.gz"), packed)
                .map_err(|e| format!("{file}.gz: {e}"))?;
            if !keep {
                vfs.unlink(&path).map_err(|e| format!("{file}: {e}"))?;
            }
            Ok(0)
        }
        _ => {
            ctx.write_all(1, &packed)
                .await
                .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
            Ok(0)
        }
    }
}

pub(crate) async fn gunzip(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let keep = args.iter().any(|a| a == "-k");
    let to_stdout = args.iter().any(|a| a == "-c");
    let operand = args.iter().skip(1).find(|a| !a.starts_with('-')).cloned();

    let data = read_input(ctx, operand.as_deref()).await?;
    let unpacked = decompress(&data)?;

    match operand {
        Some(file) if !to_stdout => {
            let Some(stem) = file.strip_suffix(".gz") else {
                return Err(format!("{file}: unknown suffix"));
            };
            let path = ctx.absolute(&file).map_err(|e| format!("{file}: {e}"))?;
            let out_path = ctx.absolute(stem).map_err(|e| format!("{stem}: {e}"))?;
            let mut vfs = ctx.vfs.lock().unwrap();
            vfs.write_file(&out_path, unpacked)
                .map_err(|e| format!("{stem}: {e}"))?;
            if !keep {
                vfs.unlink(&path).map_err(|e| format!("{file}: {e}"))?;
            }
            Ok(0)
        }
        _ => {
            ctx.write_all(1, &unpacked)
                .await
                .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
            Ok(0)
        }
    }
}

/// Collects `(relative path, kind)` pairs depth-first under `rel`.
fn walk(
    vfs: &mut wasmbox_vfs::Vfs,
    cwd: &str,
    rel: &str,
    out: &mut Vec<(String, NodeKind)>,
) -> Result<(), String> {
    let abs = wasmbox_vfs::path::absolutize(cwd, rel).map_err(|e| format!("{rel}: {e}"))?;
    let stat = vfs.stat(&abs).map_err(|e| format!("{rel}: {e}"))?;
    out.push((rel.to_string(), stat.kind));
    if stat.kind == NodeKind::Dir {
        let entries = vfs.readdir(&abs).map_err(|e| format!("{rel}: {e}"))?;
        for entry in entries {
            walk(vfs, cwd, &format!("{rel}/{}", entry.name), out)?;
        }
    }
    Ok(())
}

pub(crate) async fn tar_tool(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let Some(flag_arg) = args.get(1) else {
        return Err("usage: tar -c|-x|-t -f ARCHIVE [PATH...]".to_string());
    };
    let flags: Vec<char> = flag_arg.trim_start_matches('-').chars().collect();
    let create = flags.contains(&'c');
    let extract = flags.contains(&'x');
    let list = flags.contains(&'t');
    if !flags.contains(&'f') {
        return Err("only file archives are supported (use -f)".to_string());
    }
    let Some(archive_name) = args.get(2).cloned() else {
        return Err("missing archive name".to_string());
    };
    let operands: Vec<String> = args[3..].to_vec();
    let archive_path = ctx
        .absolute(&archive_name)
        .map_err(|e| format!("{archive_name}: {e}"))?;

    if create {
        if operands.is_empty() {
            return Err("refusing to create an empty archive".to_string());
        }
        let mut entries = Vec::new();
        {
            let mut vfs = ctx.vfs.lock().unwrap();
            for operand in &operands {
                walk(&mut vfs, &ctx.cwd, operand, &mut entries)?;
            }
        }
        let mut builder = tar::Builder::new(Vec::new());
        for (rel, kind) in entries {
            let abs = wasmbox_vfs::path::absolutize(&ctx.cwd, &rel)
                .map_err(|e| format!("{rel}: {e}"))?;
            let mut vfs = ctx.vfs.lock().unwrap();
            let stat = vfs.stat(&abs).map_err(|e| format!("{rel}: {e}"))?;
            let mut header = tar::Header::new_gnu();
            header.set_mode(stat.mode);
            header.set_mtime(stat.mtime / 1_000_000_000);
            match kind {
                NodeKind::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, format!("{rel}/"), std::io::empty())
                        .map_err(|e| e.to_string())?;
                }
                _ => {
                    let content = vfs.read_file(&abs).map_err(|e| format!("{rel}: {e}"))?;
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(content.len() as u64);
                    builder
                        .append_data(&mut header, &rel, &content[..])
                        .map_err(|e| e.to_string())?;
                }
            }
        }
        let bytes = builder.into_inner().map_err(|e| e.to_string())?;
        ctx.vfs
            .lock()
            .unwrap()
            .write_file(&archive_path, bytes)
            .map_err(|e| format!("{archive_name}: {e}"))?;
        return Ok(0);
    }

    let data = {
        let mut vfs = ctx.vfs.lock().unwrap();
        vfs.read_file(&archive_path)
            .map_err(|e| format!("{archive_name}: {e}"))?
    };

    if list {
        let mut archive = tar::Archive::new(&data[..]);
        let mut out = String::new();
        for entry in archive.entries().map_err(|e| e.to_string())? {
            let entry = entry.map_err(|e| e.to_string())?;
            out.push_str(&entry.path().map_err(|e| e.to_string())?.to_string_lossy());
            out.push('\n');
        }
        ctx.write_all(1, out.as_bytes())
            .await
            .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
        return Ok(0);
    }

    if extract {
        let mut archive = tar::Archive::new(&data[..]);
        for entry in archive.entries().map_err(|e| e.to_string())? {
            let mut entry = entry.map_err(|e| e.to_string())?;
            let rel = entry.path().map_err(|e| e.to_string())?.to_string_lossy().into_owned();
            let abs = wasmbox_vfs::path::absolutize(&ctx.cwd, &rel)
                .map_err(|e| format!("{rel}: {e}"))?;
            let kind = entry.header().entry_type();
            let mode = entry.header().mode().unwrap_or(0o644);
            if kind.is_dir() {
                let mut vfs = ctx.vfs.lock().unwrap();
                vfs.mkdirp(&abs).map_err(|e| format!("{rel}: {e}"))?;
                vfs.set_mode(&abs, mode).ok();
            } else {
                let mut content = Vec::new();
                entry.read_to_end(&mut content).map_err(|e| e.to_string())?;
                let mut vfs = ctx.vfs.lock().unwrap();
                if let Some(parent) = abs.rfind('/').map(|idx| &abs[..idx.max(1)]) {
                    vfs.mkdirp(parent).map_err(|e| format!("{rel}: {e}"))?;
                }
                vfs.write_file(&abs, content).map_err(|e| format!("{rel}: {e}"))?;
                vfs.set_mode(&abs, mode).ok();
            }
        }
        return Ok(0);
    }

    Err("one of -c, -x, -t is required".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let packed = compress(&original).unwrap();
        assert!(packed.len() < original.len());
        assert_eq!(decompress(&packed).unwrap(), original);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
