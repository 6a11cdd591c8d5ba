//! Line-oriented text tools.

use wasmbox_wasi::ProcessCtx;

use crate::{read_input, ToolResult};

fn lines_of(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    // A trailing newline yields a phantom empty tail.
    if lines.last().map(String::is_empty).unwrap_or(false) {
        lines.pop();
    }
    lines
}

async fn emit_lines(ctx: &mut ProcessCtx, lines: &[String]) -> ToolResult {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    ctx.write_all(1, out.as_bytes())
        .await
        .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
    Ok(0)
}

/// Positional operands after skipping `-x` flags.
fn operands(args: &[String]) -> Vec<String> {
    args.iter()
        .skip(1)
        .filter(|arg| !arg.starts_with('-') || *arg == "-")
        .cloned()
        .collect()
}

pub(crate) async fn cat(ctx: &mut ProcessCtx) -> ToolResult {
    let files = operands(&ctx.args);
    if files.is_empty() {
        let data = read_input(ctx, None).await?;
        ctx.write_all(1, &data)
            .await
            .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
        return Ok(0);
    }
    for file in files {
        let data = read_input(ctx, Some(&file)).await?;
        ctx.write_all(1, &data)
            .await
            .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
    }
    Ok(0)
}

pub(crate) async fn sort(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let reverse = args.iter().any(|a| a == "-r");
    let numeric = args.iter().any(|a| a == "-n");
    let unique = args.iter().any(|a| a == "-u");
    let data = read_input(ctx, operands(&args).first().map(String::as_str)).await?;
    let mut lines = lines_of(&data);
    if numeric {
        lines.sort_by_key(|line| {
            line.trim()
                .parse::<i64>()
                .unwrap_or_else(|_| line.trim().split_whitespace().next().and_then(|w| w.parse().ok()).unwrap_or(0))
        });
    } else {
        lines.sort();
    }
    if reverse {
        lines.reverse();
    }
    if unique {
        lines.dedup();
    }
    emit_lines(ctx, &lines).await
}

pub(crate) async fn uniq(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let count = args.iter().any(|a| a == "-c");
    let data = read_input(ctx, operands(&args).first().map(String::as_str)).await?;
    let lines = lines_of(&data);
    let mut out: Vec<String> = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let mut run = 1;
        while idx + run < lines.len() && lines[idx + run] == lines[idx] {
            run += 1;
        }
        if count {
            out.push(format!("{run:7} {}", lines[idx]));
        } else {
            out.push(lines[idx].clone());
        }
        idx += run;
    }
    emit_lines(ctx, &out).await
}

/// Operands for tools whose `-n` flag consumes the next argument.
fn operands_after_count(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        if arg == "-n" {
            iter.next();
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn count_flag(args: &[String], flag: &str, default: usize) -> usize {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            if let Some(value) = iter.next() {
                return value.parse().unwrap_or(default);
            }
        } else if let Some(rest) = arg.strip_prefix(flag) {
            if let Ok(value) = rest.parse() {
                return value;
            }
        }
    }
    default
}

pub(crate) async fn head(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let n = count_flag(&args, "-n", 10);
    let data = read_input(ctx, operands_after_count(&args).first().map(String::as_str)).await?;
    let lines = lines_of(&data);
    emit_lines(ctx, &lines[..n.min(lines.len())]).await
}

pub(crate) async fn tail(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let n = count_flag(&args, "-n", 10);
    let data = read_input(ctx, operands_after_count(&args).first().map(String::as_str)).await?;
    let lines = lines_of(&data);
    let start = lines.len().saturating_sub(n);
    emit_lines(ctx, &lines[start..]).await
}

pub(crate) async fn wc(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let want_lines = args.iter().any(|a| a == "-l");
    let want_words = args.iter().any(|a| a == "-w");
    let want_bytes = args.iter().any(|a| a == "-c");
    let all = !want_lines && !want_words && !want_bytes;
    let operand = operands(&args).first().cloned();
    let data = read_input(ctx, operand.as_deref()).await?;

    let line_count = data.iter().filter(|b| **b == b'\n').count();
    let word_count = String::from_utf8_lossy(&data).split_whitespace().count();
    let byte_count = data.len();

    let mut parts = Vec::new();
    if all || want_lines {
        parts.push(format!("{line_count:7}"));
    }
    if all || want_words {
        parts.push(format!("{word_count:7}"));
    }
    if all || want_bytes {
        parts.push(format!("{byte_count:7}"));
    }
    let mut out = parts.join("");
    if let Some(file) = operand {
        if file != "-" {
            out.push(' ');
            out.push_str(&file);
        }
    }
    out.push('\n');
    ctx.write_all(1, out.as_bytes())
        .await
        .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
    Ok(0)
}

pub(crate) async fn grep(ctx: &mut ProcessCtx) -> ToolResult {
    let args = ctx.args.clone();
    let mut invert = false;
    let mut ignore_case = false;
    let mut count_only = false;
    let mut fixed = false;
    let mut positional = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-v" => invert = true,
            "-i" => ignore_case = true,
            "-c" => count_only = true,
            "-F" => fixed = true,
            "-q" => {}
            other => positional.push(other.to_string()),
        }
    }
    let quiet = args.iter().any(|a| a == "-q");
    let Some(pattern) = positional.first().cloned() else {
        return Err("missing pattern".to_string());
    };
    let source = if fixed {
        regex::escape(&pattern)
    } else {
        pattern.clone()
    };
    let source = if ignore_case {
        format!("(?i){source}")
    } else {
        source
    };
    let re = regex::Regex::new(&source).map_err(|e| format!("invalid pattern: {e}"))?;

    let data = read_input(ctx, positional.get(1).map(String::as_str)).await?;
    let matched: Vec<String> = lines_of(&data)
        .into_iter()
        .filter(|line| re.is_match(line) != invert)
        .collect();

    let status = if matched.is_empty() { 1 } else { 0 };
    if quiet {
        return Ok(status);
    }
    if count_only {
        ctx.write_all(1, format!("{}\n", matched.len()).as_bytes())
            .await
            .map_err(|errno| format!("stdout: errno {}", errno.raw()))?;
        return Ok(status);
    }
    emit_lines(ctx, &matched).await?;
    Ok(status)
}
