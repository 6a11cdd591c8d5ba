//! `read` and `mapfile`/`readarray`: line input from the stdin stream.

use crate::exec::{Executor, Flow};
use crate::stream::Io;

impl Executor {
    pub(crate) async fn builtin_read(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut raw = false;
        let mut array_name: Option<String> = None;
        let mut prompt: Option<String> = None;
        let mut names: Vec<String> = Vec::new();
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-r" => raw = true,
                "-a" => {
                    idx += 1;
                    match args.get(idx) {
                        Some(name) => array_name = Some(name.clone()),
                        None => {
                            self.write_stderr(io, "sh: read: -a: option requires an argument\n")
                                .await;
                            return Ok(2);
                        }
                    }
                }
                "-p" => {
                    idx += 1;
                    prompt = args.get(idx).cloned();
                }
                "--" => {
                    idx += 1;
                    break;
                }
                arg if arg.starts_with('-') => {
                    self.write_stderr(io, &format!("sh: read: {arg}: invalid option\n")).await;
                    return Ok(2);
                }
                _ => break,
            }
            idx += 1;
        }
        names.extend(args[idx..].iter().cloned());

        if let Some(prompt) = prompt {
            self.write_stderr(io, &prompt).await;
        }

        let mut line = match io.stdin.read_line(&self.vfs).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                // EOF: clear the targets, report failure.
                for name in &names {
                    self.state.set_var(name, "");
                }
                return Ok(1);
            }
            Err(errno) => {
                self.write_stderr(io, &format!("sh: read: errno {}\n", errno.raw())).await;
                return Ok(1);
            }
        };

        // Without -r a trailing backslash continues onto the next line
        // and backslash escapes drop.
        if !raw {
            while line.ends_with('\\') && !line.ends_with("\\\\") {
                line.pop();
                match io.stdin.read_line(&self.vfs).await {
                    Ok(Some(next)) => line.push_str(&next),
                    _ => break,
                }
            }
            line = strip_backslashes(&line);
        }

        let ifs = self.state.ifs();
        if let Some(array) = array_name {
            let fields = split_ifs(&line, &ifs, usize::MAX);
            self.state.arrays.insert(array, fields);
            return Ok(0);
        }
        if names.is_empty() {
            self.state.set_var("REPLY", line);
            return Ok(0);
        }
        let fields = split_ifs(&line, &ifs, names.len());
        for (pos, name) in names.iter().enumerate() {
            let value = fields.get(pos).cloned().unwrap_or_default();
            self.state.set_var(name, value);
        }
        Ok(0)
    }

    pub(crate) async fn builtin_mapfile(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut strip_newlines = false;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-t" => strip_newlines = true,
                arg if arg.starts_with('-') => {
                    self.write_stderr(io, &format!("sh: mapfile: {arg}: invalid option\n")).await;
                    return Ok(2);
                }
                _ => break,
            }
            idx += 1;
        }
        let array = args
            .get(idx)
            .cloned()
            .unwrap_or_else(|| "MAPFILE".to_string());
        let mut lines = Vec::new();
        loop {
            match io.stdin.read_line(&self.vfs).await {
                Ok(Some(line)) => {
                    if strip_newlines {
                        lines.push(line);
                    } else {
                        lines.push(format!("{line}\n"));
                    }
                }
                Ok(None) => break,
                Err(errno) => {
                    self.write_stderr(io, &format!("sh: mapfile: errno {}\n", errno.raw())).await;
                    return Ok(1);
                }
            }
        }
        self.state.arrays.insert(array, lines);
        Ok(0)
    }
}

fn strip_backslashes(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits into at most `max` fields; the last field keeps the rest of
/// the line.
fn split_ifs(line: &str, ifs: &str, max: usize) -> Vec<String> {
    let trimmed = line.trim_matches(|c: char| ifs.contains(c) && c.is_whitespace());
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        if ifs.contains(c) && fields.len() + 1 < max {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
            // Collapse runs of separators.
            while chars.peek().map(|&n| ifs.contains(n)).unwrap_or(false) {
                chars.next();
            }
        } else if ifs.contains(c) && max != usize::MAX {
            // Inside the final field everything is literal.
            current.push(c);
        } else if ifs.contains(c) {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_limits_fields_and_keeps_remainder() {
        assert_eq!(split_ifs("a b c", " \t\n", usize::MAX), vec!["a", "b", "c"]);
        assert_eq!(split_ifs("a b c d", " \t\n", 2), vec!["a", "b c d"]);
        assert_eq!(split_ifs("  padded  ", " \t\n", usize::MAX), vec!["padded"]);
        assert!(split_ifs("", " \t\n", 1).is_empty());
    }

    #[test]
    fn backslash_stripping() {
        assert_eq!(strip_backslashes(r"a\ b"), "a b");
        assert_eq!(strip_backslashes(r"a\\b"), r"a\b");
    }
}
