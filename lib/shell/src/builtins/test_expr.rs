//! `test` / `[` and the `[[ … ]]` conditional.
//!
//! Both share one evaluator over string operands; `[[` adds pattern
//! matching for `==`/`!=` and regex for `=~`, and expands its operands
//! itself (no field splitting).

use crate::exec::{Executor, Flow};
use crate::pattern::fnmatch;
use crate::stream::Io;
use crate::word::Word;
use wasmbox_vfs::NodeKind;

/// `test`/`[`: operands are already expanded fields. 0 = true, 1 =
/// false, 2 = usage error.
pub(crate) async fn eval_test(
    exec: &mut Executor,
    args: &[String],
    io: &Io,
) -> Result<i32, Flow> {
    if args.is_empty() {
        return Ok(1);
    }
    let (result, end) = {
        let mut parser = TestParser {
            exec: &mut *exec,
            args,
            pos: 0,
            extended: false,
            patterns: None,
            operator_ok: None,
        };
        let result = parser.or_expr();
        (result, parser.pos)
    };
    match result {
        Ok(value) if end == args.len() => Ok(if value { 0 } else { 1 }),
        Ok(_) => {
            exec.write_stderr(io, "sh: test: too many arguments\n").await;
            Ok(2)
        }
        Err(message) => {
            exec.write_stderr(io, &format!("sh: test: {message}\n")).await;
            Ok(2)
        }
    }
}

/// `[[ … ]]`: words are expanded lazily, unquoted operators recognized
/// structurally.
pub(crate) async fn eval_cond_words(
    exec: &mut Executor,
    words: &[Word],
    io: &Io,
) -> Result<bool, Flow> {
    // Expand operands up front; operators are unquoted literals and
    // keep their spelling, quoted words lose special meaning.
    let mut args = Vec::with_capacity(words.len());
    let mut patterns = Vec::with_capacity(words.len());
    for word in words {
        let is_operator_spelling = word.as_literal().is_some();
        args.push((exec.expand_single(word, io).await?, is_operator_spelling));
        patterns.push(exec.expand_pattern(word, io).await?);
    }
    let operands: Vec<String> = args.iter().map(|(text, _)| text.clone()).collect();
    let (result, end) = {
        let mut parser = TestParser {
            exec: &mut *exec,
            args: &operands,
            pos: 0,
            extended: true,
            patterns: Some(&patterns),
            operator_ok: Some(&args),
        };
        let result = parser.or_expr();
        (result, parser.pos)
    };
    match result {
        Ok(value) if end == operands.len() => Ok(value),
        Ok(_) => {
            exec.write_stderr(io, "sh: [[: malformed expression\n").await;
            Err(Flow::Fail(2))
        }
        Err(message) => {
            exec.write_stderr(io, &format!("sh: [[: {message}\n")).await;
            Err(Flow::Fail(2))
        }
    }
}

struct TestParser<'a> {
    exec: &'a mut Executor,
    args: &'a [String],
    pos: usize,
    extended: bool,
    /// `[[` only: pattern-spelled operands for `==`/`!=` right sides.
    patterns: Option<&'a [String]>,
    /// `[[` only: whether each word was an unquoted literal (operators
    /// must be).
    operator_ok: Option<&'a [(String, bool)]>,
}

impl<'a> TestParser<'a> {
    fn bump(&mut self) -> Option<&'a str> {
        let arg = self.args.get(self.pos).map(String::as_str);
        if arg.is_some() {
            self.pos += 1;
        }
        arg
    }

    fn operator_at(&self, pos: usize) -> Option<&str> {
        let arg = self.args.get(pos).map(String::as_str)?;
        if self.extended {
            // Quoted operators are operands in `[[`.
            match self.operator_ok {
                Some(flags) if !flags.get(pos).map(|(_, ok)| *ok).unwrap_or(false) => return None,
                _ => {}
            }
        }
        Some(arg)
    }

    fn or_expr(&mut self) -> Result<bool, String> {
        let mut value = self.and_expr()?;
        while matches!(self.operator_at(self.pos), Some("-o") | Some("||")) {
            self.pos += 1;
            let rhs = self.and_expr()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and_expr(&mut self) -> Result<bool, String> {
        let mut value = self.not_expr()?;
        while matches!(self.operator_at(self.pos), Some("-a") | Some("&&")) {
            self.pos += 1;
            let rhs = self.not_expr()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not_expr(&mut self) -> Result<bool, String> {
        if self.operator_at(self.pos) == Some("!") {
            self.pos += 1;
            return Ok(!self.not_expr()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        if self.operator_at(self.pos) == Some("(") {
            self.pos += 1;
            let value = self.or_expr()?;
            if self.operator_at(self.pos) != Some(")") {
                return Err("expected `)`".to_string());
            }
            self.pos += 1;
            return Ok(value);
        }

        // Unary operators.
        if let Some(op) = self.operator_at(self.pos) {
            if is_unary(op) && self.pos + 1 < self.args.len() {
                let op = op.to_string();
                self.pos += 1;
                let operand = self.bump().expect("checked").to_string();
                return self.unary(&op, &operand);
            }
        }

        let Some(lhs) = self.bump().map(str::to_string) else {
            return Err("expected expression".to_string());
        };

        // Binary operators.
        if let Some(op) = self.operator_at(self.pos) {
            if is_binary(op, self.extended) {
                let op = op.to_string();
                self.pos += 1;
                let rhs_pos = self.pos;
                let Some(rhs) = self.bump().map(str::to_string) else {
                    return Err(format!("`{op}`: missing operand"));
                };
                return self.binary(&lhs, &op, &rhs, rhs_pos);
            }
        }

        // Bare operand: true when non-empty.
        Ok(!lhs.is_empty())
    }

    fn unary(&mut self, op: &str, operand: &str) -> Result<bool, String> {
        match op {
            "-z" => return Ok(operand.is_empty()),
            "-n" => return Ok(!operand.is_empty()),
            "-t" => return Ok(false),
            _ => {}
        }
        let path = wasmbox_vfs::path::absolutize(&self.exec.state.pwd(), operand)
            .unwrap_or_else(|_| operand.to_string());
        let vfs = self.exec.vfs.lock().unwrap();
        let stat = vfs.stat(&path);
        let lstat = vfs.lstat(&path);
        Ok(match op {
            "-e" => stat.is_ok(),
            "-f" => stat.map(|s| s.kind == NodeKind::File).unwrap_or(false),
            "-d" => stat.map(|s| s.kind == NodeKind::Dir).unwrap_or(false),
            "-s" => stat.map(|s| s.size > 0).unwrap_or(false),
            "-L" | "-h" => lstat.map(|s| s.kind == NodeKind::Symlink).unwrap_or(false),
            // Mode bits are recorded, not enforced; report them.
            "-r" => stat.map(|s| s.mode & 0o444 != 0).unwrap_or(false),
            "-w" => stat.map(|s| s.mode & 0o222 != 0).unwrap_or(false),
            "-x" => stat.map(|s| s.mode & 0o111 != 0).unwrap_or(false),
            other => return Err(format!("`{other}`: unknown operator")),
        })
    }

    fn binary(&mut self, lhs: &str, op: &str, rhs: &str, rhs_pos: usize) -> Result<bool, String> {
        match op {
            "=" | "==" => {
                if self.extended {
                    let pattern = self
                        .patterns
                        .and_then(|p| p.get(rhs_pos))
                        .cloned()
                        .unwrap_or_else(|| rhs.to_string());
                    return Ok(fnmatch(&pattern, lhs));
                }
                return Ok(lhs == rhs);
            }
            "!=" => {
                if self.extended {
                    let pattern = self
                        .patterns
                        .and_then(|p| p.get(rhs_pos))
                        .cloned()
                        .unwrap_or_else(|| rhs.to_string());
                    return Ok(!fnmatch(&pattern, lhs));
                }
                return Ok(lhs != rhs);
            }
            "<" => return Ok(lhs < rhs),
            ">" => return Ok(lhs > rhs),
            "=~" if self.extended => {
                let re = regex::Regex::new(rhs).map_err(|e| format!("invalid regex: {e}"))?;
                return Ok(re.is_match(lhs));
            }
            _ => {}
        }
        let a: i64 = lhs
            .trim()
            .parse()
            .map_err(|_| format!("`{lhs}`: integer expression expected"))?;
        let b: i64 = rhs
            .trim()
            .parse()
            .map_err(|_| format!("`{rhs}`: integer expression expected"))?;
        Ok(match op {
            "-eq" => a == b,
            "-ne" => a != b,
            "-lt" => a < b,
            "-le" => a <= b,
            "-gt" => a > b,
            "-ge" => a >= b,
            other => return Err(format!("`{other}`: unknown operator")),
        })
    }
}

fn is_unary(op: &str) -> bool {
    matches!(
        op,
        "-e" | "-f" | "-d" | "-s" | "-r" | "-w" | "-x" | "-z" | "-n" | "-L" | "-h" | "-t"
    )
}

fn is_binary(op: &str, extended: bool) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge"
    ) || (extended && op == "=~")
}
