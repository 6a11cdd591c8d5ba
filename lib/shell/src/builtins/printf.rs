//! The `printf` builtin: a hand-rolled subset of the C formatter.

use crate::exec::{Executor, Flow};
use crate::stream::Io;

impl Executor {
    pub(crate) async fn builtin_printf(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let Some((format, mut rest)) = args.split_first() else {
            self.write_stderr(io, "sh: printf: usage: printf format [arguments]\n").await;
            return Ok(2);
        };
        let mut out = String::new();
        // The format string is reused until the arguments run dry.
        loop {
            let consumed = render(format, rest, &mut out);
            if consumed == 0 || consumed >= rest.len() {
                break;
            }
            rest = &rest[consumed..];
        }
        self.write_stdout(io, &out).await?;
        Ok(0)
    }
}

/// Renders one pass of the format; returns how many arguments it used.
fn render(format: &str, args: &[String], out: &mut String) -> usize {
    let chars: Vec<char> = format.chars().collect();
    let mut idx = 0;
    let mut used = 0;
    let mut next_arg = || {
        let arg = args.get(used).map(String::as_str).unwrap_or("");
        used += 1;
        arg
    };

    while idx < chars.len() {
        match chars[idx] {
            '\\' if idx + 1 < chars.len() => {
                idx += 1;
                match chars[idx] {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    'a' => out.push('\x07'),
                    '0' => out.push('\0'),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                idx += 1;
            }
            '%' => {
                idx += 1;
                if chars.get(idx) == Some(&'%') {
                    out.push('%');
                    idx += 1;
                    continue;
                }
                let spec_start = idx;
                let mut left_align = false;
                let mut zero_pad = false;
                loop {
                    match chars.get(idx) {
                        Some('-') => left_align = true,
                        Some('0') => zero_pad = true,
                        Some('+') | Some(' ') => {}
                        _ => break,
                    }
                    idx += 1;
                }
                let mut width = 0usize;
                while chars.get(idx).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    width = width * 10 + chars[idx].to_digit(10).expect("digit") as usize;
                    idx += 1;
                }
                let mut precision = None;
                if chars.get(idx) == Some(&'.') {
                    idx += 1;
                    let mut p = 0usize;
                    while chars.get(idx).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        p = p * 10 + chars[idx].to_digit(10).expect("digit") as usize;
                        idx += 1;
                    }
                    precision = Some(p);
                }
                let Some(&spec) = chars.get(idx) else {
                    out.push('%');
                    idx = spec_start;
                    continue;
                };
                idx += 1;
                let rendered = match spec {
                    's' => {
                        let mut value = next_arg().to_string();
                        if let Some(p) = precision {
                            value.truncate(p);
                        }
                        value
                    }
                    'b' => {
                        let (value, _) = super::process_echo_escapes(next_arg());
                        value
                    }
                    'c' => next_arg().chars().next().map(String::from).unwrap_or_default(),
                    'd' | 'i' => parse_int(next_arg()).to_string(),
                    'u' => (parse_int(next_arg()) as u64).to_string(),
                    'o' => format!("{:o}", parse_int(next_arg())),
                    'x' => format!("{:x}", parse_int(next_arg())),
                    'X' => format!("{:X}", parse_int(next_arg())),
                    other => {
                        out.push('%');
                        out.push(other);
                        continue;
                    }
                };
                out.push_str(&pad(&rendered, width, left_align, zero_pad && !left_align));
            }
            other => {
                out.push(other);
                idx += 1;
            }
        }
    }
    used
}

fn parse_int(text: &str) -> i64 {
    let trimmed = text.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    trimmed.parse().unwrap_or(0)
}

fn pad(value: &str, width: usize, left_align: bool, zero_pad: bool) -> String {
    if value.chars().count() >= width {
        return value.to_string();
    }
    let fill = width - value.chars().count();
    if left_align {
        format!("{value}{}", " ".repeat(fill))
    } else if zero_pad {
        // Keep a leading sign ahead of the zeros.
        if let Some(rest) = value.strip_prefix('-') {
            format!("-{}{rest}", "0".repeat(fill))
        } else {
            format!("{}{value}", "0".repeat(fill))
        }
    } else {
        format!("{}{value}", " ".repeat(fill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut out = String::new();
        let mut rest: &[String] = &args;
        loop {
            let used = render(format, rest, &mut out);
            if used == 0 || used >= rest.len() {
                break;
            }
            rest = &rest[used..];
        }
        out
    }

    #[test]
    fn strings_and_integers() {
        assert_eq!(fmt("%s-%s\n", &["a", "b"]), "a-b\n");
        assert_eq!(fmt("%d\n", &["42"]), "42\n");
        assert_eq!(fmt("%x", &["255"]), "ff");
        assert_eq!(fmt("%o", &["8"]), "10");
        assert_eq!(fmt("%c", &["hello"]), "h");
    }

    #[test]
    fn widths_and_alignment() {
        assert_eq!(fmt("%5d", &["42"]), "   42");
        assert_eq!(fmt("%-5d|", &["42"]), "42   |");
        assert_eq!(fmt("%05d", &["42"]), "00042");
        assert_eq!(fmt("%05d", &["-42"]), "-0042");
        assert_eq!(fmt("%.3s", &["abcdef"]), "abc");
    }

    #[test]
    fn format_reuses_for_extra_args() {
        assert_eq!(fmt("%s\n", &["a", "b", "c"]), "a\nb\nc\n");
    }

    #[test]
    fn escapes_and_percent() {
        assert_eq!(fmt("a\\tb", &[]), "a\tb");
        assert_eq!(fmt("100%%", &[]), "100%");
        assert_eq!(fmt("%d", &["nope"]), "0");
    }
}
