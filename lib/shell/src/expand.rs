//! Word expansion.
//!
//! Fixed order per word: tilde, parameter expansion, command
//! substitution, arithmetic expansion, brace expansion, IFS field
//! splitting, pathname globs. Quoting survives into the fragment stream
//! so splitting and globbing know which spans to leave alone.

use crate::arith::{self, ArithScope};
use crate::error::ShellError;
use crate::exec::{Executor, Flow};
use crate::lexer;
use crate::parser;
use crate::pattern::{expand_glob, fnmatch, has_glob_chars};
use crate::stream::{Io, Stream};
use crate::word::{ParamExp, ParamOp, Word, WordPart};
use wasmbox_wasi::{FdTarget, OutputBuffer};

/// Maximum nesting of command substitutions.
pub const MAX_SUBST_DEPTH: u32 = 50;

/// One expanded span, before field splitting.
#[derive(Clone, Debug)]
pub(crate) enum Frag {
    Text { text: String, quoted: bool },
    /// Field boundary from `"$@"` and friends.
    Break,
}

impl Frag {
    fn quoted(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            quoted: true,
        }
    }

    fn bare(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            quoted: false,
        }
    }
}

/// A field being assembled: raw text plus a glob pattern where quoted
/// spans are escaped.
#[derive(Default)]
struct Field {
    raw: String,
    pattern: String,
}

fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Executor {
    /// Full expansion of a word list into fields.
    pub(crate) async fn expand_words(&mut self, words: &[Word], io: &Io) -> Result<Vec<String>, Flow> {
        let mut fields = Vec::new();
        for word in words {
            fields.extend(self.expand_word(word, io).await?);
        }
        Ok(fields)
    }

    /// Expansion without field splitting or globs (redirect targets,
    /// `case` subjects, assignment values). Multiple fields join with
    /// spaces, the `"$@"`-in-scalar-context rule.
    pub(crate) async fn expand_single(&mut self, word: &Word, io: &Io) -> Result<String, Flow> {
        let frags = self.word_frags(word, io).await?;
        let mut out = String::new();
        let mut first = true;
        for frag in frags {
            match frag {
                Frag::Text { text, .. } => out.push_str(&text),
                Frag::Break => {
                    if !first {
                        out.push(' ');
                    }
                }
            }
            first = false;
        }
        Ok(out)
    }

    /// Expansion into a match pattern: quoted spans lose their special
    /// meaning (`case "$x" in "$lit") …`).
    pub(crate) async fn expand_pattern(&mut self, word: &Word, io: &Io) -> Result<String, Flow> {
        let frags = self.word_frags(word, io).await?;
        let mut out = String::new();
        for frag in frags {
            if let Frag::Text { text, quoted } = frag {
                if quoted {
                    out.push_str(&escape_pattern(&text));
                } else {
                    out.push_str(&text);
                }
            }
        }
        Ok(out)
    }

    async fn expand_word(&mut self, word: &Word, io: &Io) -> Result<Vec<String>, Flow> {
        let frags = self.word_frags(word, io).await?;

        // Brace expansion applies to fully unquoted words only.
        let all_bare = frags
            .iter()
            .all(|f| matches!(f, Frag::Text { quoted: false, .. }));
        if all_bare {
            let joined: String = frags
                .iter()
                .map(|f| match f {
                    Frag::Text { text, .. } => text.as_str(),
                    Frag::Break => "",
                })
                .collect();
            if joined.contains('{') {
                let mut fields = Vec::new();
                for candidate in brace_expand(&joined) {
                    fields.extend(self.split_and_glob(vec![Frag::bare(candidate)]));
                }
                return Ok(fields);
            }
        }
        Ok(self.split_and_glob(frags))
    }

    /// IFS field splitting followed by pathname expansion.
    fn split_and_glob(&mut self, frags: Vec<Frag>) -> Vec<String> {
        let ifs = self.state.ifs();
        let mut fields: Vec<Field> = Vec::new();
        let mut current = Field::default();
        let mut started = false;

        let mut close = |fields: &mut Vec<Field>, current: &mut Field| {
            fields.push(std::mem::take(current));
        };

        for frag in frags {
            match frag {
                Frag::Break => {
                    if started {
                        close(&mut fields, &mut current);
                        started = false;
                    }
                }
                Frag::Text { text, quoted: true } => {
                    current.raw.push_str(&text);
                    current.pattern.push_str(&escape_pattern(&text));
                    started = true;
                }
                Frag::Text {
                    text,
                    quoted: false,
                } => {
                    let mut chars = text.chars().peekable();
                    while chars.peek().is_some() {
                        // A maximal run of IFS characters is one
                        // delimiter per non-whitespace char, min one.
                        if ifs.contains(*chars.peek().expect("peeked")) {
                            let mut non_ws = 0u32;
                            while let Some(&c) = chars.peek() {
                                if !ifs.contains(c) {
                                    break;
                                }
                                if !c.is_whitespace() {
                                    non_ws += 1;
                                }
                                chars.next();
                            }
                            if non_ws == 0 {
                                if started {
                                    close(&mut fields, &mut current);
                                    started = false;
                                }
                            } else {
                                close(&mut fields, &mut current);
                                started = false;
                                for _ in 1..non_ws {
                                    fields.push(Field::default());
                                }
                            }
                        } else {
                            let c = chars.next().expect("peeked");
                            current.raw.push(c);
                            current.pattern.push(c);
                            started = true;
                        }
                    }
                }
            }
        }
        if started {
            fields.push(current);
        }

        let pwd = self.state.pwd();
        let mut out = Vec::new();
        for field in fields {
            if has_glob_chars(&field.pattern) {
                let mut vfs = self.vfs.lock().unwrap();
                let matches = expand_glob(&mut vfs, &pwd, &field.pattern);
                drop(vfs);
                if matches.is_empty() {
                    // Unmatched globs pass through literally.
                    out.push(field.raw);
                } else {
                    out.extend(matches);
                }
            } else {
                out.push(field.raw);
            }
        }
        out
    }

    pub(crate) fn word_frags<'a>(
        &'a mut self,
        word: &'a Word,
        io: &'a Io,
    ) -> futures::future::LocalBoxFuture<'a, Result<Vec<Frag>, Flow>> {
        Box::pin(async move {
            let mut frags = Vec::new();
            for (idx, part) in word.parts.iter().enumerate() {
                match part {
                    WordPart::Literal(text) => {
                        let text = if idx == 0 {
                            self.tilde_expand(text)
                        } else {
                            text.clone()
                        };
                        frags.push(Frag::bare(text));
                    }
                    WordPart::SingleQuoted(text) => frags.push(Frag::quoted(text.clone())),
                    WordPart::DoubleQuoted(inner) => {
                        for part in inner {
                            match part {
                                WordPart::Literal(text) => frags.push(Frag::quoted(text.clone())),
                                WordPart::Param(pexp) => {
                                    self.param_frags(pexp, true, io, &mut frags).await?
                                }
                                WordPart::CmdSub(src) | WordPart::Backquote(src) => {
                                    let output = self.command_substitute(src, io).await?;
                                    frags.push(Frag::quoted(output));
                                }
                                WordPart::Arith(expr) => {
                                    let value = self.arith_eval(expr, io).await?;
                                    frags.push(Frag::quoted(value.to_string()));
                                }
                                _ => {}
                            }
                        }
                        // An empty "" still produces a field.
                        if inner.is_empty() {
                            frags.push(Frag::quoted(String::new()));
                        }
                    }
                    WordPart::Param(pexp) => self.param_frags(pexp, false, io, &mut frags).await?,
                    WordPart::CmdSub(src) | WordPart::Backquote(src) => {
                        let output = self.command_substitute(src, io).await?;
                        frags.push(Frag::bare(output));
                    }
                    WordPart::Arith(expr) => {
                        let value = self.arith_eval(expr, io).await?;
                        frags.push(Frag::bare(value.to_string()));
                    }
                }
            }
            Ok(frags)
        })
    }

    fn tilde_expand(&self, text: &str) -> String {
        if let Some(rest) = text.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with('/') {
                let home = self.state.get_var("HOME").unwrap_or("/home/user");
                return format!("{home}{rest}");
            }
        }
        text.to_string()
    }

    /// Expands one parameter into fragments. `quoted` reflects `"$x"`
    /// context: values stay one field (except `"$@"`).
    async fn param_frags(
        &mut self,
        pexp: &ParamExp,
        quoted: bool,
        io: &Io,
        out: &mut Vec<Frag>,
    ) -> Result<(), Flow> {
        let wrap = |text: String| {
            if quoted {
                Frag::quoted(text)
            } else {
                Frag::bare(text)
            }
        };

        // Positional/special multi-value parameters first.
        if pexp.index.as_deref() == Some("@") || pexp.index.as_deref() == Some("*")
            || pexp.name == "@"
            || pexp.name == "*"
        {
            let values: Vec<String> = if pexp.name == "@" || pexp.name == "*" {
                self.state.positional.clone()
            } else if let Some(values) = self.state.arrays.get(&pexp.name) {
                values.clone()
            } else if let Some(map) = self.state.assoc.get(&pexp.name) {
                map.values().cloned().collect()
            } else if let Some(scalar) = self.state.get_var(&pexp.name) {
                vec![scalar.to_string()]
            } else {
                Vec::new()
            };
            match &pexp.op {
                ParamOp::Length => {
                    out.push(wrap(values.len().to_string()));
                }
                _ => {
                    let star = pexp.name == "*" || pexp.index.as_deref() == Some("*");
                    if quoted && star {
                        let sep = self.state.ifs().chars().next().unwrap_or(' ').to_string();
                        out.push(Frag::quoted(values.join(&sep)));
                    } else if quoted {
                        for (idx, value) in values.iter().enumerate() {
                            if idx > 0 {
                                out.push(Frag::Break);
                            }
                            out.push(Frag::quoted(value.clone()));
                        }
                    } else {
                        out.push(Frag::bare(values.join(" ")));
                    }
                }
            }
            return Ok(());
        }

        let current = self.lookup_param(pexp, io).await?;

        let value = match &pexp.op {
            ParamOp::Plain => match current {
                Some(value) => value,
                None => {
                    if self.state.options.nounset && !is_special_param(&pexp.name) {
                        self.write_stderr(io, &format!("{}: unbound variable\n", pexp.name))
                            .await;
                        return Err(Flow::Exit(1));
                    }
                    String::new()
                }
            },
            ParamOp::Length => current.unwrap_or_default().chars().count().to_string(),
            ParamOp::Default { word, colon } => {
                let unset = current.is_none() || (*colon && current.as_deref() == Some(""));
                if unset {
                    self.expand_single(word, io).await?
                } else {
                    current.unwrap_or_default()
                }
            }
            ParamOp::Assign { word, colon } => {
                let unset = current.is_none() || (*colon && current.as_deref() == Some(""));
                if unset {
                    let fallback = self.expand_single(word, io).await?;
                    self.state.set_var(&pexp.name, fallback.clone());
                    fallback
                } else {
                    current.unwrap_or_default()
                }
            }
            ParamOp::Alt { word, colon } => {
                let set = match (&current, colon) {
                    (None, _) => false,
                    (Some(value), true) => !value.is_empty(),
                    (Some(_), false) => true,
                };
                if set {
                    self.expand_single(word, io).await?
                } else {
                    String::new()
                }
            }
            ParamOp::Error { word, colon } => {
                let unset = current.is_none() || (*colon && current.as_deref() == Some(""));
                if unset {
                    let message = self.expand_single(word, io).await?;
                    let message = if message.is_empty() {
                        "parameter null or not set".to_string()
                    } else {
                        message
                    };
                    self.write_stderr(io, &format!("{}: {message}\n", pexp.name)).await;
                    return Err(Flow::Exit(1));
                }
                current.unwrap_or_default()
            }
            ParamOp::RemovePrefix { pattern, longest } => {
                let value = current.unwrap_or_default();
                let pattern = self.expand_pattern(pattern, io).await?;
                remove_prefix(&value, &pattern, *longest)
            }
            ParamOp::RemoveSuffix { pattern, longest } => {
                let value = current.unwrap_or_default();
                let pattern = self.expand_pattern(pattern, io).await?;
                remove_suffix(&value, &pattern, *longest)
            }
            ParamOp::Replace {
                pattern,
                replacement,
                all,
            } => {
                let value = current.unwrap_or_default();
                let pattern = self.expand_pattern(pattern, io).await?;
                let replacement = self.expand_single(replacement, io).await?;
                replace_pattern(&value, &pattern, &replacement, *all)
            }
        };
        out.push(wrap(value));
        Ok(())
    }

    /// Resolves a parameter's current value (no operator applied).
    async fn lookup_param(&mut self, pexp: &ParamExp, io: &Io) -> Result<Option<String>, Flow> {
        if let Some(index) = &pexp.index {
            if self.state.assoc.contains_key(&pexp.name) {
                let key_word = lexer::lex_word_text(index).map_err(|e| self.syntax_fail(e))?;
                let key = self.expand_single(&key_word, io).await?;
                return Ok(self.state.assoc.get(&pexp.name).and_then(|m| m.get(&key).cloned()));
            }
            let idx = self.arith_eval(index, io).await?;
            let values = self.state.arrays.get(&pexp.name);
            return Ok(values.and_then(|v| {
                if idx < 0 {
                    None
                } else {
                    v.get(idx as usize).cloned()
                }
            }));
        }
        Ok(match pexp.name.as_str() {
            "?" => Some(self.state.last_status.to_string()),
            "#" => Some(self.state.positional.len().to_string()),
            "$" => Some("1".to_string()),
            "!" => self.state.last_bg_pid.map(|pid| pid.to_string()),
            "0" => Some(self.state.arg0.clone()),
            name if name.chars().all(|c| c.is_ascii_digit()) => {
                let n: usize = name.parse().map_err(|_| Flow::Fail(1))?;
                self.state.positional.get(n - 1).cloned()
            }
            name => {
                if let Some(value) = self.state.get_var(name) {
                    Some(value.to_string())
                } else if let Some(values) = self.state.arrays.get(name) {
                    // A bare array name reads element zero.
                    values.first().cloned()
                } else {
                    None
                }
            }
        })
    }

    /// Runs a command substitution, capturing stdout and stripping
    /// trailing newlines.
    pub(crate) async fn command_substitute(&mut self, src: &str, io: &Io) -> Result<String, Flow> {
        if self.subst_depth >= MAX_SUBST_DEPTH {
            self.write_stderr(io, "command substitution: nesting too deep\n").await;
            return Err(Flow::Fail(1));
        }
        let program = match parser::parse(src) {
            Ok(Some(program)) => program,
            Ok(None) => {
                self.state.last_status = 0;
                return Ok(String::new());
            }
            Err(err) => {
                self.write_stderr(io, &format!("{err}\n")).await;
                return Err(Flow::Fail(2));
            }
        };
        let capture = OutputBuffer::new(None);
        let sub_io = Io {
            stdin: io.stdin.clone(),
            stdout: Stream::Target(FdTarget::Buffer(capture.clone())),
            stderr: io.stderr.clone(),
        };
        self.subst_depth += 1;
        let result = self.exec(&program, &sub_io).await;
        self.subst_depth -= 1;
        let status = match result {
            Ok(status) => status,
            Err(Flow::Exit(code)) | Err(Flow::Fail(code)) | Err(Flow::Return(code)) => code,
            Err(flow @ Flow::Signal(_)) => return Err(flow),
            Err(Flow::Break(_)) | Err(Flow::Continue(_)) => 0,
        };
        self.state.last_status = status;
        let mut output = capture.into_string_lossy();
        while output.ends_with('\n') {
            output.pop();
        }
        Ok(output)
    }

    /// Arithmetic over the shell's scalar variables.
    pub(crate) async fn arith_eval(&mut self, expr: &str, io: &Io) -> Result<i64, Flow> {
        struct Scope<'a>(&'a mut crate::state::ShellState);
        impl ArithScope for Scope<'_> {
            fn get(&self, name: &str) -> i64 {
                self.0
                    .get_var(name)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0)
            }
            fn set(&mut self, name: &str, value: i64) {
                self.0.set_var(name, value.to_string());
            }
        }
        match arith::eval(expr, &mut Scope(&mut self.state)) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.write_stderr(io, &format!("{err}\n")).await;
                Err(Flow::Fail(1))
            }
        }
    }

    /// Expands an unquoted heredoc body.
    pub(crate) async fn expand_heredoc(&mut self, body: &str, io: &Io) -> Result<String, Flow> {
        let word = lexer::lex_heredoc(body).map_err(|e| self.syntax_fail(e))?;
        self.expand_single(&word, io).await
    }

    fn syntax_fail(&self, err: crate::error::SyntaxError) -> Flow {
        tracing::debug!(%err, "expansion syntax error");
        Flow::Fail(2)
    }
}

fn is_special_param(name: &str) -> bool {
    matches!(name, "?" | "#" | "@" | "*" | "$" | "!" | "0" | "-")
        || name.chars().all(|c| c.is_ascii_digit())
}

/// `${VAR#pat}` / `${VAR##pat}`.
fn remove_prefix(value: &str, pattern: &str, longest: bool) -> String {
    let chars: Vec<char> = value.chars().collect();
    let range: Vec<usize> = (0..=chars.len()).collect();
    let cuts: Box<dyn Iterator<Item = &usize>> = if longest {
        Box::new(range.iter().rev())
    } else {
        Box::new(range.iter())
    };
    for &cut in cuts {
        let prefix: String = chars[..cut].iter().collect();
        if fnmatch(pattern, &prefix) {
            return chars[cut..].iter().collect();
        }
    }
    value.to_string()
}

/// `${VAR%pat}` / `${VAR%%pat}`.
fn remove_suffix(value: &str, pattern: &str, longest: bool) -> String {
    let chars: Vec<char> = value.chars().collect();
    let range: Vec<usize> = (0..=chars.len()).collect();
    let cuts: Box<dyn Iterator<Item = &usize>> = if longest {
        Box::new(range.iter())
    } else {
        Box::new(range.iter().rev())
    };
    for &cut in cuts {
        let suffix: String = chars[cut..].iter().collect();
        if fnmatch(pattern, &suffix) {
            return chars[..cut].iter().collect();
        }
    }
    value.to_string()
}

/// `${VAR/pat/rep}` / `${VAR//pat/rep}`: longest match at each scan
/// position.
fn replace_pattern(value: &str, pattern: &str, replacement: &str, all: bool) -> String {
    if pattern.is_empty() {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut idx = 0;
    let mut replaced = false;
    while idx < chars.len() {
        if !replaced || all {
            let mut matched_end = None;
            for end in (idx..=chars.len()).rev() {
                let candidate: String = chars[idx..end].iter().collect();
                if fnmatch(pattern, &candidate) {
                    matched_end = Some(end);
                    break;
                }
            }
            if let Some(end) = matched_end {
                if end > idx {
                    out.push_str(replacement);
                    idx = end;
                    replaced = true;
                    continue;
                }
            }
        }
        out.push(chars[idx]);
        idx += 1;
    }
    out
}

/// String-level brace expansion: `{a,b}`, `{1..5}`, `{a..e}`. Applied
/// only to fully unquoted words.
pub(crate) fn brace_expand(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let Some((open, close)) = find_brace_pair(&chars) else {
        return vec![input.to_string()];
    };
    let prefix: String = chars[..open].iter().collect();
    let body: String = chars[open + 1..close].iter().collect();
    let suffix: String = chars[close + 1..].iter().collect();

    let alternatives = if let Some(range) = range_alternatives(&body) {
        range
    } else if body_has_top_level_comma(&body) {
        split_top_level_commas(&body)
    } else {
        return vec![input.to_string()];
    };

    let mut out = Vec::new();
    for alternative in alternatives {
        for expanded_alt in brace_expand(&alternative) {
            for expanded_suffix in brace_expand(&suffix) {
                out.push(format!("{prefix}{expanded_alt}{expanded_suffix}"));
            }
        }
    }
    out
}

fn find_brace_pair(chars: &[char]) -> Option<(usize, usize)> {
    let mut open = None;
    let mut depth = 0usize;
    for (idx, &c) in chars.iter().enumerate() {
        match c {
            '{' => {
                if open.is_none() {
                    open = Some(idx);
                    depth = 0;
                } else {
                    depth += 1;
                }
            }
            '}' => {
                if let Some(open_idx) = open {
                    if depth == 0 {
                        return Some((open_idx, idx));
                    }
                    depth -= 1;
                }
            }
            _ => {}
        }
    }
    None
}

fn body_has_top_level_comma(body: &str) -> bool {
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn split_top_level_commas(body: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                parts.last_mut().expect("non-empty").push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                parts.last_mut().expect("non-empty").push(c);
            }
            ',' if depth == 0 => parts.push(String::new()),
            _ => parts.last_mut().expect("non-empty").push(c),
        }
    }
    parts
}

/// `{1..5}`, `{05..10}`, `{a..e}`, descending allowed.
fn range_alternatives(body: &str) -> Option<Vec<String>> {
    let (lo, hi) = body.split_once("..")?;
    if let (Ok(a), Ok(b)) = (lo.parse::<i64>(), hi.parse::<i64>()) {
        let width = if lo.starts_with('0') || hi.starts_with('0') {
            lo.trim_start_matches('-').len().max(hi.trim_start_matches('-').len())
        } else {
            0
        };
        let mut out = Vec::new();
        let step: i64 = if a <= b { 1 } else { -1 };
        let mut value = a;
        loop {
            out.push(format!("{value:0width$}"));
            if value == b {
                break;
            }
            value += step;
        }
        return Some(out);
    }
    let (a, b) = (single_char(lo)?, single_char(hi)?);
    let (a, b) = (a as u32, b as u32);
    let step: i64 = if a <= b { 1 } else { -1 };
    let mut out = Vec::new();
    let mut value = a as i64;
    loop {
        out.push(char::from_u32(value as u32)?.to_string());
        if value == b as i64 {
            break;
        }
        value += step;
    }
    Some(out)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_lists_and_ranges() {
        assert_eq!(brace_expand("a{b,c}d"), vec!["abd", "acd"]);
        assert_eq!(brace_expand("{1..3}"), vec!["1", "2", "3"]);
        assert_eq!(brace_expand("{3..1}"), vec!["3", "2", "1"]);
        assert_eq!(brace_expand("{a..c}"), vec!["a", "b", "c"]);
        assert_eq!(brace_expand("{01..03}"), vec!["01", "02", "03"]);
        assert_eq!(brace_expand("x{a,b}{1,2}"), vec!["xa1", "xa2", "xb1", "xb2"]);
        assert_eq!(brace_expand("plain"), vec!["plain"]);
        assert_eq!(brace_expand("{nocommas}"), vec!["{nocommas}"]);
    }

    #[test]
    fn prefix_suffix_removal() {
        assert_eq!(remove_prefix("a/b/c", "*/", false), "b/c");
        assert_eq!(remove_prefix("a/b/c", "*/", true), "c");
        assert_eq!(remove_suffix("a.tar.gz", ".*", true), "a");
        assert_eq!(remove_suffix("a.tar.gz", ".*", false), "a.tar");
        assert_eq!(remove_prefix("abc", "xyz", true), "abc");
    }

    #[test]
    fn pattern_replacement() {
        assert_eq!(replace_pattern("aXbXc", "X", "-", false), "a-bXc");
        assert_eq!(replace_pattern("aXbXc", "X", "-", true), "a-b-c");
        assert_eq!(replace_pattern("hello", "l*o", "!", false), "he!");
        assert_eq!(replace_pattern("none", "zz", "-", true), "none");
    }
}
