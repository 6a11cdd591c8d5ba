//! The shell lexer.
//!
//! Turns a command string into tokens: words with their expansion
//! markers, operators, redirections (heredoc bodies collected at the
//! following newline) and array assignments. Scalar `NAME=VALUE`
//! assignments stay plain words; the parser reclassifies them by
//! position, as the grammar demands.

use crate::ast::{AssignValue, Assignment, Redirect, RedirKind, RedirTarget};
use crate::error::SyntaxError;
use crate::word::{ParamExp, ParamOp, Word, WordPart};

/// Lexer output.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Word(Word),
    /// `NAME=( … )`: arrays need paren capture at lex time.
    ArrayAssign(Assignment),
    Redir(Redirect),
    Op(Op),
    /// `(( … ))` in command position.
    ArithCmd(String),
    Newline,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Pipe,
    AndIf,
    OrIf,
    Semi,
    DSemi,
    Amp,
    LParen,
    RParen,
}

struct PendingHeredoc {
    token_idx: usize,
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
    /// Inside `[[ … ]]`: operator characters lex as word text.
    in_cond: bool,
}

pub fn lex(input: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(input).run()
}

/// Lexes a raw fragment (a `${…:-word}` operand) as one word, with no
/// operator or whitespace splitting.
pub fn lex_word_text(input: &str) -> Result<Word, SyntaxError> {
    let mut lexer = Lexer::new(input);
    lexer.read_word(true)
}

/// Lexes an unquoted heredoc body: `$…` and backquotes expand, quote
/// characters stay literal.
pub fn lex_heredoc(body: &str) -> Result<Word, SyntaxError> {
    let mut lexer = Lexer::new(body);
    let mut parts = Vec::new();
    let mut literal = String::new();
    while let Some(c) = lexer.peek() {
        match c {
            '\\' if matches!(lexer.peek_at(1), Some('$' | '`' | '\\')) => {
                lexer.pos += 1;
                literal.push(lexer.bump().expect("escaped char"));
            }
            '$' => {
                lexer.pos += 1;
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(lexer.read_dollar()?);
            }
            '`' => {
                lexer.pos += 1;
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(lexer.read_backquote()?);
            }
            other => {
                literal.push(other);
                lexer.pos += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(WordPart::Literal(literal));
    }
    // The body is quoted context: expansions run, splitting does not.
    Ok(Word {
        parts: vec![WordPart::DoubleQuoted(parts)],
    })
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
            in_cond: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            self.skip_blanks();
            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    self.collect_heredocs();
                    self.tokens.push(Token::Newline);
                }
                '|' | '&' | ';' | '(' | ')' if !self.in_cond => self.lex_operator()?,
                '<' | '>' if !self.in_cond => self.lex_redirect(None)?,
                c if c.is_ascii_digit() && !self.in_cond && self.fd_prefix().is_some() => {
                    let (fd, digits) = self.fd_prefix().expect("checked");
                    self.pos += digits;
                    self.lex_redirect(Some(fd))?;
                }
                _ => self.lex_word_token()?,
            }
        }
        self.collect_heredocs();
        Ok(self.tokens)
    }

    /// `2>`-style prefix: digits immediately followed by a redirect char.
    fn fd_prefix(&self) -> Option<(u32, usize)> {
        let mut idx = 0;
        while self
            .peek_at(idx)
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            idx += 1;
        }
        if idx == 0 {
            return None;
        }
        match self.peek_at(idx) {
            Some('<') | Some('>') => {
                let digits: String = self.chars[self.pos..self.pos + idx].iter().collect();
                digits.parse().ok().map(|fd| (fd, idx))
            }
            _ => None,
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    self.pos += 1;
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_operator(&mut self) -> Result<(), SyntaxError> {
        let op = match self.bump().expect("caller peeked") {
            '|' => {
                if self.eat('|') {
                    Op::OrIf
                } else {
                    Op::Pipe
                }
            }
            '&' => {
                if self.eat('&') {
                    Op::AndIf
                } else {
                    Op::Amp
                }
            }
            ';' => {
                if self.eat(';') {
                    Op::DSemi
                } else {
                    Op::Semi
                }
            }
            '(' => {
                if self.peek() == Some('(') {
                    if let Some(content) = self.try_arith_command() {
                        self.tokens.push(Token::ArithCmd(content));
                        return Ok(());
                    }
                }
                Op::LParen
            }
            ')' => Op::RParen,
            other => return Err(SyntaxError::new(format!("unexpected `{other}`"))),
        };
        self.tokens.push(Token::Op(op));
        Ok(())
    }

    /// Called with `pos` on the second `(` of `((`. Scans for the
    /// balancing `))`; backs off to a plain subshell paren when the
    /// closer is absent.
    fn try_arith_command(&mut self) -> Option<String> {
        let start = self.pos + 1;
        let mut idx = start;
        let mut depth = 0usize;
        while idx < self.chars.len() {
            match self.chars[idx] {
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        if self.chars.get(idx + 1) == Some(&')') {
                            let content: String = self.chars[start..idx].iter().collect();
                            self.pos = idx + 2;
                            return Some(content);
                        }
                        return None;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            idx += 1;
        }
        None
    }

    fn lex_redirect(&mut self, fd: Option<u32>) -> Result<(), SyntaxError> {
        let kind = match self.bump().expect("caller peeked") {
            '<' => {
                if self.eat('<') {
                    if self.eat('<') {
                        RedirKind::HereString
                    } else if self.eat('-') {
                        RedirKind::HereDoc { strip_tabs: true }
                    } else {
                        RedirKind::HereDoc { strip_tabs: false }
                    }
                } else if self.eat('&') {
                    RedirKind::DupIn
                } else {
                    RedirKind::In
                }
            }
            '>' => {
                if self.eat('>') {
                    RedirKind::Append
                } else if self.eat('|') {
                    RedirKind::OutClobber
                } else if self.eat('&') {
                    RedirKind::DupOut
                } else {
                    RedirKind::Out
                }
            }
            other => return Err(SyntaxError::new(format!("unexpected `{other}`"))),
        };
        self.skip_blanks();

        match kind {
            RedirKind::DupIn | RedirKind::DupOut => {
                let mut digits = String::new();
                while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    digits.push(self.bump().expect("digit"));
                }
                let target = digits
                    .parse()
                    .map_err(|_| SyntaxError::new("expected fd number after `>&`"))?;
                self.tokens.push(Token::Redir(Redirect {
                    fd,
                    kind,
                    target: RedirTarget::Fd(target),
                }));
            }
            RedirKind::HereDoc { strip_tabs } => {
                let delim_word = self.read_word(false)?;
                let (delimiter, quoted) = heredoc_delimiter(&delim_word)
                    .ok_or_else(|| SyntaxError::new("missing heredoc delimiter"))?;
                self.tokens.push(Token::Redir(Redirect {
                    fd,
                    kind,
                    target: RedirTarget::Heredoc {
                        body: String::new(),
                        quoted,
                    },
                }));
                self.pending_heredocs.push(PendingHeredoc {
                    token_idx: self.tokens.len() - 1,
                    delimiter,
                    strip_tabs,
                    quoted,
                });
            }
            _ => {
                let word = self.read_word(false)?;
                if word.is_empty() {
                    return Err(SyntaxError::new("missing redirect target"));
                }
                self.tokens.push(Token::Redir(Redirect {
                    fd,
                    kind,
                    target: RedirTarget::Word(word),
                }));
            }
        }
        Ok(())
    }

    /// Consumes heredoc bodies from the lines that follow the command.
    fn collect_heredocs(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let mut body = String::new();
            loop {
                if self.pos >= self.chars.len() {
                    break;
                }
                let line_start = self.pos;
                while !matches!(self.peek(), None | Some('\n')) {
                    self.pos += 1;
                }
                let line: String = self.chars[line_start..self.pos].iter().collect();
                self.eat('\n');
                let stripped = if heredoc.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if stripped == heredoc.delimiter {
                    break;
                }
                body.push_str(stripped);
                body.push('\n');
            }
            if let Token::Redir(redir) = &mut self.tokens[heredoc.token_idx] {
                redir.target = RedirTarget::Heredoc {
                    body,
                    quoted: heredoc.quoted,
                };
            }
        }
    }

    fn lex_word_token(&mut self) -> Result<(), SyntaxError> {
        if let Some(assign) = self.try_array_assignment()? {
            self.tokens.push(Token::ArrayAssign(assign));
            return Ok(());
        }
        let word = self.read_word(false)?;
        if word.is_empty() {
            return Err(SyntaxError::new("empty word"));
        }
        match word.as_literal() {
            Some("[[") => self.in_cond = true,
            Some("]]") => self.in_cond = false,
            _ => {}
        }
        self.tokens.push(Token::Word(word));
        Ok(())
    }

    /// `NAME=( … )` / `NAME+=( … )`: elements are whitespace-separated
    /// words, newlines allowed.
    fn try_array_assignment(&mut self) -> Result<Option<Assignment>, SyntaxError> {
        let start = self.pos;
        let mut idx = self.pos;
        if !self.chars.get(idx).copied().map(is_name_start).unwrap_or(false) {
            return Ok(None);
        }
        while self.chars.get(idx).copied().map(is_name_char).unwrap_or(false) {
            idx += 1;
        }
        let name: String = self.chars[self.pos..idx].iter().collect();
        let append = self.chars.get(idx) == Some(&'+');
        if append {
            idx += 1;
        }
        if self.chars.get(idx) != Some(&'=') || self.chars.get(idx + 1) != Some(&'(') {
            return Ok(None);
        }
        self.pos = idx + 2;
        let mut elements = Vec::new();
        loop {
            self.skip_blanks();
            match self.peek() {
                Some('\n') => {
                    self.pos += 1;
                }
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => elements.push(self.read_word(false)?),
                None => {
                    self.pos = start;
                    return Err(SyntaxError::new("unterminated array assignment"));
                }
            }
        }
        Ok(Some(Assignment {
            name,
            index: None,
            value: AssignValue::Array(elements),
            append,
        }))
    }

    /// Reads one word. With `raw` set, nothing terminates the word but
    /// end of input (used for expansion operands).
    fn read_word(&mut self, raw: bool) -> Result<Word, SyntaxError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();

        macro_rules! flush {
            () => {
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
            };
        }

        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\n' if !raw => break,
                '|' | '&' | ';' | '(' | ')' | '<' | '>' if !raw && !self.in_cond => break,
                '\'' => {
                    self.pos += 1;
                    flush!();
                    let mut quoted = String::new();
                    loop {
                        match self.bump() {
                            Some('\'') => break,
                            Some(other) => quoted.push(other),
                            None => return Err(SyntaxError::new("unterminated single quote")),
                        }
                    }
                    parts.push(WordPart::SingleQuoted(quoted));
                }
                '"' => {
                    self.pos += 1;
                    flush!();
                    parts.push(self.read_double_quoted()?);
                }
                '\\' => {
                    self.pos += 1;
                    match self.bump() {
                        Some('\n') => {}
                        Some(escaped) => {
                            flush!();
                            parts.push(WordPart::SingleQuoted(escaped.to_string()));
                        }
                        None => literal.push('\\'),
                    }
                }
                '$' => {
                    self.pos += 1;
                    flush!();
                    parts.push(self.read_dollar()?);
                }
                '`' => {
                    self.pos += 1;
                    flush!();
                    parts.push(self.read_backquote()?);
                }
                other => {
                    literal.push(other);
                    self.pos += 1;
                }
            }
        }
        flush!();
        Ok(Word { parts })
    }

    fn read_double_quoted(&mut self) -> Result<WordPart, SyntaxError> {
        let mut inner: Vec<WordPart> = Vec::new();
        let mut literal = String::new();
        loop {
            match self.peek() {
                None => return Err(SyntaxError::new("unterminated double quote")),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.bump() {
                        Some('\n') => {}
                        Some(c @ ('$' | '`' | '"' | '\\')) => literal.push(c),
                        Some(other) => {
                            literal.push('\\');
                            literal.push(other);
                        }
                        None => return Err(SyntaxError::new("unterminated double quote")),
                    }
                }
                Some('$') => {
                    self.pos += 1;
                    if !literal.is_empty() {
                        inner.push(WordPart::Literal(std::mem::take(&mut literal)));
                    }
                    inner.push(self.read_dollar()?);
                }
                Some('`') => {
                    self.pos += 1;
                    if !literal.is_empty() {
                        inner.push(WordPart::Literal(std::mem::take(&mut literal)));
                    }
                    inner.push(self.read_backquote()?);
                }
                Some(other) => {
                    literal.push(other);
                    self.pos += 1;
                }
            }
        }
        if !literal.is_empty() {
            inner.push(WordPart::Literal(literal));
        }
        Ok(WordPart::DoubleQuoted(inner))
    }

    fn read_backquote(&mut self) -> Result<WordPart, SyntaxError> {
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('`' | '$' | '\\')) => content.push(c),
                    Some(other) => {
                        content.push('\\');
                        content.push(other);
                    }
                    None => return Err(SyntaxError::new("unterminated backquote")),
                },
                Some(other) => content.push(other),
                None => return Err(SyntaxError::new("unterminated backquote")),
            }
        }
        Ok(WordPart::Backquote(content))
    }

    /// `pos` sits just past a `$`.
    fn read_dollar(&mut self) -> Result<WordPart, SyntaxError> {
        match self.peek() {
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    self.pos += 2;
                    let content = self.scan_arith_close()?;
                    Ok(WordPart::Arith(content))
                } else {
                    self.pos += 1;
                    let content = self.scan_paren_close()?;
                    Ok(WordPart::CmdSub(content))
                }
            }
            Some('{') => {
                self.pos += 1;
                let content = self.scan_brace_close()?;
                parse_param_body(&content).map(WordPart::Param)
            }
            Some(c) if is_name_start(c) => {
                let start = self.pos;
                while self.peek().map(is_name_char).unwrap_or(false) {
                    self.pos += 1;
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                Ok(WordPart::Param(ParamExp::plain(name)))
            }
            Some(c) if c.is_ascii_digit() => {
                self.pos += 1;
                Ok(WordPart::Param(ParamExp::plain(c.to_string())))
            }
            Some(c @ ('?' | '#' | '@' | '*' | '$' | '!')) => {
                self.pos += 1;
                Ok(WordPart::Param(ParamExp::plain(c.to_string())))
            }
            _ => Ok(WordPart::Literal("$".to_string())),
        }
    }

    /// After `$((`: scans to the balancing `))`.
    fn scan_arith_close(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        if self.peek_at(1) == Some(')') {
                            let content: String = self.chars[start..self.pos].iter().collect();
                            self.pos += 2;
                            return Ok(content);
                        }
                        return Err(SyntaxError::new("expected `))` closing arithmetic"));
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(SyntaxError::new("unterminated arithmetic expansion"))
    }

    /// After `$(`: scans to the matching `)`, skipping quoted spans.
    fn scan_paren_close(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.pos += 1;
                }
                '\'' => {
                    self.pos += 1;
                    while !matches!(self.peek(), None | Some('\'')) {
                        self.pos += 1;
                    }
                }
                '"' => {
                    self.pos += 1;
                    while let Some(inner) = self.peek() {
                        if inner == '\\' {
                            self.pos += 1;
                        } else if inner == '"' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        let content: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(content);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(SyntaxError::new("unterminated command substitution"))
    }

    /// After `${`: scans to the matching `}`.
    fn scan_brace_close(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.pos += 1;
                }
                '{' => depth += 1,
                '}' => {
                    if depth == 0 {
                        let content: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(content);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(SyntaxError::new("unterminated `${`"))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Extracts a heredoc delimiter: its literal spelling plus whether any
/// part was quoted (which suppresses expansion of the body).
fn heredoc_delimiter(word: &Word) -> Option<(String, bool)> {
    if word.is_empty() {
        return None;
    }
    let mut text = String::new();
    let mut quoted = false;
    for part in &word.parts {
        match part {
            WordPart::Literal(s) => text.push_str(s),
            WordPart::SingleQuoted(s) => {
                text.push_str(s);
                quoted = true;
            }
            WordPart::DoubleQuoted(inner) => {
                quoted = true;
                for p in inner {
                    if let WordPart::Literal(s) = p {
                        text.push_str(s);
                    }
                }
            }
            _ => return None,
        }
    }
    Some((text, quoted))
}

/// Parses the inside of `${ … }`.
fn parse_param_body(raw: &str) -> Result<ParamExp, SyntaxError> {
    let chars: Vec<char> = raw.chars().collect();
    if chars.is_empty() {
        return Err(SyntaxError::new("bad substitution: `${}`"));
    }

    // ${#NAME} and ${#a[@]}
    if chars[0] == '#' && chars.len() > 1 {
        let rest: String = chars[1..].iter().collect();
        let (name, index) = split_subscript(&rest)
            .ok_or_else(|| SyntaxError::new(format!("bad substitution: `${{{raw}}}`")))?;
        return Ok(ParamExp {
            name,
            index,
            op: ParamOp::Length,
        });
    }

    // Name: a regular identifier, digits, or one special character.
    let mut idx = 0;
    if is_name_start(chars[0]) {
        while idx < chars.len() && is_name_char(chars[idx]) {
            idx += 1;
        }
    } else if chars[0].is_ascii_digit() {
        while idx < chars.len() && chars[idx].is_ascii_digit() {
            idx += 1;
        }
    } else if matches!(chars[0], '?' | '#' | '@' | '*' | '$' | '!') {
        idx = 1;
    } else {
        return Err(SyntaxError::new(format!("bad substitution: `${{{raw}}}`")));
    }
    let name: String = chars[..idx].iter().collect();

    // Optional subscript.
    let mut index = None;
    if idx < chars.len() && chars[idx] == '[' {
        let close = find_matching_bracket(&chars, idx)
            .ok_or_else(|| SyntaxError::new(format!("bad substitution: `${{{raw}}}`")))?;
        index = Some(chars[idx + 1..close].iter().collect());
        idx = close + 1;
    }

    let rest: String = chars[idx..].iter().collect();
    let op = parse_param_op(&rest, raw)?;
    Ok(ParamExp { name, index, op })
}

fn parse_param_op(rest: &str, raw: &str) -> Result<ParamOp, SyntaxError> {
    let word = |s: &str| lex_word_text(s);
    Ok(if rest.is_empty() {
        ParamOp::Plain
    } else if let Some(s) = rest.strip_prefix(":-") {
        ParamOp::Default { word: word(s)?, colon: true }
    } else if let Some(s) = rest.strip_prefix(":=") {
        ParamOp::Assign { word: word(s)?, colon: true }
    } else if let Some(s) = rest.strip_prefix(":+") {
        ParamOp::Alt { word: word(s)?, colon: true }
    } else if let Some(s) = rest.strip_prefix(":?") {
        ParamOp::Error { word: word(s)?, colon: true }
    } else if let Some(s) = rest.strip_prefix("##") {
        ParamOp::RemovePrefix { pattern: word(s)?, longest: true }
    } else if let Some(s) = rest.strip_prefix('#') {
        ParamOp::RemovePrefix { pattern: word(s)?, longest: false }
    } else if let Some(s) = rest.strip_prefix("%%") {
        ParamOp::RemoveSuffix { pattern: word(s)?, longest: true }
    } else if let Some(s) = rest.strip_prefix('%') {
        ParamOp::RemoveSuffix { pattern: word(s)?, longest: false }
    } else if let Some(s) = rest.strip_prefix("//") {
        let (pattern, replacement) = split_replacement(s);
        ParamOp::Replace {
            pattern: word(&pattern)?,
            replacement: word(&replacement)?,
            all: true,
        }
    } else if let Some(s) = rest.strip_prefix('/') {
        let (pattern, replacement) = split_replacement(s);
        ParamOp::Replace {
            pattern: word(&pattern)?,
            replacement: word(&replacement)?,
            all: false,
        }
    } else if let Some(s) = rest.strip_prefix('-') {
        ParamOp::Default { word: word(s)?, colon: false }
    } else if let Some(s) = rest.strip_prefix('=') {
        ParamOp::Assign { word: word(s)?, colon: false }
    } else if let Some(s) = rest.strip_prefix('+') {
        ParamOp::Alt { word: word(s)?, colon: false }
    } else if let Some(s) = rest.strip_prefix('?') {
        ParamOp::Error { word: word(s)?, colon: false }
    } else {
        return Err(SyntaxError::new(format!("bad substitution: `${{{raw}}}`")));
    })
}

/// Splits `pat/rep` at the first unescaped slash; no slash means an
/// empty replacement.
fn split_replacement(s: &str) -> (String, String) {
    let chars: Vec<char> = s.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        match chars[idx] {
            '\\' => idx += 2,
            '/' => {
                return (
                    chars[..idx].iter().collect(),
                    chars[idx + 1..].iter().collect(),
                )
            }
            _ => idx += 1,
        }
    }
    (s.to_string(), String::new())
}

/// Splits `name[subscript]` into its halves; `None` on malformed input.
fn split_subscript(s: &str) -> Option<(String, Option<String>)> {
    match s.find('[') {
        None => Some((s.to_string(), None)),
        Some(open) => {
            if !s.ends_with(']') {
                return None;
            }
            Some((
                s[..open].to_string(),
                Some(s[open + 1..s.len() - 1].to_string()),
            ))
        }
    }
}

fn find_matching_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in chars.iter().enumerate().skip(open + 1) {
        match c {
            '[' => depth += 1,
            ']' => {
                if depth == 0 {
                    return Some(idx);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}
