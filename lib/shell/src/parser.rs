//! Recursive-descent parser: token stream to command tree.

use crate::ast::{Assignment, AssignValue, CaseItem, Command, ListOp, Redirect};
use crate::error::SyntaxError;
use crate::lexer::{lex, Op, Token};
use crate::word::{Word, WordPart};

const RESERVED: &[&str] = &[
    "if", "then", "else", "elif", "fi", "for", "in", "do", "done", "while", "until", "case",
    "esac", "function", "!", "{", "}", "[[", "]]",
];

/// Parses a whole program. `Ok(None)` means the input held no commands
/// (blank or comment-only).
pub fn parse(input: &str) -> Result<Option<Command>, SyntaxError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.skip_newlines();
    if parser.at_end() {
        return Ok(None);
    }
    let program = parser.parse_list(&[])?;
    parser.skip_newlines();
    if !parser.at_end() {
        return Err(SyntaxError::new(format!(
            "unexpected token near `{}`",
            parser.describe_current()
        )));
    }
    Ok(Some(program))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some(Token::Word(w)) => w.as_literal().unwrap_or("word").to_string(),
            Some(Token::Op(op)) => format!("{op:?}"),
            Some(Token::Newline) => "newline".to_string(),
            Some(Token::Redir(_)) => "redirection".to_string(),
            Some(Token::ArrayAssign(a)) => format!("{}=(…)", a.name),
            Some(Token::ArithCmd(_)) => "((".to_string(),
        }
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, ctx: &str) -> Result<(), SyntaxError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(SyntaxError::new(format!(
                "expected `{op:?}` in {ctx}, found `{}`",
                self.describe_current()
            )))
        }
    }

    /// The literal spelling of the next token if it is an unquoted word.
    fn peek_literal(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Word(w)) => w.as_literal(),
            _ => None,
        }
    }

    fn eat_reserved(&mut self, kw: &str) -> bool {
        if self.peek_literal() == Some(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_reserved(&mut self, kw: &str, ctx: &str) -> Result<(), SyntaxError> {
        if self.eat_reserved(kw) {
            Ok(())
        } else {
            Err(SyntaxError::new(format!(
                "expected `{kw}` to close {ctx}, found `{}`",
                self.describe_current()
            )))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn take_word(&mut self, ctx: &str) -> Result<Word, SyntaxError> {
        match self.peek() {
            Some(Token::Word(_)) => {
                let Some(Token::Word(word)) = self.tokens.get(self.pos).cloned() else {
                    unreachable!()
                };
                self.pos += 1;
                Ok(word)
            }
            _ => Err(SyntaxError::new(format!(
                "expected word in {ctx}, found `{}`",
                self.describe_current()
            ))),
        }
    }

    /// True when the next token ends a list in the current context.
    fn list_ends(&self, stop_words: &[&str]) -> bool {
        match self.peek() {
            None => true,
            Some(Token::Op(Op::RParen)) | Some(Token::Op(Op::DSemi)) => true,
            Some(Token::Word(w)) => w
                .as_literal()
                .map(|lit| stop_words.contains(&lit))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// `and_or ((';' | '&' | newline) and_or)*`, folded left into `Seq`.
    fn parse_list(&mut self, stop_words: &[&str]) -> Result<Command, SyntaxError> {
        self.skip_newlines();
        let mut acc: Option<Command> = None;
        loop {
            if self.list_ends(stop_words) {
                break;
            }
            let next = self.parse_and_or(stop_words)?;
            acc = Some(match acc {
                None => next,
                Some(left) => Command::List {
                    left: Box::new(left),
                    op: ListOp::Seq,
                    right: Box::new(next),
                },
            });
            // Separator: `;`, `&` (run as `;`), or newline(s).
            let mut separated = false;
            if self.eat_op(Op::Semi) || self.eat_op(Op::Amp) {
                separated = true;
            }
            if self.peek() == Some(&Token::Newline) {
                self.skip_newlines();
                separated = true;
            }
            if !separated {
                break;
            }
        }
        acc.ok_or_else(|| {
            SyntaxError::new(format!("expected command, found `{}`", self.describe_current()))
        })
    }

    fn parse_and_or(&mut self, stop_words: &[&str]) -> Result<Command, SyntaxError> {
        let mut left = self.parse_pipeline(stop_words)?;
        loop {
            let op = if self.eat_op(Op::AndIf) {
                ListOp::And
            } else if self.eat_op(Op::OrIf) {
                ListOp::Or
            } else {
                break;
            };
            self.skip_newlines();
            let right = self.parse_pipeline(stop_words)?;
            left = Command::List {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_pipeline(&mut self, stop_words: &[&str]) -> Result<Command, SyntaxError> {
        let negated = self.eat_reserved("!");
        let mut cmds = vec![self.parse_command(stop_words)?];
        while self.eat_op(Op::Pipe) {
            self.skip_newlines();
            cmds.push(self.parse_command(stop_words)?);
        }
        let pipeline = if cmds.len() == 1 {
            cmds.pop().expect("one command")
        } else {
            Command::Pipeline { cmds }
        };
        Ok(if negated {
            Command::Negate(Box::new(pipeline))
        } else {
            pipeline
        })
    }

    fn parse_command(&mut self, stop_words: &[&str]) -> Result<Command, SyntaxError> {
        let cmd = match self.peek() {
            Some(Token::ArithCmd(_)) => {
                let Some(Token::ArithCmd(expr)) = self.tokens.get(self.pos).cloned() else {
                    unreachable!()
                };
                self.pos += 1;
                Command::ArithCommand(expr)
            }
            Some(Token::Op(Op::LParen)) => {
                self.pos += 1;
                let body = self.parse_list(&[])?;
                self.expect_op(Op::RParen, "subshell")?;
                Command::Subshell(Box::new(body))
            }
            Some(Token::Word(_)) => match self.peek_literal() {
                Some("if") => self.parse_if()?,
                Some("while") => self.parse_while(false)?,
                Some("until") => self.parse_while(true)?,
                Some("for") => self.parse_for()?,
                Some("case") => self.parse_case()?,
                Some("{") => self.parse_brace_group()?,
                Some("[[") => self.parse_double_bracket()?,
                Some("function") => self.parse_function_keyword()?,
                _ => return self.parse_simple(stop_words),
            },
            // Redirect-first simple commands (`>out echo hi`) and bare
            // array assignments.
            Some(Token::Redir(_)) | Some(Token::ArrayAssign(_)) => {
                return self.parse_simple(stop_words)
            }
            _ => {
                return Err(SyntaxError::new(format!(
                    "expected command, found `{}`",
                    self.describe_current()
                )))
            }
        };
        self.wrap_redirects(cmd)
    }

    /// Attaches trailing redirections to a compound command.
    fn wrap_redirects(&mut self, cmd: Command) -> Result<Command, SyntaxError> {
        let mut redirects = Vec::new();
        while let Some(Token::Redir(_)) = self.peek() {
            let Some(Token::Redir(redir)) = self.tokens.get(self.pos).cloned() else {
                unreachable!()
            };
            self.pos += 1;
            redirects.push(redir);
        }
        Ok(if redirects.is_empty() {
            cmd
        } else {
            Command::Redirected {
                cmd: Box::new(cmd),
                redirects,
            }
        })
    }

    fn parse_if(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("if");
        let cond = self.parse_list(&["then"])?;
        self.expect_reserved("then", "`if`")?;
        let then = self.parse_list(&["elif", "else", "fi"])?;
        let mut elifs = Vec::new();
        let mut else_branch = None;
        loop {
            if self.eat_reserved("elif") {
                let elif_cond = self.parse_list(&["then"])?;
                self.expect_reserved("then", "`elif`")?;
                let elif_body = self.parse_list(&["elif", "else", "fi"])?;
                elifs.push((elif_cond, elif_body));
            } else if self.eat_reserved("else") {
                else_branch = Some(Box::new(self.parse_list(&["fi"])?));
            } else {
                break;
            }
        }
        self.expect_reserved("fi", "`if`")?;
        Ok(Command::If {
            cond: Box::new(cond),
            then: Box::new(then),
            elifs,
            else_branch,
        })
    }

    fn parse_while(&mut self, until: bool) -> Result<Command, SyntaxError> {
        self.pos += 1; // while / until
        let cond = self.parse_list(&["do"])?;
        self.expect_reserved("do", "loop")?;
        let body = self.parse_list(&["done"])?;
        self.expect_reserved("done", "loop")?;
        Ok(Command::While {
            cond: Box::new(cond),
            body: Box::new(body),
            until,
        })
    }

    fn parse_for(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("for");

        // C-style: `for (( init; cond; step ))` arrives as one token.
        if let Some(Token::ArithCmd(_)) = self.peek() {
            let Some(Token::ArithCmd(spec)) = self.tokens.get(self.pos).cloned() else {
                unreachable!()
            };
            self.pos += 1;
            let mut sections = spec.splitn(3, ';').map(|s| s.trim().to_string());
            let init = sections.next().unwrap_or_default();
            let cond = sections.next().ok_or_else(|| {
                SyntaxError::new("`for ((…))` needs three `;`-separated sections")
            })?;
            let step = sections.next().ok_or_else(|| {
                SyntaxError::new("`for ((…))` needs three `;`-separated sections")
            })?;
            self.eat_op(Op::Semi);
            self.skip_newlines();
            self.expect_reserved("do", "`for`")?;
            let body = self.parse_list(&["done"])?;
            self.expect_reserved("done", "`for`")?;
            return Ok(Command::CFor {
                init,
                cond,
                step,
                body: Box::new(body),
            });
        }

        let var_word = self.take_word("`for`")?;
        let var = var_word
            .as_literal()
            .filter(|name| is_valid_name(name))
            .ok_or_else(|| SyntaxError::new("bad `for` loop variable"))?
            .to_string();

        let mut words = None;
        self.skip_newlines();
        if self.eat_reserved("in") {
            let mut list = Vec::new();
            while let Some(Token::Word(_)) = self.peek() {
                list.push(self.take_word("`for` word list")?);
            }
            words = Some(list);
        }
        self.eat_op(Op::Semi);
        self.skip_newlines();
        self.expect_reserved("do", "`for`")?;
        let body = self.parse_list(&["done"])?;
        self.expect_reserved("done", "`for`")?;
        Ok(Command::For {
            var,
            words,
            body: Box::new(body),
        })
    }

    fn parse_case(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("case");
        let word = self.take_word("`case`")?;
        self.skip_newlines();
        self.expect_reserved("in", "`case`")?;
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_reserved("esac") {
                break;
            }
            self.eat_op(Op::LParen);
            let mut patterns = vec![self.take_word("`case` pattern")?];
            while self.eat_op(Op::Pipe) {
                patterns.push(self.take_word("`case` pattern")?);
            }
            self.expect_op(Op::RParen, "`case` pattern")?;
            self.skip_newlines();
            let body = if self.peek() == Some(&Token::Op(Op::DSemi)) || self.peek_literal() == Some("esac")
            {
                None
            } else {
                Some(self.parse_list(&["esac"])?)
            };
            self.eat_op(Op::DSemi);
            items.push(CaseItem { patterns, body });
        }
        Ok(Command::Case { word, items })
    }

    fn parse_brace_group(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("{");
        let body = self.parse_list(&["}"])?;
        self.expect_reserved("}", "brace group")?;
        Ok(Command::BraceGroup(Box::new(body)))
    }

    fn parse_double_bracket(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("[[");
        let mut words = Vec::new();
        loop {
            if self.eat_reserved("]]") {
                break;
            }
            match self.peek() {
                Some(Token::Word(_)) => words.push(self.take_word("`[[`")?),
                _ => {
                    return Err(SyntaxError::new(format!(
                        "expected `]]`, found `{}`",
                        self.describe_current()
                    )))
                }
            }
        }
        Ok(Command::DoubleBracket(words))
    }

    fn parse_function_keyword(&mut self) -> Result<Command, SyntaxError> {
        self.eat_reserved("function");
        let name_word = self.take_word("function definition")?;
        let name = name_word
            .as_literal()
            .filter(|name| is_valid_name(name))
            .ok_or_else(|| SyntaxError::new("bad function name"))?
            .to_string();
        if self.eat_op(Op::LParen) {
            self.expect_op(Op::RParen, "function definition")?;
        }
        self.skip_newlines();
        let body = self.parse_command(&[])?;
        Ok(Command::Function {
            name,
            body: Box::new(body),
        })
    }

    fn parse_simple(&mut self, _stop_words: &[&str]) -> Result<Command, SyntaxError> {
        let mut assignments: Vec<Assignment> = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirects: Vec<Redirect> = Vec::new();

        // `NAME () body` function definition.
        if let Some(name) = self.peek_literal() {
            if is_valid_name(name)
                && self.tokens.get(self.pos + 1) == Some(&Token::Op(Op::LParen))
                && self.tokens.get(self.pos + 2) == Some(&Token::Op(Op::RParen))
            {
                let name = name.to_string();
                self.pos += 3;
                self.skip_newlines();
                let body = self.parse_command(&[])?;
                return Ok(Command::Function {
                    name,
                    body: Box::new(body),
                });
            }
        }

        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    let word = self.take_word("command")?;
                    if words.is_empty() {
                        if let Some(assign) = scalar_assignment(&word) {
                            assignments.push(assign);
                            continue;
                        }
                    }
                    words.push(word);
                }
                Some(Token::ArrayAssign(_)) => {
                    let Some(Token::ArrayAssign(assign)) = self.tokens.get(self.pos).cloned()
                    else {
                        unreachable!()
                    };
                    self.pos += 1;
                    assignments.push(assign);
                }
                Some(Token::Redir(_)) => {
                    let Some(Token::Redir(redir)) = self.tokens.get(self.pos).cloned() else {
                        unreachable!()
                    };
                    self.pos += 1;
                    redirects.push(redir);
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            return Err(SyntaxError::new(format!(
                "expected command, found `{}`",
                self.describe_current()
            )));
        }

        // `break [n]` / `continue [n]` get their own nodes.
        if assignments.is_empty() && redirects.is_empty() && !words.is_empty() {
            if let Some(kw @ ("break" | "continue")) = words[0].as_literal() {
                let level = match words.get(1).and_then(|w| w.as_literal()) {
                    Some(n) if words.len() == 2 => n.parse().ok(),
                    None if words.len() == 1 => Some(1),
                    _ => None,
                };
                if let Some(level) = level {
                    return Ok(if kw == "break" {
                        Command::Break(level)
                    } else {
                        Command::Continue(level)
                    });
                }
            }
        }

        Ok(Command::Simple {
            assignments,
            words,
            redirects,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reclassifies a word as a `NAME=VALUE` / `NAME[IDX]=VALUE` /
/// `NAME+=VALUE` assignment when it is positioned as one.
fn scalar_assignment(word: &Word) -> Option<Assignment> {
    let first = match word.parts.first() {
        Some(WordPart::Literal(text)) => text,
        _ => return None,
    };
    let eq = first.find('=')?;
    let (lhs, append) = if eq > 0 && first.as_bytes()[eq - 1] == b'+' {
        (&first[..eq - 1], true)
    } else {
        (&first[..eq], false)
    };
    let (name, index) = match lhs.find('[') {
        Some(open) if lhs.ends_with(']') => {
            (&lhs[..open], Some(lhs[open + 1..lhs.len() - 1].to_string()))
        }
        Some(_) => return None,
        None => (lhs, None),
    };
    if !is_valid_name(name) {
        return None;
    }
    let mut value_parts = Vec::new();
    let remainder = &first[eq + 1..];
    if !remainder.is_empty() {
        value_parts.push(WordPart::Literal(remainder.to_string()));
    }
    value_parts.extend(word.parts.iter().skip(1).cloned());
    Some(Assignment {
        name: name.to_string(),
        index,
        value: AssignValue::Scalar(Word { parts: value_parts }),
        append,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Command {
        parse(input).unwrap().unwrap()
    }

    #[test]
    fn simple_command_with_assignment_prefix() {
        let cmd = parse_one("FOO=bar echo hi");
        match cmd {
            Command::Simple {
                assignments, words, ..
            } => {
                assert_eq!(assignments.len(), 1);
                assert_eq!(assignments[0].name, "FOO");
                assert_eq!(words.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_assignment_is_not_a_command_word() {
        let cmd = parse_one("X=1");
        match cmd {
            Command::Simple {
                assignments, words, ..
            } => {
                assert_eq!(assignments.len(), 1);
                assert!(words.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipeline_groups_commands() {
        let cmd = parse_one("sort data.txt | uniq | wc -l");
        match cmd {
            Command::Pipeline { cmds } => assert_eq!(cmds.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn and_or_lists_associate_left() {
        let cmd = parse_one("a && b || c");
        match cmd {
            Command::List { op: ListOp::Or, left, .. } => match *left {
                Command::List { op: ListOp::And, .. } => {}
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_elif_else_fi() {
        let cmd = parse_one("if a; then b; elif c; then d; else e; fi");
        match cmd {
            Command::If {
                elifs, else_branch, ..
            } => {
                assert_eq!(elifs.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_loop_with_word_list() {
        let cmd = parse_one("for i in 1 2 3; do echo $i; done");
        match cmd {
            Command::For { var, words, .. } => {
                assert_eq!(var, "i");
                assert_eq!(words.unwrap().len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn c_style_for_loop() {
        let cmd = parse_one("for ((i=0; i<5; i++)); do echo $i; done");
        match cmd {
            Command::CFor { init, cond, step, .. } => {
                assert_eq!(init, "i=0");
                assert_eq!(cond, "i<5");
                assert_eq!(step, "i++");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn while_and_until() {
        assert!(matches!(
            parse_one("while a; do b; done"),
            Command::While { until: false, .. }
        ));
        assert!(matches!(
            parse_one("until a; do b; done"),
            Command::While { until: true, .. }
        ));
    }

    #[test]
    fn case_items_with_multiple_patterns() {
        let cmd = parse_one("case $x in a|b) echo ab;; *) echo other;; esac");
        match cmd {
            Command::Case { items, .. } => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].patterns.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn function_definitions_both_spellings() {
        assert!(matches!(
            parse_one("greet() { echo hi; }"),
            Command::Function { .. }
        ));
        assert!(matches!(
            parse_one("function greet { echo hi; }"),
            Command::Function { .. }
        ));
    }

    #[test]
    fn subshell_and_brace_group() {
        assert!(matches!(parse_one("(cd /tmp; pwd)"), Command::Subshell(_)));
        assert!(matches!(parse_one("{ a; b; }"), Command::BraceGroup(_)));
    }

    #[test]
    fn negated_pipeline() {
        assert!(matches!(parse_one("! false"), Command::Negate(_)));
    }

    #[test]
    fn break_and_continue_nodes() {
        assert_eq!(parse_one("break"), Command::Break(1));
        assert_eq!(parse_one("break 2"), Command::Break(2));
        assert_eq!(parse_one("continue"), Command::Continue(1));
    }

    #[test]
    fn double_bracket_collects_words() {
        let cmd = parse_one("[[ $a == b* ]]");
        match cmd {
            Command::DoubleBracket(words) => assert_eq!(words.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compound_redirects_wrap() {
        let cmd = parse_one("{ echo a; echo b; } > out.txt");
        assert!(matches!(cmd, Command::Redirected { .. }));
    }

    #[test]
    fn background_amp_separates_like_semicolon() {
        let cmd = parse_one("a & b");
        assert!(matches!(cmd, Command::List { op: ListOp::Seq, .. }));
    }

    #[test]
    fn syntax_errors_name_the_construct() {
        let err = parse("if true; then echo hi").unwrap_err();
        assert!(err.message.contains("fi"), "got: {}", err.message);
        assert!(parse("for do done").is_err());
        assert!(parse("echo |").is_err());
    }

    #[test]
    fn empty_input_parses_to_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("  # only a comment\n").unwrap(), None);
    }
}
