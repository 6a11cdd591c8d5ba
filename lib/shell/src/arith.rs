//! Arithmetic expansion: a recursive-descent integer evaluator with C
//! operator precedence, assignments and increment/decrement (needed by
//! `for (( ; ; ))`).

use crate::error::ShellError;

/// Variable access for the evaluator; unset names read as zero.
pub trait ArithScope {
    fn get(&self, name: &str) -> i64;
    fn set(&mut self, name: &str, value: i64);
}

pub fn eval(expr: &str, scope: &mut dyn ArithScope) -> Result<i64, ShellError> {
    let tokens = tokenize(expr)?;
    let mut parser = ArithParser {
        tokens,
        pos: 0,
        scope,
    };
    if parser.at_end() {
        // An empty expression (e.g. `for ((;;))` sections) is zero.
        return Ok(0);
    }
    let value = parser.comma()?;
    if !parser.at_end() {
        return Err(ShellError::Arith(format!(
            "unexpected `{}` in `{expr}`",
            parser.describe()
        )));
    }
    Ok(value)
}

#[derive(Clone, Debug, PartialEq)]
enum ATok {
    Num(i64),
    Ident(String),
    Op(&'static str),
}

const OPS: &[&str] = &[
    "<<=", ">>=", "**", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=",
    "*=", "/=", "%=", "&=", "^=", "|=", "?", ":", ",", "+", "-", "*", "/", "%", "<", ">", "!",
    "~", "&", "^", "|", "(", ")", "=",
];

fn tokenize(expr: &str) -> Result<Vec<ATok>, ShellError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;
    'outer: while idx < chars.len() {
        let c = chars[idx];
        if c.is_whitespace() {
            idx += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = idx;
            while idx < chars.len() && chars[idx].is_ascii_alphanumeric() {
                idx += 1;
            }
            let text: String = chars[start..idx].iter().collect();
            let value = parse_number(&text)
                .ok_or_else(|| ShellError::Arith(format!("bad number `{text}`")))?;
            tokens.push(ATok::Num(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = if c == '$' { idx + 1 } else { idx };
            idx = start;
            while idx < chars.len() && (chars[idx].is_ascii_alphanumeric() || chars[idx] == '_') {
                idx += 1;
            }
            if idx == start {
                return Err(ShellError::Arith("dangling `$`".to_string()));
            }
            tokens.push(ATok::Ident(chars[start..idx].iter().collect()));
            continue;
        }
        for op in OPS {
            if chars[idx..].starts_with(&op.chars().collect::<Vec<_>>()[..]) {
                tokens.push(ATok::Op(op));
                idx += op.len();
                continue 'outer;
            }
        }
        return Err(ShellError::Arith(format!("unexpected character `{c}`")));
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

struct ArithParser<'a> {
    tokens: Vec<ATok>,
    pos: usize,
    scope: &'a mut dyn ArithScope,
}

impl ArithParser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&ATok> {
        self.tokens.get(self.pos)
    }

    fn describe(&self) -> String {
        match self.peek() {
            Some(ATok::Op(op)) => (*op).to_string(),
            Some(ATok::Ident(name)) => name.clone(),
            Some(ATok::Num(n)) => n.to_string(),
            None => "end of expression".to_string(),
        }
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.peek() == Some(&ATok::Op(op_static(op))) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn comma(&mut self) -> Result<i64, ShellError> {
        let mut value = self.assignment()?;
        while self.eat(",") {
            value = self.assignment()?;
        }
        Ok(value)
    }

    fn assignment(&mut self) -> Result<i64, ShellError> {
        // Lookahead: IDENT op= …
        if let Some(ATok::Ident(name)) = self.peek().cloned() {
            if let Some(ATok::Op(op)) = self.tokens.get(self.pos + 1) {
                let combine: Option<fn(i64, i64) -> Result<i64, ShellError>> = match *op {
                    "=" => Some(|_, b| Ok(b)),
                    "+=" => Some(|a, b| Ok(a.wrapping_add(b))),
                    "-=" => Some(|a, b| Ok(a.wrapping_sub(b))),
                    "*=" => Some(|a, b| Ok(a.wrapping_mul(b))),
                    "/=" => Some(checked_div),
                    "%=" => Some(checked_rem),
                    "<<=" => Some(|a, b| Ok(a.wrapping_shl(b as u32))),
                    ">>=" => Some(|a, b| Ok(a.wrapping_shr(b as u32))),
                    "&=" => Some(|a, b| Ok(a & b)),
                    "^=" => Some(|a, b| Ok(a ^ b)),
                    "|=" => Some(|a, b| Ok(a | b)),
                    _ => None,
                };
                if let Some(combine) = combine {
                    self.pos += 2;
                    let rhs = self.assignment()?;
                    let value = combine(self.scope.get(&name), rhs)?;
                    self.scope.set(&name, value);
                    return Ok(value);
                }
            }
        }
        self.ternary()
    }

    fn ternary(&mut self) -> Result<i64, ShellError> {
        let cond = self.logical_or()?;
        if self.eat("?") {
            // Both branches are parsed; only the chosen one is kept.
            let then = self.assignment()?;
            if !self.eat(":") {
                return Err(ShellError::Arith("expected `:` in `?:`".to_string()));
            }
            let other = self.assignment()?;
            return Ok(if cond != 0 { then } else { other });
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> Result<i64, ShellError> {
        let mut value = self.logical_and()?;
        while self.eat("||") {
            let rhs = self.logical_and()?;
            value = ((value != 0) || (rhs != 0)) as i64;
        }
        Ok(value)
    }

    fn logical_and(&mut self) -> Result<i64, ShellError> {
        let mut value = self.bit_or()?;
        while self.eat("&&") {
            let rhs = self.bit_or()?;
            value = ((value != 0) && (rhs != 0)) as i64;
        }
        Ok(value)
    }

    fn bit_or(&mut self) -> Result<i64, ShellError> {
        let mut value = self.bit_xor()?;
        while self.eat("|") {
            value |= self.bit_xor()?;
        }
        Ok(value)
    }

    fn bit_xor(&mut self) -> Result<i64, ShellError> {
        let mut value = self.bit_and()?;
        while self.eat("^") {
            value ^= self.bit_and()?;
        }
        Ok(value)
    }

    fn bit_and(&mut self) -> Result<i64, ShellError> {
        let mut value = self.equality()?;
        while self.eat("&") {
            value &= self.equality()?;
        }
        Ok(value)
    }

    fn equality(&mut self) -> Result<i64, ShellError> {
        let mut value = self.relational()?;
        loop {
            if self.eat("==") {
                value = (value == self.relational()?) as i64;
            } else if self.eat("!=") {
                value = (value != self.relational()?) as i64;
            } else {
                return Ok(value);
            }
        }
    }

    fn relational(&mut self) -> Result<i64, ShellError> {
        let mut value = self.shift()?;
        loop {
            if self.eat("<=") {
                value = (value <= self.shift()?) as i64;
            } else if self.eat(">=") {
                value = (value >= self.shift()?) as i64;
            } else if self.eat("<") {
                value = (value < self.shift()?) as i64;
            } else if self.eat(">") {
                value = (value > self.shift()?) as i64;
            } else {
                return Ok(value);
            }
        }
    }

    fn shift(&mut self) -> Result<i64, ShellError> {
        let mut value = self.additive()?;
        loop {
            if self.eat("<<") {
                value = value.wrapping_shl(self.additive()? as u32);
            } else if self.eat(">>") {
                value = value.wrapping_shr(self.additive()? as u32);
            } else {
                return Ok(value);
            }
        }
    }

    fn additive(&mut self) -> Result<i64, ShellError> {
        let mut value = self.term()?;
        loop {
            if self.eat("+") {
                value = value.wrapping_add(self.term()?);
            } else if self.eat("-") {
                value = value.wrapping_sub(self.term()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<i64, ShellError> {
        let mut value = self.power()?;
        loop {
            if self.eat("*") {
                value = value.wrapping_mul(self.power()?);
            } else if self.eat("/") {
                value = checked_div(value, self.power()?)?;
            } else if self.eat("%") {
                value = checked_rem(value, self.power()?)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn power(&mut self) -> Result<i64, ShellError> {
        let base = self.unary()?;
        if self.eat("**") {
            let exp = self.power()?;
            if exp < 0 {
                return Err(ShellError::Arith("negative exponent".to_string()));
            }
            return Ok(base.wrapping_pow(exp as u32));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<i64, ShellError> {
        if self.eat("!") {
            return Ok((self.unary()? == 0) as i64);
        }
        if self.eat("~") {
            return Ok(!self.unary()?);
        }
        if self.eat("-") {
            return Ok(self.unary()?.wrapping_neg());
        }
        if self.eat("+") {
            return self.unary();
        }
        if self.eat("++") {
            let name = self.expect_ident("++")?;
            let value = self.scope.get(&name).wrapping_add(1);
            self.scope.set(&name, value);
            return Ok(value);
        }
        if self.eat("--") {
            let name = self.expect_ident("--")?;
            let value = self.scope.get(&name).wrapping_sub(1);
            self.scope.set(&name, value);
            return Ok(value);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<i64, ShellError> {
        match self.peek().cloned() {
            Some(ATok::Num(value)) => {
                self.pos += 1;
                Ok(value)
            }
            Some(ATok::Ident(name)) => {
                self.pos += 1;
                let value = self.scope.get(&name);
                if self.eat("++") {
                    self.scope.set(&name, value.wrapping_add(1));
                } else if self.eat("--") {
                    self.scope.set(&name, value.wrapping_sub(1));
                }
                Ok(value)
            }
            Some(ATok::Op("(")) => {
                self.pos += 1;
                let value = self.comma()?;
                if !self.eat(")") {
                    return Err(ShellError::Arith("expected `)`".to_string()));
                }
                Ok(value)
            }
            _ => Err(ShellError::Arith(format!(
                "expected operand, found `{}`",
                self.describe()
            ))),
        }
    }

    fn expect_ident(&mut self, op: &str) -> Result<String, ShellError> {
        match self.peek().cloned() {
            Some(ATok::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(ShellError::Arith(format!("`{op}` needs a variable"))),
        }
    }
}

fn checked_div(a: i64, b: i64) -> Result<i64, ShellError> {
    if b == 0 {
        Err(ShellError::Arith("division by zero".to_string()))
    } else {
        Ok(a.wrapping_div(b))
    }
}

fn checked_rem(a: i64, b: i64) -> Result<i64, ShellError> {
    if b == 0 {
        Err(ShellError::Arith("division by zero".to_string()))
    } else {
        Ok(a.wrapping_rem(b))
    }
}

fn op_static(op: &str) -> &'static str {
    OPS.iter().find(|candidate| **candidate == op).copied().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Vars(HashMap<String, i64>);

    impl ArithScope for Vars {
        fn get(&self, name: &str) -> i64 {
            self.0.get(name).copied().unwrap_or(0)
        }
        fn set(&mut self, name: &str, value: i64) {
            self.0.insert(name.to_string(), value);
        }
    }

    fn vars() -> Vars {
        Vars(HashMap::new())
    }

    fn eval_str(expr: &str) -> i64 {
        eval(expr, &mut vars()).unwrap()
    }

    #[test]
    fn precedence_is_c_like() {
        assert_eq!(eval_str("1 + 2 * 3"), 7);
        assert_eq!(eval_str("(1 + 2) * 3"), 9);
        assert_eq!(eval_str("10 - 4 - 3"), 3);
        assert_eq!(eval_str("2 ** 3 ** 2"), 512);
        assert_eq!(eval_str("7 / 2"), 3);
        assert_eq!(eval_str("7 % 3"), 1);
        assert_eq!(eval_str("1 << 4 | 3"), 19);
    }

    #[test]
    fn comparisons_and_logic_yield_zero_or_one() {
        assert_eq!(eval_str("3 < 5"), 1);
        assert_eq!(eval_str("3 >= 5"), 0);
        assert_eq!(eval_str("1 && 0"), 0);
        assert_eq!(eval_str("1 || 0"), 1);
        assert_eq!(eval_str("!5"), 0);
        assert_eq!(eval_str("5 == 5 && 2 != 3"), 1);
    }

    #[test]
    fn ternary_and_comma() {
        assert_eq!(eval_str("1 ? 10 : 20"), 10);
        assert_eq!(eval_str("0 ? 10 : 20"), 20);
        assert_eq!(eval_str("1, 2, 3"), 3);
    }

    #[test]
    fn variables_and_assignment() {
        let mut scope = vars();
        assert_eq!(eval("x = 5", &mut scope).unwrap(), 5);
        assert_eq!(eval("x += 3", &mut scope).unwrap(), 8);
        assert_eq!(eval("x * 2", &mut scope).unwrap(), 16);
        assert_eq!(eval("unset_var + 1", &mut scope).unwrap(), 1);
        assert_eq!(eval("$x + 1", &mut scope).unwrap(), 9);
    }

    #[test]
    fn increments_pre_and_post() {
        let mut scope = vars();
        scope.set("i", 5);
        assert_eq!(eval("i++", &mut scope).unwrap(), 5);
        assert_eq!(scope.get("i"), 6);
        assert_eq!(eval("++i", &mut scope).unwrap(), 7);
        assert_eq!(eval("i--", &mut scope).unwrap(), 7);
        assert_eq!(scope.get("i"), 6);
    }

    #[test]
    fn hex_and_octal_literals() {
        assert_eq!(eval_str("0x10"), 16);
        assert_eq!(eval_str("010"), 8);
        assert_eq!(eval_str("0"), 0);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            eval("1 / 0", &mut vars()),
            Err(ShellError::Arith(_))
        ));
        assert!(matches!(
            eval("1 % 0", &mut vars()),
            Err(ShellError::Arith(_))
        ));
    }

    #[test]
    fn empty_expression_is_zero() {
        assert_eq!(eval_str(""), 0);
        assert_eq!(eval_str("  "), 0);
    }
}
